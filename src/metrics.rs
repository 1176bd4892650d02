//! Metrics for scoring class predictions.
use ndarray::Array2;

use crate::error::{Error, Result};

/// Index of the largest score in each row; ties go to the lowest index.
pub fn argmax_rows(scores: &Array2<f64>) -> Vec<usize> {
    scores
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold(0usize, |max_i, (i, &v)| if v > row[max_i] { i } else { max_i })
        })
        .collect()
}

/// Accuracy
pub fn accuracy(scores: &Array2<f64>, labels: &[usize]) -> Result<f64> {
    if scores.nrows() != labels.len() {
        return Err(Error::shape("labels", &[scores.nrows()], &[labels.len()]));
    }
    if labels.is_empty() {
        return Err(Error::EmptyDataset);
    }
    let correct = argmax_rows(scores)
        .iter()
        .zip(labels)
        .filter(|(pred, label)| pred == label)
        .count();
    Ok(correct as f64 / labels.len() as f64)
}

/// Confusion matrix indexed `[true][predicted]`.
pub fn confusion_matrix(scores: &Array2<f64>, labels: &[usize], classes: usize) -> Result<Vec<Vec<usize>>> {
    if scores.nrows() != labels.len() {
        return Err(Error::shape("labels", &[scores.nrows()], &[labels.len()]));
    }
    let mut cm = vec![vec![0; classes]; classes];
    for (pred, &label) in argmax_rows(scores).into_iter().zip(labels) {
        if label >= classes || pred >= classes {
            return Err(Error::LabelOutOfRange {
                label: label.max(pred),
                classes,
            });
        }
        cm[label][pred] += 1;
    }
    Ok(cm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn argmax_prefers_first_of_ties() {
        let scores = array![[0.1, 0.9], [0.5, 0.5], [0.7, 0.3]];
        assert_eq!(argmax_rows(&scores), vec![1, 0, 0]);
    }

    #[test]
    fn accuracy_counts_matches() {
        let scores = array![[0.1, 0.9], [0.8, 0.2], [0.3, 0.7], [0.6, 0.4]];
        assert_eq!(accuracy(&scores, &[1, 0, 0, 0]).unwrap(), 0.75);
        assert!(accuracy(&scores, &[1, 0]).is_err());
    }

    #[test]
    fn confusion_matrix_tallies() {
        let scores = array![[0.1, 0.9], [0.8, 0.2], [0.3, 0.7]];
        let cm = confusion_matrix(&scores, &[1, 0, 0], 2).unwrap();
        assert_eq!(cm, vec![vec![1, 1], vec![0, 1]]);
        assert!(confusion_matrix(&scores, &[1, 0, 5], 2).is_err());
    }
}
