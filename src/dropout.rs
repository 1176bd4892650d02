//! Dropout masks.
//!
//! A mask is drawn per hidden layer per training batch, multiplied into that
//! layer's output on the way forward and into its gradient on the way back.
//! Inference never masks: hidden layers are evaluated with a keep-probability
//! scale instead (see [`crate::layers::DenseLayer::predict`]).
use ndarray::Array2;
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Bernoulli;

use crate::error::{Error, Result};

/// Draw a binary mask where each entry is kept (1.0) with probability `1 - rate`.
pub fn bernoulli_mask<R: Rng + ?Sized>(
    shape: (usize, usize),
    rate: f64,
    rng: &mut R,
) -> Result<Array2<f64>> {
    if !(0.0..1.0).contains(&rate) {
        return Err(Error::InvalidConfig(format!(
            "dropout rate must be in [0, 1), got {}",
            rate
        )));
    }
    let keep = Bernoulli::new(1.0 - rate)
        .map_err(|e| Error::InvalidConfig(format!("dropout rate {}: {}", rate, e)))?;
    let draws: Array2<bool> = Array2::random_using(shape, keep, rng);
    Ok(draws.mapv(|kept| if kept { 1.0 } else { 0.0 }))
}

/// Masks of the batch in flight, indexed by hidden layer.
///
/// Cleared at the start of every forward pass so a mask never outlives its batch.
#[derive(Debug, Default, Clone)]
pub struct MaskStore {
    masks: Vec<Option<Array2<f64>>>,
}

impl MaskStore {
    pub fn new(layers: usize) -> Self {
        Self {
            masks: vec![None; layers],
        }
    }

    /// Forget every mask from the previous batch.
    pub fn clear(&mut self) {
        for mask in &mut self.masks {
            *mask = None;
        }
    }

    pub fn insert(&mut self, layer: usize, mask: Array2<f64>) {
        if layer >= self.masks.len() {
            self.masks.resize(layer + 1, None);
        }
        self.masks[layer] = Some(mask);
    }

    pub fn get(&self, layer: usize) -> Option<&Array2<f64>> {
        self.masks.get(layer).and_then(Option::as_ref)
    }

    pub fn is_empty(&self) -> bool {
        self.masks.iter().all(Option::is_none)
    }
}

/// Multiply `mask` into `target` in place.
pub fn apply_mask(target: &mut Array2<f64>, mask: &Array2<f64>) -> Result<()> {
    if target.raw_dim() != mask.raw_dim() {
        return Err(Error::shape("dropout mask", target.shape(), mask.shape()));
    }
    *target *= mask;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn mask_is_binary_with_expected_keep_rate() {
        let mut rng = StdRng::seed_from_u64(7);
        let mask = bernoulli_mask((200, 50), 0.3, &mut rng).unwrap();
        assert!(mask.iter().all(|&v| v == 0.0 || v == 1.0));
        let kept = mask.sum() / mask.len() as f64;
        assert!((kept - 0.7).abs() < 0.03, "kept fraction {}", kept);
    }

    #[test]
    fn zero_rate_keeps_everything() {
        let mut rng = StdRng::seed_from_u64(1);
        let mask = bernoulli_mask((4, 3), 0.0, &mut rng).unwrap();
        assert!(mask.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn rejects_rates_outside_unit_interval() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(bernoulli_mask((2, 2), 1.0, &mut rng).is_err());
        assert!(bernoulli_mask((2, 2), -0.1, &mut rng).is_err());
    }

    #[test]
    fn same_seed_same_mask() {
        let a = bernoulli_mask((5, 5), 0.5, &mut StdRng::seed_from_u64(3)).unwrap();
        let b = bernoulli_mask((5, 5), 0.5, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn store_is_cleared_per_batch() {
        let mut store = MaskStore::new(2);
        store.insert(1, array![[1.0, 0.0]]);
        assert!(store.get(0).is_none());
        assert_eq!(store.get(1), Some(&array![[1.0, 0.0]]));
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn apply_mask_zeroes_dropped_units() {
        let mut out = array![[0.5, 0.25], [0.75, 1.0]];
        apply_mask(&mut out, &array![[1.0, 0.0], [0.0, 1.0]]).unwrap();
        assert_eq!(out, array![[0.5, 0.0], [0.0, 1.0]]);
        assert!(apply_mask(&mut out, &array![[1.0, 0.0]]).is_err());
    }
}
