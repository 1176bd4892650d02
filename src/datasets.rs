//! Dataset providers: the XOR toy set and MNIST in IDX format.
//!
//! These sit outside the training core; they only produce an input matrix and
//! a label vector of the same length.
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::GzDecoder;
use ndarray::{array, Array2};

use crate::error::{Error, Result};

/// Feature matrix and matching class labels.
pub type Dataset = (Array2<f64>, Vec<usize>);

const LABEL_MAGIC: i32 = 2049;
const IMAGE_MAGIC: i32 = 2051;

/// The four XOR points.
pub fn xor() -> Dataset {
    (
        array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]],
        vec![0, 1, 1, 0],
    )
}

/// Divide every value by the largest one; an all-zero matrix is returned unchanged.
pub fn normalize_by_max(data: &Array2<f64>) -> Array2<f64> {
    let max = data.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    if max > 0.0 && max.is_finite() {
        data / max
    } else {
        data.clone()
    }
}

/// Raw IDX file
#[derive(Debug)]
struct IdxData {
    sizes: Vec<usize>,
    data: Vec<u8>,
}

impl IdxData {
    /// Read `path`, or `path.gz` if only the compressed file exists.
    fn open(path: &Path) -> Result<Self> {
        let gz_path = {
            let mut name = path.as_os_str().to_owned();
            name.push(".gz");
            PathBuf::from(name)
        };
        let (file, gzipped) = match File::open(path) {
            Ok(file) => (file, path.extension().map_or(false, |ext| ext == "gz")),
            Err(e) if e.kind() == io::ErrorKind::NotFound => (File::open(&gz_path)?, true),
            Err(e) => return Err(e.into()),
        };
        let mut contents = Vec::new();
        if gzipped {
            GzDecoder::new(file).read_to_end(&mut contents)?;
        } else {
            let mut file = file;
            file.read_to_end(&mut contents)?;
        }
        Self::parse(&contents)
    }

    fn parse(contents: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(contents);
        let magic = r.read_i32::<BigEndian>()?;
        let dims = match magic {
            LABEL_MAGIC => 1,
            IMAGE_MAGIC => 3,
            _ => return Err(Error::Dataset(format!("invalid IDX magic: {}", magic))),
        };
        let mut sizes = Vec::with_capacity(dims);
        for _ in 0..dims {
            let size = r.read_i32::<BigEndian>()?;
            let size = usize::try_from(size)
                .map_err(|_| Error::Dataset(format!("negative IDX dimension: {}", size)))?;
            sizes.push(size);
        }
        let mut data = Vec::new();
        r.read_to_end(&mut data)?;
        let expected = checked_product(&sizes)?;
        if data.len() < expected {
            return Err(Error::Dataset(format!(
                "IDX payload holds {} bytes, header promises {}",
                data.len(),
                expected
            )));
        }
        data.truncate(expected);
        Ok(Self { sizes, data })
    }
}

fn checked_product(sizes: &[usize]) -> Result<usize> {
    sizes
        .iter()
        .try_fold(1usize, |acc, &s| acc.checked_mul(s))
        .ok_or_else(|| Error::Dataset("IDX dimensions overflow".into()))
}

/// Load an IDX image file as a `(images, rows * cols)` matrix of raw pixel values.
pub fn load_idx_images<P: AsRef<Path>>(path: P) -> Result<Array2<f64>> {
    let idx = IdxData::open(path.as_ref())?;
    images_from(idx)
}

fn images_from(idx: IdxData) -> Result<Array2<f64>> {
    if idx.sizes.len() != 3 {
        return Err(Error::Dataset("not an image file".into()));
    }
    let (count, pixels) = (idx.sizes[0], checked_product(&idx.sizes[1..])?);
    let values: Vec<f64> = idx.data.into_iter().map(f64::from).collect();
    Array2::from_shape_vec((count, pixels), values)
        .map_err(|e| Error::Dataset(format!("image payload: {}", e)))
}

/// Load an IDX label file.
pub fn load_idx_labels<P: AsRef<Path>>(path: P) -> Result<Vec<usize>> {
    let idx = IdxData::open(path.as_ref())?;
    labels_from(idx)
}

fn labels_from(idx: IdxData) -> Result<Vec<usize>> {
    if idx.sizes.len() != 1 {
        return Err(Error::Dataset("not a label file".into()));
    }
    Ok(idx.data.into_iter().map(usize::from).collect())
}

/// Load the MNIST training or test split from `dir`, pixels left unnormalised.
pub fn load_mnist<P: AsRef<Path>>(dir: P, train: bool) -> Result<Dataset> {
    let prefix = if train { "train" } else { "t10k" };
    let dir = dir.as_ref();
    let images = load_idx_images(dir.join(format!("{}-images-idx3-ubyte", prefix)))?;
    let labels = load_idx_labels(dir.join(format!("{}-labels-idx1-ubyte", prefix)))?;
    if images.nrows() != labels.len() {
        return Err(Error::shape("MNIST labels", &[images.nrows()], &[labels.len()]));
    }
    if labels.is_empty() {
        return Err(Error::EmptyDataset);
    }
    Ok((images, labels))
}
