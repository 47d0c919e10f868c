//! Optional raw-descriptor retention for `*_and_store`/`search_with_distance`.
//!
//! FLINNG's index proper never needs a point's original vector once it has
//! been hashed; distance re-ranking does. `VecStore` is kept as a thin,
//! separate append-only structure so callers who only need approximate
//! membership (no re-ranking) aren't forced to pay for storage they don't use.
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Flat, row-major storage of fixed-width dense descriptors (`f32` rows of
/// width `dim`), indexed by the same point ids `FlinngIndex` hands out.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VecStore {
    dim: usize,
    data: Vec<f32>,
}

impl VecStore {
    pub fn new(dim: usize) -> Self {
        VecStore { dim, data: Vec::new() }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a flat, point-major batch of descriptors.
    pub fn add(&mut self, points: &[f32]) -> Result<()> {
        if self.dim == 0 || points.len() % self.dim != 0 {
            return Err(Error::InvalidInput(format!(
                "input length {} is not a positive multiple of dim {}",
                points.len(),
                self.dim
            )));
        }
        self.data.extend_from_slice(points);
        Ok(())
    }

    pub fn get(&self, id: u32) -> Result<&[f32]> {
        let start = id as usize * self.dim;
        let end = start + self.dim;
        self.data.get(start..end).ok_or(Error::NotFound)
    }
}

/// Flat storage of ragged sparse token sets (used by `SparseIndex`), indexed
/// the same way as [`VecStore`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SparseStore {
    rows: Vec<Vec<u64>>,
}

impl SparseStore {
    pub fn new() -> Self {
        SparseStore { rows: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a batch of token sets, sorting each for `dist::jaccard_sim`'s
    /// merge-intersection.
    pub fn add(&mut self, points: &[Vec<u64>]) {
        for tokens in points {
            let mut sorted = tokens.clone();
            sorted.sort_unstable();
            sorted.dedup();
            self.rows.push(sorted);
        }
    }

    pub fn get(&self, id: u32) -> Result<&[u64]> {
        self.rows.get(id as usize).map(|v| v.as_slice()).ok_or(Error::NotFound)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_vec_store_roundtrip() {
        let mut store = VecStore::new(3);
        store.add(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(store.get(1).unwrap(), &[4.0, 5.0, 6.0]);
        assert!(store.get(2).is_err());
    }

    #[test]
    fn test_vec_store_rejects_misaligned_batch() {
        let mut store = VecStore::new(3);
        assert!(store.add(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_sparse_store_roundtrip() {
        let mut store = SparseStore::new();
        store.add(&[vec![3, 1, 2], vec![5, 4]]);
        assert_eq!(store.get(0).unwrap(), &[1, 2, 3]);
        assert_eq!(store.get(1).unwrap(), &[4, 5]);
        assert!(store.get(2).is_err());
    }
}
