//! FLINNG: sub-linear approximate nearest-neighbor search over LSH-filtered
//! cell groups.
//!
//! A [`FlinngIndex`] scatters every inserted point into `num_rows` random
//! cells (one per row) and records which cells each of its LSH hash values
//! points at. A query walks the cells struck by its own hashes, highest
//! strike count first, and returns the first `top_k` points whose cells were
//! struck in every row.
//!
//! Most callers want one of the typed wrappers built through
//! [`FlinngBuilder`] rather than [`FlinngIndex`] directly:
//!
//! ```
//! use flinng_rs::FlinngBuilder;
//!
//! let mut index = FlinngBuilder::new()
//!     .num_rows(3)
//!     .cells_per_row(4096)
//!     .num_hash_tables(8)
//!     .hashes_per_table(6)
//!     .seed(42)
//!     .srp(4)
//!     .unwrap();
//!
//! index.add_points(&[1.0, 2.0, 3.0, 4.0]).unwrap();
//! let neighbors = index.query(&[1.0, 2.0, 3.0, 4.0], 1).unwrap();
//! assert_eq!(neighbors, vec![0]);
//! ```
pub mod data;
pub mod dist;
pub mod error;
pub mod hash;
pub mod index;
mod serialize;
pub mod store;
pub mod utils;
pub mod wrapper;

pub use crate::error::{Error, Result};
pub use crate::hash::{DensifiedMinHash, HashFamily, L2Lsh, Srp};
pub use crate::index::FlinngIndex;
pub use crate::store::{SparseStore, VecStore};
pub use crate::wrapper::{DenseAngularIndex, DenseL2Index, FlinngBuilder, SparseIndex};
