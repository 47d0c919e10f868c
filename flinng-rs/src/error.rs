//! Error types shared by every module in this crate.
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Caller passed data whose shape does not match the index configuration
    /// (wrong hash-stream length, wrong dimensionality, hash value out of range, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Constructor arguments violate a structural constraint (e.g. `R < 2`,
    /// `sub_hash_bits * hashes_per_table >= 32`).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A bucket, cell or stored vector could not be found.
    #[error("not found")]
    NotFound,
    /// Catch-all for a failed operation that doesn't fit the variants above.
    #[error("operation failed: {0}")]
    Failed(String),
    /// Persisted index does not carry the expected magic number / format version.
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Bincode(#[from] std::boxed::Box<bincode::ErrorKind>),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
