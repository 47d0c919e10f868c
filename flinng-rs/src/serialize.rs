//! Binary snapshot/restore for [`FlinngIndex`] and the typed wrappers.
//!
//! Every file starts with a magic number and format version so a reader can
//! reject foreign or future-versioned files outright, a gap in the original
//! format this crate deliberately closes. The remainder is a single `bincode`
//! blob, mirroring the reference crate's `IntermediatBlob` pattern (`lsh.rs`):
//! persistent state is gathered into one plain-old-data struct and serialized
//! in one shot, rather than hand-rolling a byte-for-byte writer for every field.
use crate::error::{Error, Result};
use crate::hash::{DensifiedMinHash, L2Lsh, Srp};
use crate::index::FlinngIndex;
use crate::store::{SparseStore, VecStore};
use crate::wrapper::{DenseAngularIndex, DenseL2Index, SparseIndex};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

const MAGIC: [u8; 4] = *b"FLNG";
const VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
enum Blob {
    DenseAngular {
        index_core: Vec<u8>,
        hasher: Srp,
        dim: u64,
        store: Option<VecStore>,
    },
    DenseL2 {
        index_core: Vec<u8>,
        hasher: L2Lsh,
        dim: u64,
        store: Option<VecStore>,
    },
    Sparse {
        index_core: Vec<u8>,
        hasher: DensifiedMinHash,
        store: Option<SparseStore>,
    },
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let mut tmp_path = dir.to_path_buf();
    let tmp_name = match path.file_name() {
        Some(name) => format!(".{}.tmp", name.to_string_lossy()),
        None => ".flinng.tmp".to_string(),
    };
    tmp_path.push(tmp_name);

    {
        let mut f = File::create(&tmp_path)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_framed(path: &Path) -> Result<Blob> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    if buf.len() < 8 {
        return Err(Error::Serialization("file too short to contain a header".to_string()));
    }
    if buf[0..4] != MAGIC {
        return Err(Error::Serialization("magic number mismatch; not a flinng-rs index file".to_string()));
    }
    let version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if version != VERSION {
        return Err(Error::Serialization(format!(
            "unsupported format version {} (expected {})",
            version, VERSION
        )));
    }
    log::debug!("reading flinng-rs index from {:?}", path);
    Ok(bincode::deserialize(&buf[8..])?)
}

fn write_framed(path: &Path, blob: &Blob) -> Result<()> {
    let payload = bincode::serialize(blob)?;
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&payload);
    log::debug!("writing flinng-rs index to {:?} ({} bytes)", path, out.len());
    write_atomic(path, &out)
}

impl DenseAngularIndex {
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let blob = Blob::DenseAngular {
            index_core: self.index().to_bytes()?,
            hasher: self.hasher().clone(),
            dim: self.dim() as u64,
            store: self.store().cloned(),
        };
        write_framed(path.as_ref(), &blob)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        match read_framed(path.as_ref())? {
            Blob::DenseAngular { index_core, hasher, dim, store } => {
                let index = FlinngIndex::from_bytes(&index_core)?;
                Ok(DenseAngularIndex::from_parts(hasher, index, dim as usize, store))
            }
            _ => Err(Error::Serialization("file does not contain a DenseAngularIndex".to_string())),
        }
    }
}

impl DenseL2Index {
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let blob = Blob::DenseL2 {
            index_core: self.index().to_bytes()?,
            hasher: self.hasher().clone(),
            dim: self.dim() as u64,
            store: self.store().cloned(),
        };
        write_framed(path.as_ref(), &blob)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        match read_framed(path.as_ref())? {
            Blob::DenseL2 { index_core, hasher, dim, store } => {
                let index = FlinngIndex::from_bytes(&index_core)?;
                Ok(DenseL2Index::from_parts(hasher, index, dim as usize, store))
            }
            _ => Err(Error::Serialization("file does not contain a DenseL2Index".to_string())),
        }
    }
}

impl SparseIndex {
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let blob = Blob::Sparse {
            index_core: self.index().to_bytes()?,
            hasher: self.hasher().clone(),
            store: self.store().cloned(),
        };
        write_framed(path.as_ref(), &blob)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        match read_framed(path.as_ref())? {
            Blob::Sparse { index_core, hasher, store } => {
                let index = FlinngIndex::from_bytes(&index_core)?;
                Ok(SparseIndex::from_parts(hasher, index, store))
            }
            _ => Err(Error::Serialization("file does not contain a SparseIndex".to_string())),
        }
    }
}

impl FlinngIndex {
    /// Write this index's core state alone (no hasher/store), framed with the
    /// magic number and version. Typed wrappers use [`DenseAngularIndex::write`]
    /// and friends instead; this is exposed for callers building their own
    /// hasher-agnostic persistence on top of a bare `FlinngIndex`.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let payload = self.to_bytes()?;
        let mut out = Vec::with_capacity(8 + payload.len());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&payload);
        write_atomic(path.as_ref(), &out)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut f = File::open(path)?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        if buf.len() < 8 {
            return Err(Error::Serialization("file too short to contain a header".to_string()));
        }
        if buf[0..4] != MAGIC {
            return Err(Error::Serialization("magic number mismatch; not a flinng-rs index file".to_string()));
        }
        let version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if version != VERSION {
            return Err(Error::Serialization(format!(
                "unsupported format version {} (expected {})",
                version, VERSION
            )));
        }
        FlinngIndex::from_bytes(&buf[8..])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wrapper::FlinngBuilder;
    use tempfile::tempdir;

    #[test]
    fn test_bare_index_round_trip() {
        let mut idx = FlinngIndex::new(3, 64, 4, 16, 5).unwrap();
        idx.add_points(&[1u64, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("idx.bin");
        idx.write(&path).unwrap();
        let loaded = FlinngIndex::read(&path).unwrap();
        assert_eq!(loaded.num_points_added(), idx.num_points_added());
        assert_eq!(loaded.num_rows(), idx.num_rows());
        assert_eq!(
            loaded.query(&[1, 2, 3, 4], 1).unwrap(),
            idx.query(&[1, 2, 3, 4], 1).unwrap()
        );
    }

    #[test]
    fn test_rejects_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        std::fs::write(&path, b"NOTFLNGjunkjunk").unwrap();
        assert!(FlinngIndex::read(&path).is_err());
    }

    #[test]
    fn test_dense_angular_round_trip_with_store() {
        let mut idx = FlinngBuilder::new()
            .num_rows(3)
            .cells_per_row(256)
            .num_hash_tables(8)
            .hashes_per_table(6)
            .seed(21)
            .with_store(true)
            .srp(4)
            .unwrap();
        idx.add_and_store(&[1.0, 2.0, 3.0, 4.0, -1.0, -2.0, -3.0, -4.0]).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("angular.bin");
        idx.write(&path).unwrap();
        let loaded = DenseAngularIndex::read(&path).unwrap();

        let q = [1.0_f32, 2.0, 3.0, 4.0];
        assert_eq!(idx.query(&q, 1).unwrap(), loaded.query(&q, 1).unwrap());
        assert_eq!(loaded.fetch_descriptor(0).unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_sparse_round_trip() {
        let mut idx = FlinngBuilder::new()
            .num_rows(3)
            .cells_per_row(256)
            .num_hash_tables(8)
            .hashes_per_table(4)
            .seed(31)
            .minhash(16)
            .unwrap();
        idx.add_points(&[vec![1u64, 2, 3], vec![100u64, 200, 300]]).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("sparse.bin");
        idx.write(&path).unwrap();
        let loaded = SparseIndex::read(&path).unwrap();

        let q = vec![vec![1u64, 2, 3]];
        assert_eq!(idx.query(&q, 1).unwrap(), loaded.query(&q, 1).unwrap());
    }
}
