//! Typed index wrappers binding a [`crate::hash::HashFamily`] to a
//! [`crate::index::FlinngIndex`], plus the [`FlinngBuilder`] used to
//! construct them with the reference configuration defaults.
use crate::dist::{cosine_dist, euclidean_dist};
use crate::error::{Error, Result};
use crate::hash::{DensifiedMinHash, HashFamily, L2Lsh, Srp};
use crate::index::FlinngIndex;
use crate::store::{SparseStore, VecStore};

/// Angular (cosine-similarity) index over dense `f32` vectors, backed by
/// Signed Random Projection.
pub struct DenseAngularIndex {
    hasher: Srp,
    index: FlinngIndex,
    dim: usize,
    store: Option<VecStore>,
}

impl DenseAngularIndex {
    pub(crate) fn new(hasher: Srp, index: FlinngIndex, dim: usize, with_store: bool) -> Self {
        DenseAngularIndex {
            hasher,
            index,
            dim,
            store: if with_store { Some(VecStore::new(dim)) } else { None },
        }
    }

    pub(crate) fn from_parts(hasher: Srp, index: FlinngIndex, dim: usize, store: Option<VecStore>) -> Self {
        DenseAngularIndex { hasher, index, dim, store }
    }

    fn validate(&self, points: &[f32]) -> Result<()> {
        if points.is_empty() || points.len() % self.dim != 0 {
            return Err(Error::InvalidInput(format!(
                "input length {} is not a positive multiple of dim {}",
                points.len(),
                self.dim
            )));
        }
        Ok(())
    }

    pub fn add_points(&mut self, points: &[f32]) -> Result<()> {
        self.validate(points)?;
        let hashes = self.hasher.batch_hash(points)?;
        self.index.add_points(&hashes)
    }

    pub fn add_and_store(&mut self, points: &[f32]) -> Result<()> {
        self.validate(points)?;
        let hashes = self.hasher.batch_hash(points)?;
        self.index.add_points(&hashes)?;
        let store = self
            .store
            .get_or_insert_with(|| VecStore::new(self.dim));
        store.add(points)
    }

    pub fn prepare_for_queries(&mut self) {
        self.index.prepare_for_queries();
    }

    /// Documented alias for [`DenseAngularIndex::prepare_for_queries`], kept
    /// for parity with the C++ builder API this crate's shape is modeled on.
    pub fn finalize_construction(&mut self) {
        self.prepare_for_queries();
    }

    pub fn query(&self, queries: &[f32], top_k: u32) -> Result<Vec<u32>> {
        self.validate(queries)?;
        let hashes = self.hasher.batch_hash(queries)?;
        self.index.query(&hashes, top_k)
    }

    pub fn search_with_distance(&self, queries: &[f32], top_k: u32) -> Result<Vec<(u32, f32)>> {
        let store = self.store.as_ref().ok_or_else(|| {
            Error::Failed("search_with_distance requires an index built with add_and_store".to_string())
        })?;
        if store.len() as u64 != self.index.num_points_added() {
            return Err(Error::Failed(format!(
                "store holds {} points but index has {} added; results would be inconsistent",
                store.len(),
                self.index.num_points_added()
            )));
        }
        let ids = self.query(queries, top_k)?;
        let num_queries = queries.len() / self.dim;
        let top_k = top_k as usize;
        let mut out = Vec::with_capacity(ids.len());
        for q in 0..num_queries {
            let query_vec = &queries[q * self.dim..(q + 1) * self.dim];
            for &id in &ids[q * top_k..(q + 1) * top_k] {
                let dist = match store.get(id) {
                    Ok(v) => cosine_dist(query_vec, v),
                    Err(_) => 0.0,
                };
                out.push((id, dist));
            }
        }
        Ok(out)
    }

    pub fn fetch_descriptor(&self, id: u32) -> Result<&[f32]> {
        self.store
            .as_ref()
            .ok_or_else(|| Error::Failed("index was not built with a store".to_string()))?
            .get(id)
    }

    pub fn num_points_added(&self) -> u64 {
        self.index.num_points_added()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub(crate) fn index(&self) -> &FlinngIndex {
        &self.index
    }

    pub(crate) fn hasher(&self) -> &Srp {
        &self.hasher
    }

    pub(crate) fn store(&self) -> Option<&VecStore> {
        self.store.as_ref()
    }
}

/// Euclidean-distance index over dense `f32` vectors, backed by L2-LSH.
pub struct DenseL2Index {
    hasher: L2Lsh,
    index: FlinngIndex,
    dim: usize,
    store: Option<VecStore>,
}

impl DenseL2Index {
    pub(crate) fn new(hasher: L2Lsh, index: FlinngIndex, dim: usize, with_store: bool) -> Self {
        DenseL2Index {
            hasher,
            index,
            dim,
            store: if with_store { Some(VecStore::new(dim)) } else { None },
        }
    }

    pub(crate) fn from_parts(hasher: L2Lsh, index: FlinngIndex, dim: usize, store: Option<VecStore>) -> Self {
        DenseL2Index { hasher, index, dim, store }
    }

    fn validate(&self, points: &[f32]) -> Result<()> {
        if points.is_empty() || points.len() % self.dim != 0 {
            return Err(Error::InvalidInput(format!(
                "input length {} is not a positive multiple of dim {}",
                points.len(),
                self.dim
            )));
        }
        Ok(())
    }

    pub fn add_points(&mut self, points: &[f32]) -> Result<()> {
        self.validate(points)?;
        let hashes = self.hasher.batch_hash(points)?;
        self.index.add_points(&hashes)
    }

    pub fn add_and_store(&mut self, points: &[f32]) -> Result<()> {
        self.validate(points)?;
        let hashes = self.hasher.batch_hash(points)?;
        self.index.add_points(&hashes)?;
        let store = self
            .store
            .get_or_insert_with(|| VecStore::new(self.dim));
        store.add(points)
    }

    pub fn prepare_for_queries(&mut self) {
        self.index.prepare_for_queries();
    }

    pub fn finalize_construction(&mut self) {
        self.prepare_for_queries();
    }

    pub fn query(&self, queries: &[f32], top_k: u32) -> Result<Vec<u32>> {
        self.validate(queries)?;
        let hashes = self.hasher.batch_hash(queries)?;
        self.index.query(&hashes, top_k)
    }

    pub fn search_with_distance(&self, queries: &[f32], top_k: u32) -> Result<Vec<(u32, f32)>> {
        let store = self.store.as_ref().ok_or_else(|| {
            Error::Failed("search_with_distance requires an index built with add_and_store".to_string())
        })?;
        if store.len() as u64 != self.index.num_points_added() {
            return Err(Error::Failed(format!(
                "store holds {} points but index has {} added; results would be inconsistent",
                store.len(),
                self.index.num_points_added()
            )));
        }
        let ids = self.query(queries, top_k)?;
        let num_queries = queries.len() / self.dim;
        let top_k = top_k as usize;
        let mut out = Vec::with_capacity(ids.len());
        for q in 0..num_queries {
            let query_vec = &queries[q * self.dim..(q + 1) * self.dim];
            for &id in &ids[q * top_k..(q + 1) * top_k] {
                let dist = match store.get(id) {
                    Ok(v) => euclidean_dist(query_vec, v),
                    Err(_) => 0.0,
                };
                out.push((id, dist));
            }
        }
        Ok(out)
    }

    pub fn fetch_descriptor(&self, id: u32) -> Result<&[f32]> {
        self.store
            .as_ref()
            .ok_or_else(|| Error::Failed("index was not built with a store".to_string()))?
            .get(id)
    }

    pub fn num_points_added(&self) -> u64 {
        self.index.num_points_added()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub(crate) fn index(&self) -> &FlinngIndex {
        &self.index
    }

    pub(crate) fn hasher(&self) -> &L2Lsh {
        &self.hasher
    }

    pub(crate) fn store(&self) -> Option<&VecStore> {
        self.store.as_ref()
    }
}

/// Jaccard-similarity index over sparse token sets, backed by Densified MinHash.
pub struct SparseIndex {
    hasher: DensifiedMinHash,
    index: FlinngIndex,
    store: Option<SparseStore>,
}

impl SparseIndex {
    pub(crate) fn new(hasher: DensifiedMinHash, index: FlinngIndex, with_store: bool) -> Self {
        SparseIndex {
            hasher,
            index,
            store: if with_store { Some(SparseStore::new()) } else { None },
        }
    }

    pub(crate) fn from_parts(hasher: DensifiedMinHash, index: FlinngIndex, store: Option<SparseStore>) -> Self {
        SparseIndex { hasher, index, store }
    }

    pub fn add_points(&mut self, points: &[Vec<u64>]) -> Result<()> {
        let hashes = self.hasher.batch_hash(points)?;
        self.index.add_points(&hashes)
    }

    pub fn add_points_same_dim(&mut self, points: &[u64], point_dim: usize) -> Result<()> {
        let hashes = self.hasher.batch_hash_same_dim(points, point_dim)?;
        self.index.add_points(&hashes)
    }

    pub fn add_and_store(&mut self, points: &[Vec<u64>]) -> Result<()> {
        let hashes = self.hasher.batch_hash(points)?;
        self.index.add_points(&hashes)?;
        self.store.get_or_insert_with(SparseStore::new).add(points);
        Ok(())
    }

    pub fn prepare_for_queries(&mut self) {
        self.index.prepare_for_queries();
    }

    pub fn finalize_construction(&mut self) {
        self.prepare_for_queries();
    }

    pub fn query(&self, queries: &[Vec<u64>], top_k: u32) -> Result<Vec<u32>> {
        let hashes = self.hasher.batch_hash(queries)?;
        self.index.query(&hashes, top_k)
    }

    pub fn search_with_distance(&self, queries: &[Vec<u64>], top_k: u32) -> Result<Vec<(u32, f32)>> {
        let store = self.store.as_ref().ok_or_else(|| {
            Error::Failed("search_with_distance requires an index built with add_and_store".to_string())
        })?;
        if store.len() as u64 != self.index.num_points_added() {
            return Err(Error::Failed(format!(
                "store holds {} points but index has {} added; results would be inconsistent",
                store.len(),
                self.index.num_points_added()
            )));
        }
        let ids = self.query(queries, top_k)?;
        let top_k = top_k as usize;
        let mut out = Vec::with_capacity(ids.len());
        for (q, query_tokens) in queries.iter().enumerate() {
            let mut sorted_query = query_tokens.clone();
            sorted_query.sort_unstable();
            sorted_query.dedup();
            for &id in &ids[q * top_k..(q + 1) * top_k] {
                let dist = match store.get(id) {
                    Ok(v) => crate::dist::jaccard_dist(&sorted_query, v),
                    Err(_) => 0.0,
                };
                out.push((id, dist));
            }
        }
        Ok(out)
    }

    pub fn fetch_descriptor(&self, id: u32) -> Result<&[u64]> {
        self.store
            .as_ref()
            .ok_or_else(|| Error::Failed("index was not built with a store".to_string()))?
            .get(id)
    }

    pub fn num_points_added(&self) -> u64 {
        self.index.num_points_added()
    }

    pub(crate) fn index(&self) -> &FlinngIndex {
        &self.index
    }

    pub(crate) fn hasher(&self) -> &DensifiedMinHash {
        &self.hasher
    }

    pub(crate) fn store(&self) -> Option<&SparseStore> {
        self.store.as_ref()
    }
}

/// Builder for the three typed index flavors, carrying the reference
/// configuration defaults (`num_rows=3, cells_per_row=4096,
/// num_hash_tables=512, hashes_per_table=14, sub_hash_bits=2, cutoff=6`).
#[derive(Clone, Debug)]
pub struct FlinngBuilder {
    num_rows: u64,
    cells_per_row: u64,
    num_hash_tables: u64,
    hashes_per_table: u64,
    sub_hash_bits: u32,
    cutoff: i64,
    seed: u64,
    with_store: bool,
}

impl Default for FlinngBuilder {
    fn default() -> Self {
        FlinngBuilder {
            num_rows: 3,
            cells_per_row: 4096,
            num_hash_tables: 512,
            hashes_per_table: 14,
            sub_hash_bits: 2,
            cutoff: 6,
            seed: 0,
            with_store: false,
        }
    }
}

impl FlinngBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_rows(mut self, num_rows: u64) -> Self {
        self.num_rows = num_rows;
        self
    }

    pub fn cells_per_row(mut self, cells_per_row: u64) -> Self {
        self.cells_per_row = cells_per_row;
        self
    }

    pub fn num_hash_tables(mut self, num_hash_tables: u64) -> Self {
        self.num_hash_tables = num_hash_tables;
        self
    }

    pub fn hashes_per_table(mut self, hashes_per_table: u64) -> Self {
        self.hashes_per_table = hashes_per_table;
        self
    }

    pub fn sub_hash_bits(mut self, sub_hash_bits: u32) -> Self {
        self.sub_hash_bits = sub_hash_bits;
        self
    }

    pub fn cutoff(mut self, cutoff: i64) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Attach a raw-descriptor store so `add_and_store`/`search_with_distance`
    /// become available on the built index.
    pub fn with_store(mut self, with_store: bool) -> Self {
        self.with_store = with_store;
        self
    }

    /// Build a [`DenseAngularIndex`] (cosine similarity via SRP) over vectors of width `dim`.
    pub fn srp(self, dim: usize) -> Result<DenseAngularIndex> {
        let hasher = Srp::new(
            self.num_hash_tables as usize,
            self.hashes_per_table as usize,
            dim,
            self.seed,
        )?;
        let index = FlinngIndex::new(
            self.num_rows,
            self.cells_per_row,
            self.num_hash_tables,
            hasher.hash_range(),
            self.seed,
        )?;
        Ok(DenseAngularIndex::new(hasher, index, dim, self.with_store))
    }

    /// Build a [`DenseL2Index`] (Euclidean distance via L2-LSH) over vectors of width `dim`.
    pub fn l2(self, dim: usize) -> Result<DenseL2Index> {
        let hasher = L2Lsh::new(
            self.num_hash_tables as usize,
            self.hashes_per_table as usize,
            dim,
            self.sub_hash_bits,
            self.cutoff,
            self.seed,
        )?;
        let index = FlinngIndex::new(
            self.num_rows,
            self.cells_per_row,
            self.num_hash_tables,
            hasher.hash_range(),
            self.seed,
        )?;
        Ok(DenseL2Index::new(hasher, index, dim, self.with_store))
    }

    /// Build a [`SparseIndex`] (Jaccard similarity via Densified MinHash).
    ///
    /// `hash_range_pow` sizes each table's output range to `2^hash_range_pow`;
    /// it plays the role `hashes_per_table` plays for the dense families.
    pub fn minhash(self, hash_range_pow: u32) -> Result<SparseIndex> {
        let hasher = DensifiedMinHash::new(
            self.num_hash_tables as usize,
            self.hashes_per_table as usize,
            hash_range_pow,
            self.seed as u32,
        )?;
        let index = FlinngIndex::new(
            self.num_rows,
            self.cells_per_row,
            self.num_hash_tables,
            hasher.hash_range(),
            self.seed,
        )?;
        Ok(SparseIndex::new(hasher, index, self.with_store))
    }
}
