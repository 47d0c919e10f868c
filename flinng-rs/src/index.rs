//! The FLINNG inverted index: cell scattering, bucket aggregation and the
//! top-K strike-count query path. This is the ~60% of the core described in
//! the module overview; everything else in this crate is a typed adapter
//! around it.
use crate::error::{Error, Result};
use crate::utils::create_rng;
use rand::Rng;
use rayon::prelude::*;

/// How a point's surviving-row count is turned into a qualification decision
/// during `query`. Chosen once at construction from `num_rows` rather than
/// branched on per-query, so the byte-counter/bit-packed memory tradeoff is a
/// visible, fixed choice rather than a hidden per-call cost.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QualificationRegime {
    /// `num_rows > 2`: one byte per point, emit when the counter reaches `num_rows`.
    ByteCounter,
    /// `num_rows == 2`: one bit per point (8 points/byte), emit on the second strike.
    BitPair,
}

/// The FLINNG index: an inverted map from `(table, hash value)` to cell ids,
/// paired with the reverse map from cells to point ids.
///
/// Construct with [`FlinngIndex::new`], feed hash streams produced by a
/// [`crate::hash::HashFamily`] to [`FlinngIndex::add_points`], then call
/// [`FlinngIndex::query`] with a query's hash stream to get back up to
/// `top_k` candidate point ids ordered by descending strike count.
pub struct FlinngIndex {
    num_rows: u64,
    cells_per_row: u64,
    num_hash_tables: u64,
    hash_range: u64,
    total_points_added: u64,
    /// `num_hash_tables * hash_range` buckets of cell ids.
    buckets: Vec<Vec<u32>>,
    /// `num_rows * cells_per_row` cells, each a list of point ids.
    cells: Vec<Vec<u32>>,
    regime: QualificationRegime,
    rng: std::cell::RefCell<rand::rngs::SmallRng>,
}

impl FlinngIndex {
    /// Construct an empty index with the given `(R, B, T, H)`.
    ///
    /// `seed` drives the cell-scattering RNG used by `add_points`; `0` seeds
    /// from OS entropy, matching `crate::utils::create_rng`.
    pub fn new(num_rows: u64, cells_per_row: u64, num_hash_tables: u64, hash_range: u64, seed: u64) -> Result<Self> {
        if num_rows < 2 {
            return Err(Error::InvalidConfig(format!(
                "num_rows must be >= 2 (R=1 has no sound qualification rule under deduplicated cell \
                 membership), got {}",
                num_rows
            )));
        }
        if cells_per_row == 0 || num_hash_tables == 0 || hash_range == 0 {
            return Err(Error::InvalidConfig(
                "cells_per_row, num_hash_tables and hash_range must all be > 0".to_string(),
            ));
        }
        let regime = if num_rows > 2 {
            QualificationRegime::ByteCounter
        } else {
            QualificationRegime::BitPair
        };
        log::debug!(
            "constructing FlinngIndex R={} B={} T={} H={} regime={:?}",
            num_rows,
            cells_per_row,
            num_hash_tables,
            hash_range,
            regime
        );
        Ok(FlinngIndex {
            num_rows,
            cells_per_row,
            num_hash_tables,
            hash_range,
            total_points_added: 0,
            buckets: vec![Vec::new(); (num_hash_tables * hash_range) as usize],
            cells: vec![Vec::new(); (num_rows * cells_per_row) as usize],
            regime,
            rng: std::cell::RefCell::new(create_rng(seed)),
        })
    }

    pub fn num_rows(&self) -> u64 {
        self.num_rows
    }

    pub fn cells_per_row(&self) -> u64 {
        self.cells_per_row
    }

    pub fn num_hash_tables(&self) -> u64 {
        self.num_hash_tables
    }

    pub fn hash_range(&self) -> u64 {
        self.hash_range
    }

    pub fn num_points_added(&self) -> u64 {
        self.total_points_added
    }

    /// Insert a flat, point-major batch of hashes (`num_points * num_hash_tables`
    /// values, each in `[0, hash_range)`). Assigns each point `num_rows` cells
    /// (one uniformly random cell per row), appends the point to every cell it
    /// occupies, and appends every occupied cell to the buckets its hashes
    /// select. Calls [`FlinngIndex::prepare_for_queries`] before returning.
    pub fn add_points(&mut self, hashes: &[u64]) -> Result<()> {
        let t = self.num_hash_tables as usize;
        if t == 0 || hashes.len() % t != 0 {
            return Err(Error::InvalidInput(format!(
                "hash stream length {} is not a multiple of num_hash_tables {}",
                hashes.len(),
                t
            )));
        }
        let num_points = hashes.len() / t;
        if num_points == 0 {
            return Ok(());
        }
        for &h in hashes {
            if h >= self.hash_range {
                return Err(Error::InvalidInput(format!(
                    "hash value {} is out of range [0, {})",
                    h, self.hash_range
                )));
            }
        }

        // Step 2: draw R cells per point up front (sequential: a single shared RNG).
        let b = self.cells_per_row;
        let mut point_cells = vec![0u32; num_points * self.num_rows as usize];
        {
            let mut rng = self.rng.borrow_mut();
            for p in 0..num_points {
                for r in 0..self.num_rows as usize {
                    let within_row = rng.gen_range(0, b) as u32;
                    point_cells[p * self.num_rows as usize + r] = within_row + (r as u64 * b) as u32;
                }
            }
        }

        // Step 3: parallel over hash tables `t`; each worker owns a disjoint
        // range `I[t*H .. (t+1)*H)` of buckets, so no synchronization is needed.
        let h_range = self.hash_range as usize;
        let num_rows = self.num_rows as usize;
        self.buckets
            .par_chunks_mut(h_range)
            .enumerate()
            .for_each(|(table, table_buckets)| {
                for p in 0..num_points {
                    let hash_value = hashes[p * t + table] as usize;
                    let bucket = &mut table_buckets[hash_value];
                    for r in 0..num_rows {
                        bucket.push(point_cells[p * num_rows + r]);
                    }
                }
            });

        // Step 4: sequential cell-membership append (all rows share `cells`).
        let base_id = self.total_points_added as u32;
        for p in 0..num_points {
            let id = base_id + p as u32;
            for r in 0..num_rows {
                let cell = point_cells[p * num_rows + r] as usize;
                self.cells[cell].push(id);
            }
        }

        self.total_points_added += num_points as u64;
        self.prepare_for_queries();
        Ok(())
    }

    /// Sort and deduplicate every bucket. Idempotent; implicitly called by
    /// [`FlinngIndex::add_points`]. Must be called (directly or via
    /// `add_points`) before `query` for query results to reflect the full
    /// dataset inserted so far without duplicate cell entries.
    pub fn prepare_for_queries(&mut self) {
        self.buckets.par_iter_mut().for_each(|bucket| {
            bucket.sort_unstable();
            bucket.dedup();
        });
    }

    /// Query a flat, point-major batch of hashes and return `num_queries *
    /// top_k` point ids, `top_k` per query, ordered by descending strike
    /// count (ties broken by ascending cell id then insertion order within a
    /// cell). Slots left unfilled because fewer than `top_k` points
    /// qualified hold `0`.
    pub fn query(&self, hashes: &[u64], top_k: u32) -> Result<Vec<u32>> {
        let t = self.num_hash_tables as usize;
        if t == 0 || hashes.len() % t != 0 {
            return Err(Error::InvalidInput(format!(
                "hash stream length {} is not a multiple of num_hash_tables {}",
                hashes.len(),
                t
            )));
        }
        for &h in hashes {
            if h >= self.hash_range {
                return Err(Error::InvalidInput(format!(
                    "hash value {} is out of range [0, {})",
                    h, self.hash_range
                )));
            }
        }
        let num_queries = hashes.len() / t;
        let top_k = top_k as usize;

        let results: Vec<Vec<u32>> = (0..num_queries)
            .into_par_iter()
            .map(|q| self.query_one(&hashes[q * t..(q + 1) * t], top_k))
            .collect();

        let mut out = vec![0u32; num_queries * top_k];
        for (q, ids) in results.into_iter().enumerate() {
            let base = q * top_k;
            out[base..base + ids.len()].copy_from_slice(&ids);
        }
        Ok(out)
    }

    fn query_one(&self, hashes: &[u64], top_k: usize) -> Vec<u32> {
        if top_k == 0 {
            return Vec::new();
        }
        let total_cells = (self.num_rows * self.cells_per_row) as usize;
        let t = hashes.len();
        let h_range = self.hash_range as usize;

        // Step 1-2: strike counts per cell, 0..=T.
        let mut counts = zero_vec::<u32>(total_cells);
        for (table, &h) in hashes.iter().enumerate() {
            let bucket = &self.buckets[table * h_range + h as usize];
            for &cell in bucket {
                counts[cell as usize] += 1;
            }
        }

        // Step 3: bucket-sort cells by strike count into T+1 lists, ascending
        // cell id within each. Every cell lands in some list, including the
        // never-struck ones in `sorted[0]`: step 5's fallback sweep requires
        // that bucket to hold the zero-count cells, not be empty by construction.
        let mut sorted: Vec<Vec<u32>> = vec![Vec::new(); t + 1];
        for (cell, &c) in counts.iter().enumerate() {
            sorted[c as usize].push(cell as u32);
        }

        // Step 4: descend from the highest strike count, walking each cell's
        // membership list and counting surviving rows per point.
        let total_points = self.total_points_added as usize;
        let mut results = Vec::with_capacity(top_k);
        match self.regime {
            QualificationRegime::ByteCounter => {
                let threshold = self.num_rows as u8;
                let mut survived = vec![0u8; total_points];
                'outer: for k in (0..=t).rev() {
                    for &cell in &sorted[k] {
                        for &p in &self.cells[cell as usize] {
                            let slot = &mut survived[p as usize];
                            if *slot < threshold {
                                *slot += 1;
                                if *slot == threshold {
                                    results.push(p);
                                    if results.len() >= top_k {
                                        break 'outer;
                                    }
                                }
                            }
                        }
                    }
                }
            }
            QualificationRegime::BitPair => {
                let mut bits = vec![0u8; (total_points + 7) / 8];
                'outer2: for k in (0..=t).rev() {
                    for &cell in &sorted[k] {
                        for &p in &self.cells[cell as usize] {
                            let byte = &mut bits[p as usize / 8];
                            let mask = 1u8 << (p as usize % 8);
                            if *byte & mask == 0 {
                                *byte |= mask;
                            } else {
                                results.push(p);
                                if results.len() >= top_k {
                                    break 'outer2;
                                }
                            }
                        }
                    }
                }
            }
        }
        results
    }

    /// Serialize the index's core persistent state (configuration, buckets,
    /// cells, point count) to `writer`. Typed wrappers call this and append
    /// their own hasher/store state; see `crate::serialize`.
    pub(crate) fn write_core<W: std::io::Write>(&self, writer: &mut W) -> Result<()> {
        bincode::serialize_into(&mut *writer, &self.num_rows)?;
        bincode::serialize_into(&mut *writer, &self.cells_per_row)?;
        bincode::serialize_into(&mut *writer, &self.num_hash_tables)?;
        bincode::serialize_into(&mut *writer, &self.hash_range)?;
        bincode::serialize_into(&mut *writer, &self.total_points_added)?;
        bincode::serialize_into(&mut *writer, &(self.buckets.len() as u64))?;
        for bucket in &self.buckets {
            bincode::serialize_into(&mut *writer, &(bucket.len() as u64))?;
            for &c in bucket {
                bincode::serialize_into(&mut *writer, &c)?;
            }
        }
        bincode::serialize_into(&mut *writer, &(self.cells.len() as u64))?;
        for cell in &self.cells {
            bincode::serialize_into(&mut *writer, &(cell.len() as u64))?;
            for &p in cell {
                bincode::serialize_into(&mut *writer, &p)?;
            }
        }
        Ok(())
    }

    pub(crate) fn read_core<R: std::io::Read>(reader: &mut R) -> Result<Self> {
        let num_rows: u64 = bincode::deserialize_from(&mut *reader)?;
        let cells_per_row: u64 = bincode::deserialize_from(&mut *reader)?;
        let num_hash_tables: u64 = bincode::deserialize_from(&mut *reader)?;
        let hash_range: u64 = bincode::deserialize_from(&mut *reader)?;
        let total_points_added: u64 = bincode::deserialize_from(&mut *reader)?;

        let num_buckets: u64 = bincode::deserialize_from(&mut *reader)?;
        let mut buckets = Vec::with_capacity(num_buckets as usize);
        for _ in 0..num_buckets {
            let len: u64 = bincode::deserialize_from(&mut *reader)?;
            let mut bucket = Vec::with_capacity(len as usize);
            for _ in 0..len {
                bucket.push(bincode::deserialize_from(&mut *reader)?);
            }
            buckets.push(bucket);
        }

        let num_cells: u64 = bincode::deserialize_from(&mut *reader)?;
        let mut cells = Vec::with_capacity(num_cells as usize);
        for _ in 0..num_cells {
            let len: u64 = bincode::deserialize_from(&mut *reader)?;
            let mut cell = Vec::with_capacity(len as usize);
            for _ in 0..len {
                cell.push(bincode::deserialize_from(&mut *reader)?);
            }
            cells.push(cell);
        }

        let regime = if num_rows > 2 {
            QualificationRegime::ByteCounter
        } else {
            QualificationRegime::BitPair
        };

        Ok(FlinngIndex {
            num_rows,
            cells_per_row,
            num_hash_tables,
            hash_range,
            total_points_added,
            buckets,
            cells,
            regime,
            rng: std::cell::RefCell::new(create_rng(0)),
        })
    }

    /// Convenience wrapper around [`FlinngIndex::write_core`] for callers
    /// (`crate::serialize`) that bundle the core bytes into a larger blob
    /// alongside hasher and store state.
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_core(&mut buf)?;
        Ok(buf)
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(bytes);
        Self::read_core(&mut cursor)
    }
}

#[inline]
fn zero_vec<T: Clone + Default>(n: usize) -> Vec<T> {
    vec![T::default(); n]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_construction_rejects_bad_config() {
        assert!(FlinngIndex::new(1, 16, 4, 16, 1).is_err());
        assert!(FlinngIndex::new(3, 0, 4, 16, 1).is_err());
        assert!(FlinngIndex::new(3, 16, 0, 16, 1).is_err());
        assert!(FlinngIndex::new(3, 16, 4, 0, 1).is_err());
    }

    #[test]
    fn test_empty_index_query() {
        let idx = FlinngIndex::new(3, 16, 4, 16, 1).unwrap();
        let hashes = vec![0u64, 1, 2, 3];
        let res = idx.query(&hashes, 5).unwrap();
        assert_eq!(res.len(), 5);
        assert!(res.iter().all(|&x| x == 0));
    }

    #[test]
    fn test_self_match() {
        let mut idx = FlinngIndex::new(3, 1024, 8, 256, 1).unwrap();
        let hashes = vec![0u64; 8];
        idx.add_points(&hashes).unwrap();
        let res = idx.query(&hashes, 1).unwrap();
        assert_eq!(res, vec![0]);
    }

    #[test]
    fn test_cross_batch_ids() {
        let mut idx = FlinngIndex::new(3, 4096, 4, 64, 7).unwrap();
        let make = |n: usize, offset: u64| -> Vec<u64> {
            (0..n * 4).map(|i| (i as u64 + offset) % 64).collect()
        };
        idx.add_points(&make(50, 0)).unwrap();
        idx.add_points(&make(75, 1)).unwrap();
        assert_eq!(idx.num_points_added(), 125);

        // Point 80 is the 30th point of the second batch (50 + 30 = 80).
        let point_80_hashes = &make(75, 1)[30 * 4..30 * 4 + 4];
        let res = idx.query(point_80_hashes, 5).unwrap();
        assert!(res.contains(&80), "expected id 80 in {:?}", res);
    }

    #[test]
    fn test_regime_boundary_both_emit_on_full_strike() {
        for &r in &[2u64, 3u64] {
            let mut idx = FlinngIndex::new(r, 4096, 6, 64, 3).unwrap();
            let hashes = vec![5u64; 6];
            idx.add_points(&hashes).unwrap();
            let res = idx.query(&hashes, 1).unwrap();
            assert_eq!(res, vec![0], "regime R={} should emit the fully struck point", r);
        }
    }

    #[test]
    fn test_prepare_for_queries_idempotent() {
        let mut idx = FlinngIndex::new(3, 64, 4, 16, 9).unwrap();
        idx.add_points(&[1u64, 2, 3, 4]).unwrap();
        let before = idx.buckets.clone();
        idx.prepare_for_queries();
        idx.prepare_for_queries();
        assert_eq!(before, idx.buckets);
    }

    #[test]
    fn test_buckets_sorted_and_deduped_after_prepare() {
        let mut idx = FlinngIndex::new(3, 4, 2, 4, 11).unwrap();
        idx.add_points(&[0u64, 1]).unwrap();
        idx.add_points(&[0u64, 1]).unwrap();
        for bucket in &idx.buckets {
            let mut sorted = bucket.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(bucket, &sorted);
        }
    }

    #[test]
    fn test_cell_membership_invariant() {
        let mut idx = FlinngIndex::new(4, 8, 3, 8, 5).unwrap();
        idx.add_points(&[0u64, 1, 2, 0, 1, 2]).unwrap();
        let total: usize = idx.cells.iter().map(|c| c.len()).sum();
        assert_eq!(total, 4 * 2);
        for (row_cell, cell) in idx.cells.iter().enumerate() {
            let row = row_cell / 8;
            for &_p in cell {
                assert!(row < 4);
            }
        }
    }

    #[test]
    fn test_rejects_hash_out_of_range() {
        let mut idx = FlinngIndex::new(3, 8, 2, 4, 1).unwrap();
        assert!(idx.add_points(&[0u64, 99]).is_err());
        idx.add_points(&[0u64, 1]).unwrap();
        assert!(idx.query(&[0u64, 99], 1).is_err());
    }

    #[test]
    fn test_rejects_misaligned_hash_stream() {
        let mut idx = FlinngIndex::new(3, 8, 4, 4, 1).unwrap();
        assert!(idx.add_points(&[0u64, 1, 2]).is_err());
    }

    #[test]
    fn test_query_falls_back_to_zero_strike_cells_when_exhausted() {
        // R=3, B=4, T=1, H=4: point 0 hashes to 0, point 1 hashes to 2. A
        // query hashing to 1 strikes neither, so both points are only found
        // by sweeping `sorted[0]`'s never-struck cells.
        let mut idx = FlinngIndex::new(3, 4, 1, 4, 1).unwrap();
        idx.add_points(&[0u64]).unwrap();
        idx.add_points(&[2u64]).unwrap();
        let res = idx.query(&[1u64], 2).unwrap();
        assert_eq!(res.len(), 2);
        assert!(res.contains(&0), "expected point 0 via the sorted[0] fallback, got {:?}", res);
        assert!(res.contains(&1), "expected point 1 via the sorted[0] fallback, got {:?}", res);
    }

    #[test]
    fn test_query_top_k_zero_returns_empty_without_panicking() {
        let mut idx = FlinngIndex::new(3, 1024, 8, 256, 1).unwrap();
        let hashes = vec![0u64; 8];
        idx.add_points(&hashes).unwrap();
        let res = idx.query(&hashes, 0).unwrap();
        assert!(res.is_empty());
    }
}
