//! End-to-end scenarios exercising the FlinngIndex/DenseAngularIndex path
//! together, as opposed to the per-module unit tests under `src/`.
use flinng_rs::{DenseAngularIndex, FlinngBuilder, FlinngIndex};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn empty_index_query_returns_all_zero_slots() {
    init_logger();
    let idx = FlinngIndex::new(3, 16, 4, 16, 1).unwrap();
    let hashes = vec![0u64, 1, 2, 3];
    let result = idx.query(&hashes, 5).unwrap();
    assert_eq!(result.len(), 5);
    assert!(result.iter().all(|&id| id == 0));
}

#[test]
fn self_match_returns_the_single_inserted_point() {
    let mut idx = FlinngIndex::new(3, 1024, 8, 256, 7).unwrap();
    let hashes = vec![0u64; 8];
    idx.add_points(&hashes).unwrap();
    assert_eq!(idx.query(&hashes, 1).unwrap(), vec![0]);
}

#[test]
fn cross_batch_insertion_assigns_contiguous_ids() {
    let mut idx = FlinngIndex::new(3, 4096, 4, 64, 9).unwrap();
    let make = |n: usize, offset: u64| -> Vec<u64> { (0..n * 4).map(|i| (i as u64 + offset) % 64).collect() };

    idx.add_points(&make(50, 0)).unwrap();
    assert_eq!(idx.num_points_added(), 50);
    idx.add_points(&make(75, 1)).unwrap();
    assert_eq!(idx.num_points_added(), 125);

    // Point 80 is the 30th point of the second batch.
    let hashes_for_80 = &make(75, 1)[30 * 4..30 * 4 + 4];
    let result = idx.query(hashes_for_80, 5).unwrap();
    assert!(result.contains(&80), "expected point 80 among {:?}", result);
}

#[test]
fn regime_a_and_regime_b_both_emit_on_full_strike() {
    for &num_rows in &[2u64, 3u64] {
        let mut idx = FlinngIndex::new(num_rows, 4096, 6, 64, 4).unwrap();
        let hashes = vec![11u64; 6];
        idx.add_points(&hashes).unwrap();
        assert_eq!(
            idx.query(&hashes, 1).unwrap(),
            vec![0],
            "num_rows={} should emit the fully-struck point",
            num_rows
        );
    }
}

#[test]
fn serialization_round_trip_preserves_query_results() {
    let mut idx = FlinngBuilder::new()
        .num_rows(3)
        .cells_per_row(512)
        .num_hash_tables(16)
        .hashes_per_table(8)
        .seed(100)
        .srp(6)
        .unwrap();

    let mut rng = SmallRng::seed_from_u64(100);
    let normal = Normal::new(0.0f32, 1.0).unwrap();
    let points: Vec<f32> = (0..200 * 6).map(|_| normal.sample(&mut rng)).collect();
    idx.add_points(&points).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.bin");
    idx.write(&path).unwrap();
    let loaded = DenseAngularIndex::read(&path).unwrap();

    for q in 0..10 {
        let query = &points[q * 6..(q + 1) * 6];
        assert_eq!(
            idx.query(query, 3).unwrap(),
            loaded.query(query, 3).unwrap(),
            "query {} diverged after round-trip",
            q
        );
    }
}

#[test]
fn near_duplicate_queries_recall_their_source_point() {
    // Mirrors the source's recall test: insert a batch of random points, then
    // query with small perturbations of a subset and expect the perturbed
    // point's own id back as the top-1 result an overwhelming fraction of the
    // time. This is a statistical property (SRP is approximate), so the
    // assertion allows a small miss rate rather than requiring perfection.
    let dim = 10;
    let mut idx = FlinngBuilder::new()
        .num_rows(3)
        .cells_per_row(100)
        .num_hash_tables(10)
        .hashes_per_table(12)
        .seed(100)
        .srp(dim)
        .unwrap();

    let mut rng = SmallRng::seed_from_u64(100);
    let normal = Normal::new(0.0f32, 1.0).unwrap();
    let base_points: Vec<f32> = (0..1000 * dim).map(|_| normal.sample(&mut rng)).collect();
    idx.add_points(&base_points).unwrap();

    let perturb = Normal::new(0.0f32, 0.1).unwrap();
    let mut hits = 0;
    let num_queries = 100;
    for q in 0..num_queries {
        let src = &base_points[q * dim..(q + 1) * dim];
        let query: Vec<f32> = src.iter().map(|&x| x + perturb.sample(&mut rng)).collect();
        let result = idx.query(&query, 1).unwrap();
        if result[0] as usize == q {
            hits += 1;
        }
    }
    assert!(
        hits as f64 / num_queries as f64 > 0.5,
        "expected most near-duplicate queries to recall their source point, got {}/{}",
        hits,
        num_queries
    );
}

#[test]
fn add_points_rejects_hash_values_outside_range() {
    let mut idx = FlinngIndex::new(3, 16, 2, 8, 1).unwrap();
    assert!(idx.add_points(&[0u64, 8]).is_err());
}

#[test]
fn search_with_distance_ranks_closer_point_first() {
    let mut idx = FlinngBuilder::new()
        .num_rows(3)
        .cells_per_row(2048)
        .num_hash_tables(16)
        .hashes_per_table(8)
        .seed(55)
        .with_store(true)
        .srp(3)
        .unwrap();
    idx.add_and_store(&[1.0, 0.0, 0.0, 0.9, 0.1, 0.0, -1.0, 0.0, 0.0]).unwrap();
    let results = idx.search_with_distance(&[1.0, 0.0, 0.0], 3).unwrap();
    assert_eq!(results.len(), 3);
    // Point 0 is an exact match; its cosine distance must be (near) zero and
    // smallest among the three.
    let dist0 = results.iter().find(|(id, _)| *id == 0).unwrap().1;
    assert!(dist0 < 1e-4);
}
