//! Small, shared helper: RNG construction.
use rand::rngs::SmallRng;
use rand::SeedableRng;

/// Construct a deterministic RNG from `seed`, or an OS-seeded one if `seed == 0`.
///
/// The reference crate pulls hash-function randomness from a process-wide
/// generator with no injectable seed, which makes results impossible to
/// reproduce across runs. This crate threads an explicit seed through every
/// construction path instead (`FlinngIndex::new`, each `HashFamily::new`),
/// always going through this single helper.
pub fn create_rng(seed: u64) -> SmallRng {
    if seed == 0 {
        SmallRng::from_entropy()
    } else {
        SmallRng::seed_from_u64(seed)
    }
}
