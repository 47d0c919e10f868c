//! Generic bounds for numeric input accepted by the dense hash families.
use ndarray::{LinalgScalar, ScalarOperand};
use num::{Float, FromPrimitive, NumCast, ToPrimitive};
use std::fmt::{Debug, Display};

/// Bound shared by the floating point types the dense hashers accept.
///
/// Mirrors the `Numeric` marker trait used throughout the reference crate
/// this codebase is modeled on: it exists purely to keep the hasher structs
/// generic over `f32`/`f64` without repeating the same trait-bound list on
/// every `impl` block.
pub trait Numeric:
    LinalgScalar + ScalarOperand + Float + NumCast + ToPrimitive + FromPrimitive + Send + Sync + Debug + Display
{
}

impl Numeric for f32 {}
impl Numeric for f64 {}
