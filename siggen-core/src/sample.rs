//! Output element types.
//!
//! Generators compute in `f64` and write through [`Sample::from_f64`], so the
//! same code fills `f64`, `f32`, and `i16` buffers.

use num_traits::{Bounded, NumCast, Zero};

/// A scalar that a generator can write.
///
/// Float targets cast directly (out-of-range values saturate to ±inf).
/// Integer targets truncate toward zero and clamp to their range; NaN maps to 0.
pub trait Sample: Copy + Default + PartialOrd + NumCast + Bounded + Zero + Send + Sync + 'static {
    /// Convert from the generator's working precision.
    #[inline]
    fn from_f64(v: f64) -> Self {
        match <Self as NumCast>::from(v) {
            Some(s) => s,
            None if v.is_nan() => Self::zero(),
            None if v > 0.0 => Self::max_value(),
            None => Self::min_value(),
        }
    }

    /// Width of one element in bits, used for throughput statistics.
    #[inline]
    fn bits() -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let bytes = core::mem::size_of::<Self>() as f64;
        bytes * 8.0
    }
}

impl Sample for f64 {}
impl Sample for f32 {}
impl Sample for i16 {}
