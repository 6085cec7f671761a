//! Gaussian white noise from a deterministic linear-congruential generator.
//!
//! Uniform draws come from `x ← frac(x·A + B/2^26)`, which is the classic
//! `A=67081293, B=14181771, M=2^26` LCG carried in floating point. Pairs of
//! draws are mapped to `[-1, 1)` and pushed through the polar transform;
//! pairs landing outside the unit circle are rejected.
//!
//! The variance scale is `-2/ln(10)` rather than the textbook `-2`, so the
//! output variance is `sdev² / ln(10)`. Downstream consumers calibrated against
//! that, keep it.
//!
//! The seed is process-wide by default ([`whitenoise`], [`set_seed`]). Code that
//! needs an isolated, reproducible stream uses [`NoiseState`] directly.

use core::sync::atomic::{AtomicI64, Ordering};

use crate::math::{m_ln, m_sqrt, m_trunc};
use crate::sample::Sample;
use crate::waveform::Layout;

/// LCG multiplier.
pub const LCG_A: f64 = 67_081_293.0;
/// LCG increment.
pub const LCG_B: f64 = 14_181_771.0;
/// LCG modulus, 2^26.
pub const LCG_M: f64 = 67_108_864.0;
/// Seed the process starts with.
pub const DEFAULT_SEED: i64 = 123_456_789;

/// Polar-transform scale. Deliberately not `-2.0`.
#[inline]
fn factor() -> f64 {
    -2.0 / m_ln(10.0)
}

/// Ratio between the produced variance and `sdev²` (i.e. `1/ln 10`).
#[inline]
#[must_use]
pub fn variance_scale() -> f64 {
    -factor() / 2.0
}

static GLOBAL_SEED: AtomicI64 = AtomicI64::new(DEFAULT_SEED);

/// Set the process-wide seed. Non-positive values are ignored.
pub fn set_seed(value: i64) {
    if value > 0 {
        GLOBAL_SEED.store(value, Ordering::Relaxed);
    }
}

/// Current process-wide seed.
#[must_use]
pub fn seed() -> i64 {
    GLOBAL_SEED.load(Ordering::Relaxed)
}

/// Independent noise generator state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NoiseState {
    seed: i64,
}

impl Default for NoiseState {
    fn default() -> Self {
        Self { seed: DEFAULT_SEED }
    }
}

impl NoiseState {
    #[inline]
    #[must_use]
    pub fn new(seed: i64) -> Self {
        let mut s = Self::default();
        s.reseed(seed);
        s
    }

    /// Same rule as [`set_seed`]: non-positive values are ignored.
    #[inline]
    pub fn reseed(&mut self, seed: i64) {
        if seed > 0 {
            self.seed = seed;
        }
    }

    #[inline]
    #[must_use]
    pub fn seed(&self) -> i64 {
        self.seed
    }

    /// Fill `out` with Gaussian samples of standard deviation `sdev`.
    ///
    /// Only real and complex layouts are defined; exact layouts leave `out`
    /// untouched. Each accepted pair writes two consecutive scalars; a trailing
    /// odd slot takes the first half of the last pair.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn fill<T: Sample>(&mut self, out: &mut [T], sdev: f64, layout: Layout) {
        if layout.is_exact() {
            return;
        }
        let total = out.len();
        let bi = LCG_B / LCG_M;
        let factor = factor();
        let mut sis = self.seed as f64 / LCG_M;
        let mut i = 0;
        while i < total {
            sis = sis * LCG_A + bi;
            sis -= m_trunc(sis);
            let v1 = sis + sis - 1.0;
            sis = sis * LCG_A + bi;
            sis -= m_trunc(sis);
            let v2 = sis + sis - 1.0;
            let sum = v1 * v1 + v2 * v2;
            if sum >= 1.0 || sum == 0.0 {
                continue;
            }
            let scale = sdev * m_sqrt(factor * m_ln(sum) / sum);
            out[i] = T::from_f64(v1 * scale);
            i += 1;
            if i < total {
                out[i] = T::from_f64(v2 * scale);
                i += 1;
            }
        }
        self.seed = (sis * LCG_M) as i64;
    }
}

/// Fill `out` with Gaussian samples using the process-wide seed.
pub fn whitenoise<T: Sample>(out: &mut [T], sdev: f64, layout: Layout) {
    let mut state = NoiseState { seed: seed() };
    state.fill(out, sdev, layout);
    GLOBAL_SEED.store(state.seed, Ordering::Relaxed);
}
