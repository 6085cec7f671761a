//! Math backend selection and phase helpers.
//!
//! Everything in the generators runs in `f64`. On hosted targets the std
//! intrinsics are used; with the `no-std` feature the `libm` versions are
//! linked instead.

use cfg_if::cfg_if;

// ----------------------------- Math backend selection -----------------------------

cfg_if! {
    // libm (C math) in no_std
    if #[cfg(feature = "no-std")] {
        #[inline] pub(crate) fn m_sin(x: f64) -> f64 { libm::sin(x) }
        #[inline] pub(crate) fn m_cos(x: f64) -> f64 { libm::cos(x) }
        #[inline] pub(crate) fn m_ln(x: f64) -> f64 { libm::log(x) }
        #[inline] pub(crate) fn m_sqrt(x: f64) -> f64 { libm::sqrt(x) }
        #[inline] pub(crate) fn m_floor(x: f64) -> f64 { libm::floor(x) }
        #[inline] pub(crate) fn m_trunc(x: f64) -> f64 { libm::trunc(x) }
    // std backend
    } else {
        #[inline] pub(crate) fn m_sin(x: f64) -> f64 { x.sin() }
        #[inline] pub(crate) fn m_cos(x: f64) -> f64 { x.cos() }
        #[inline] pub(crate) fn m_ln(x: f64) -> f64 { x.ln() }
        #[inline] pub(crate) fn m_sqrt(x: f64) -> f64 { x.sqrt() }
        #[inline] pub(crate) fn m_floor(x: f64) -> f64 { x.floor() }
        #[inline] pub(crate) fn m_trunc(x: f64) -> f64 { x.trunc() }
    }
}

// --------------------------------- Constants -------------------------------------

/// 2π. Phases in this crate are fractions of a cycle and get multiplied by this.
pub const TWO_PI: f64 = core::f64::consts::PI * 2.0;

// --------------------------------- Phase helpers ---------------------------------

/// Reduce a phase (in cycles) into `[0, 1)`.
///
/// This is `p - floor(p)`, so negative phases wrap from the top. A
/// non-finite phase restarts at 0.
#[inline]
pub fn wrap_phase01(p: f64) -> f64 {
    if !p.is_finite() {
        return 0.0;
    }
    let w = p - m_floor(p);
    // floor of a tiny negative value can round the result up to exactly 1.0
    if w >= 1.0 { 0.0 } else { w }
}

/// Advance a phase accumulator by `n` steps of `dp` and wrap it into `[0, 1)`.
#[inline]
#[allow(clippy::cast_precision_loss)]
pub fn advance_phase(phase: f64, dp: f64, n: usize) -> f64 {
    wrap_phase01(phase + dp * n as f64)
}

// --------------------------------- Tests (std only) ------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_keeps_unit_interval() {
        for p in [-3.75, -1.0, -0.25, -1e-18, 0.0, 0.5, 0.999_999, 1.0, 2.5, 1234.125] {
            let w = wrap_phase01(p);
            assert!((0.0..1.0).contains(&w), "p={p} w={w}");
        }
        assert!((wrap_phase01(-0.25) - 0.75).abs() < 1e-15);
        assert!((wrap_phase01(2.5) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn non_finite_phase_restarts_at_zero() {
        assert_eq!(wrap_phase01(f64::INFINITY), 0.0);
        assert_eq!(wrap_phase01(f64::NEG_INFINITY), 0.0);
        assert_eq!(wrap_phase01(f64::NAN), 0.0);
        assert_eq!(advance_phase(0.25, f64::INFINITY, 10), 0.0);
        assert_eq!(advance_phase(f64::NAN, 0.1, 3), 0.0);
    }

    #[test]
    fn advance_wraps_after_many_cycles() {
        let p = advance_phase(0.9, 0.2, 1000);
        assert!((0.0..1.0).contains(&p));
        assert!((p - 0.9).abs() < 1e-9, "p={p}");
    }
}
