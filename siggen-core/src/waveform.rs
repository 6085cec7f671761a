//! Waveform families.
//!
//! Every generator fills a caller-provided slice. Phases are fractions of a
//! cycle; `dp` is the phase advance per sample. The number of samples produced
//! is `out.len() / layout.scalars()`.
//!
//! Layouts:
//! - [`Layout::Real`]         : one scalar per sample
//! - [`Layout::Complex`]      : two scalars per sample, interleaved
//! - [`Layout::ExactReal`] / [`Layout::ExactComplex`] : sine only, evaluates
//!   `sin`/`cos` per sample instead of the rotation recurrence
//!
//! Families that do not define a layout leave the buffer untouched.
//! For non-sine families the complex layout writes the same value twice.

use core::fmt;
use core::str::FromStr;

use crate::math::{m_cos, m_sin, TWO_PI};
use crate::noise;
use crate::sample::Sample;

/// `2^30`, the LFSR output scale.
const B1G: f64 = 1_073_741_824.0;

/// Scalars-per-sample selector.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Layout {
    #[default]
    Real,
    Complex,
    ExactReal,
    ExactComplex,
}

impl Layout {
    /// Map the numeric selector (`1`, `2`, `-1`, `-2`) to a layout.
    #[must_use]
    pub fn from_scalars(spa: i32) -> Option<Self> {
        match spa {
            1 => Some(Self::Real),
            2 => Some(Self::Complex),
            -1 => Some(Self::ExactReal),
            -2 => Some(Self::ExactComplex),
            _ => None,
        }
    }

    /// Scalars written per sample element.
    #[inline]
    #[must_use]
    pub fn scalars(self) -> usize {
        match self {
            Self::Real | Self::ExactReal => 1,
            Self::Complex | Self::ExactComplex => 2,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_exact(self) -> bool {
        matches!(self, Self::ExactReal | Self::ExactComplex)
    }

    /// Descriptor `mode` value: 0 scalar, 1 complex.
    #[inline]
    #[must_use]
    pub fn mode(self) -> u8 {
        u8::from(self.scalars() == 2)
    }
}

/// Every waveform the generator knows about.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Family {
    Sine,
    Square,
    Triangle,
    Sawtooth,
    Pulse,
    Constant,
    WhiteNoise,
    Lrs,
    Ramp,
}

impl Family {
    pub const ALL: [Family; 9] = [
        Family::Sine,
        Family::Square,
        Family::Triangle,
        Family::Sawtooth,
        Family::Pulse,
        Family::Constant,
        Family::WhiteNoise,
        Family::Lrs,
        Family::Ramp,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Family::Sine => "sine",
            Family::Square => "square",
            Family::Triangle => "triangle",
            Family::Sawtooth => "sawtooth",
            Family::Pulse => "pulse",
            Family::Constant => "constant",
            Family::WhiteNoise => "whitenoise",
            Family::Lrs => "lrs",
            Family::Ramp => "ramp",
        }
    }

    /// Whether the family reads `phase`/`dp` at all.
    #[must_use]
    pub fn is_periodic(self) -> bool {
        matches!(
            self,
            Family::Sine | Family::Square | Family::Triangle | Family::Sawtooth | Family::Pulse
        )
    }

    /// Whether the family carries register state between calls.
    #[must_use]
    pub fn is_stateful(self) -> bool {
        matches!(self, Family::Lrs | Family::Ramp)
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned by [`Family::from_str`] for unknown names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownFamily;

impl fmt::Display for UnknownFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown waveform family")
    }
}

impl FromStr for Family {
    type Err = UnknownFamily;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Family::ALL
            .iter()
            .copied()
            .find(|f| f.name().eq_ignore_ascii_case(s.trim()))
            .ok_or(UnknownFamily)
    }
}

/// Parameters shared by every family.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Params {
    /// Amplitude (standard deviation for white noise).
    pub amplitude: f64,
    /// Starting phase in cycles.
    pub phase: f64,
    /// Phase increment per sample in cycles.
    pub dp: f64,
    pub layout: Layout,
}

impl Params {
    #[must_use]
    pub fn new(amplitude: f64, phase: f64, dp: f64, layout: Layout) -> Self {
        Self { amplitude, phase, dp, layout }
    }
}

// --------------------------------- Sine / cosine ---------------------------------

/// Sine (real) or cosine/sine (complex).
///
/// Recurrence layouts rotate `amp·(cos p, sin p)` by `(cos dp, sin dp)` each
/// sample. Exact layouts call `sin`/`cos` on every sample.
pub fn sincos<T: Sample>(out: &mut [T], amp: f64, phase: f64, dp: f64, layout: Layout) {
    match layout {
        Layout::Real | Layout::Complex => {
            let mut cxr = amp * m_cos(phase * TWO_PI);
            let mut cxi = amp * m_sin(phase * TWO_PI);
            let dxr = m_cos(dp * TWO_PI);
            let dxi = m_sin(dp * TWO_PI);
            let rotate = |cxr: f64, cxi: f64| (cxr * dxr - cxi * dxi, cxr * dxi + cxi * dxr);
            if layout == Layout::Complex {
                for pair in out.chunks_exact_mut(2) {
                    pair[0] = T::from_f64(cxr);
                    pair[1] = T::from_f64(cxi);
                    (cxr, cxi) = rotate(cxr, cxi);
                }
            } else {
                for y in out.iter_mut() {
                    *y = T::from_f64(cxi);
                    (cxr, cxi) = rotate(cxr, cxi);
                }
            }
        }
        Layout::ExactReal => {
            let mut p = phase;
            for y in out.iter_mut() {
                *y = T::from_f64(amp * m_sin(p * TWO_PI));
                p += dp;
            }
        }
        Layout::ExactComplex => {
            let mut p = phase;
            for pair in out.chunks_exact_mut(2) {
                pair[0] = T::from_f64(amp * m_cos(p * TWO_PI));
                pair[1] = T::from_f64(amp * m_sin(p * TWO_PI));
                p += dp;
            }
        }
    }
}

// --------------------------------- Shaped periodic -------------------------------

/// Write `value` into one sample element (one or two scalars).
#[inline]
fn put<T: Sample>(elem: &mut [T], value: f64) {
    let v = T::from_f64(value);
    for s in elem.iter_mut() {
        *s = v;
    }
}

/// Shared loop for the piecewise families: `shape` maps the running phase to
/// a value and may rewrite the phase (wrapping).
#[inline]
fn shaped<T: Sample>(out: &mut [T], start: f64, dp: f64, layout: Layout, mut shape: impl FnMut(&mut f64) -> f64) {
    if layout.is_exact() {
        return;
    }
    let mut p = start;
    for elem in out.chunks_exact_mut(layout.scalars()) {
        put(elem, shape(&mut p));
        p += dp;
    }
}

/// `+amp` for phase in `[0.5, 1)`, `-amp` otherwise.
///
/// The phase wraps lazily: on the sample where it reaches 1.0 it is reduced and
/// that sample reads `-amp`.
pub fn square<T: Sample>(out: &mut [T], amp: f64, phase: f64, dp: f64, layout: Layout) {
    shaped(out, phase, dp, layout, |p| {
        if *p >= 1.0 {
            *p -= 1.0;
            -amp
        } else if *p >= 0.5 {
            amp
        } else {
            -amp
        }
    });
}

/// Symmetric triangle peaking at `+amp` at phase 0.5 and `-amp` at phase 0.
pub fn triangle<T: Sample>(out: &mut [T], amp: f64, phase: f64, dp: f64, layout: Layout) {
    let slope = 4.0 * amp;
    shaped(out, phase - 0.5, dp, layout, |fp| {
        if *fp >= 0.5 {
            *fp -= 1.0;
        }
        if *fp > 0.0 {
            amp - *fp * slope
        } else {
            amp + *fp * slope
        }
    });
}

/// Rising ramp from `-amp` at phase 0 toward `+amp` just before phase 1.
pub fn sawtooth<T: Sample>(out: &mut [T], amp: f64, phase: f64, dp: f64, layout: Layout) {
    let slope = 2.0 * amp;
    shaped(out, phase - 0.5, dp, layout, |fp| {
        if *fp >= 0.5 {
            *fp -= 1.0;
        }
        *fp * slope
    });
}

/// One sample of `amp` each time the accumulated phase reaches 1.0, else 0.
pub fn pulse<T: Sample>(out: &mut [T], amp: f64, phase: f64, dp: f64, layout: Layout) {
    shaped(out, phase, dp, layout, |p| {
        if *p >= 1.0 {
            *p -= 1.0;
            amp
        } else {
            0.0
        }
    });
}

/// Every scalar set to `amp`.
pub fn constant<T: Sample>(out: &mut [T], amp: f64, layout: Layout) {
    if layout.is_exact() {
        return;
    }
    put(out, amp);
}

// --------------------------------- Register based --------------------------------

/// One LFSR step: taps 0, 1, 5, 25, XNOR fed back into bit 0.
#[inline]
#[must_use]
pub fn lrs_step(reg: i32) -> i32 {
    let bit0 = !(reg ^ (reg >> 1) ^ (reg >> 5) ^ (reg >> 25)) & 0x1;
    reg.wrapping_shl(1) | bit0
}

/// Linear-feedback pseudo noise scaled by `amp / 2 / 2^30`.
///
/// Returns the register after the last sample so a caller can continue the
/// sequence. The all-ones register is a fixed point.
#[must_use]
pub fn lrs<T: Sample>(out: &mut [T], amp: f64, layout: Layout, mut reg: i32) -> i32 {
    if layout.is_exact() {
        return reg;
    }
    let factor = amp / 2.0 / B1G;
    for elem in out.chunks_exact_mut(layout.scalars()) {
        put(elem, factor * f64::from(reg));
        reg = lrs_step(reg);
    }
    reg
}

/// Integer counter that wraps to `-amp` once it reaches `amp`.
///
/// Returns the counter after the last sample.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn ramp<T: Sample>(out: &mut [T], amp: f64, layout: Layout, mut count: i32) -> i32 {
    if layout.is_exact() {
        return count;
    }
    for elem in out.chunks_exact_mut(layout.scalars()) {
        put(elem, f64::from(count));
        count = count.wrapping_add(1);
        if f64::from(count) >= amp {
            count = (-amp) as i32;
        }
    }
    count
}

// --------------------------------- Dispatch --------------------------------------

/// Fill `out` with `family`.
///
/// `register` is the LFSR/ramp state going in; the returned value is the state
/// coming out (unchanged for the other families). White noise draws on the
/// process-wide seed.
pub fn generate<T: Sample>(family: Family, out: &mut [T], params: &Params, register: i32) -> i32 {
    let Params { amplitude: amp, phase, dp, layout } = *params;
    match family {
        Family::Sine => sincos(out, amp, phase, dp, layout),
        Family::Square => square(out, amp, phase, dp, layout),
        Family::Triangle => triangle(out, amp, phase, dp, layout),
        Family::Sawtooth => sawtooth(out, amp, phase, dp, layout),
        Family::Pulse => pulse(out, amp, phase, dp, layout),
        Family::Constant => constant(out, amp, layout),
        Family::WhiteNoise => noise::whitenoise(out, amp, layout),
        Family::Lrs => return lrs(out, amp, layout, register),
        Family::Ramp => return ramp(out, amp, layout, register),
    }
    register
}

/// Allocate `n` sample elements and fill them.
#[cfg(feature = "std")]
#[must_use]
pub fn render<T: Sample>(family: Family, n: usize, params: &Params, register: i32) -> (std::vec::Vec<T>, i32) {
    let mut out = std::vec![T::zero(); n * params.layout.scalars()];
    let reg = generate(family, &mut out, params, register);
    (out, reg)
}

// --------------------------------- Tests (std only) ------------------------------
