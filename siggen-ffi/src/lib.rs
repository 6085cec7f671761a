//! C ABI wrapper for the siggen waveform generators.
//!
//! Two ways in:
//! - stateless: `siggen_generate_f64` / `siggen_generate_f32` fill one buffer
//!   from explicit phase and increment; the LFSR/ramp register is passed in
//!   and out through a pointer;
//! - stateful: a `SiggenGenerator` handle keeps phase and LFSR/ramp state so
//!   consecutive `siggen_render_*` calls continue the waveform.
//!
//! ABI notes
//! - All functions are `extern "C"` and `#[no_mangle]`.
//! - Families: 0 sine, 1 square, 2 triangle, 3 sawtooth, 4 pulse,
//!   5 constant, 6 whitenoise, 7 lrs, 8 ramp.
//! - Layouts (`scalars_per_sample`): 1 real, 2 complex, -1/-2 exact.
//! - Buffers hold `samples * |scalars_per_sample|` values.
//!
//! Threading
//! - A handle is NOT thread-safe. The white noise seed is process-wide.

use siggen_core::math::advance_phase;
use siggen_core::noise;
use siggen_core::sample::Sample;
use siggen_core::waveform::{generate, Family, Layout, Params};

/// Status of a call that succeeded.
pub const SIGGEN_OK: i32 = 0;
/// Status of a call whose arguments were rejected.
pub const SIGGEN_EINVAL: i32 = -1;

fn family_from_id(id: i32) -> Option<Family> {
    usize::try_from(id).ok().and_then(|i| Family::ALL.get(i).copied())
}

/// Opaque generator handle we hand to C.
pub struct SiggenGenerator {
    family: Family,
    layout: Layout,
    sample_rate: f64,
    frequency: f64,
    amplitude: f64,
    phase: f64,
    register: i32,
}

impl SiggenGenerator {
    fn render<T: Sample>(&mut self, out: &mut [T]) {
        let dp = self.frequency / self.sample_rate;
        let params = Params::new(self.amplitude, self.phase, dp, self.layout);
        self.register = generate(self.family, out, &params, self.register);
        self.phase = advance_phase(self.phase, dp, out.len() / self.layout.scalars());
    }
}

/// # Safety
/// `out` must be valid for `samples * scalars` writes.
unsafe fn buffer<'a, T>(out: *mut T, samples: u32, layout: Layout) -> &'a mut [T] {
    std::slice::from_raw_parts_mut(out, samples as usize * layout.scalars())
}

unsafe fn generate_raw<T: Sample>(
    family: i32,
    out: *mut T,
    samples: u32,
    amplitude: f64,
    phase: f64,
    dp: f64,
    scalars_per_sample: i32,
    register: *mut i32,
) -> i32 {
    let (Some(family), Some(layout)) = (family_from_id(family), Layout::from_scalars(scalars_per_sample)) else {
        return SIGGEN_EINVAL;
    };
    if out.is_null() {
        return SIGGEN_EINVAL;
    }
    let out = buffer(out, samples, layout);
    let start = register.as_ref().copied().unwrap_or(0);
    let end = generate(family, out, &Params::new(amplitude, phase, dp, layout), start);
    if let Some(r) = register.as_mut() {
        *r = end;
    }
    SIGGEN_OK
}

// --- Stateless ------------------------------------------------------------------

/// Fill `out` with `samples` elements of `family`.
///
/// `register` holds the LFSR / ramp state going in and receives the state
/// after the call; the other families leave it unchanged. A null `register`
/// starts from 0 and discards the result.
///
/// Returns `SIGGEN_OK` or `SIGGEN_EINVAL`.
///
/// # Safety
/// `out` must point to `samples * |scalars_per_sample|` writable doubles and
/// `register` must be null or valid for reads and writes.
#[no_mangle]
pub unsafe extern "C" fn siggen_generate_f64(
    family: i32,
    out: *mut f64,
    samples: u32,
    amplitude: f64,
    phase: f64,
    dp: f64,
    scalars_per_sample: i32,
    register: *mut i32,
) -> i32 {
    generate_raw(family, out, samples, amplitude, phase, dp, scalars_per_sample, register)
}

/// `f32` variant of [`siggen_generate_f64`].
///
/// # Safety
/// `out` must point to `samples * |scalars_per_sample|` writable floats and
/// `register` must be null or valid for reads and writes.
#[no_mangle]
pub unsafe extern "C" fn siggen_generate_f32(
    family: i32,
    out: *mut f32,
    samples: u32,
    amplitude: f64,
    phase: f64,
    dp: f64,
    scalars_per_sample: i32,
    register: *mut i32,
) -> i32 {
    generate_raw(family, out, samples, amplitude, phase, dp, scalars_per_sample, register)
}

/// Reset the process-wide white noise seed. Non-positive values are ignored.
#[no_mangle]
pub extern "C" fn siggen_set_seed(seed: i64) {
    noise::set_seed(seed);
}

#[no_mangle]
pub extern "C" fn siggen_get_seed() -> i64 {
    noise::seed()
}

// --- Creation / destruction -------------------------------------------------------

/// Create a generator. Returns null for an unknown family or layout, or a
/// non-positive sample rate.
#[no_mangle]
pub extern "C" fn siggen_create(family: i32, scalars_per_sample: i32, sample_rate: f64) -> *mut SiggenGenerator {
    let (Some(family), Some(layout)) = (family_from_id(family), Layout::from_scalars(scalars_per_sample)) else {
        return std::ptr::null_mut();
    };
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return std::ptr::null_mut();
    }
    let register = if family == Family::Lrs { 1 } else { 0 };
    Box::into_raw(Box::new(SiggenGenerator {
        family,
        layout,
        sample_rate,
        frequency: 1000.0,
        amplitude: 1.0,
        phase: 0.0,
        register,
    }))
}

/// Destroy a generator returned by `siggen_create`.
///
/// # Safety
/// `gen` must come from `siggen_create` and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn siggen_destroy(gen: *mut SiggenGenerator) {
    if !gen.is_null() {
        drop(Box::from_raw(gen));
    }
}

// --- Parameters -------------------------------------------------------------------

/// # Safety
/// `gen` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn siggen_set_frequency(gen: *mut SiggenGenerator, hz: f64) {
    if let Some(g) = gen.as_mut() {
        if hz.is_finite() {
            g.frequency = hz;
        }
    }
}

/// # Safety
/// `gen` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn siggen_set_amplitude(gen: *mut SiggenGenerator, amplitude: f64) {
    if let Some(g) = gen.as_mut() {
        if amplitude.is_finite() {
            g.amplitude = amplitude;
        }
    }
}

/// Phase in cycles, wrapped into `[0, 1)`.
///
/// # Safety
/// `gen` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn siggen_get_phase(gen: *const SiggenGenerator) -> f64 {
    gen.as_ref().map_or(0.0, |g| g.phase)
}

/// LFSR / ramp register.
///
/// # Safety
/// `gen` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn siggen_get_register(gen: *const SiggenGenerator) -> i32 {
    gen.as_ref().map_or(0, |g| g.register)
}

// --- Rendering -------------------------------------------------------------------

/// Render `samples` elements, continuing from the previous call.
///
/// Returns the number of samples rendered (0 on error).
///
/// # Safety
/// `gen` must be a live handle and `out` valid for `samples * scalars` doubles.
#[no_mangle]
pub unsafe extern "C" fn siggen_render_f64(gen: *mut SiggenGenerator, out: *mut f64, samples: u32) -> u32 {
    let Some(g) = gen.as_mut() else { return 0 };
    if out.is_null() || samples == 0 {
        return 0;
    }
    g.render(buffer(out, samples, g.layout));
    samples
}

/// `f32` variant of [`siggen_render_f64`].
///
/// # Safety
/// `gen` must be a live handle and `out` valid for `samples * scalars` floats.
#[no_mangle]
pub unsafe extern "C" fn siggen_render_f32(gen: *mut SiggenGenerator, out: *mut f32, samples: u32) -> u32 {
    let Some(g) = gen.as_mut() else { return 0 };
    if out.is_null() || samples == 0 {
        return 0;
    }
    g.render(buffer(out, samples, g.layout));
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stateless_rejects_bad_selectors() {
        let mut buf = [0.0_f64; 4];
        let mut reg = 5;
        unsafe {
            assert_eq!(siggen_generate_f64(42, buf.as_mut_ptr(), 4, 1.0, 0.0, 0.1, 1, &mut reg), SIGGEN_EINVAL);
            assert_eq!(siggen_generate_f64(0, buf.as_mut_ptr(), 4, 1.0, 0.0, 0.1, 3, &mut reg), SIGGEN_EINVAL);
            assert_eq!(
                siggen_generate_f64(0, std::ptr::null_mut(), 4, 1.0, 0.0, 0.1, 1, &mut reg),
                SIGGEN_EINVAL
            );
        }
        assert_eq!(reg, 5);
    }

    #[test]
    fn stateless_ramp_returns_its_counter() {
        let mut buf = [0.0_f64; 8];
        let mut reg = 0;
        let status = unsafe { siggen_generate_f64(8, buf.as_mut_ptr(), 8, 3.0, 0.0, 0.0, 1, &mut reg) };
        assert_eq!(status, SIGGEN_OK);
        assert_eq!(buf, [0.0, 1.0, 2.0, -3.0, -2.0, -1.0, 0.0, 1.0]);
        assert_eq!(reg, 2);
    }

    #[test]
    fn register_can_take_any_value() {
        // a large ramp wraps the counter onto i32::MIN, which is still a success
        let mut buf = [0.0_f64; 1];
        let mut reg = i32::MAX;
        let status = unsafe { siggen_generate_f64(8, buf.as_mut_ptr(), 1, 3.0e9, 0.0, 0.0, 1, &mut reg) };
        assert_eq!(status, SIGGEN_OK);
        assert_eq!(buf[0], f64::from(i32::MAX));
        assert_eq!(reg, i32::MIN);
    }

    #[test]
    fn null_register_starts_from_zero() {
        let mut buf = [9.0_f64; 3];
        let status = unsafe { siggen_generate_f64(8, buf.as_mut_ptr(), 3, 10.0, 0.0, 0.0, 1, std::ptr::null_mut()) };
        assert_eq!(status, SIGGEN_OK);
        assert_eq!(buf, [0.0, 1.0, 2.0]);
    }

    #[test]
    fn complex_buffer_is_twice_as_long() {
        let mut buf = [9.0_f32; 8];
        let mut reg = 7;
        let status = unsafe { siggen_generate_f32(0, buf.as_mut_ptr(), 4, 1.0, 0.0, 0.125, 2, &mut reg) };
        assert_eq!(status, SIGGEN_OK);
        assert_eq!(reg, 7);
        // cos then sin at phase 0
        assert!((buf[0] - 1.0).abs() < 1e-6);
        assert!(buf[1].abs() < 1e-6);
        assert!(buf.iter().all(|v| *v != 9.0));
    }

    #[test]
    fn handle_continues_the_waveform() {
        let g = siggen_create(0, 1, 1000.0);
        assert!(!g.is_null());
        let mut first = [0.0_f64; 100];
        let mut second = [0.0_f64; 100];
        unsafe {
            siggen_set_frequency(g, 10.0);
            assert_eq!(siggen_render_f64(g, first.as_mut_ptr(), 100), 100);
            assert_eq!(siggen_render_f64(g, second.as_mut_ptr(), 100), 100);
            // 100 samples of 10 Hz at 1 kHz is exactly one cycle
            assert!(siggen_get_phase(g) < 1e-9 || siggen_get_phase(g) > 1.0 - 1e-9);
            siggen_destroy(g);
        }
        for (a, b) in first.iter().zip(second.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn lrs_handle_advances_its_register() {
        let g = siggen_create(7, 1, 1000.0);
        let mut buf = [0.0_f64; 16];
        unsafe {
            assert_eq!(siggen_get_register(g), 1);
            siggen_render_f64(g, buf.as_mut_ptr(), 16);
            assert_ne!(siggen_get_register(g), 1);
            siggen_destroy(g);
        }
    }

    #[test]
    fn create_validates_arguments() {
        assert!(siggen_create(99, 1, 1000.0).is_null());
        assert!(siggen_create(0, 0, 1000.0).is_null());
        assert!(siggen_create(0, 1, 0.0).is_null());
        unsafe {
            siggen_destroy(std::ptr::null_mut());
            assert_eq!(siggen_render_f64(std::ptr::null_mut(), std::ptr::null_mut(), 4), 0);
        }
    }

    #[test]
    fn seed_round_trip() {
        let before = siggen_get_seed();
        siggen_set_seed(-3);
        assert_eq!(siggen_get_seed(), before);
    }
}
