#![cfg_attr(not(feature = "std"), no_std)]
//! siggen core: no_std-ready waveform generators for a synthetic signal source.
//!
//! Features
//! - `std`    : (default) use the Rust standard library
//! - `no-std` : build with `#![no_std]` and use `libm` for the math backend
//!
//! Modules
//! - [`math`]     : math backend selection, phase wrapping helpers
//! - [`sample`]   : the [`Sample`](sample::Sample) output trait (f64 / f32 / i16)
//! - [`waveform`] : sine, square, triangle, sawtooth, pulse, constant, lrs, ramp
//! - [`noise`]    : reproducible Gaussian white noise with a process-wide seed
//!
//! Design
//! - Generators are pure functions over caller-owned slices; no allocation
//! - Phase is carried by the caller, so a source can keep waveforms continuous
//!   across buffers of any length

pub mod math;
pub mod noise;
pub mod sample;
pub mod waveform;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::math::{advance_phase, wrap_phase01, TWO_PI};
    pub use crate::noise::{set_seed, whitenoise, NoiseState};
    pub use crate::sample::Sample;
    pub use crate::waveform::{generate, Family, Layout, Params};
}
