//! The production loop body: one call to [`SignalSource::tick`] produces one
//! packet.
//!
//! A tick reads a configuration snapshot, keeps the sample buffer sized to
//! `transfer_length`, pushes the stream descriptor when it is dirty or when a
//! subscriber has not seen it, fills the buffer, advances the phase
//! accumulator, timestamps the packet and fans it out. The returned
//! [`TickReport`] carries the pacing delay; sleeping is left to the caller so
//! that it can be interrupted.

use std::sync::Arc;
use std::time::Duration;

use siggen_core::math::advance_phase;
use siggen_core::sample::Sample;
use siggen_core::waveform::{generate, Family, Layout, Params};
use tracing::{debug, info};

use crate::config::{SharedConfig, SourceConfig};
use crate::descriptor::{DescriptorCache, KeywordValue, PrecisionUtcTime, StreamDescriptor};
use crate::port::OutPort;

/// LFSR register every `lrs` packet starts from.
pub const LRS_SEED: i32 = 1;

/// Name of the `f64` output port.
pub const DOUBLE_PORT: &str = "dataDouble_out";
/// Name of the `i16` output port.
pub const SHORT_PORT: &str = "dataShort_out";

/// Phase accumulator and the reusable sample buffer.
///
/// Owned by the producer; resizing the buffer never touches the phase.
#[derive(Debug, Default)]
pub struct WaveformState {
    phase: f64,
    phase_increment: f64,
    buffer: Vec<f64>,
}

impl WaveformState {
    /// Current phase in cycles, always in `[0, 1)`.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn phase_increment(&self) -> f64 {
        self.phase_increment
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer(&self) -> &[f64] {
        &self.buffer
    }

    /// Resize to `len` samples. Returns true when the length changed.
    fn ensure_len(&mut self, len: usize) -> bool {
        if self.buffer.len() == len {
            return false;
        }
        self.buffer.clear();
        self.buffer.resize(len, 0.0);
        true
    }

    /// Fill the buffer and advance the phase past it.
    fn produce(&mut self, family: Family, amplitude: f64, dp: f64) {
        self.phase_increment = dp;
        let params = Params::new(amplitude, self.phase, dp, Layout::Real);
        let _ = generate(family, &mut self.buffer, &params, LRS_SEED);
        self.phase = advance_phase(self.phase, dp, self.buffer.len());
    }
}

/// Outcome of one tick.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TickReport {
    /// Samples pushed.
    pub elements: usize,
    /// Sleep before the next tick, when throttled.
    pub pacing: Option<Duration>,
    /// Whether a descriptor went out this tick.
    pub descriptor_pushed: bool,
}

/// Per-tick phase increment. Only sine keeps the sign of the frequency.
pub fn phase_increment(family: Family, frequency: f64, xdelta: f64) -> f64 {
    let dp = frequency * xdelta;
    if family == Family::Sine {
        dp
    } else {
        dp.abs()
    }
}

/// Descriptor a configuration implies for its stream.
#[allow(clippy::float_cmp)]
pub fn descriptor_for(config: &SourceConfig, xdelta: f64) -> StreamDescriptor {
    let mut d = StreamDescriptor::new(config.stream_id.as_str()).with_xdelta(xdelta);
    d.blocking = config.sri_blocking;
    if config.chan_rf != -1.0 {
        d.keywords
            .insert("CHAN_RF".to_string(), KeywordValue::Double(config.chan_rf));
    }
    if config.col_rf != -1.0 {
        d.keywords
            .insert("COL_RF".to_string(), KeywordValue::Double(config.col_rf));
    }
    d
}

/// A synthetic signal source with a double and a short output port.
pub struct SignalSource {
    config: SharedConfig,
    state: WaveformState,
    cache: DescriptorCache,
    stream_id: Option<String>,
    double_out: Arc<OutPort<f64>>,
    short_out: Arc<OutPort<i16>>,
    short_buffer: Vec<i16>,
}

impl SignalSource {
    pub fn new(config: SharedConfig) -> Self {
        Self::with_ports(
            config,
            Arc::new(OutPort::new(DOUBLE_PORT)),
            Arc::new(OutPort::new(SHORT_PORT)),
        )
    }

    /// Build on existing ports, keeping their connections.
    pub fn with_ports(config: SharedConfig, double_out: Arc<OutPort<f64>>, short_out: Arc<OutPort<i16>>) -> Self {
        Self {
            config,
            state: WaveformState::default(),
            cache: DescriptorCache::new(),
            stream_id: None,
            double_out,
            short_out,
            short_buffer: Vec::new(),
        }
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Port carrying the samples as `f64`.
    pub fn double_out(&self) -> Arc<OutPort<f64>> {
        Arc::clone(&self.double_out)
    }

    /// Port carrying the samples truncated and clamped to `i16`.
    pub fn short_out(&self) -> Arc<OutPort<i16>> {
        Arc::clone(&self.short_out)
    }

    pub fn state(&self) -> &WaveformState {
        &self.state
    }

    pub fn descriptors(&self) -> &DescriptorCache {
        &self.cache
    }

    /// Stream id of the last tick, if any.
    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    /// Run one production cycle.
    pub fn tick(&mut self) -> TickReport {
        let cfg = self.config.snapshot();
        let id = cfg.stream_id.clone();

        if self.stream_id.as_deref() != Some(id.as_str()) {
            if let Some(old) = self.stream_id.take() {
                info!(from = %old, to = %id, "stream id changed");
                self.end_stream(&old);
            }
            let _ = self.cache.get_or_create(&id);
            self.cache.mark_dirty(&id);
            self.stream_id = Some(id.clone());
        }

        let old_len = self.state.buffer_len();
        if self.state.ensure_len(cfg.transfer_length) {
            debug!(from = old_len, to = cfg.transfer_length, "reallocated sample buffer");
            self.cache.mark_dirty(&id);
        }

        let xdelta = 1.0 / cfg.sample_rate;
        let _ = self
            .cache
            .mark_dirty_if_changed(&id, descriptor_for(&cfg, xdelta));

        let descriptor_pushed = self.push_descriptor_if_needed(&id);

        let family = cfg.shape.family();
        let dp = phase_increment(family, cfg.frequency, xdelta);
        self.state.produce(family, cfg.magnitude, dp);

        let time = PrecisionUtcTime::now();
        self.double_out.push_packet(self.state.buffer(), &time, false, &id);
        if self.short_out.is_active() {
            self.short_buffer.clear();
            self.short_buffer
                .extend(self.state.buffer().iter().map(|&v| <i16 as Sample>::from_f64(v)));
            self.short_out.push_packet(&self.short_buffer, &time, false, &id);
        }

        #[allow(clippy::cast_precision_loss)]
        let pacing = if cfg.throttle {
            Duration::try_from_secs_f64(self.state.buffer_len() as f64 * xdelta).ok()
        } else {
            None
        };

        TickReport {
            elements: self.state.buffer_len(),
            pacing,
            descriptor_pushed,
        }
    }

    fn push_descriptor_if_needed(&mut self, id: &str) -> bool {
        let Some(descriptor) = self.cache.get(id).cloned() else {
            return false;
        };
        if self.cache.is_dirty(id) {
            self.double_out.push_descriptor(&descriptor);
            self.short_out.push_descriptor(&descriptor);
            self.cache.clear_dirty(id);
            return true;
        }
        let mut pushed = false;
        if self.double_out.needs_descriptor(id) {
            pushed |= self.double_out.announce(&descriptor) > 0;
        }
        if self.short_out.needs_descriptor(id) {
            pushed |= self.short_out.announce(&descriptor) > 0;
        }
        pushed
    }

    fn end_stream(&mut self, stream_id: &str) {
        let time = PrecisionUtcTime::now();
        self.double_out.push_packet(&[], &time, true, stream_id);
        self.short_out.push_packet(&[], &time, true, stream_id);
    }

    /// Close the current stream with an end-of-stream packet.
    ///
    /// The next tick reopens it with a fresh descriptor.
    pub fn finish(&mut self) {
        if let Some(id) = self.stream_id.take() {
            info!(stream = %id, "end of stream");
            self.end_stream(&id);
        }
    }
}
