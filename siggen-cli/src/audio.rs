//! Audio playback subscriber (feature `playback`).
//!
//! Packets are queued into a bounded FIFO; the CPAL output callback drains it
//! and writes the same sample to every channel. An underrun plays silence, an
//! overrun drops the oldest samples.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use siggen_engine::{PrecisionUtcTime, PushSink, StreamDescriptor, TransportError};
use tracing::{info, warn};

type Fifo = Arc<Mutex<VecDeque<f32>>>;

/// Feeds the double port into an output device.
pub struct AudioSink {
    fifo: Fifo,
    capacity: usize,
    gain: f32,
}

impl PushSink<f64> for AudioSink {
    fn push_descriptor(&self, _: &StreamDescriptor) -> Result<(), TransportError> {
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn push_packet(&self, data: &[f64], _: &PrecisionUtcTime, eos: bool, _: &str) -> Result<(), TransportError> {
        let mut q = self
            .fifo
            .lock()
            .map_err(|_| TransportError::Rejected("audio queue poisoned".into()))?;
        if eos {
            q.clear();
            return Ok(());
        }
        q.extend(data.iter().map(|&v| (v as f32 * self.gain).clamp(-1.0, 1.0)));
        let excess = q.len().saturating_sub(self.capacity);
        q.drain(..excess);
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn queue_depth(&self) -> f64 {
        self.fifo.lock().map_or(0.0, |q| q.len() as f64 / self.capacity as f64)
    }
}

/// Print the names of all output devices.
pub fn list_output_devices() -> Result<()> {
    let host = cpal::default_host();
    println!("Available output devices:");
    for dev in host.output_devices()? {
        println!("- {}", dev.name()?);
    }
    Ok(())
}

fn pick_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = name {
        for d in host.output_devices()? {
            if d.name()? == name {
                return Ok(d);
            }
        }
        return Err(anyhow!("requested device not found: {name}"));
    }
    host.default_output_device()
        .ok_or_else(|| anyhow!("no default output device"))
}

/// Closest supported config to `sample_rate`.
fn choose_config(device: &cpal::Device, sample_rate: u32) -> Result<cpal::SupportedStreamConfig> {
    let mut best: Option<(u32, cpal::SupportedStreamConfigRange)> = None;
    for range in device.supported_output_configs()? {
        let lo = range.min_sample_rate().0;
        let hi = range.max_sample_rate().0;
        let penalty = if (lo..=hi).contains(&sample_rate) {
            0
        } else {
            lo.abs_diff(sample_rate).min(hi.abs_diff(sample_rate))
        };
        if best.as_ref().map_or(true, |(p, _)| penalty < *p) {
            best = Some((penalty, range));
        }
    }
    let (_, range) = best.ok_or_else(|| anyhow!("no supported output configs"))?;
    let lo = range.min_sample_rate().0;
    let hi = range.max_sample_rate().0;
    Ok(range.with_sample_rate(cpal::SampleRate(sample_rate.clamp(lo, hi))))
}

fn build_stream<T>(device: &cpal::Device, cfg: &cpal::StreamConfig, fifo: Fifo) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::FromSample<f32> + cpal::SizedSample + Send + 'static,
{
    let channels = usize::from(cfg.channels);
    let err_fn = |e: cpal::StreamError| warn!(error = %e, "audio stream error");
    let stream = device.build_output_stream(
        cfg,
        move |output: &mut [T], _| {
            let mut q = match fifo.lock() {
                Ok(q) => q,
                Err(poisoned) => poisoned.into_inner(),
            };
            for frame in output.chunks_mut(channels) {
                let v: T = T::from_sample(q.pop_front().unwrap_or(0.0));
                for ch in frame.iter_mut() {
                    *ch = v;
                }
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Open `device` (or the default) near `sample_rate` and start playing.
///
/// Keep the returned stream alive for as long as audio should play.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn start(device: Option<&str>, sample_rate: f64, gain: f32) -> Result<(Arc<AudioSink>, cpal::Stream)> {
    let device = pick_device(device)?;
    let supported = choose_config(&device, sample_rate.round().max(1.0) as u32)?;
    let format = supported.sample_format();
    let cfg = supported.config();

    // half a second of audio
    let capacity = (cfg.sample_rate.0 as usize / 2).max(1024);
    let fifo: Fifo = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));

    let stream = match format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &cfg, Arc::clone(&fifo))?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &cfg, Arc::clone(&fifo))?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &cfg, Arc::clone(&fifo))?,
        other => return Err(anyhow!("unsupported device sample format: {other:?}")),
    };
    stream.play().context("starting audio stream")?;

    info!(device = %device.name().unwrap_or_default(), config = ?cfg, "audio playback started");
    if f64::from(cfg.sample_rate.0) != sample_rate.round() {
        warn!(source = sample_rate, device = cfg.sample_rate.0, "device rate differs; pitch will shift");
    }
    Ok((Arc::new(AudioSink { fifo, capacity, gain }), stream))
}
