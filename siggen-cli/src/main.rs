//! siggen CLI: run a synthetic signal source and watch it.

mod sinks;
#[cfg(feature = "playback")]
mod audio;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use siggen_engine::{loader, Shape, SharedConfig, SignalSource, SourceConfig, SourceRunner, StopSignal};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::sinks::LogSink;

#[derive(Parser, Debug)]
#[command(name = "siggen", version, about = "Synthetic signal source")]
struct Args {
    /// Config file; replaces ./siggen.toml in the load order
    #[arg(long, env = "SIGGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Frequency in Hz
    #[arg(long)]
    frequency: Option<f64>,

    /// Sample rate in Hz
    #[arg(long)]
    sample_rate: Option<f64>,

    /// Amplitude (standard deviation for whitenoise)
    #[arg(long)]
    magnitude: Option<f64>,

    /// sine | square | triangle | sawtooth | pulse | constant | whitenoise | lrs
    #[arg(long)]
    shape: Option<Shape>,

    /// Samples per packet
    #[arg(long)]
    transfer_length: Option<usize>,

    /// Produce as fast as possible instead of in real time
    #[arg(long)]
    no_throttle: bool,

    #[arg(long)]
    stream_id: Option<String>,

    /// CHAN_RF keyword value
    #[arg(long)]
    chan_rf: Option<f64>,

    /// COL_RF keyword value
    #[arg(long)]
    col_rf: Option<f64>,

    /// White noise seed (positive)
    #[arg(long)]
    seed: Option<i64>,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Statistics report period in milliseconds, 0 to disable
    #[arg(long)]
    stats_interval_ms: Option<u64>,

    /// Do not attach the logging subscriber
    #[arg(long)]
    quiet: bool,

    /// Play the signal on an audio device
    #[cfg(feature = "playback")]
    #[arg(long)]
    play: bool,

    /// Output device name (default device otherwise)
    #[cfg(feature = "playback")]
    #[arg(long)]
    device: Option<String>,

    /// Playback gain
    #[cfg(feature = "playback")]
    #[arg(long, default_value_t = 0.35)]
    gain: f32,

    #[cfg(feature = "playback")]
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    fn apply(&self, c: &mut SourceConfig) {
        if let Some(v) = self.frequency {
            c.frequency = v;
        }
        if let Some(v) = self.sample_rate {
            c.sample_rate = v;
        }
        if let Some(v) = self.magnitude {
            c.magnitude = v;
        }
        if let Some(v) = self.shape {
            c.shape = v;
        }
        if let Some(v) = self.transfer_length {
            c.transfer_length = v;
        }
        if self.no_throttle {
            c.throttle = false;
        }
        if let Some(v) = &self.stream_id {
            c.stream_id.clone_from(v);
        }
        if let Some(v) = self.chan_rf {
            c.chan_rf = v;
        }
        if let Some(v) = self.col_rf {
            c.col_rf = v;
        }
    }
}

fn init_tracing(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn report(runner: &SourceRunner) {
    for s in runner.double_out().statistics() {
        info!(
            port = "double",
            connection = %s.connection_id,
            elements_per_second = s.elements_per_second,
            bits_per_second = s.bits_per_second,
            calls_per_second = s.calls_per_second,
            since_last = s.time_since_last_call,
            streams = ?s.stream_ids,
            "stats"
        );
    }
    for s in runner.short_out().statistics() {
        info!(
            port = "short",
            connection = %s.connection_id,
            elements_per_second = s.elements_per_second,
            calls_per_second = s.calls_per_second,
            "stats"
        );
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    #[cfg(feature = "playback")]
    if args.list_devices {
        return audio::list_output_devices();
    }

    let (mut config, sources) = loader::load(args.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.telemetry.log_level);
    info!(files = ?sources.files, env = ?sources.env_overrides, "configuration loaded");

    args.apply(&mut config.source);
    let shared = SharedConfig::new(config.source.clone()).context("invalid command-line settings")?;
    if let Some(seed) = args.seed {
        if seed <= 0 {
            warn!(seed, "non-positive seed ignored");
        }
        siggen_core::noise::set_seed(seed);
    }
    info!(
        shape = %config.source.shape,
        frequency = config.source.frequency,
        sample_rate = config.source.sample_rate,
        magnitude = config.source.magnitude,
        transfer_length = config.source.transfer_length,
        throttle = config.source.throttle,
        stream = %config.source.stream_id,
        "source configured"
    );

    let mut runner = SourceRunner::new(SignalSource::new(shared));

    // the ports hold subscribers weakly; these bindings keep them alive
    let log_sink = Arc::new(LogSink);
    if !args.quiet {
        runner.double_out().connect("log", &log_sink)?;
    }

    #[cfg(feature = "playback")]
    let _playback = if args.play {
        let (sink, stream) = audio::start(args.device.as_deref(), config.source.sample_rate, args.gain)?;
        runner.double_out().connect("audio", &sink)?;
        Some((sink, stream))
    } else {
        None
    };

    let shutdown = Arc::new(StopSignal::new());
    let on_signal = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, stopping");
        on_signal.stop();
    })
    .context("installing Ctrl+C handler")?;

    runner.start()?;

    let deadline = args
        .duration
        .and_then(|d| Duration::try_from_secs_f64(d).ok())
        .map(|d| Instant::now() + d);
    let interval_ms = args.stats_interval_ms.unwrap_or(config.telemetry.stats_interval_ms);
    let tick = if interval_ms == 0 {
        Duration::from_millis(250)
    } else {
        Duration::from_millis(interval_ms)
    };

    loop {
        let wait = deadline.map_or(tick, |d| tick.min(d.saturating_duration_since(Instant::now())));
        if shutdown.wait(wait) {
            break;
        }
        if interval_ms > 0 {
            report(&runner);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("duration elapsed");
            break;
        }
    }

    runner.stop();
    report(&runner);
    Ok(())
}
