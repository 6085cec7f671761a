//! siggen engine: descriptor cache, subscriber fan-out, and the production loop.
//!
//! Crate layout:
//! - [`descriptor`] : `StreamDescriptor`, timestamps, and the per-stream `DescriptorCache`
//! - [`port`]       : `PushSink` trait and the `OutPort<T>` subscriber registry
//! - [`stats`]      : sliding-window link statistics
//! - [`source`]     : `SignalSource`, one `tick()` per packet
//! - [`runner`]     : the producer thread with interruptible pacing
//! - [`config`]     : `SourceConfig` and the shared handle the loop snapshots
//! - [`loader`]     : layered TOML + environment configuration
//! - [`error`]      : error types
//!
//! The engine only emits `tracing` events; installing a subscriber is up to
//! the binary.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod loader;
pub mod port;
pub mod runner;
pub mod source;
pub mod stats;

// Re-export some commonly used items to make downstream imports ergonomic.
pub use config::{SharedConfig, Shape, SigGenConfig, SourceConfig, TelemetryConfig};
pub use descriptor::{DescriptorCache, KeywordValue, PrecisionUtcTime, StreamDescriptor, Units};
pub use error::{ConfigError, PortError, SourceError, TransportError};
pub use port::{OutPort, PortActivity, PushSink};
pub use runner::{SourceRunner, StopSignal};
pub use source::{SignalSource, TickReport, WaveformState};
pub use stats::{LinkStatistics, PortStatistics};
