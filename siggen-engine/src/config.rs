//! Source configuration.
//!
//! [`SourceConfig`] is the one struct the production loop reads. It is shared
//! through [`SharedConfig`]; the loop clones a snapshot at the top of every
//! tick, so writers never block generation for longer than a field copy.
//!
//! [`SigGenConfig`] is the on-disk shape (`[source]` + `[telemetry]`), loaded
//! in layers by [`crate::loader`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use siggen_core::waveform::Family;

use crate::error::ConfigError;

/// Waveform families selectable from configuration.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    #[default]
    Sine,
    Square,
    Triangle,
    Sawtooth,
    Pulse,
    Constant,
    WhiteNoise,
    Lrs,
}

impl Shape {
    pub const ALL: [Shape; 8] = [
        Shape::Sine,
        Shape::Square,
        Shape::Triangle,
        Shape::Sawtooth,
        Shape::Pulse,
        Shape::Constant,
        Shape::WhiteNoise,
        Shape::Lrs,
    ];

    /// Generator family backing this shape.
    pub fn family(self) -> Family {
        match self {
            Shape::Sine => Family::Sine,
            Shape::Square => Family::Square,
            Shape::Triangle => Family::Triangle,
            Shape::Sawtooth => Family::Sawtooth,
            Shape::Pulse => Family::Pulse,
            Shape::Constant => Family::Constant,
            Shape::WhiteNoise => Family::WhiteNoise,
            Shape::Lrs => Family::Lrs,
        }
    }

    pub fn name(self) -> &'static str {
        self.family().name()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Shape {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ConfigError::UnknownShape(s.to_owned());
        let family = Family::from_str(s).map_err(|_| unknown())?;
        Shape::ALL
            .into_iter()
            .find(|shape| shape.family() == family)
            .ok_or_else(unknown)
    }
}

/// Everything the production loop reads at the top of a tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Hz. Ignored by the non-periodic shapes.
    pub frequency: f64,
    pub sample_rate: f64,
    /// Amplitude, or standard deviation for white noise.
    pub magnitude: f64,
    pub shape: Shape,
    /// Samples per packet.
    pub transfer_length: usize,
    pub throttle: bool,
    pub stream_id: String,
    /// `CHAN_RF` keyword; -1 leaves it out.
    pub chan_rf: f64,
    /// `COL_RF` keyword; -1 leaves it out.
    pub col_rf: f64,
    pub sri_blocking: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            frequency: 1000.0,
            sample_rate: 5000.0,
            magnitude: 1.0,
            shape: Shape::Sine,
            transfer_length: 1000,
            throttle: true,
            stream_id: "SigGen Stream".to_string(),
            chan_rf: -1.0,
            col_rf: -1.0,
            sri_blocking: false,
        }
    }
}

impl SourceConfig {
    /// Reject values the production loop does not guard against.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ConfigError::Invalid {
                field: "sample_rate",
                reason: format!("must be a positive finite number, got {}", self.sample_rate),
            });
        }
        // subnormal rates pass the check above but have no finite sample period
        if !(1.0 / self.sample_rate).is_finite() {
            return Err(ConfigError::Invalid {
                field: "sample_rate",
                reason: format!("sample period of {} is not finite", self.sample_rate),
            });
        }
        if self.transfer_length == 0 {
            return Err(ConfigError::Invalid {
                field: "transfer_length",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.frequency.is_finite() {
            return Err(ConfigError::Invalid {
                field: "frequency",
                reason: format!("must be finite, got {}", self.frequency),
            });
        }
        if !self.magnitude.is_finite() {
            return Err(ConfigError::Invalid {
                field: "magnitude",
                reason: format!("must be finite, got {}", self.magnitude),
            });
        }
        Ok(())
    }
}

/// Handle shared between the producer and whoever reconfigures it.
#[derive(Clone, Debug, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<SourceConfig>>,
}

impl SharedConfig {
    /// Validate `config` and wrap it.
    pub fn new(config: SourceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(config)),
        })
    }

    /// Copy of the current configuration.
    pub fn snapshot(&self) -> SourceConfig {
        self.inner.read().clone()
    }

    /// Apply `f` to a copy, validate it, then publish it.
    ///
    /// On error nothing is published.
    pub fn update<F>(&self, f: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut SourceConfig),
    {
        let mut next = self.snapshot();
        f(&mut next);
        self.replace(next)
    }

    /// Validate and publish a whole configuration.
    pub fn replace(&self, config: SourceConfig) -> Result<(), ConfigError> {
        config.validate()?;
        *self.inner.write() = config;
        Ok(())
    }
}

/// Logging and reporting settings for the binaries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Period of the statistics report, 0 disables it.
    pub stats_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            stats_interval_ms: 1000,
        }
    }
}

/// Complete file configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigGenConfig {
    pub source: SourceConfig,
    pub telemetry: TelemetryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_component_properties() {
        let c = SourceConfig::default();
        assert_eq!(c.frequency, 1000.0);
        assert_eq!(c.sample_rate, 5000.0);
        assert_eq!(c.magnitude, 1.0);
        assert_eq!(c.shape, Shape::Sine);
        assert_eq!(c.transfer_length, 1000);
        assert!(c.throttle);
        assert_eq!(c.stream_id, "SigGen Stream");
        assert_eq!(c.chan_rf, -1.0);
        assert!(!c.sri_blocking);
        c.validate().unwrap();
    }

    #[test]
    fn shape_names() {
        for shape in Shape::ALL {
            assert_eq!(shape.name().parse::<Shape>().unwrap(), shape);
        }
        assert_eq!(" WhiteNoise ".parse::<Shape>().unwrap(), Shape::WhiteNoise);
        assert!(matches!("ramp".parse::<Shape>(), Err(ConfigError::UnknownShape(_))));
        assert!(matches!("chirp".parse::<Shape>(), Err(ConfigError::UnknownShape(_))));
    }

    #[test]
    fn validation_rejects_degenerate_values() {
        let bad = [
            SourceConfig { sample_rate: 0.0, ..SourceConfig::default() },
            SourceConfig { sample_rate: -10.0, ..SourceConfig::default() },
            SourceConfig { sample_rate: f64::NAN, ..SourceConfig::default() },
            SourceConfig { sample_rate: 1e-310, ..SourceConfig::default() },
            SourceConfig { transfer_length: 0, ..SourceConfig::default() },
            SourceConfig { frequency: f64::INFINITY, ..SourceConfig::default() },
            SourceConfig { magnitude: f64::NAN, ..SourceConfig::default() },
        ];
        for c in bad {
            assert!(matches!(c.validate(), Err(ConfigError::Invalid { .. })), "{c:?}");
        }
    }

    #[test]
    fn shared_update_publishes_only_valid_configs() {
        let shared = SharedConfig::default();
        shared.update(|c| c.frequency = 250.0).unwrap();
        assert_eq!(shared.snapshot().frequency, 250.0);

        let err = shared.update(|c| {
            c.frequency = 10.0;
            c.sample_rate = 0.0;
        });
        assert!(err.is_err());
        let snap = shared.snapshot();
        assert_eq!(snap.frequency, 250.0);
        assert_eq!(snap.sample_rate, 5000.0);
    }

    #[test]
    fn shared_new_validates() {
        let zero_rate = SourceConfig { sample_rate: 0.0, ..SourceConfig::default() };
        assert!(matches!(
            SharedConfig::new(zero_rate),
            Err(ConfigError::Invalid { field: "sample_rate", .. })
        ));
        let empty = SourceConfig { transfer_length: 0, ..SourceConfig::default() };
        assert!(matches!(
            SharedConfig::new(empty),
            Err(ConfigError::Invalid { field: "transfer_length", .. })
        ));
        let shared = SharedConfig::new(SourceConfig::default()).unwrap();
        assert_eq!(shared.snapshot(), SourceConfig::default());
    }

    #[test]
    fn subnormal_sample_rate_is_rejected_on_update() {
        let shared = SharedConfig::default();
        assert!(shared.update(|c| c.sample_rate = 1e-310).is_err());
        assert_eq!(shared.snapshot().sample_rate, 5000.0);
    }

    #[test]
    fn toml_round_trip_uses_lowercase_shapes() {
        let c: SigGenConfig = toml::from_str(
            r#"
[source]
shape = "whitenoise"
magnitude = 0.5

[telemetry]
log_level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(c.source.shape, Shape::WhiteNoise);
        assert_eq!(c.source.magnitude, 0.5);
        assert_eq!(c.source.transfer_length, 1000);
        assert_eq!(c.telemetry.log_level, "debug");
        assert_eq!(c.telemetry.stats_interval_ms, 1000);
    }
}
