//! Subscribers the CLI can attach to a source.

use siggen_engine::{PrecisionUtcTime, PushSink, StreamDescriptor, TransportError};
use tracing::{debug, info};

/// Peak and RMS of one packet.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PacketSummary {
    pub len: usize,
    pub min: f64,
    pub max: f64,
    pub rms: f64,
}

impl PacketSummary {
    #[allow(clippy::cast_precision_loss)]
    pub fn of(data: &[f64]) -> Self {
        if data.is_empty() {
            return Self::default();
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sq = 0.0;
        for &v in data {
            min = min.min(v);
            max = max.max(v);
            sq += v * v;
        }
        Self {
            len: data.len(),
            min,
            max,
            rms: (sq / data.len() as f64).sqrt(),
        }
    }
}

/// Logs every descriptor and a one-line summary of every packet.
#[derive(Debug, Default)]
pub struct LogSink;

impl PushSink<f64> for LogSink {
    fn push_descriptor(&self, d: &StreamDescriptor) -> Result<(), TransportError> {
        let keywords: Vec<String> = d.keywords.iter().map(|(k, v)| format!("{k}={v}")).collect();
        info!(
            stream = %d.stream_id,
            xdelta = d.xdelta,
            mode = d.mode,
            blocking = d.blocking,
            keywords = %keywords.join(","),
            "descriptor"
        );
        Ok(())
    }

    fn push_packet(
        &self,
        data: &[f64],
        time: &PrecisionUtcTime,
        eos: bool,
        stream_id: &str,
    ) -> Result<(), TransportError> {
        if eos {
            info!(stream = stream_id, "end of stream");
            return Ok(());
        }
        let s = PacketSummary::of(data);
        debug!(
            stream = stream_id,
            t = time.seconds(),
            len = s.len,
            min = s.min,
            max = s.max,
            rms = s.rms,
            "packet"
        );
        Ok(())
    }
}
