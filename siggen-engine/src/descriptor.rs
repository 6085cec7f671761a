//! Stream descriptors (SRI) and the per-stream descriptor cache.
//!
//! A descriptor travels ahead of the samples it describes. The cache keeps one
//! descriptor per stream id and a dirty bit; the production loop pushes the
//! descriptor whenever the bit is set and clears it afterwards.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::Utc;

/// Lower edge of the band inside which a sample period counts as unchanged.
pub const XDELTA_LOWER: f64 = 0.999_999;
/// Upper edge of the same band.
pub const XDELTA_UPPER: f64 = 1.000_000_1;

/// Units of the x (or y) axis.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Units {
    #[default]
    None,
    Time,
    Delay,
    Frequency,
}

impl Units {
    /// Numeric code as carried on the wire.
    pub fn code(self) -> i16 {
        match self {
            Units::None => 0,
            Units::Time => 1,
            Units::Delay => 2,
            Units::Frequency => 3,
        }
    }
}

/// Value of an auxiliary descriptor keyword.
#[derive(Clone, Debug, PartialEq)]
pub enum KeywordValue {
    Double(f64),
    Long(i64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for KeywordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeywordValue::Double(v) => write!(f, "{v}"),
            KeywordValue::Long(v) => write!(f, "{v}"),
            KeywordValue::Bool(v) => write!(f, "{v}"),
            KeywordValue::Text(v) => f.write_str(v),
        }
    }
}

/// Metadata describing one data stream.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamDescriptor {
    pub hversion: i32,
    pub xstart: f64,
    /// Seconds between samples, `1 / sample_rate`.
    pub xdelta: f64,
    pub xunits: Units,
    /// 0 for one-dimensional streams.
    pub subsize: i32,
    pub ystart: f64,
    pub ydelta: f64,
    pub yunits: Units,
    /// 0 = scalar, 1 = complex.
    pub mode: u8,
    pub stream_id: String,
    pub blocking: bool,
    pub keywords: BTreeMap<String, KeywordValue>,
}

impl StreamDescriptor {
    /// Default descriptor for `stream_id`: scalar, unit sample period, time axis.
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            hversion: 1,
            xstart: 0.0,
            xdelta: 1.0,
            xunits: Units::Time,
            subsize: 0,
            ystart: 0.0,
            ydelta: 0.0,
            yunits: Units::None,
            mode: 0,
            stream_id: stream_id.into(),
            blocking: false,
            keywords: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_xdelta(mut self, xdelta: f64) -> Self {
        self.xdelta = xdelta;
        self
    }

    #[must_use]
    pub fn with_keyword(mut self, key: impl Into<String>, value: KeywordValue) -> Self {
        self.keywords.insert(key.into(), value);
        self
    }

    /// Same stream as `other` for re-announcement purposes.
    ///
    /// `xdelta` is compared through the tolerance band, everything else exactly.
    pub fn equivalent(&self, other: &StreamDescriptor) -> bool {
        self.stream_id == other.stream_id
            && xdelta_matches(self.xdelta, other.xdelta)
            && self.mode == other.mode
            && self.subsize == other.subsize
            && self.xunits == other.xunits
            && self.blocking == other.blocking
            && self.keywords == other.keywords
    }
}

/// True when `candidate` lies within the tolerance band around `cached`.
pub fn xdelta_matches(cached: f64, candidate: f64) -> bool {
    let (lo, hi) = if cached >= 0.0 {
        (cached * XDELTA_LOWER, cached * XDELTA_UPPER)
    } else {
        (cached * XDELTA_UPPER, cached * XDELTA_LOWER)
    };
    candidate >= lo && candidate <= hi
}

/// Wall-clock timestamp attached to each packet.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PrecisionUtcTime {
    /// Timecode mode, [`PrecisionUtcTime::TCM_CPU`] for host clock samples.
    pub tcmode: i16,
    /// 1 when valid.
    pub tcstatus: i16,
    pub toff: f64,
    /// Whole seconds since the Unix epoch.
    pub twsec: f64,
    /// Fractional seconds in `[0, 1)`.
    pub tfsec: f64,
}

impl PrecisionUtcTime {
    pub const TCM_CPU: i16 = 1;
    pub const TCS_VALID: i16 = 1;

    /// Sample the host wall clock. Not monotonic.
    #[allow(clippy::cast_precision_loss)]
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            tcmode: Self::TCM_CPU,
            tcstatus: Self::TCS_VALID,
            toff: 0.0,
            twsec: now.timestamp() as f64,
            tfsec: f64::from(now.timestamp_subsec_nanos()) / 1.0e9,
        }
    }

    pub fn seconds(&self) -> f64 {
        self.twsec + self.tfsec
    }
}

#[derive(Clone, Debug)]
struct Entry {
    descriptor: StreamDescriptor,
    dirty: bool,
}

/// One descriptor per stream id seen by a source.
///
/// Entries are created dirty and never removed.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    entries: HashMap<String, Entry>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached descriptor for `stream_id`, creating a default dirty one on a miss.
    pub fn get_or_create(&mut self, stream_id: &str) -> &StreamDescriptor {
        &self
            .entries
            .entry(stream_id.to_owned())
            .or_insert_with(|| Entry {
                descriptor: StreamDescriptor::new(stream_id),
                dirty: true,
            })
            .descriptor
    }

    pub fn get(&self, stream_id: &str) -> Option<&StreamDescriptor> {
        self.entries.get(stream_id).map(|e| &e.descriptor)
    }

    /// Replace the cached descriptor if `candidate` differs from it and flag it dirty.
    ///
    /// Returns true when the cache changed. A missing entry counts as a change.
    pub fn mark_dirty_if_changed(&mut self, stream_id: &str, candidate: StreamDescriptor) -> bool {
        match self.entries.get_mut(stream_id) {
            Some(entry) if entry.descriptor.equivalent(&candidate) => false,
            Some(entry) => {
                entry.descriptor = candidate;
                entry.dirty = true;
                true
            }
            None => {
                self.entries.insert(
                    stream_id.to_owned(),
                    Entry {
                        descriptor: candidate,
                        dirty: true,
                    },
                );
                true
            }
        }
    }

    /// Force a re-push of an existing entry.
    pub fn mark_dirty(&mut self, stream_id: &str) {
        if let Some(entry) = self.entries.get_mut(stream_id) {
            entry.dirty = true;
        }
    }

    pub fn is_dirty(&self, stream_id: &str) -> bool {
        self.entries.get(stream_id).is_some_and(|e| e.dirty)
    }

    pub fn clear_dirty(&mut self, stream_id: &str) {
        if let Some(entry) = self.entries.get_mut(stream_id) {
            entry.dirty = false;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
