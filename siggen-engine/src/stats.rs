//! Per-connection delivery statistics over a fixed sliding window.
//!
//! Each successful packet push records `{elements, queue depth, time}` into a
//! ring of [`WINDOW`] entries. Rates are derived from the span between the
//! oldest recorded entry and "now".

use std::sync::OnceLock;
use std::time::Instant;

/// Number of pushes the window remembers.
pub const WINDOW: usize = 10;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct StatPoint {
    pub elements: usize,
    pub queue_depth: f64,
    /// Seconds on the statistics clock.
    pub secs: f64,
}

/// Snapshot reported for one connection.
#[derive(Clone, Debug, PartialEq)]
pub struct PortStatistics {
    pub connection_id: String,
    pub elements_per_second: f64,
    pub bits_per_second: f64,
    pub calls_per_second: f64,
    pub average_queue_depth: f64,
    pub time_since_last_call: f64,
    pub stream_ids: Vec<String>,
}

impl Default for PortStatistics {
    /// Values reported before anything has been pushed.
    fn default() -> Self {
        Self {
            connection_id: String::new(),
            elements_per_second: -1.0,
            bits_per_second: -1.0,
            calls_per_second: -1.0,
            average_queue_depth: -1.0,
            time_since_last_call: -1.0,
            stream_ids: Vec::new(),
        }
    }
}

/// Seconds since the first use of the statistics clock in this process.
pub fn clock_secs() -> f64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
}

/// Sliding window for one link.
#[derive(Clone, Debug)]
pub struct LinkStatistics {
    bit_size: f64,
    points: [StatPoint; WINDOW],
    next: usize,
    filled: usize,
    enabled: bool,
}

impl LinkStatistics {
    /// `bit_size` is the width of one element, e.g. 64 for `f64`.
    pub fn new(bit_size: f64) -> Self {
        Self {
            bit_size,
            points: [StatPoint::default(); WINDOW],
            next: 0,
            filled: 0,
            enabled: true,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Disabling freezes the window; it is not cleared.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn bit_size(&self) -> f64 {
        self.bit_size
    }

    /// Record one push. Entries are stamped with the monotonic process clock,
    /// not the packet's wall-clock timestamp.
    pub fn update(&mut self, elements: usize, queue_depth: f64) {
        self.update_at(elements, queue_depth, clock_secs());
    }

    /// Record one push at an explicit clock value. No-op while disabled.
    pub fn update_at(&mut self, elements: usize, queue_depth: f64, secs: f64) {
        if !self.enabled {
            return;
        }
        self.points[self.next] = StatPoint {
            elements,
            queue_depth,
            secs,
        };
        self.next = (self.next + 1) % WINDOW;
        self.filled = (self.filled + 1).min(WINDOW);
    }

    pub fn retrieve(&self) -> Option<PortStatistics> {
        self.retrieve_at(clock_secs())
    }

    /// Rates as of `now`. `None` while disabled.
    ///
    /// `connection_id` and `stream_ids` are left empty for the caller to fill.
    #[allow(clippy::cast_precision_loss)]
    pub fn retrieve_at(&self, now: f64) -> Option<PortStatistics> {
        if !self.enabled {
            return None;
        }
        let n = self.filled;
        if n == 0 {
            return Some(PortStatistics::default());
        }
        let oldest = if n < WINDOW { 0 } else { self.next };
        let newest = (self.next + WINDOW - 1) % WINDOW;

        let total_time = now - self.points[oldest].secs;
        let mut data = 0.0;
        let mut queue = 0.0;
        for k in 0..n {
            let p = &self.points[(oldest + k) % WINDOW];
            // the oldest entry opens the span; its payload was delivered before it
            if k > 0 {
                data += p.elements as f64;
            }
            queue += p.queue_depth;
        }

        let (eps, cps) = if total_time > 0.0 {
            (data / total_time, (n - 1) as f64 / total_time)
        } else {
            (0.0, 0.0)
        };
        Some(PortStatistics {
            elements_per_second: eps,
            bits_per_second: eps * self.bit_size,
            calls_per_second: cps,
            average_queue_depth: queue / n as f64,
            time_since_last_call: now - self.points[newest].secs,
            ..PortStatistics::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_reports_sentinels() {
        let s = LinkStatistics::new(64.0);
        let r = s.retrieve_at(5.0).unwrap();
        assert_eq!(r.elements_per_second, -1.0);
        assert_eq!(r.time_since_last_call, -1.0);
    }

    #[test]
    fn full_window_rates() {
        let mut s = LinkStatistics::new(64.0);
        // 15 pushes of 1000 elements, one per second; the window keeps the last 10
        for i in 0..15 {
            s.update_at(1000, 2.0, f64::from(i));
        }
        let r = s.retrieve_at(14.5).unwrap();
        // oldest kept entry is t=5, span 9.5 s, nine payloads after it
        assert!((r.elements_per_second - 9000.0 / 9.5).abs() < 1e-9);
        assert!((r.bits_per_second - 64.0 * 9000.0 / 9.5).abs() < 1e-6);
        assert!((r.calls_per_second - 9.0 / 9.5).abs() < 1e-9);
        assert!((r.average_queue_depth - 2.0).abs() < 1e-12);
        assert!((r.time_since_last_call - 0.5).abs() < 1e-12);
    }

    #[test]
    fn partial_window_uses_filled_entries() {
        let mut s = LinkStatistics::new(16.0);
        s.update_at(100, 0.0, 1.0);
        s.update_at(100, 4.0, 2.0);
        s.update_at(100, 8.0, 3.0);
        let r = s.retrieve_at(3.0).unwrap();
        assert!((r.elements_per_second - 100.0).abs() < 1e-12);
        assert!((r.calls_per_second - 1.0).abs() < 1e-12);
        assert!((r.average_queue_depth - 4.0).abs() < 1e-12);
        assert_eq!(r.time_since_last_call, 0.0);
    }

    #[test]
    fn zero_span_gives_zero_rates() {
        let mut s = LinkStatistics::new(64.0);
        s.update_at(10, 0.0, 7.0);
        let r = s.retrieve_at(7.0).unwrap();
        assert_eq!(r.elements_per_second, 0.0);
        assert_eq!(r.calls_per_second, 0.0);
    }

    #[test]
    fn disabled_window_is_frozen() {
        let mut s = LinkStatistics::new(64.0);
        s.update_at(10, 0.0, 1.0);
        s.set_enabled(false);
        assert!(s.retrieve_at(2.0).is_none());
        s.update_at(10, 0.0, 2.0);
        s.set_enabled(true);
        let r = s.retrieve_at(3.0).unwrap();
        // only the first push was recorded
        assert_eq!(r.time_since_last_call, 2.0);
    }

    #[test]
    fn clock_is_monotonic() {
        let a = clock_secs();
        let b = clock_secs();
        assert!(b >= a);
    }
}
