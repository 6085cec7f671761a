//! Output port: subscriber registry and best-effort fan-out.
//!
//! An [`OutPort`] holds weak references to [`PushSink`]s keyed by connection
//! id. Every push walks the registry under one lock, delivers to each enabled
//! subscriber, logs failures and moves on. The port never owns a subscriber;
//! a sink that has been dropped shows up as [`TransportError::Dropped`] until
//! it is explicitly disconnected.
//!
//! A sink that panics is treated like one that returned an error: the panic is
//! caught, logged as [`TransportError::Panicked`] and the fan-out continues.
//! Builds with `panic = "abort"` cannot unwind, so there a panicking sink still
//! takes the process down.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use siggen_core::sample::Sample;
use tracing::{debug, info, trace, warn};

use crate::descriptor::{PrecisionUtcTime, StreamDescriptor};
use crate::error::{panic_message, PortError, TransportError};
use crate::stats::{LinkStatistics, PortStatistics};

/// Push capability supplied by a downstream consumer.
///
/// Both calls are synchronous; a slow sink stalls the whole fan-out.
pub trait PushSink<T>: Send + Sync {
    fn push_descriptor(&self, descriptor: &StreamDescriptor) -> Result<(), TransportError>;

    fn push_packet(
        &self,
        data: &[T],
        time: &PrecisionUtcTime,
        eos: bool,
        stream_id: &str,
    ) -> Result<(), TransportError>;

    /// Queue depth hint recorded with each statistics entry.
    fn queue_depth(&self) -> f64 {
        0.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PortActivity {
    Idle,
    Active,
}

struct Subscriber<T> {
    sink: Weak<dyn PushSink<T>>,
    enabled: bool,
    stats: LinkStatistics,
    /// Streams open on this connection (packet seen, no EOS yet).
    active: BTreeSet<String>,
    /// Streams whose descriptor this connection has received.
    announced: HashSet<String>,
}

impl<T: Sample> Subscriber<T> {
    fn deliver<F>(&self, id: &str, op: &str, f: F) -> bool
    where
        F: FnOnce(&dyn PushSink<T>) -> Result<(), TransportError>,
    {
        let result = match self.sink.upgrade() {
            Some(sink) => panic::catch_unwind(AssertUnwindSafe(|| f(sink.as_ref())))
                .unwrap_or_else(|payload| Err(TransportError::Panicked(panic_message(payload.as_ref())))),
            None => Err(TransportError::Dropped),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(connection = id, op, error = %e, "push failed");
                false
            }
        }
    }
}

struct Registry<T> {
    subscribers: BTreeMap<String, Subscriber<T>>,
    /// Set on connect; the next packet push announces descriptors to newcomers.
    refresh: bool,
    /// Last descriptor pushed through this port, per stream id.
    current: HashMap<String, StreamDescriptor>,
}

/// Fan-out port for samples of type `T`.
pub struct OutPort<T> {
    name: String,
    registry: Mutex<Registry<T>>,
}

impl<T: Sample> OutPort<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: Mutex::new(Registry {
                subscribers: BTreeMap::new(),
                refresh: false,
                current: HashMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Registry<T>> {
        self.registry.lock()
    }

    /// Register `sink` under `connection_id`. The port keeps only a weak reference.
    pub fn connect<S>(&self, connection_id: impl Into<String>, sink: &Arc<S>) -> Result<(), PortError>
    where
        S: PushSink<T> + 'static,
    {
        let id = connection_id.into();
        let mut reg = self.lock();
        if reg.subscribers.contains_key(&id) {
            return Err(PortError::AlreadyConnected(id));
        }
        let weak: Weak<dyn PushSink<T>> = Arc::downgrade(sink) as Weak<dyn PushSink<T>>;
        reg.subscribers.insert(
            id.clone(),
            Subscriber {
                sink: weak,
                enabled: true,
                stats: LinkStatistics::new(T::bits()),
                active: BTreeSet::new(),
                announced: HashSet::new(),
            },
        );
        reg.refresh = true;
        info!(port = %self.name, connection = %id, subscribers = reg.subscribers.len(), "connected");
        Ok(())
    }

    /// Remove a connection. Unknown ids are ignored.
    pub fn disconnect(&self, connection_id: &str) {
        let mut reg = self.lock();
        if reg.subscribers.remove(connection_id).is_some() {
            info!(port = %self.name, connection = connection_id, subscribers = reg.subscribers.len(), "disconnected");
        }
    }

    pub fn is_active(&self) -> bool {
        !self.lock().subscribers.is_empty()
    }

    pub fn state(&self) -> PortActivity {
        if self.is_active() {
            PortActivity::Active
        } else {
            PortActivity::Idle
        }
    }

    pub fn connections(&self) -> Vec<String> {
        self.lock().subscribers.keys().cloned().collect()
    }

    /// Descriptors pushed through this port for streams still open.
    pub fn active_descriptors(&self) -> Vec<StreamDescriptor> {
        let mut out: Vec<_> = self.lock().current.values().cloned().collect();
        out.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        out
    }

    /// True when some enabled connection has not yet received a descriptor for `stream_id`.
    pub fn needs_descriptor(&self, stream_id: &str) -> bool {
        self.lock()
            .subscribers
            .values()
            .any(|s| s.enabled && !s.announced.contains(stream_id))
    }

    /// Deliver `descriptor` to every enabled connection.
    pub fn push_descriptor(&self, descriptor: &StreamDescriptor) {
        let mut reg = self.lock();
        reg.current
            .insert(descriptor.stream_id.clone(), descriptor.clone());
        debug!(port = %self.name, stream = %descriptor.stream_id, xdelta = descriptor.xdelta, "push descriptor");
        for (id, sub) in reg.subscribers.iter_mut() {
            Self::announce_one(id, sub, descriptor);
        }
    }

    /// Deliver `descriptor` only to connections that have not seen its stream id.
    ///
    /// Returns how many connections received it.
    pub fn announce(&self, descriptor: &StreamDescriptor) -> usize {
        let mut reg = self.lock();
        reg.current
            .insert(descriptor.stream_id.clone(), descriptor.clone());
        Self::announce_missing(&self.name, &mut reg, descriptor)
    }

    fn announce_missing(name: &str, reg: &mut Registry<T>, descriptor: &StreamDescriptor) -> usize {
        let mut delivered = 0;
        for (id, sub) in reg.subscribers.iter_mut() {
            if !sub.announced.contains(&descriptor.stream_id) && Self::announce_one(id, sub, descriptor) {
                delivered += 1;
            }
        }
        if delivered > 0 {
            debug!(port = name, stream = %descriptor.stream_id, delivered, "announced descriptor");
        }
        delivered
    }

    fn announce_one(id: &str, sub: &mut Subscriber<T>, descriptor: &StreamDescriptor) -> bool {
        if !sub.enabled {
            return false;
        }
        let ok = sub.deliver(id, "descriptor", |s| s.push_descriptor(descriptor));
        if ok {
            sub.announced.insert(descriptor.stream_id.clone());
        }
        ok
    }

    /// Deliver one packet to every enabled connection.
    ///
    /// After a new connection, a stream with no descriptor on this port gets
    /// a default one pushed first.
    pub fn push_packet(&self, data: &[T], time: &PrecisionUtcTime, eos: bool, stream_id: &str) {
        let mut reg = self.lock();
        if reg.refresh {
            let descriptor = reg
                .current
                .entry(stream_id.to_owned())
                .or_insert_with(|| StreamDescriptor::new(stream_id))
                .clone();
            Self::announce_missing(&self.name, &mut reg, &descriptor);
            reg.refresh = false;
        }

        trace!(port = %self.name, stream = stream_id, len = data.len(), eos, "push packet");
        for (id, sub) in reg.subscribers.iter_mut() {
            if !sub.enabled {
                continue;
            }
            if !sub.deliver(id, "packet", |s| s.push_packet(data, time, eos, stream_id)) {
                continue;
            }
            let depth = sub
                .sink
                .upgrade()
                .map_or(0.0, |s| panic::catch_unwind(AssertUnwindSafe(|| s.queue_depth())).unwrap_or(0.0));
            sub.stats.update(data.len(), depth);
            if eos {
                sub.active.remove(stream_id);
                sub.announced.remove(stream_id);
            } else if !sub.active.contains(stream_id) {
                sub.active.insert(stream_id.to_owned());
            }
        }
        if eos {
            reg.current.remove(stream_id);
        }
    }

    /// Statistics for one connection.
    pub fn statistics_snapshot(&self, connection_id: &str) -> Result<PortStatistics, PortError> {
        let reg = self.lock();
        let sub = reg
            .subscribers
            .get(connection_id)
            .ok_or_else(|| PortError::UnknownConnection(connection_id.to_owned()))?;
        let mut stats = sub
            .stats
            .retrieve()
            .ok_or_else(|| PortError::StatisticsDisabled(connection_id.to_owned()))?;
        stats.connection_id = connection_id.to_owned();
        stats.stream_ids = sub.active.iter().cloned().collect();
        Ok(stats)
    }

    /// Statistics for every connection with monitoring enabled.
    pub fn statistics(&self) -> Vec<PortStatistics> {
        let reg = self.lock();
        reg.subscribers
            .iter()
            .filter_map(|(id, sub)| {
                let mut stats = sub.stats.retrieve()?;
                stats.connection_id.clone_from(id);
                stats.stream_ids = sub.active.iter().cloned().collect();
                Some(stats)
            })
            .collect()
    }

    /// Turn statistics collection on or off for every connection.
    pub fn enable_stats(&self, enabled: bool) {
        for sub in self.lock().subscribers.values_mut() {
            sub.stats.set_enabled(enabled);
        }
    }

    pub fn set_monitoring(&self, connection_id: &str, enabled: bool) -> Result<(), PortError> {
        let mut reg = self.lock();
        let sub = reg
            .subscribers
            .get_mut(connection_id)
            .ok_or_else(|| PortError::UnknownConnection(connection_id.to_owned()))?;
        sub.stats.set_enabled(enabled);
        Ok(())
    }

    /// A disabled connection stays registered but receives nothing.
    pub fn set_enabled(&self, connection_id: &str, enabled: bool) -> Result<(), PortError> {
        let mut reg = self.lock();
        let sub = reg
            .subscribers
            .get_mut(connection_id)
            .ok_or_else(|| PortError::UnknownConnection(connection_id.to_owned()))?;
        sub.enabled = enabled;
        Ok(())
    }
}
