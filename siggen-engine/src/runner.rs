//! Dedicated producer thread.
//!
//! [`SourceRunner`] moves a [`SignalSource`] onto a thread named
//! `siggen-producer` that ticks until stopped. Pacing waits on a
//! [`StopSignal`], so `stop()` returns within one wake-up instead of waiting
//! out a long throttle sleep. A tick that panics is logged, the loop backs
//! off briefly and carries on; only an explicit stop ends it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use crate::config::SharedConfig;
use crate::error::{panic_message, SourceError};
use crate::port::OutPort;
use crate::source::{SignalSource, TickReport};

/// Pause after a failed tick so a persistent fault does not spin a core.
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Interruptible stop flag.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        *self.stopped.lock() = true;
        self.cv.notify_all();
    }

    pub fn reset(&self) {
        *self.stopped.lock() = false;
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleep for up to `timeout`. Returns true if stopped.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            let _ = self.cv.wait_while_for(&mut stopped, |s| !*s, timeout);
        }
        *stopped
    }
}

enum Slot {
    Idle(Box<SignalSource>),
    Running(JoinHandle<SignalSource>),
    /// The source was lost to a panic or a failed spawn.
    Lost,
}

/// Start/stop control over a [`SignalSource`].
pub struct SourceRunner {
    config: SharedConfig,
    double_out: Arc<OutPort<f64>>,
    short_out: Arc<OutPort<i16>>,
    stop: Arc<StopSignal>,
    slot: Slot,
}

impl SourceRunner {
    pub fn new(source: SignalSource) -> Self {
        Self {
            config: source.config().clone(),
            double_out: source.double_out(),
            short_out: source.short_out(),
            stop: Arc::new(StopSignal::new()),
            slot: Slot::Idle(Box::new(source)),
        }
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn double_out(&self) -> Arc<OutPort<f64>> {
        Arc::clone(&self.double_out)
    }

    pub fn short_out(&self) -> Arc<OutPort<i16>> {
        Arc::clone(&self.short_out)
    }

    /// True while the producer thread is alive.
    pub fn is_running(&self) -> bool {
        matches!(&self.slot, Slot::Running(handle) if !handle.is_finished())
    }

    /// Spawn the producer thread.
    pub fn start(&mut self) -> Result<(), SourceError> {
        let source = match std::mem::replace(&mut self.slot, Slot::Lost) {
            Slot::Idle(source) => *source,
            Slot::Lost => SignalSource::with_ports(
                self.config.clone(),
                Arc::clone(&self.double_out),
                Arc::clone(&self.short_out),
            ),
            running @ Slot::Running(_) => {
                self.slot = running;
                return Err(SourceError::AlreadyRunning);
            }
        };

        self.stop.reset();
        let stop = Arc::clone(&self.stop);
        let spawned = thread::Builder::new()
            .name("siggen-producer".into())
            .spawn(move || {
                let mut source = source;
                run(&mut source, &stop);
                source
            });
        match spawned {
            Ok(handle) => {
                info!("producer started");
                self.slot = Slot::Running(handle);
                Ok(())
            }
            // the source went down with the closure; the slot stays Lost and
            // the next start rebuilds it on the same ports
            Err(e) => Err(SourceError::Spawn(e)),
        }
    }

    /// Signal the producer and wait for it to finish. No-op when idle.
    pub fn stop(&mut self) {
        self.stop.stop();
        match std::mem::replace(&mut self.slot, Slot::Lost) {
            Slot::Running(handle) => match handle.join() {
                Ok(source) => {
                    info!("producer stopped");
                    self.slot = Slot::Idle(Box::new(source));
                }
                Err(_) => warn!("producer thread panicked"),
            },
            other => self.slot = other,
        }
    }
}

impl Drop for SourceRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Tick until `stop` fires, then close the stream.
pub fn run(source: &mut SignalSource, stop: &StopSignal) {
    drive(|| source.tick(), stop);
    source.finish();
}

/// Call `tick` until `stop` fires, sleeping for the reported pacing.
///
/// Returns the number of ticks that panicked.
fn drive<F>(mut tick: F, stop: &StopSignal) -> usize
where
    F: FnMut() -> TickReport,
{
    let mut failures = 0;
    while !stop.is_stopped() {
        match panic::catch_unwind(AssertUnwindSafe(&mut tick)) {
            Ok(report) => {
                if let Some(pacing) = report.pacing {
                    if stop.wait(pacing) {
                        break;
                    }
                }
            }
            Err(payload) => {
                failures += 1;
                warn!(error = %panic_message(payload.as_ref()), failures, "tick panicked");
                if stop.wait(ERROR_BACKOFF) {
                    break;
                }
            }
        }
    }
    failures
}
