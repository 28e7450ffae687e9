/// Periodic server monitoring
///
/// A background task polls a `SnapshotSource` on a fixed interval and
/// publishes each snapshot to subscribers. The wait between polls is the only
/// place the task observes cancellation; an in-flight collection is allowed
/// to finish, but its result is dropped if `stop` was called meanwhile.

use crate::core::ServerSnapshot;
use crate::error::MiradorResult;
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

pub const DEFAULT_INTERVAL_MS: u64 = 2000;

const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;

/// Anything able to produce server snapshots
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn snapshot(&self) -> MiradorResult<ServerSnapshot>;
}

/// Monitoring state as seen by observers
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorStatus {
    Stopped,
    Running,
    /// The loop ended on its own because the source failed
    Failed { reason: String },
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Stopped => write!(f, "Monitoring stopped"),
            MonitorStatus::Running => write!(f, "Monitoring"),
            MonitorStatus::Failed { reason } => {
                write!(f, "Monitoring stopped due to error: {}", reason)
            }
        }
    }
}

impl MonitorStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, MonitorStatus::Running)
    }
}

struct LoopState {
    /// Bumped on every start/stop; a task only publishes for its own run
    generation: u64,
    /// Present exactly while a loop is running
    cancel: Option<watch::Sender<bool>>,
}

struct Inner {
    source: Arc<dyn SnapshotSource>,
    interval: Duration,
    state: Mutex<LoopState>,
    snapshots: broadcast::Sender<ServerSnapshot>,
    status: watch::Sender<MonitorStatus>,
    latest: RwLock<Option<ServerSnapshot>>,
}

impl Inner {
    /// Publish for run `generation`; `false` once that run is over
    fn publish(&self, generation: u64, snapshot: ServerSnapshot) -> bool {
        let state = self.state.lock();
        if state.generation != generation || state.cancel.is_none() {
            return false;
        }

        *self.latest.write() = Some(snapshot.clone());
        // no subscribers is fine
        let _ = self.snapshots.send(snapshot);
        true
    }

    fn fail(&self, generation: u64, reason: String) {
        let mut state = self.state.lock();
        if state.generation != generation || state.cancel.is_none() {
            return;
        }

        state.cancel = None;
        state.generation += 1;
        warn!("Monitoring stopped due to error: {}", reason);
        self.status.send_replace(MonitorStatus::Failed { reason });
    }
}

pub struct MonitoringLoop {
    inner: Arc<Inner>,
}

impl MonitoringLoop {
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self::with_interval(source, Duration::from_millis(DEFAULT_INTERVAL_MS))
    }

    pub fn with_interval(source: Arc<dyn SnapshotSource>, interval: Duration) -> Self {
        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let (status, _) = watch::channel(MonitorStatus::Stopped);

        Self {
            inner: Arc::new(Inner {
                source,
                interval,
                state: Mutex::new(LoopState {
                    generation: 0,
                    cancel: None,
                }),
                snapshots,
                status,
                latest: RwLock::new(None),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Start polling. Returns `false` if a loop is already running or there
    /// is no tokio runtime to run it on.
    pub fn start(&self) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Cannot start monitoring outside a tokio runtime");
            return false;
        };

        let mut state = self.inner.state.lock();
        if state.cancel.is_some() {
            debug!("Monitoring already running");
            return false;
        }

        state.generation += 1;
        let generation = state.generation;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        state.cancel = Some(cancel_tx);
        self.inner.status.send_replace(MonitorStatus::Running);
        drop(state);

        info!(
            "Monitoring started (every {} ms)",
            self.inner.interval.as_millis()
        );
        runtime.spawn(run_loop(self.inner.clone(), generation, cancel_rx));
        true
    }

    /// Stop polling. Idempotent; once this returns no further snapshot is
    /// published.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        let Some(cancel) = state.cancel.take() else {
            return;
        };

        state.generation += 1;
        let _ = cancel.send(true);
        self.inner.status.send_replace(MonitorStatus::Stopped);
        info!("Monitoring stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().cancel.is_some()
    }

    pub fn status(&self) -> MonitorStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<MonitorStatus> {
        self.inner.status.subscribe()
    }

    /// Receive every snapshot published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ServerSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Most recently published snapshot
    pub fn latest(&self) -> Option<ServerSnapshot> {
        self.inner.latest.read().clone()
    }
}

impl Drop for MonitoringLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(inner: Arc<Inner>, generation: u64, mut cancel: watch::Receiver<bool>) {
    loop {
        match AssertUnwindSafe(inner.source.snapshot()).catch_unwind().await {
            Ok(Ok(snapshot)) => {
                if !inner.publish(generation, snapshot) {
                    break;
                }
            }
            Ok(Err(e)) => {
                inner.fail(generation, e.to_string());
                break;
            }
            Err(panic) => {
                let reason = format!("snapshot source panicked: {}", panic_message(panic.as_ref()));
                inner.fail(generation, reason);
                break;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(inner.interval) => {}
            _ = cancel.changed() => {
                debug!("Monitoring loop cancelled");
                break;
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
