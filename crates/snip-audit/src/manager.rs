use crate::event::AuditEvent;
use crate::observer::Observer;
use parking_lot::{Mutex, RwLock};
use std::fmt::{Debug, Display};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// How long [`AuditManager::close`] waits for in-flight deliveries.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle returned by [`AuditManager::register`], used to remove an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Fans audit events out to registered observers.
///
/// Each [`notify`](AuditManager::notify) snapshots the observer list and
/// spawns one delivery task per observer, so a slow or failing sink never
/// blocks the caller or the other sinks. Delivery errors are logged and
/// dropped.
pub struct AuditManager {
    observers: RwLock<Vec<(ObserverId, Arc<dyn Observer>)>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    in_flight: Mutex<JoinSet<()>>,
    drain_timeout: Duration,
}

impl AuditManager {
    pub fn new() -> Self {
        Self::with_drain_timeout(DEFAULT_DRAIN_TIMEOUT)
    }

    pub fn with_drain_timeout(drain_timeout: Duration) -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            in_flight: Mutex::new(JoinSet::new()),
            drain_timeout,
        }
    }

    pub fn register(&self, observer: Arc<dyn Observer>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(%id, observer = observer.name(), "audit observer registered");
        self.observers.write().push((id, observer));
        id
    }

    /// Removes an observer, returning whether it was registered. Deliveries
    /// already spawned still run.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Schedules delivery of `event` to every registered observer and returns
    /// immediately.
    ///
    /// Events are dropped when the manager is closed, when no observer is
    /// registered, or when called outside a Tokio runtime.
    pub fn notify(&self, event: AuditEvent) {
        let mut in_flight = self.in_flight.lock();
        if self.is_closed() {
            debug!(action = %event.action, "audit manager closed, event dropped");
            return;
        }

        let observers: Vec<Arc<dyn Observer>> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        if observers.is_empty() {
            return;
        }

        let Ok(handle) = Handle::try_current() else {
            warn!(action = %event.action, "no async runtime, audit event dropped");
            return;
        };

        // reap finished deliveries so the set does not grow unbounded
        while in_flight.try_join_next().is_some() {}

        let event = Arc::new(event);
        for observer in observers {
            let event = Arc::clone(&event);
            in_flight.spawn_on(deliver(observer, event), &handle);
        }
    }

    /// Stops accepting events, waits up to the drain timeout for in-flight
    /// deliveries, then closes every observer.
    ///
    /// Deliveries still running after the timeout are aborted. Calling close
    /// more than once is harmless.
    pub async fn close(&self) {
        let mut pending = {
            let mut in_flight = self.in_flight.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *in_flight)
        };

        let drained = tokio::time::timeout(self.drain_timeout, async {
            while pending.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = pending.len(),
                timeout_ms = self.drain_timeout.as_millis() as u64,
                "audit drain timed out, aborting deliveries"
            );
            pending.shutdown().await;
        }

        let observers = std::mem::take(&mut *self.observers.write());
        for (id, observer) in observers {
            if let Err(err) = observer.close().await {
                warn!(%id, observer = observer.name(), error = %err, "failed to close audit observer");
            }
        }
    }
}

impl Default for AuditManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for AuditManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditManager")
            .field("observers", &self.observer_count())
            .field("closed", &self.is_closed())
            .field("drain_timeout", &self.drain_timeout)
            .finish()
    }
}

async fn deliver(observer: Arc<dyn Observer>, event: Arc<AuditEvent>) {
    if let Err(err) = observer.notify(&event).await {
        warn!(
            observer = observer.name(),
            action = %event.action,
            error = %err,
            "audit delivery failed"
        );
    }
}
