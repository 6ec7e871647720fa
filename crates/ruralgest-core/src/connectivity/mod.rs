//! Network reachability tracking.
//!
//! The monitor does not probe anything itself: a platform integration reports
//! reachability through [`ConnectivityMonitor::set_online`], and the monitor
//! turns those reports into edge-triggered transitions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::watch;

/// Read-only view of reachability used by the sync engine and scheduler
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// A definite change in reachability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Online,
    Offline,
}

impl Transition {
    const fn from_state(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

type Handler = Arc<dyn Fn(Transition) + Send + Sync>;

struct MonitorInner {
    state: watch::Sender<bool>,
    handlers: Mutex<Vec<(u64, Handler)>>,
    next_id: AtomicU64,
}

/// Cloneable reachability monitor
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("online", &self.is_online())
            .finish_non_exhaustive()
    }
}

impl ConnectivityMonitor {
    /// Create a monitor seeded with the platform's current reachability.
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self {
            inner: Arc::new(MonitorInner {
                state,
                handlers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Report the platform's reachability.
    ///
    /// Returns the transition when the state actually changed. Repeated
    /// reports of the same state notify nobody.
    pub fn set_online(&self, online: bool) -> Option<Transition> {
        let changed = self.inner.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if !changed {
            return None;
        }

        let transition = Transition::from_state(online);
        tracing::info!("Connectivity changed: {:?}", transition);

        // Snapshot so handlers may subscribe or unsubscribe while being called.
        let handlers = self
            .inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect::<Vec<_>>();
        for handler in handlers {
            handler(transition);
        }

        Some(transition)
    }

    /// Register a callback invoked once per transition edge.
    ///
    /// The callback stays registered until the returned [`Subscription`] is
    /// unsubscribed or dropped.
    #[must_use = "dropping the subscription unsubscribes the handler"]
    pub fn on_transition<F>(&self, handler: F) -> Subscription
    where
        F: Fn(Transition) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));

        Subscription {
            id,
            monitor: Arc::downgrade(&self.inner),
        }
    }

    /// Async view of the reachability state; `changed()` resolves on edges only.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.inner.state.subscribe()
    }
}

impl Connectivity for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.inner.state.borrow()
    }
}

/// Handle returned by [`ConnectivityMonitor::on_transition`]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    monitor: Weak<MonitorInner>,
}

impl Subscription {
    /// Detach the handler.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.monitor.upgrade() {
            inner
                .handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn recorder() -> (Arc<Mutex<Vec<Transition>>>, impl Fn(Transition) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |transition| sink.lock().unwrap().push(transition))
    }

    #[test]
    fn reports_initial_state() {
        assert!(ConnectivityMonitor::new(true).is_online());
        assert!(!ConnectivityMonitor::new(false).is_online());
    }

    #[test]
    fn handlers_fire_once_per_edge() {
        let monitor = ConnectivityMonitor::new(true);
        let (seen, handler) = recorder();
        let _subscription = monitor.on_transition(handler);

        assert_eq!(monitor.set_online(true), None);
        assert_eq!(monitor.set_online(false), Some(Transition::Offline));
        assert_eq!(monitor.set_online(false), None);
        assert_eq!(monitor.set_online(true), Some(Transition::Online));
        assert_eq!(monitor.set_online(true), None);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Transition::Offline, Transition::Online]
        );
    }

    #[test]
    fn unsubscribe_detaches_handler() {
        let monitor = ConnectivityMonitor::new(true);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subscription = monitor.on_transition(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        monitor.set_online(false);
        subscription.unsubscribe();
        monitor.set_online(true);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_detaches_only_that_handler() {
        let monitor = ConnectivityMonitor::new(false);
        let (kept, kept_handler) = recorder();
        let (dropped, dropped_handler) = recorder();
        let _kept = monitor.on_transition(kept_handler);
        drop(monitor.on_transition(dropped_handler));

        monitor.set_online(true);

        assert_eq!(*kept.lock().unwrap(), vec![Transition::Online]);
        assert!(dropped.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn watch_resolves_on_edges() {
        let monitor = ConnectivityMonitor::new(false);
        let mut receiver = monitor.watch();

        monitor.set_online(false);
        assert!(!receiver.has_changed().unwrap());

        monitor.set_online(true);
        receiver.changed().await.unwrap();
        assert!(*receiver.borrow_and_update());
    }
}
