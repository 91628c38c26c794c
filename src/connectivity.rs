//! Two-state reachability model with transition events.

use std::sync::atomic::{AtomicBool, Ordering};

use log::info;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BecameReachable,
    BecameUnreachable,
}

/// Process-wide connectivity state.
///
/// Platform code calls [`ConnectivityMonitor::report`] with every raw network
/// signal; subscribers only hear about actual changes.
pub struct ConnectivityMonitor {
    reachable: AtomicBool,
    events: broadcast::Sender<Transition>,
}

impl ConnectivityMonitor {
    pub fn new(reachable: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            reachable: AtomicBool::new(reachable),
            events,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Transition> {
        self.events.subscribe()
    }

    /// Records a network signal and returns the transition it caused, if any.
    pub fn report(&self, reachable: bool) -> Option<Transition> {
        if self.reachable.swap(reachable, Ordering::AcqRel) == reachable {
            return None;
        }
        let transition = if reachable {
            Transition::BecameReachable
        } else {
            Transition::BecameUnreachable
        };
        info!("Connectivity changed: {:?}", transition);
        // no subscribers is fine
        let _ = self.events.send(transition);
        Some(transition)
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}
