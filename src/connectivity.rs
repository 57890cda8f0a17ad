//! Connectivity state machine
//!
//! Two states, one interesting transition. The monitor is written only by the
//! connectivity observer callback and read by everything else; queue draining
//! fires on the `Unreachable -> Reachable` edge and on nothing else, so a
//! repeated "reachable" event can never re-trigger a drain.

use std::sync::atomic::{AtomicBool, Ordering};

/// Result of feeding an observer event into the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No state change
    None,
    /// Unreachable -> Reachable: queued requests should be drained
    CameOnline,
    /// Reachable -> Unreachable
    WentOffline,
}

/// Process-wide reachability state
///
/// Starts reachable: until the observer says otherwise, requests are
/// attempted rather than failed preemptively.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    reachable: AtomicBool,
}

impl ConnectivityMonitor {
    /// Create a monitor in the reachable state
    pub fn new() -> Self {
        Self { reachable: AtomicBool::new(true) }
    }

    /// Current reachability
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Feed an observer event, returning the transition it caused
    pub fn update(&self, reachable: bool) -> Transition {
        let was_reachable = self.reachable.swap(reachable, Ordering::SeqCst);
        match (was_reachable, reachable) {
            (false, true) => Transition::CameOnline,
            (true, false) => Transition::WentOffline,
            _ => Transition::None,
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}
