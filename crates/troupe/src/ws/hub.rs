//! Active connection tracking.
//!
//! Sessions share no mutable state with each other; the tracker only exists
//! so the status endpoint and logs can report how many connections are live.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Registry of live WebSocket connections.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    connections: DashMap<u64, ConnectionInfo>,
    next_id: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connected_at: DateTime<Utc>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection, returning its id.
    pub fn register(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.insert(
            id,
            ConnectionInfo {
                connected_at: Utc::now(),
            },
        );
        id
    }

    /// Remove a connection after its transport closes.
    pub fn unregister(&self, id: u64) {
        self.connections.remove(&id);
    }

    /// Number of currently active connections.
    pub fn active_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_unregister() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let a = tracker.register();
        let b = tracker.register();
        assert_ne!(a, b);
        assert_eq!(tracker.active_count(), 2);

        tracker.unregister(a);
        assert_eq!(tracker.active_count(), 1);

        // Unregistering twice is harmless.
        tracker.unregister(a);
        assert_eq!(tracker.active_count(), 1);

        tracker.unregister(b);
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let tracker = ConnectionTracker::new();
        let a = tracker.register();
        tracker.unregister(a);
        let b = tracker.register();
        assert_ne!(a, b);
    }
}
