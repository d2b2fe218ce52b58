//! Per-executor bookkeeping of in-flight and recently issued requests.

use crate::types::RequestKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Result of asking whether a fresh call may go out
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed; the key is now marked in flight
    Admitted,
    /// An identical call was issued within the throttle window
    Throttled,
    /// An identical call is still in flight
    InFlight,
}

#[derive(Clone, Copy, Debug)]
struct PendingEntry {
    in_flight: bool,
    last_issued: Instant,
}

/// Mapping from request key to its in-flight marker and last issue time
///
/// Owned by one executor; there is no process-wide instance.
#[derive(Debug, Default)]
pub struct PendingRequestSet {
    entries: HashMap<RequestKey, PendingEntry>,
}

impl PendingRequestSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a fresh call for `key` may be issued at `now`.
    ///
    /// The throttle check runs before the in-flight check. Admission marks the
    /// key in flight and records `now` as its last issue time. Idle entries
    /// older than the window are pruned on the way.
    pub fn admit(&mut self, key: &RequestKey, now: Instant, window: Duration) -> Admission {
        self.entries
            .retain(|_, e| e.in_flight || now.saturating_duration_since(e.last_issued) < window);

        if let Some(entry) = self.entries.get(key) {
            if now.saturating_duration_since(entry.last_issued) < window {
                return Admission::Throttled;
            }
            if entry.in_flight {
                return Admission::InFlight;
            }
        }

        self.entries.insert(
            key.clone(),
            PendingEntry {
                in_flight: true,
                last_issued: now,
            },
        );
        Admission::Admitted
    }

    /// Clear the in-flight marker of `key`, keeping its issue time for throttling
    pub fn complete(&mut self, key: &RequestKey) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.in_flight = false;
        }
    }

    /// Whether `key` is currently in flight
    pub fn is_in_flight(&self, key: &RequestKey) -> bool {
        self.entries.get(key).is_some_and(|e| e.in_flight)
    }

    /// When `key` was last admitted, if it is still tracked
    pub fn last_issued(&self, key: &RequestKey) -> Option<Instant> {
        self.entries.get(key).map(|e| e.last_issued)
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No tracked keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Clears the in-flight marker when dropped, including on error, panic or
/// cancellation of the owning future.
pub(crate) struct PendingGuard {
    set: Arc<Mutex<PendingRequestSet>>,
    key: RequestKey,
}

impl PendingGuard {
    pub(crate) fn new(set: Arc<Mutex<PendingRequestSet>>, key: RequestKey) -> Self {
        Self { set, key }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.set.lock().complete(&self.key);
    }
}
