//! Last-call-wins coalescing of rapid repeated calls to the same key.

use super::{Dispatch, RequestOptions};
use crate::error::Error;
use crate::types::RequestKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Outcome handed to every coalesced caller
pub(crate) type SharedOutcome = std::result::Result<Dispatch, Arc<Error>>;

struct DebounceSlot {
    generation: u64,
    options: RequestOptions,
    waiters: Vec<oneshot::Sender<SharedOutcome>>,
}

/// Pending debounced calls, one slot per key
#[derive(Default)]
pub(crate) struct Debouncer {
    slots: Mutex<HashMap<RequestKey, DebounceSlot>>,
}

impl Debouncer {
    /// Add a caller to the slot of `key`, replacing the options to send.
    ///
    /// Returns the generation the caller's timer must still see when it fires
    /// for it to be the one that executes.
    pub(crate) fn register(
        &self,
        key: &RequestKey,
        options: RequestOptions,
        waiter: oneshot::Sender<SharedOutcome>,
    ) -> u64 {
        let mut slots = self.slots.lock();
        let slot = slots.entry(key.clone()).or_insert_with(|| DebounceSlot {
            generation: 0,
            options: RequestOptions::default(),
            waiters: Vec::new(),
        });
        slot.generation += 1;
        slot.options = options;
        slot.waiters.push(waiter);
        slot.generation
    }

    /// Take the slot if no later call reset the timer
    pub(crate) fn take_if_current(
        &self,
        key: &RequestKey,
        generation: u64,
    ) -> Option<(RequestOptions, Vec<oneshot::Sender<SharedOutcome>>)> {
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|s| s.generation == generation) {
            slots.remove(key).map(|s| (s.options, s.waiters))
        } else {
            None
        }
    }

    /// Number of callers waiting on `key`
    #[cfg(test)]
    pub(crate) fn waiting(&self, key: &RequestKey) -> usize {
        self.slots.lock().get(key).map_or(0, |s| s.waiters.len())
    }
}
