//! Processed-event guard: the fast path for exact webhook replays.
//!
//! The provider redelivers an event until it sees a 2xx, so the same
//! `ProviderEventId` can arrive many times. The guard remembers recently
//! processed ids in a bounded LRU-style cache so memory stays predictable
//! in long-running nodes.
//!
//! Correctness never depends on the guard: an evicted id is simply
//! reprocessed, and every ledger transition is idempotent.

use std::collections::{HashSet, VecDeque};

use dealdesk_types::ProviderEventId;

/// Bounded set of processed event ids with oldest-first eviction.
#[derive(Debug)]
pub struct IdempotencyGuard {
    /// Ids already processed.
    processed: HashSet<ProviderEventId>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<ProviderEventId>,
    /// Maximum number of entries before eviction kicks in.
    max_size: usize,
}

impl IdempotencyGuard {
    /// Create a guard holding at most `max_size` ids (at least one).
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            processed: HashSet::with_capacity(max_size),
            order: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Record `event_id` as processed. Returns `false` if it already was.
    pub fn record(&mut self, event_id: ProviderEventId) -> bool {
        if self.processed.contains(&event_id) {
            return false;
        }

        // Evict oldest if at capacity.
        if self.processed.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.processed.remove(&oldest);
            }
        }

        self.processed.insert(event_id.clone());
        self.order.push_back(event_id);
        true
    }

    #[must_use]
    pub fn contains(&self, event_id: &ProviderEventId) -> bool {
        self.processed.contains(event_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }
}
