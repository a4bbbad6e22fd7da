// src/flow/registry.rs
//! Process-wide table of live exchanges
//!
//! Single source of truth for "which exchange is this command about".
//! Exchanges are indexed by id (exact) and by key (last writer wins).
//! Registration happens on every request *and* response event, because a
//! command issued after the request phase must still find the exchange.

use crate::flow::exchange::FlowHandle;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Bounded registry of live exchange handles
pub struct FlowRegistry {
    /// Exact index, one entry per live exchange
    by_id: DashMap<String, FlowHandle>,

    /// Key index; concurrent exchanges to the same endpoint share one slot
    by_key: DashMap<String, FlowHandle>,

    /// Insertion order of ids, for capacity eviction
    order: Mutex<VecDeque<String>>,

    /// Ids exempt from eviction while suspended at a breakpoint
    pinned: DashSet<String>,

    /// Maximum number of live exchanges retained
    capacity: usize,
}

impl FlowRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            by_id: DashMap::new(),
            by_key: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            pinned: DashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Insert or refresh both indexes for this exchange
    pub fn register(&self, handle: &FlowHandle) {
        let (id, key) = {
            let exchange = handle.read();
            (exchange.id.clone(), exchange.key())
        };

        if self.by_id.insert(id.clone(), Arc::clone(handle)).is_none() {
            self.order.lock().push_back(id.clone());
            metrics::counter!("flowbridge_flows_registered_total").increment(1);
        }
        self.by_key.insert(key.clone(), Arc::clone(handle));

        debug!(id = %id, key = %key, "registered flow");
        self.evict_over_capacity();
    }

    pub fn lookup_by_id(&self, id: &str) -> Option<FlowHandle> {
        self.by_id.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn lookup_by_key(&self, key: &str) -> Option<FlowHandle> {
        self.by_key.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Move the key index entry after an edit changed host or path.
    /// The id entry is untouched.
    pub fn rekey(&self, old_key: &str, new_key: &str, handle: &FlowHandle) {
        self.by_key
            .remove_if(old_key, |_, existing| Arc::ptr_eq(existing, handle));
        self.by_key.insert(new_key.to_string(), Arc::clone(handle));
        debug!(old_key = %old_key, new_key = %new_key, "rekeyed flow");
    }

    /// Exempt an exchange from capacity eviction. A suspended exchange
    /// must stay resident until it is released, or the release command
    /// would find nothing to resume.
    pub fn pin(&self, id: &str) {
        self.pinned.insert(id.to_string());
    }

    /// Make an exchange evictable again
    pub fn unpin(&self, id: &str) {
        self.pinned.remove(id);
    }

    /// Number of live exchanges tracked by id
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn evict_over_capacity(&self) {
        let mut requeued = 0usize;
        loop {
            let evict_id = {
                let mut order = self.order.lock();
                // Stop once within capacity, or once every remaining
                // candidate turned out to be pinned
                if order.len() <= self.capacity || requeued >= order.len() {
                    return;
                }
                match order.pop_front() {
                    Some(id) => id,
                    None => return,
                }
            };

            if self.pinned.contains(&evict_id) {
                self.order.lock().push_back(evict_id);
                requeued += 1;
                continue;
            }

            if let Some((_, handle)) = self.by_id.remove(&evict_id) {
                let key = handle.read().key();
                // Drop the key slot only while this exchange still owns it
                self.by_key
                    .remove_if(&key, |_, existing| Arc::ptr_eq(existing, &handle));
                debug!(id = %evict_id, "evicted flow over registry capacity");
                metrics::counter!("flowbridge_flows_evicted_total").increment(1);
            }
        }
    }
}
