//! Read cache for finalized transaction views.
//!
//! RULE: The cache never serves a non-terminal view. While a
//! transaction is pending or processing, reads go to the store, so a
//! stale "safe" view of an in-flight evaluation can never be observed.
//! Purely derived state: safe to lose or rebuild at any time.

use crate::transaction::TransactionView;
use crate::types::TransactionId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct CacheEntry {
    view: TransactionView,
    expires_at: Instant,
}

pub struct ReadCache {
    ttl: Duration,
    entries: Mutex<HashMap<TransactionId, CacheEntry>>,
}

impl ReadCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, id: &str) -> Option<TransactionView> {
        self.get_at(id, Instant::now())
    }

    /// Lookup against an explicit clock (tests drive expiry this way).
    pub fn get_at(&self, id: &str, now: Instant) -> Option<TransactionView> {
        let mut entries = self.lock_entries();
        match entries.get(id) {
            Some(entry) if entry.expires_at > now => Some(entry.view.clone()),
            Some(_) => {
                entries.remove(id);
                None
            }
            None => None,
        }
    }

    /// Insert a finalized view. Returns false (and stores nothing) for
    /// a non-terminal view.
    pub fn put(&self, view: TransactionView) -> bool {
        self.put_at(view, Instant::now())
    }

    pub fn put_at(&self, view: TransactionView, now: Instant) -> bool {
        if !view.status.is_terminal() {
            log::warn!("txn={} refused non-terminal view for cache", view.id);
            return false;
        }
        let expires_at = now + self.ttl;
        self.lock_entries()
            .insert(view.id.clone(), CacheEntry { view, expires_at });
        true
    }

    pub fn invalidate(&self, id: &str) {
        self.lock_entries().remove(id);
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<TransactionId, CacheEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
