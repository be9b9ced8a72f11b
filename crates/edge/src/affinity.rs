// crates/edge/src/affinity.rs
//! Bounded, idle-expiring map from session id to backend index.
//!
//! An entry lives until it has been idle for the TTL or until it is the
//! oldest pinned entry when the store is full. Lookups refresh idleness but
//! not eviction order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_AFFINITY_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_AFFINITY_MAX_ENTRIES: usize = 100_000;

struct Affinity {
    backend: usize,
    seq: u64,
    last_seen: Instant,
}

pub struct AffinityStore {
    entries: DashMap<String, Affinity>,
    /// Pin order. Items whose seq no longer matches the map are stale.
    order: Mutex<VecDeque<(String, u64)>>,
    next_seq: AtomicU64,
    ttl: Duration,
    max_entries: usize,
}

impl AffinityStore {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            next_seq: AtomicU64::new(0),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn is_live(&self, affinity: &Affinity, now: Instant) -> bool {
        now.duration_since(affinity.last_seen) < self.ttl
    }

    fn lock_order(&self) -> MutexGuard<'_, VecDeque<(String, u64)>> {
        self.order.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Backend pinned for `session_id`, if the pin is still live.
    pub fn get(&self, session_id: &str) -> Option<usize> {
        let now = Instant::now();
        {
            let mut entry = self.entries.get_mut(session_id)?;
            if self.is_live(&entry, now) {
                entry.last_seen = now;
                return Some(entry.backend);
            }
        }
        self.entries
            .remove_if(session_id, |_, affinity| !self.is_live(affinity, now));
        None
    }

    /// Pin `session_id` to `backend` unless a live pin already exists.
    /// Returns the backend the session is pinned to afterwards.
    pub fn pin(&self, session_id: &str, backend: usize) -> usize {
        let now = Instant::now();
        let mut order = self.lock_order();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let fresh = Affinity {
            backend,
            seq,
            last_seen: now,
        };

        let is_new = match self.entries.entry(session_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if self.is_live(occupied.get(), now) {
                    let existing = occupied.get_mut();
                    existing.last_seen = now;
                    return existing.backend;
                }
                occupied.insert(fresh);
                false
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                true
            }
        };
        order.push_back((session_id.to_string(), seq));

        if is_new {
            while self.entries.len() > self.max_entries {
                if !self.evict_oldest(&mut order) {
                    break;
                }
            }
        }
        backend
    }

    fn evict_oldest(&self, order: &mut VecDeque<(String, u64)>) -> bool {
        while let Some((session_id, seq)) = order.pop_front() {
            if self
                .entries
                .remove_if(&session_id, |_, affinity| affinity.seq == seq)
                .is_some()
            {
                debug!(%session_id, "Evicted oldest affinity entry");
                return true;
            }
        }
        false
    }

    /// Drop idle entries and compact the pin order. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, affinity| {
            let keep = self.is_live(affinity, now);
            if !keep {
                removed += 1;
            }
            keep
        });

        let mut order = self.lock_order();
        order.retain(|(session_id, seq)| {
            self.entries
                .get(session_id)
                .is_some_and(|affinity| affinity.seq == *seq)
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AffinityStore {
    fn default() -> Self {
        Self::new(DEFAULT_AFFINITY_TTL, DEFAULT_AFFINITY_MAX_ENTRIES)
    }
}
