use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::{debug, trace};

use super::{Accumulate, RamEngine};
use crate::error::{RamDbError, Result};
use crate::typed::WireValue;

// time to live of an entry created by an increment/decrement
const ACCUMULATE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

// deadlines further out than this are clamped, Instant can't represent arbitrary offsets
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// The in-memory implementation of [`RamEngine`].
///
/// Each key maps to a single [`Entry`] holding both the value and its deadline, so the two are
/// always replaced together. The map is a sharded [`DashMap`]: an operation locks only the shard
/// its key hashes to, which makes every single key read-modify-write atomic without a global
/// lock.
///
/// Expired entries are never returned by [`get`](RamEngine::get) but stay in the map until they
/// are overwritten, removed, or swept by [`purge_expired`](MemStore::purge_expired).
///
/// Cloning a `MemStore` is cheap, all clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    entries: Arc<DashMap<String, Entry>>,
}

/// a value and the instant it stops being live
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn new(value: String, ttl: Duration) -> Self {
        Entry {
            value,
            expires_at: deadline(ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at >= now
    }
}

impl MemStore {
    /// creates an empty store
    pub fn new() -> Self {
        MemStore::default()
    }

    /// number of entries physically held, including expired ones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// true if the store holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every expired entry and returns how many were removed.
    ///
    /// Expiry is enforced on read, so this only reclaims memory.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let purged = before.saturating_sub(self.entries.len());
        debug!(purged, "purged expired entries");
        purged
    }
}

impl RamEngine for MemStore {
    fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    fn set(&self, key: String, value: String, ttl: Duration) -> bool {
        trace!(%key, len = value.len(), ?ttl, "set");
        self.entries.insert(key, Entry::new(value, ttl)).is_none()
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    fn accumulate(&self, key: &str, delta: Decimal, op: Accumulate) -> Result<Decimal> {
        // the entry guard holds the shard lock for the whole read-modify-write
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let current = Decimal::from_wire(&entry.value).map_err(|_| RamDbError::NotANumber {
                    key: key.to_string(),
                    value: entry.value.clone(),
                })?;
                let updated = match op {
                    Accumulate::Increment => current.checked_add(delta),
                    Accumulate::Decrement => current.checked_sub(delta),
                }
                .ok_or_else(|| RamDbError::Overflow { key: key.to_string() })?;
                entry.value = updated.to_wire();
                Ok(updated)
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(delta.to_wire(), ACCUMULATE_TTL));
                Ok(delta)
            }
        }
    }

    fn set_if_vacant(&self, key: String, value: String, ttl: Duration) -> bool {
        // check and insert under one shard lock
        match self.entries.entry(key) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_live(Instant::now()) {
                    return false;
                }
                trace!(key = %occupied.key(), "replacing expired entry");
                occupied.insert(Entry::new(value, ttl));
                true
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(value, ttl));
                true
            }
        }
    }
}

/// converts a time to live into an absolute deadline
fn deadline(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl)
        .or_else(|| now.checked_add(MAX_TTL))
        .unwrap_or(now)
}
