//! Generation-tagged cache in front of [`UtxoSet::spend_status`].
//!
//! Every entry carries the UTXO-set generation it was read at. A lookup
//! only counts as a hit when the entry's tag matches the set's current
//! generation; any apply or undo since then makes the entry stale, and a
//! stale entry is handled like a miss and silently refreshed. Callers never
//! observe staleness.
//!
//! The caller decides per lookup whether to bypass the cache and read the
//! authoritative set directly. Bypassed reads are still written back, so a
//! bypass doubles as a refresh. Capacity zero disables storage entirely;
//! lookups then always fall through to the set.

use std::collections::HashMap;
use std::fmt;

use ebb_core::types::OutPoint;
use ebb_core::utxo::{SpendStatus, UtxoSet};
use parking_lot::Mutex;
use serde::Serialize;

/// Counters describing cache behavior since construction.
///
/// `hits`, `misses`, `stale_reads`, and `bypasses` partition the lookups:
/// every call to [`SpendStatusCache::query`] increments exactly one of them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Fresh entry served without touching the authoritative set.
    pub hits: u64,
    /// No entry present.
    pub misses: u64,
    /// Entry present but tagged with an older generation.
    pub stale_reads: u64,
    /// Lookups that skipped the cache by caller decision.
    pub bypasses: u64,
    /// Authoritative results written back.
    pub insertions: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
}

impl CacheStats {
    /// Total lookups.
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses + self.stale_reads + self.bypasses
    }

    /// Fraction of lookups served from the cache, 0.0 when idle.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.lookups();
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }
}

#[derive(Clone, Copy, Debug)]
struct CacheEntry {
    status: SpendStatus,
    generation: u64,
}

struct CacheInner {
    entries: HashMap<OutPoint, CacheEntry>,
    stats: CacheStats,
}

/// Spend-status cache shared by readers; interior locking keeps lookups
/// usable through a shared reference.
pub struct SpendStatusCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl SpendStatusCache {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
            capacity,
        }
    }

    /// Spend status of `op`, served from the cache when possible.
    ///
    /// With `bypass` set, the cache is not consulted and the authoritative
    /// set is read directly. Either way the authoritative result is written
    /// back tagged with the set's current generation.
    pub fn query(&self, op: &OutPoint, bypass: bool, utxo: &UtxoSet) -> SpendStatus {
        let generation = utxo.generation();
        let mut inner = self.inner.lock();

        if bypass {
            inner.stats.bypasses += 1;
        } else {
            match inner.entries.get(op) {
                Some(entry) if entry.generation == generation => {
                    let status = entry.status;
                    inner.stats.hits += 1;
                    return status;
                }
                Some(_) => inner.stats.stale_reads += 1,
                None => inner.stats.misses += 1,
            }
        }

        let status = utxo.spend_status(op);
        self.store(&mut inner, *op, status, generation);
        status
    }

    fn store(&self, inner: &mut CacheInner, op: OutPoint, status: SpendStatus, generation: u64) {
        if self.capacity == 0 {
            return;
        }
        if !inner.entries.contains_key(&op) && inner.entries.len() >= self.capacity {
            // Victim choice is arbitrary.
            if let Some(victim) = inner.entries.keys().next().copied() {
                inner.entries.remove(&victim);
                inner.stats.evictions += 1;
            }
        }
        inner.entries.insert(op, CacheEntry { status, generation });
        inner.stats.insertions += 1;
    }

    /// Drop the entries for the given outpoints.
    ///
    /// Called after a chain switch with every outpoint the switch touched.
    pub fn invalidate<'a, I>(&self, outpoints: I)
    where
        I: IntoIterator<Item = &'a OutPoint>,
    {
        let mut inner = self.inner.lock();
        for op in outpoints {
            inner.entries.remove(op);
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    /// Number of stored entries, fresh or stale.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Maximum number of entries. Zero means storage is disabled.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for SpendStatusCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpendStatusCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
