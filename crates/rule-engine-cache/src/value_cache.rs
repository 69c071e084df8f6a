// rule-engine-cache/src/value_cache.rs
// ============================================================================
// Module: Data Collector Value Cache
// Description: C8's short-TTL in-process value cache, sitting in front of
//              the batch store queries (spec §4.8).
// Purpose: Bound repeat-query cost for hot originators within one
//          collection window without round-tripping through Redis for
//          values that are about to be re-read within milliseconds.
// Dependencies: time, parking_lot
// ============================================================================

//! ## Overview
//! Grounded on the `MemoryCache`/`CacheEntry` shape in the pack's own
//! multi-level caching crate: an entry carries `created_at`/`access_count`,
//! eviction is bounded by a maximum entry count, and expired entries are
//! dropped lazily on the next `get` rather than swept by a background task.
//! Eviction itself is LRU: both `get` and `set` move a key to the
//! most-recently-used end of the recency order, so a hot old key survives
//! an eviction pass over colder, more-recently-inserted ones.

use std::collections::HashMap;
use std::collections::VecDeque;

use parking_lot::Mutex;
use rule_engine_core::OriginatorId;
use rule_engine_core::SnapshotValue;
use rule_engine_core::VariableName;
use time::Duration;
use time::OffsetDateTime;

/// Default time-to-live for a collected value (spec §4.8: "short-TTL").
pub const DEFAULT_VALUE_TTL: Duration = Duration::seconds(5);
/// Default maximum number of distinct keys retained.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

struct Entry {
    value: SnapshotValue,
    expires_at: OffsetDateTime,
}

/// An in-process, per-worker cache of recently collected snapshot values.
pub struct ValueCache {
    entries: Mutex<HashMap<(OriginatorId, VariableName), Entry>>,
    order: Mutex<VecDeque<(OriginatorId, VariableName)>>,
    ttl: Duration,
    max_entries: usize,
}

impl ValueCache {
    /// Creates an empty cache with the default TTL and capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_VALUE_TTL, DEFAULT_MAX_ENTRIES)
    }

    /// Creates an empty cache with an explicit TTL and maximum entry count.
    #[must_use]
    pub fn with_capacity(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            order: Mutex::new(VecDeque::new()),
            ttl,
            max_entries,
        }
    }

    /// Returns the cached value for `(originator_id, variable_name)` if
    /// present and not yet expired. A hit touches the key's recency
    /// position so it survives eviction over colder entries (spec §4.8: LRU).
    #[must_use]
    pub fn get(&self, originator_id: &OriginatorId, variable_name: &VariableName) -> Option<SnapshotValue> {
        let key = (originator_id.clone(), variable_name.clone());
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(entry) if entry.expires_at > now() => {
                let value = entry.value.clone();
                self.touch(&key);
                Some(value)
            }
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Moves `key` to the most-recently-used end of the recency order.
    fn touch(&self, key: &(OriginatorId, VariableName)) {
        let mut order = self.order.lock();
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
        order.push_back(key.clone());
    }

    /// Inserts or refreshes a value, evicting the least-recently-accessed
    /// key once over capacity (spec §4.8: LRU).
    pub fn set(&self, originator_id: OriginatorId, variable_name: VariableName, value: SnapshotValue) {
        let key = (originator_id, variable_name);
        let mut entries = self.entries.lock();
        {
            let mut order = self.order.lock();
            if let Some(pos) = order.iter().position(|k| k == &key) {
                order.remove(pos);
            }
            order.push_back(key.clone());
            while entries.len() >= self.max_entries && !entries.contains_key(&key) {
                if let Some(lru) = order.pop_front() {
                    entries.remove(&lru);
                } else {
                    break;
                }
            }
        }
        entries.insert(key, Entry { value, expires_at: now() + self.ttl });
    }

    /// Removes every cached value for `originator_id`, used when C1
    /// invalidates and the collector wants a fresh read on the next pass.
    pub fn invalidate_originator(&self, originator_id: &OriginatorId) {
        let mut entries = self.entries.lock();
        entries.retain(|(id, _), _| id != originator_id);
    }
}

impl Default for ValueCache {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit_after_set() {
        let cache = ValueCache::new();
        let id = OriginatorId::new("s1");
        let var = VariableName::new("temp");
        assert!(cache.get(&id, &var).is_none());
        cache.set(id.clone(), var.clone(), SnapshotValue::Number(21.5));
        assert_eq!(cache.get(&id, &var), Some(SnapshotValue::Number(21.5)));
    }

    #[test]
    fn invalidate_originator_drops_only_that_originators_entries() {
        let cache = ValueCache::new();
        let a = OriginatorId::new("a");
        let b = OriginatorId::new("b");
        let var = VariableName::new("x");
        cache.set(a.clone(), var.clone(), SnapshotValue::Boolean(true));
        cache.set(b.clone(), var.clone(), SnapshotValue::Boolean(false));
        cache.invalidate_originator(&a);
        assert!(cache.get(&a, &var).is_none());
        assert!(cache.get(&b, &var).is_some());
    }

    #[test]
    fn over_capacity_evicts_oldest_entry() {
        let cache = ValueCache::with_capacity(DEFAULT_VALUE_TTL, 2);
        let var = VariableName::new("x");
        cache.set(OriginatorId::new("a"), var.clone(), SnapshotValue::Number(1.0));
        cache.set(OriginatorId::new("b"), var.clone(), SnapshotValue::Number(2.0));
        cache.set(OriginatorId::new("c"), var.clone(), SnapshotValue::Number(3.0));
        assert!(cache.get(&OriginatorId::new("a"), &var).is_none());
        assert!(cache.get(&OriginatorId::new("c"), &var).is_some());
    }

    #[test]
    fn a_hot_old_key_survives_eviction_over_a_cold_newer_one() {
        let cache = ValueCache::with_capacity(DEFAULT_VALUE_TTL, 2);
        let var = VariableName::new("x");
        let a = OriginatorId::new("a");
        let b = OriginatorId::new("b");
        let c = OriginatorId::new("c");
        cache.set(a.clone(), var.clone(), SnapshotValue::Number(1.0));
        cache.set(b.clone(), var.clone(), SnapshotValue::Number(2.0));
        // Touch `a`, making `b` the least-recently-used entry.
        assert!(cache.get(&a, &var).is_some());
        cache.set(c.clone(), var.clone(), SnapshotValue::Number(3.0));
        assert!(cache.get(&b, &var).is_none(), "b was least-recently-used and should be evicted");
        assert!(cache.get(&a, &var).is_some(), "a was touched and should survive eviction");
        assert!(cache.get(&c, &var).is_some());
    }
}
