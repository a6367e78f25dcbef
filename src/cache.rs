//! Session-scoped bookkeeping shared by the writer and the reader.
//!
//! All three structures live inside one `GraphWriter` or `GraphReader` and
//! are dropped with it. Nothing here is process-global.

use std::hash::Hash;

use hashbrown::HashMap;

use crate::storage::{ParentKey, RowId, TableKind};

// ============================================================================
// AddressCache
// ============================================================================

/// First-sight memo from an identity key to the value created for it.
///
/// The writer keys it by live node identity and stores row ids; the reader
/// keys it by `(row id, table, copy number)` and stores rebuilt nodes.
#[derive(Debug, Clone)]
pub struct AddressCache<K, V> {
    entries: HashMap<K, V>,
}

impl<K, V> Default for AddressCache<K, V> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<K: Eq + Hash, V: Clone> AddressCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    /// Return the cached value, or create and cache one.
    /// The flag is `true` when the key was already present.
    pub fn lookup_or_reserve(&mut self, key: K, reserve: impl FnOnce() -> V) -> (V, bool) {
        if let Some(v) = self.entries.get(&key) {
            return (v.clone(), true);
        }
        let v = reserve();
        self.entries.insert(key, v.clone());
        (v, false)
    }

    /// Record a value created outside the cache. Returns the previous one.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// CopyNumberTracker
// ============================================================================

/// Per-`(table, row)` occurrence counters starting at 1.
#[derive(Debug, Clone, Default)]
pub struct CopyNumberTracker {
    counters: HashMap<(TableKind, RowId), u32>,
}

impl CopyNumberTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy number of the next occurrence.
    pub fn next_copy_number(&mut self, table: TableKind, id: RowId) -> u32 {
        let n = self.counters.entry((table, id)).or_insert(0);
        *n += 1;
        *n
    }

    /// Most recently assigned copy number, without incrementing.
    pub fn latest_copy_number(&self, table: TableKind, id: RowId) -> Option<u32> {
        self.counters.get(&(table, id)).copied()
    }
}

// ============================================================================
// ChildPositionCounter
// ============================================================================

/// Next child position per parent instance, starting at 1.
#[derive(Debug, Clone, Default)]
pub struct ChildPositionCounter {
    next: HashMap<ParentKey, u32>,
}

impl ChildPositionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_position(&mut self, parent: ParentKey) -> u32 {
        let n = self.next.entry(parent).or_insert(0);
        *n += 1;
        *n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_or_reserve_reports_first_sight() {
        let mut cache: AddressCache<u64, RowId> = AddressCache::new();
        let mut next = 0u64;
        let mut alloc = || {
            next += 1;
            RowId(next)
        };
        assert_eq!(cache.lookup_or_reserve(7, &mut alloc), (RowId(1), false));
        assert_eq!(cache.lookup_or_reserve(7, &mut alloc), (RowId(1), true));
        assert_eq!(cache.lookup_or_reserve(8, &mut alloc), (RowId(2), false));
        assert_eq!(cache.lookup(&9), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_copy_numbers_count_per_row() {
        let mut t = CopyNumberTracker::new();
        assert_eq!(t.latest_copy_number(TableKind::PhysVol, RowId(1)), None);
        assert_eq!(t.next_copy_number(TableKind::PhysVol, RowId(1)), 1);
        assert_eq!(t.next_copy_number(TableKind::PhysVol, RowId(1)), 2);
        assert_eq!(t.next_copy_number(TableKind::PhysVol, RowId(2)), 1);
        assert_eq!(t.next_copy_number(TableKind::FullPhysVol, RowId(1)), 1);
        assert_eq!(t.latest_copy_number(TableKind::PhysVol, RowId(1)), Some(2));
    }

    #[test]
    fn test_positions_per_parent_instance() {
        let mut c = ChildPositionCounter::new();
        let p1 = ParentKey { id: Some(RowId(1)), table_id: 1, copy_number: 1 };
        let p2 = ParentKey { copy_number: 2, ..p1 };
        assert_eq!(c.next_position(p1), 1);
        assert_eq!(c.next_position(p1), 2);
        assert_eq!(c.next_position(p2), 1);
    }
}
