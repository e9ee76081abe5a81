//! # In-Memory Record Store
//!
//! Thread-safe, cloneable map from identifier to record. Every entry
//! remembers when it was inserted so listings come back in a stable order
//! (insertion order, oldest first) regardless of hash layout.
//!
//! All operations are synchronous. The lock is `parking_lot`, which is not
//! poisoned by a panicking writer.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

#[derive(Debug)]
struct Inner<K, T> {
    entries: HashMap<K, (u64, T)>,
    next_seq: u64,
}

/// Thread-safe, cloneable in-memory record store.
#[derive(Debug)]
pub struct Store<K, T> {
    data: Arc<RwLock<Inner<K, T>>>,
}

impl<K, T> Clone for Store<K, T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<K: Eq + Hash + Clone, T: Clone> Store<K, T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(Inner {
                entries: HashMap::new(),
                next_seq: 0,
            })),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    ///
    /// Replacing a record keeps its original position in listings.
    pub fn insert(&self, id: K, value: T) -> Option<T> {
        let mut guard = self.data.write();
        if let Some((_, slot)) = guard.entries.get_mut(&id) {
            return Some(std::mem::replace(slot, value));
        }
        let seq = guard.next_seq;
        guard.next_seq += 1;
        guard.entries.insert(id, (seq, value));
        None
    }

    /// Retrieve a record by ID.
    pub fn get(&self, id: &K) -> Option<T> {
        self.data.read().entries.get(id).map(|(_, v)| v.clone())
    }

    /// List all records, oldest insertion first.
    pub fn list(&self) -> Vec<T> {
        self.filter(|_| true)
    }

    /// List the records matching `pred`, oldest insertion first.
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        let guard = self.data.read();
        let mut hits: Vec<&(u64, T)> = guard.entries.values().filter(|(_, v)| pred(v)).collect();
        hits.sort_by_key(|(seq, _)| *seq);
        hits.into_iter().map(|(_, v)| v.clone()).collect()
    }

    /// The first record matching `pred`, in insertion order.
    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let guard = self.data.read();
        guard
            .entries
            .values()
            .filter(|(_, v)| pred(v))
            .min_by_key(|(seq, _)| *seq)
            .map(|(_, v)| v.clone())
    }

    /// Atomically read-validate-update a record.
    ///
    /// The closure runs under the write lock and may reject the update by
    /// returning `Err`. Returns `None` if the record doesn't exist.
    pub fn try_update<R, E>(
        &self,
        id: &K,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.data.write().entries.get_mut(id).map(|(_, v)| f(v))
    }

    /// Remove a record by ID.
    pub fn remove(&self, id: &K) -> Option<T> {
        self.data.write().entries.remove(id).map(|(_, v)| v)
    }

    /// Check if a record exists.
    pub fn contains(&self, id: &K) -> bool {
        self.data.read().entries.contains_key(id)
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.data.read().entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone, T: Clone> Default for Store<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_follows_insertion_order() {
        let store: Store<u32, &str> = Store::new();
        for (k, v) in [(30, "c"), (10, "a"), (20, "b")] {
            store.insert(k, v);
        }
        assert_eq!(store.list(), vec!["c", "a", "b"]);
        store.insert(10, "a2");
        assert_eq!(store.list(), vec!["c", "a2", "b"]);
        assert_eq!(store.find(|v| v.starts_with('a')), Some("a2"));
    }

    #[test]
    fn test_try_update_and_remove() {
        let store: Store<u32, i32> = Store::new();
        store.insert(1, 5);
        let r: Option<Result<i32, &str>> = store.try_update(&1, |v| {
            *v += 1;
            Ok(*v)
        });
        assert_eq!(r, Some(Ok(6)));
        let r: Option<Result<(), &str>> = store.try_update(&2, |_| Ok(()));
        assert!(r.is_none());
        assert_eq!(store.remove(&1), Some(6));
        assert!(store.is_empty());
    }

    #[test]
    fn test_clones_share_data() {
        let a: Store<u32, i32> = Store::new();
        let b = a.clone();
        a.insert(1, 1);
        assert!(b.contains(&1));
        assert_eq!(b.len(), 1);
    }
}
