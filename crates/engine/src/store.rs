use std::hash::Hash;

use dashmap::DashMap;

/// A sharded concurrent map offering atomic upsert-and-mutate.
///
/// Mutators run while holding exclusive access to the entry's shard, so
/// field reads and writes inside a mutator are linearizable with respect to
/// every other mutator touching the same key. Mutators must stay short and
/// non-blocking; callers needing data outside the critical section take a
/// [`load`](Self::load) snapshot instead.
pub struct SharedMap<K, V>(DashMap<K, V>);

impl<K: Eq + Hash, V> SharedMap<K, V> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self(DashMap::new())
    }

    /// Inserts or replaces the entry for `key`.
    pub fn store(&self, key: K, value: V) {
        self.0.insert(key, value);
    }

    /// Runs `mutator` with exclusive access to the entry for `key`.
    ///
    /// Returns `None` without invoking the mutator when the key is absent.
    pub fn mutate<R>(&self, key: &K, mutator: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.0.get_mut(key).map(|mut entry| mutator(entry.value_mut()))
    }

    /// Runs `mutator` with exclusive access to the entry for `key`,
    /// inserting `default()` first when the key is absent.
    ///
    /// The insertion and the mutation appear as a single atomic step to
    /// every other accessor of the same key.
    pub fn mutate_or_insert<R>(
        &self,
        key: K,
        default: impl FnOnce() -> V,
        mutator: impl FnOnce(&mut V) -> R,
    ) -> R {
        let mut entry = self.0.entry(key).or_insert_with(default);
        mutator(entry.value_mut())
    }

    /// Returns a snapshot of the entry for `key`.
    #[must_use]
    pub fn load(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.0.get(key).map(|entry| entry.value().clone())
    }

    /// Removes the entry for `key`.
    pub fn remove(&self, key: &K) {
        self.0.remove(key);
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Eq + Hash, V> Default for SharedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn store_load_remove_round_trip() {
        let map: SharedMap<String, u32> = SharedMap::new();
        assert!(map.is_empty());

        map.store("alpha".to_string(), 1);
        assert_eq!(map.load(&"alpha".to_string()), Some(1));
        assert_eq!(map.len(), 1);

        map.remove(&"alpha".to_string());
        assert!(map.load(&"alpha".to_string()).is_none());
    }

    #[test]
    fn mutate_skips_missing_keys() {
        let map: SharedMap<u64, u64> = SharedMap::new();
        assert!(map.mutate(&7, |value| *value += 1).is_none());

        map.store(7, 10);
        assert_eq!(map.mutate(&7, |value| {
            *value += 1;
            *value
        }), Some(11));
    }

    #[test]
    fn mutate_or_insert_seeds_default_exactly_once() {
        let map: SharedMap<&'static str, Vec<u32>> = SharedMap::new();
        map.mutate_or_insert("key", Vec::new, |list| list.push(1));
        map.mutate_or_insert("key", Vec::new, |list| list.push(2));
        assert_eq!(map.load(&"key"), Some(vec![1, 2]));
    }

    #[test]
    fn concurrent_mutations_are_linearizable() {
        let map: Arc<SharedMap<u32, u64>> = Arc::new(SharedMap::new());
        let threads = 8u64;
        let increments = 1000u64;

        let mut handles = Vec::new();
        for _ in 0..threads {
            let map = Arc::clone(&map);
            handles.push(thread::spawn(move || {
                for _ in 0..increments {
                    map.mutate_or_insert(42, || 0, |value| *value += 1);
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker thread");
        }

        assert_eq!(map.load(&42), Some(threads * increments));
    }
}
