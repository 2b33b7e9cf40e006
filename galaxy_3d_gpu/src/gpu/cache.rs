/// Thread-safe object cache keyed by structural descriptions
///
/// Entries are bucketed by a 64-bit hash and compared with the full key,
/// so two descriptions that collide on the hash still get distinct
/// objects. Lookups take the read lock only. Misses build the object
/// outside any lock and then race to insert it: the first writer wins and
/// the loser receives its own object back to dispose of.

use std::hash::{Hash, Hasher};
use std::sync::RwLock;

use rustc_hash::{FxHashMap, FxHasher};

use crate::error::Result;
use crate::gpu::sync;

/// Hash a key with the cache hasher
pub(crate) fn hash_key<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Hash a plain-old-data key by its bytes
pub(crate) fn hash_pod<K: bytemuck::Pod>(key: &K) -> u64 {
    hash_key(bytemuck::bytes_of(key))
}

/// Outcome of `ObjectCache::get_or_insert_with`
#[derive(Debug)]
pub(crate) enum Lookup<V> {
    /// Already cached
    Hit(V),
    /// Built by this call and now cached
    Inserted(V),
    /// Built by this call, but another thread inserted first
    LostRace { existing: V, discarded: V },
}

impl<V> Lookup<V> {
    /// The cached value, whichever way it got there
    pub fn into_value(self) -> V {
        match self {
            Lookup::Hit(v) | Lookup::Inserted(v) => v,
            Lookup::LostRace { existing, .. } => existing,
        }
    }

    /// Split into the cached value and an object to dispose of
    pub fn into_parts(self) -> (V, Option<V>) {
        match self {
            Lookup::Hit(v) | Lookup::Inserted(v) => (v, None),
            Lookup::LostRace { existing, discarded } => (existing, Some(discarded)),
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}

/// Cache contents behind the lock
pub(crate) struct CacheEntries<K, V, S> {
    buckets: FxHashMap<u64, Vec<(K, V)>>,
    len: usize,
    /// Side data that must change atomically with the entries
    pub extra: S,
}

impl<K: Eq, V, S> CacheEntries<K, V, S> {
    pub fn get(&self, hash: u64, key: &K) -> Option<&V> {
        self.buckets.get(&hash)?.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn insert(&mut self, hash: u64, key: K, value: V) {
        self.buckets.entry(hash).or_default().push((key, value));
        self.len += 1;
    }

    pub fn remove(&mut self, hash: u64, key: &K) -> Option<V> {
        let bucket = self.buckets.get_mut(&hash)?;
        let index = bucket.iter().position(|(k, _)| k == key)?;
        let (_, value) = bucket.swap_remove(index);
        if bucket.is_empty() {
            self.buckets.remove(&hash);
        }
        self.len -= 1;
        Some(value)
    }

    /// Remove every entry the predicate rejects, returning the removed values
    pub fn extract_if_not(&mut self, mut keep: impl FnMut(&K, &V) -> bool) -> Vec<V> {
        let mut removed = Vec::new();
        self.buckets.retain(|_, bucket| {
            let mut i = 0;
            while i < bucket.len() {
                if keep(&bucket[i].0, &bucket[i].1) {
                    i += 1;
                } else {
                    removed.push(bucket.swap_remove(i).1);
                }
            }
            !bucket.is_empty()
        });
        self.len -= removed.len();
        removed
    }

    pub fn drain(&mut self) -> Vec<V> {
        self.len = 0;
        self.buckets.drain().flat_map(|(_, bucket)| bucket.into_iter().map(|(_, v)| v)).collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn bucket_len(&self, hash: u64) -> usize {
        self.buckets.get(&hash).map_or(0, Vec::len)
    }
}

/// Read-mostly cache of shared device objects
pub(crate) struct ObjectCache<K, V, S = ()> {
    entries: RwLock<CacheEntries<K, V, S>>,
}

impl<K: Eq + Clone, V: Clone, S: Default> Default for ObjectCache<K, V, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Clone, V: Clone, S: Default> ObjectCache<K, V, S> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(CacheEntries {
                buckets: FxHashMap::default(),
                len: 0,
                extra: S::default(),
            }),
        }
    }

    pub fn get(&self, hash: u64, key: &K) -> Option<V> {
        sync::read(&self.entries).get(hash, key).cloned()
    }

    /// Return the cached value for `key`, building and inserting it on a miss
    ///
    /// `build` runs without holding the lock. `on_insert` runs under the
    /// write lock only when this call's value is the one inserted.
    pub fn get_or_insert_with(
        &self,
        hash: u64,
        key: &K,
        build: impl FnOnce() -> Result<V>,
        on_insert: impl FnOnce(&mut S, &V),
    ) -> Result<Lookup<V>> {
        if let Some(value) = self.get(hash, key) {
            return Ok(Lookup::Hit(value));
        }

        let built = build()?;

        let mut entries = sync::write(&self.entries);
        if let Some(existing) = entries.get(hash, key) {
            return Ok(Lookup::LostRace { existing: existing.clone(), discarded: built });
        }
        on_insert(&mut entries.extra, &built);
        entries.insert(hash, key.clone(), built.clone());
        Ok(Lookup::Inserted(built))
    }

    /// Exclusive access for multi-entry updates
    pub fn write(&self) -> std::sync::RwLockWriteGuard<'_, CacheEntries<K, V, S>> {
        sync::write(&self.entries)
    }

    pub fn len(&self) -> usize {
        sync::read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
