// storage/src/cache.rs

use blockchain_core::Block;
use blockchain_crypto::Hash;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// LRU cache for blocks read back from the database
pub struct BlockCache {
    cache: Mutex<LruCache<Hash, Arc<Block>>>,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<Hash, Arc<Block>>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, hash: &Hash) -> Option<Arc<Block>> {
        self.lock().get(hash).cloned()
    }

    pub fn insert(&self, hash: Hash, block: Arc<Block>) {
        self.lock().insert(hash, block);
    }

    pub fn remove(&self, hash: &Hash) -> Option<Arc<Block>> {
        self.lock().remove(hash)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Least recently used map. Each access stamps the entry with a
/// monotonically increasing tick; eviction takes the smallest tick.
struct LruCache<K, V> {
    map: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
    tick: u64,
    capacity: usize,
}

impl<K: Clone + std::hash::Hash + Eq, V> LruCache<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: BTreeMap::new(),
            tick: 0,
            capacity,
        }
    }

    fn touch(&mut self, key: &K) -> Option<u64> {
        let tick = self.tick + 1;
        let entry = self.map.get_mut(key)?;
        self.order.remove(&entry.1);
        entry.1 = tick;
        self.order.insert(tick, key.clone());
        self.tick = tick;
        Some(tick)
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        self.touch(key)?;
        self.map.get(key).map(|(value, _)| value)
    }

    fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }

        if let Some(entry) = self.map.get_mut(&key) {
            entry.0 = value;
            self.touch(&key);
            return;
        }

        if self.map.len() >= self.capacity {
            if let Some((_, oldest)) = self.order.pop_first() {
                self.map.remove(&oldest);
            }
        }

        self.tick += 1;
        self.order.insert(self.tick, key.clone());
        self.map.insert(key, (value, self.tick));
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let (value, tick) = self.map.remove(key)?;
        self.order.remove(&tick);
        Some(value)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }
}
