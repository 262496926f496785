use std::collections::HashMap;
use std::hash::Hash;

/// Which entry goes first when a [`BoundedCache`] is over capacity.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Evict the entry that was read or written the longest time ago.
    Lru,
    /// Evict the entry that was inserted first; reads do not count.
    Fifo,
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    inserted_tick: u64,
    last_used_tick: u64,
}

/// In-memory key/value store with a fixed entry count.
///
/// Every access advances a logical clock, so eviction order is deterministic
/// and does not depend on wall time or hash iteration order.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    policy: EvictionPolicy,
    tick: u64,
    entries: HashMap<K, Slot<V>>,
    evictions: u64,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// A capacity of zero is bumped to one.
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Self {
        Self {
            capacity: capacity.max(1),
            policy,
            tick: 0,
            entries: HashMap::new(),
            evictions: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries dropped to make room since the cache was created.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(key).map(|slot| {
            slot.last_used_tick = tick;
            slot.value.clone()
        })
    }

    /// Stores the value and returns the keys evicted to stay within capacity.
    /// Re-inserting an existing key replaces its value and keeps its original
    /// insertion position.
    pub fn insert(&mut self, key: K, value: V) -> Vec<K> {
        self.tick += 1;
        let tick = self.tick;

        match self.entries.get_mut(&key) {
            Some(slot) => {
                slot.value = value;
                slot.last_used_tick = tick;
            }
            None => {
                self.entries.insert(
                    key.clone(),
                    Slot {
                        value,
                        inserted_tick: tick,
                        last_used_tick: tick,
                    },
                );
            }
        }

        self.evict_as_needed()
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|slot| slot.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn evict_as_needed(&mut self) -> Vec<K> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            let policy = self.policy;
            let victim = self
                .entries
                .iter()
                .min_by_key(|(_, slot)| match policy {
                    EvictionPolicy::Lru => slot.last_used_tick,
                    EvictionPolicy::Fifo => slot.inserted_tick,
                })
                .map(|(k, _)| k.clone());

            let Some(key) = victim else {
                break;
            };

            self.entries.remove(&key);
            self.evictions += 1;
            evicted.push(key);
        }
        evicted
    }
}
