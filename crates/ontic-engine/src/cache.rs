//! Bounded memoisation for resolved and compiled snapshots.
//!
//! Callers hold a cache behind a `Mutex`, so a reader either sees a complete
//! entry or a miss. The eviction policy sits behind [`BoundedCache`] and can be
//! swapped without touching the resolver or compiler.

use std::{
  collections::{BTreeMap, HashMap},
  hash::Hash,
};

pub trait BoundedCache<K, V>: Send {
  /// Look up an entry, marking it as recently used.
  fn get(&mut self, key: &K) -> Option<V>;

  /// Insert an entry, evicting as needed to stay within capacity.
  fn insert(&mut self, key: K, value: V);

  fn len(&self) -> usize;

  fn is_empty(&self) -> bool { self.len() == 0 }

  fn capacity(&self) -> usize;

  fn clear(&mut self);
}

/// Least-recently-used eviction.
#[derive(Debug)]
pub struct LruCache<K, V> {
  capacity: usize,
  tick:     u64,
  entries:  HashMap<K, (V, u64)>,
  /// Recency order: oldest tick first.
  order:    BTreeMap<u64, K>,
}

impl<K, V> LruCache<K, V> {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      tick: 0,
      entries: HashMap::new(),
      order: BTreeMap::new(),
    }
  }

  fn next_tick(&mut self) -> u64 {
    self.tick += 1;
    self.tick
  }
}

impl<K, V> BoundedCache<K, V> for LruCache<K, V>
where
  K: Eq + Hash + Clone + Send,
  V: Clone + Send,
{
  fn get(&mut self, key: &K) -> Option<V> {
    let tick = self.next_tick();
    let (value, last_used) = self.entries.get_mut(key)?;
    self.order.remove(&*last_used);
    *last_used = tick;
    self.order.insert(tick, key.clone());
    Some(value.clone())
  }

  fn insert(&mut self, key: K, value: V) {
    if self.capacity == 0 {
      return;
    }
    let tick = self.next_tick();
    if let Some((_, last_used)) = self.entries.get(&key) {
      self.order.remove(last_used);
    } else if self.entries.len() >= self.capacity
      && let Some((_, evicted)) = self.order.pop_first()
    {
      self.entries.remove(&evicted);
    }
    self.order.insert(tick, key.clone());
    self.entries.insert(key, (value, tick));
  }

  fn len(&self) -> usize { self.entries.len() }

  fn capacity(&self) -> usize { self.capacity }

  fn clear(&mut self) {
    self.entries.clear();
    self.order.clear();
  }
}
