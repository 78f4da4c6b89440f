//! Clock-sweep ring for second-chance eviction.
//!
//! Fixed-size slot array plus a hand. Reads set a referenced bit; the hand
//! clears referenced bits as it passes and evicts the first unreferenced
//! entry. Free slots are filled before anything is evicted.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Entry<K, V> {
    key: K,
    value: V,
    referenced: bool,
}

/// Fixed-capacity map with approximate-recency (CLOCK) eviction.
#[derive(Debug, Clone)]
pub(crate) struct ClockRing<K, V> {
    slots: Vec<Option<Entry<K, V>>>,
    index: HashMap<K, usize>,
    hand: usize,
    len: usize,
}

impl<K, V> ClockRing<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            index: HashMap::with_capacity(capacity),
            hand: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Returns the value for `key` and sets its reference bit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        let entry = self.slots.get_mut(idx)?.as_mut()?;
        entry.referenced = true;
        Some(&entry.value)
    }

    /// Inserts or updates `key`. Returns the evicted key, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<K> {
        if self.capacity() == 0 {
            return None;
        }

        if let Some(&idx) = self.index.get(&key) {
            if let Some(entry) = self.slots.get_mut(idx).and_then(Option::as_mut) {
                entry.value = value;
                entry.referenced = true;
            }
            return None;
        }

        let has_free = self.len < self.capacity();
        // Each full turn clears every reference bit, so two turns suffice.
        for _ in 0..2 * self.capacity() {
            let idx = self.hand;
            self.advance_hand();
            let evict = match &mut self.slots[idx] {
                None => false,
                Some(_) if has_free => continue,
                Some(entry) if entry.referenced => {
                    entry.referenced = false;
                    continue;
                }
                Some(_) => true,
            };
            let evicted = if evict {
                self.slots[idx].take().map(|e| e.key)
            } else {
                self.len += 1;
                None
            };
            if let Some(old) = &evicted {
                self.index.remove(old);
            }
            self.fill(idx, key, value);
            return evicted;
        }
        None
    }

    fn fill(&mut self, idx: usize, key: K, value: V) {
        self.index.insert(key.clone(), idx);
        self.slots[idx] = Some(Entry {
            key,
            value,
            referenced: false,
        });
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.index.remove(key)?;
        let entry = self.slots.get_mut(idx)?.take()?;
        self.len -= 1;
        Some(entry.value)
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.index.clear();
        self.hand = 0;
        self.len = 0;
    }

    /// Iterates entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref().map(|e| (&e.key, &e.value)))
    }

    fn advance_hand(&mut self) {
        self.hand = (self.hand + 1) % self.capacity();
    }

    #[cfg(test)]
    pub fn debug_validate_invariants(&self) {
        let slot_count = self.slots.iter().filter(|slot| slot.is_some()).count();
        assert_eq!(self.len, slot_count);
        assert_eq!(self.len, self.index.len());
        assert!(self.capacity() == 0 || self.hand < self.capacity());
        for (key, &idx) in &self.index {
            let entry = self.slots[idx]
                .as_ref()
                .expect("index points to empty slot");
            assert!(&entry.key == key);
        }
    }
}
