//! Timed table: the probing table and the heaps in lockstep.
//!
//! Every entry carries a timestamp and may be assigned to one of up to
//! ten timeout classes. Each class has a fixed interval and its own
//! min-heap keyed by `timestamp + interval`; each heap entry's payload
//! stores the owning table key, so the earliest deadline resolves back
//! to its entry without any reverse index.
//!
//! The per-entry bookkeeping (timestamp, class, heap ref) rides in a
//! fixed-size tail inside the table's value payload. Table growth
//! copies whole payloads, so the bookkeeping survives it; the heaps
//! themselves keep their construction-time capacity.

use crate::arena::ValueRef;
use crate::error::Error;
use crate::hashtable::{KeyValuePair, ProbingTable, TableConfig};
use crate::heap::{HeapConfig, MinHeap};

/// Upper bound on the number of timeout classes a [`TimedTable`] can
/// carry.
pub const MAX_TIMEOUT_SLOTS: usize = 10;

/// Bookkeeping bytes appended to every table value slot.
const META_SIZE: usize = 16;

/// Class marker for entries not assigned to any timeout class.
const NO_SLOT: u8 = u8::MAX;

/// Configuration for [`TimedTable::new`].
#[derive(Clone, Debug)]
pub struct TimedConfig {
    /// Table configuration; `value_size` is the caller-visible payload
    /// size, the bookkeeping tail is added internally.
    pub table: TableConfig,
    /// Per-class expiry interval added to an entry's timestamp.
    /// Between 1 and [`MAX_TIMEOUT_SLOTS`] classes.
    pub intervals: Vec<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct EntryMeta {
    timestamp: i64,
    heap_ref: u32,
    slot: u8,
}

impl EntryMeta {
    fn decode(bytes: &[u8]) -> Self {
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&bytes[0..8]);
        let mut heap_ref = [0u8; 4];
        heap_ref.copy_from_slice(&bytes[8..12]);
        Self {
            timestamp: i64::from_le_bytes(timestamp),
            heap_ref: u32::from_le_bytes(heap_ref),
            slot: bytes[12],
        }
    }

    fn encode(self, bytes: &mut [u8]) {
        bytes[0..8].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.heap_ref.to_le_bytes());
        bytes[12] = self.slot;
    }
}

#[derive(Debug)]
pub struct TimedTable {
    table: ProbingTable,
    heaps: Vec<MinHeap>,
    intervals: Vec<i64>,
    user_value_size: usize,
}

impl TimedTable {
    pub fn new(config: TimedConfig) -> Result<Self, Error> {
        if config.intervals.is_empty() || config.intervals.len() > MAX_TIMEOUT_SLOTS {
            return Err(Error::InvalidTimeoutSlotCount);
        }
        if config.table.value_size == 0 {
            return Err(Error::ZeroValueSize);
        }

        let user_value_size = config.table.value_size;
        let mut inner = config.table.clone();
        inner.value_size = user_value_size
            .checked_add(META_SIZE)
            .ok_or(Error::CapacityOverflow)?;
        let table = ProbingTable::new(inner)?;

        let mut heaps = Vec::with_capacity(config.intervals.len());
        for _ in &config.intervals {
            heaps.push(MinHeap::new(HeapConfig {
                value_size: config.table.key_size,
                max_elems: config.table.max_elems,
                resizable: false,
            })?);
        }

        Ok(Self {
            table,
            heaps,
            intervals: config.intervals,
            user_value_size,
        })
    }

    /// Insert `key`, recording `timestamp`. The entry starts outside
    /// every timeout class. An already-present key is returned
    /// untouched.
    pub fn insert(&mut self, key: &[u8], timestamp: i64) -> Result<ValueRef, Error> {
        if let Some(existing) = self.table.look_up(key) {
            return Ok(existing);
        }
        let r = self.table.insert(key)?;
        self.set_meta(
            r,
            EntryMeta {
                timestamp,
                heap_ref: 0,
                slot: NO_SLOT,
            },
        );
        Ok(r)
    }

    pub fn look_up(&self, key: &[u8]) -> Option<ValueRef> {
        self.table.look_up(key)
    }

    /// Remove `key` from the table and from its timeout class, if it
    /// was assigned to one.
    pub fn remove(&mut self, key: &[u8]) -> Option<ValueRef> {
        let r = self.table.look_up(key)?;
        let meta = self.meta(r);
        if meta.slot != NO_SLOT {
            self.evict_from_heap(meta.slot as usize, ValueRef(meta.heap_ref));
        }
        self.table.remove(key)
    }

    /// Move `key` into timeout class `slot_id`, leaving any previously
    /// assigned class first. The entry's deadline becomes its stored
    /// timestamp plus the class interval. When the target heap is full
    /// the entry ends up unassigned.
    pub fn set_timeout_slot(&mut self, key: &[u8], slot_id: usize) -> Result<ValueRef, Error> {
        if slot_id >= self.heaps.len() {
            return Err(Error::InvalidTimeoutSlot);
        }
        let r = self.table.look_up(key).ok_or(Error::KeyNotFound)?;
        let mut meta = self.meta(r);

        if meta.slot != NO_SLOT {
            self.evict_from_heap(meta.slot as usize, ValueRef(meta.heap_ref));
            meta.slot = NO_SLOT;
            self.set_meta(r, meta);
        }

        let deadline = meta.timestamp.saturating_add(self.intervals[slot_id]);
        let heap_ref = self.heaps[slot_id].insert(deadline)?;
        self.heaps[slot_id].value_mut(heap_ref).copy_from_slice(key);

        meta.slot = slot_id as u8;
        meta.heap_ref = heap_ref.0;
        self.set_meta(r, meta);
        Ok(r)
    }

    /// Replace the entry's timestamp; an assigned entry is re-keyed in
    /// its heap to `new_timestamp + interval`.
    pub fn update_time_for_entry(
        &mut self,
        key: &[u8],
        new_timestamp: i64,
    ) -> Result<ValueRef, Error> {
        let r = self.table.look_up(key).ok_or(Error::KeyNotFound)?;
        let mut meta = self.meta(r);
        meta.timestamp = new_timestamp;
        if meta.slot != NO_SLOT {
            let deadline = new_timestamp.saturating_add(self.intervals[meta.slot as usize]);
            self.heaps[meta.slot as usize].change_key(ValueRef(meta.heap_ref), deadline);
        }
        self.set_meta(r, meta);
        Ok(r)
    }

    /// Entry with the earliest deadline across every timeout class,
    /// resolved back to its key and caller-visible value. `None` when
    /// no entry is assigned to any class.
    pub fn next_timeout_entry(&self) -> Option<KeyValuePair<'_>> {
        let mut best: Option<(i64, usize)> = None;
        for (slot, heap) in self.heaps.iter().enumerate() {
            if let Some(deadline) = heap.find_min() {
                if best.map_or(true, |(b, _)| deadline < b) {
                    best = Some((deadline, slot));
                }
            }
        }
        let (_, slot) = best?;
        let (_, heap_ref) = self.heaps[slot].peek_min()?;
        let key = self.heaps[slot].value(heap_ref);
        let r = self.table.look_up(key)?;
        Some(KeyValuePair {
            key: self.table.key_of(r),
            value: &self.table.value(r)[..self.user_value_size],
        })
    }

    /// Caller-visible slice of the entry's payload.
    #[inline]
    pub fn value(&self, r: ValueRef) -> &[u8] {
        &self.table.value(r)[..self.user_value_size]
    }

    #[inline]
    pub fn value_mut(&mut self, r: ValueRef) -> &mut [u8] {
        let user = self.user_value_size;
        &mut self.table.value_mut(r)[..user]
    }

    #[inline]
    pub fn key_of(&self, r: ValueRef) -> &[u8] {
        self.table.key_of(r)
    }

    /// Pull an arbitrary entry out of a heap: sink it to the root with
    /// the sentinel key, then pop it.
    fn evict_from_heap(&mut self, slot: usize, heap_ref: ValueRef) {
        let heap = &mut self.heaps[slot];
        heap.change_key(heap_ref, i64::MIN);
        let popped = heap.delete_min();
        debug_assert_eq!(popped, Some(heap_ref));
    }

    fn meta(&self, r: ValueRef) -> EntryMeta {
        EntryMeta::decode(&self.table.value(r)[self.user_value_size..])
    }

    fn set_meta(&mut self, r: ValueRef, meta: EntryMeta) {
        let user = self.user_value_size;
        meta.encode(&mut self.table.value_mut(r)[user..]);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn config(max_elems: u32, intervals: &[i64]) -> TimedConfig {
        TimedConfig {
            table: TableConfig {
                load_factor: 0.75,
                key_size: 8,
                value_size: 8,
                max_elems,
                resizable: false,
            },
            intervals: intervals.to_vec(),
        }
    }

    fn key(k: u64) -> [u8; 8] {
        k.to_le_bytes()
    }

    #[test]
    fn rejects_bad_class_counts() {
        assert_eq!(
            TimedTable::new(config(8, &[])).unwrap_err(),
            Error::InvalidTimeoutSlotCount
        );
        assert_eq!(
            TimedTable::new(config(8, &[1; 11])).unwrap_err(),
            Error::InvalidTimeoutSlotCount
        );
        assert!(TimedTable::new(config(8, &[1; 10])).is_ok());
    }

    #[test]
    fn insert_look_up_remove() {
        let mut t = TimedTable::new(config(8, &[100])).unwrap();
        let r = t.insert(&key(1), 10).unwrap();
        t.value_mut(r).copy_from_slice(&7u64.to_le_bytes());

        assert_eq!(t.look_up(&key(1)), Some(r));
        assert_eq!(t.value(r), &7u64.to_le_bytes());
        assert_eq!(t.key_of(r), &key(1));

        // metadata tail is invisible through the public accessors
        assert_eq!(t.value(r).len(), 8);

        assert_eq!(t.remove(&key(1)), Some(r));
        assert_eq!(t.look_up(&key(1)), None);
        assert_eq!(t.remove(&key(1)), None);
    }

    #[test]
    fn duplicate_insert_keeps_first_timestamp() {
        let mut t = TimedTable::new(config(8, &[100])).unwrap();
        let r = t.insert(&key(1), 10).unwrap();
        assert_eq!(t.insert(&key(1), 99).unwrap(), r);

        // had the duplicate rewritten the timestamp to 99, key 1 would
        // expire after key 2 (199 vs 115)
        t.insert(&key(2), 15).unwrap();
        t.set_timeout_slot(&key(1), 0).unwrap();
        t.set_timeout_slot(&key(2), 0).unwrap();
        assert_eq!(t.next_timeout_entry().unwrap().key, &key(1));
    }

    #[test]
    fn unassigned_entries_have_no_timeout() {
        let mut t = TimedTable::new(config(8, &[100, 200])).unwrap();
        t.insert(&key(1), 10).unwrap();
        assert!(t.next_timeout_entry().is_none());
    }

    #[test]
    fn set_timeout_slot_orders_by_deadline() {
        let mut t = TimedTable::new(config(8, &[100, 10])).unwrap();
        let ra = t.insert(&key(1), 0).unwrap();
        t.value_mut(ra).copy_from_slice(&11u64.to_le_bytes());
        let rb = t.insert(&key(2), 0).unwrap();
        t.value_mut(rb).copy_from_slice(&22u64.to_le_bytes());

        t.set_timeout_slot(&key(1), 0).unwrap(); // deadline 100
        t.set_timeout_slot(&key(2), 1).unwrap(); // deadline 10

        let next = t.next_timeout_entry().unwrap();
        assert_eq!(next.key, &key(2));
        assert_eq!(next.value, &22u64.to_le_bytes());
    }

    #[test]
    fn invalid_slot_and_missing_key() {
        let mut t = TimedTable::new(config(8, &[100])).unwrap();
        t.insert(&key(1), 0).unwrap();
        assert_eq!(
            t.set_timeout_slot(&key(1), 1).unwrap_err(),
            Error::InvalidTimeoutSlot
        );
        assert_eq!(
            t.set_timeout_slot(&key(9), 0).unwrap_err(),
            Error::KeyNotFound
        );
        assert_eq!(
            t.update_time_for_entry(&key(9), 5).unwrap_err(),
            Error::KeyNotFound
        );
    }

    #[test]
    fn reassignment_moves_between_heaps() {
        let mut t = TimedTable::new(config(8, &[100, 1])).unwrap();
        t.insert(&key(1), 0).unwrap();
        t.insert(&key(2), 0).unwrap();
        t.set_timeout_slot(&key(1), 0).unwrap(); // deadline 100
        t.set_timeout_slot(&key(2), 0).unwrap(); // deadline 100

        // moving key 1 to the fast class makes it the next timeout
        t.set_timeout_slot(&key(1), 1).unwrap(); // deadline 1
        let next = t.next_timeout_entry().unwrap();
        assert_eq!(next.key, &key(1));

        // and moving it back restores key ordering by class interval
        t.set_timeout_slot(&key(1), 0).unwrap();
        t.set_timeout_slot(&key(2), 1).unwrap();
        let next = t.next_timeout_entry().unwrap();
        assert_eq!(next.key, &key(2));
    }

    #[test]
    fn update_time_rekeys_assigned_entries() {
        let mut t = TimedTable::new(config(8, &[100])).unwrap();
        t.insert(&key(1), 0).unwrap();
        t.insert(&key(2), 50).unwrap();
        t.set_timeout_slot(&key(1), 0).unwrap(); // deadline 100
        t.set_timeout_slot(&key(2), 0).unwrap(); // deadline 150

        assert_eq!(t.next_timeout_entry().unwrap().key, &key(1));

        // pushing key 1 far into the future flips the order
        t.update_time_for_entry(&key(1), 1000).unwrap();
        assert_eq!(t.next_timeout_entry().unwrap().key, &key(2));

        // updating an unassigned entry only rewrites its timestamp
        t.insert(&key(3), 0).unwrap();
        t.update_time_for_entry(&key(3), 5).unwrap();
        assert_eq!(t.next_timeout_entry().unwrap().key, &key(2));
    }

    #[test]
    fn remove_detaches_from_heap() {
        let mut t = TimedTable::new(config(8, &[10, 20])).unwrap();
        t.insert(&key(1), 0).unwrap();
        t.insert(&key(2), 0).unwrap();
        t.set_timeout_slot(&key(1), 0).unwrap(); // deadline 10
        t.set_timeout_slot(&key(2), 1).unwrap(); // deadline 20

        assert!(t.remove(&key(1)).is_some());
        let next = t.next_timeout_entry().unwrap();
        assert_eq!(next.key, &key(2));

        assert!(t.remove(&key(2)).is_some());
        assert!(t.next_timeout_entry().is_none());
    }

    #[test]
    fn ties_resolve_to_the_first_class() {
        let mut t = TimedTable::new(config(8, &[50, 50])).unwrap();
        t.insert(&key(1), 0).unwrap();
        t.insert(&key(2), 0).unwrap();
        t.set_timeout_slot(&key(2), 1).unwrap();
        t.set_timeout_slot(&key(1), 0).unwrap();

        // both deadlines are 50; class 0 wins
        assert_eq!(t.next_timeout_entry().unwrap().key, &key(1));
    }
}
