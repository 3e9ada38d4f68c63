//! Linear-probing open-addressing hash table with stable value slots.
//!
//! Keys and values are opaque byte blobs of a size fixed at
//! construction. Every key slot records how far its entry probed from
//! its home position; deletion uses that cached distance to relocate a
//! displaced entry into the vacated slot and then backward-shifts the
//! rest of the probe run, so a probe chain never contains a hole.
//! Value payloads live in a parallel arena and never move, which keeps
//! the [`ValueRef`] handed out on insert valid until the entry is
//! removed (or the table grows).

use crate::arena::{ValueArena, ValueRef};
use crate::error::Error;
use crate::hash::KeyHasher;

/// Configuration for [`ProbingTable::new`].
#[derive(Clone, Debug)]
pub struct TableConfig {
    /// Fraction of slots allowed to hold entries, in `(0.0, 1.0)`.
    /// Lower values trade memory for shorter probe chains.
    pub load_factor: f64,
    /// Key size in bytes, non-zero.
    pub key_size: usize,
    /// Value payload size in bytes, non-zero.
    pub value_size: usize,
    /// Maximum number of entries.
    pub max_elems: u32,
    /// Grow (doubling `max_elems`) instead of failing a full insert.
    pub resizable: bool,
}

/// Usage counters reported by [`ProbingTable::status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableStatus {
    pub max_elems: u32,
    pub elems_in_use: u32,
    pub value_slot_size: usize,
}

/// Borrowed key/value pair yielded by drains and timeout queries.
#[derive(Debug)]
pub struct KeyValuePair<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
}

#[derive(Clone, Copy, Default, Debug)]
struct KeySlot {
    /// Arena index of the value slot this entry owns.
    value: u32,
    /// Probe distance from the key's home slot.
    offset: u32,
    occupied: bool,
}

#[derive(Debug)]
pub struct ProbingTable {
    hasher: KeyHasher,
    slots: Box<[KeySlot]>,
    /// Key bytes, `key_size` per slot, parallel to `slots`.
    keys: Box<[u8]>,
    values: ValueArena,
    key_size: usize,
    value_size: usize,
    /// Allocated slot count `M`; always larger than `max_elems`, so a
    /// probe chain always ends in an unoccupied slot.
    num_slots: u32,
    elems: u32,
    max_elems: u32,
    load_factor: f64,
    resizable: bool,
    drain_mode: bool,
    drain_cursor: u32,
}

impl ProbingTable {
    pub fn new(config: TableConfig) -> Result<Self, Error> {
        if !(config.load_factor > 0.0 && config.load_factor < 1.0) {
            return Err(Error::InvalidLoadFactor);
        }
        if config.key_size == 0 {
            return Err(Error::ZeroKeySize);
        }
        if config.value_size == 0 {
            return Err(Error::ZeroValueSize);
        }
        if config.max_elems == 0 {
            return Err(Error::ZeroCapacity);
        }

        let num_slots = (f64::from(config.max_elems) / config.load_factor).ceil() as u64 + 1;
        if num_slots > u64::from(u32::MAX) {
            return Err(Error::CapacityOverflow);
        }
        let num_slots = num_slots as u32;
        let key_bytes = (num_slots as usize)
            .checked_mul(config.key_size)
            .ok_or(Error::CapacityOverflow)?;
        (num_slots as usize)
            .checked_mul(config.value_size)
            .ok_or(Error::CapacityOverflow)?;

        Ok(Self {
            hasher: KeyHasher::new(),
            slots: vec![KeySlot::default(); num_slots as usize].into_boxed_slice(),
            keys: vec![0u8; key_bytes].into_boxed_slice(),
            values: ValueArena::new(num_slots, config.value_size),
            key_size: config.key_size,
            value_size: config.value_size,
            num_slots,
            elems: 0,
            max_elems: config.max_elems,
            load_factor: config.load_factor,
            resizable: config.resizable,
            drain_mode: false,
            drain_cursor: 0,
        })
    }

    /// Walk the probe chain from the key's home slot. Terminates at the
    /// first unoccupied slot; an occupied run never hides a hole.
    pub fn look_up(&self, key: &[u8]) -> Option<ValueRef> {
        debug_assert_eq!(key.len(), self.key_size);
        let mut i = self.home(self.hasher.hash(key));
        while self.slots[i as usize].occupied {
            if self.key_at(i) == key {
                return Some(ValueRef(self.slots[i as usize].value));
            }
            i = self.next_index(i);
        }
        None
    }

    /// Insert `key` and return its value slot. A key that is already
    /// present is returned untouched. A full table grows when the
    /// config allows it and fails with [`Error::CapacityExhausted`]
    /// otherwise; the capacity check runs before the duplicate probe.
    pub fn insert(&mut self, key: &[u8]) -> Result<ValueRef, Error> {
        debug_assert_eq!(key.len(), self.key_size);
        if self.elems >= self.max_elems {
            if !self.resizable {
                return Err(Error::CapacityExhausted);
            }
            self.grow()?;
        }

        let mut i = self.home(self.hasher.hash(key));
        let mut offset = 0u32;
        while self.slots[i as usize].occupied {
            if self.key_at(i) == key {
                return Ok(ValueRef(self.slots[i as usize].value));
            }
            i = self.next_index(i);
            offset += 1;
        }

        self.write_key(i, key);
        let slot = &mut self.slots[i as usize];
        slot.offset = offset;
        slot.occupied = true;
        self.elems += 1;
        Ok(ValueRef(slot.value))
    }

    /// Remove `key`, returning its (still readable) value slot, or
    /// `None` when absent. Refs held for other entries stay valid.
    pub fn remove(&mut self, key: &[u8]) -> Option<ValueRef> {
        debug_assert_eq!(key.len(), self.key_size);

        // 1. locate the slot holding the key
        let mut current = self.home(self.hasher.hash(key));
        let mut found = None;
        while self.slots[current as usize].occupied {
            if self.key_at(current) == key {
                found = Some(current);
                break;
            }
            current = self.next_index(current);
        }
        let to_remove = found?;

        // 2. scan the rest of the run for a displaced entry whose probe
        // distance says it came through the vacated slot
        let start_offset = self.slots[to_remove as usize].offset;
        let mut collision = None;
        let mut i = 0u32;
        let mut cur = self.next_index(to_remove);
        while self.slots[cur as usize].occupied {
            i += 1;
            if self.slots[cur as usize].offset == start_offset + i {
                collision = Some(cur);
                break;
            }
            cur = self.next_index(cur);
        }

        let removed = ValueRef(self.slots[to_remove as usize].value);
        match collision {
            Some(col) => {
                // pull the collision into the vacated slot, then shift
                // the rest of the run up from the hole it left behind
                self.swap_slot_values(to_remove, col);
                self.copy_key(to_remove, col);
                let slot = &mut self.slots[col as usize];
                slot.occupied = false;
                slot.offset = 0;
                self.probify(col, 0);
            }
            None => {
                let slot = &mut self.slots[to_remove as usize];
                slot.occupied = false;
                slot.offset = 0;
                self.probify(to_remove, 0);
            }
        }

        self.elems -= 1;
        Some(removed)
    }

    /// Resolve a value slot back to its key bytes, O(1).
    pub fn key_of(&self, r: ValueRef) -> &[u8] {
        let slot = self.values.back(r);
        debug_assert!(self.slots[slot as usize].occupied);
        debug_assert_eq!(self.slots[slot as usize].value, r.0);
        self.key_at(slot)
    }

    #[inline]
    pub fn value(&self, r: ValueRef) -> &[u8] {
        self.values.value(r)
    }

    #[inline]
    pub fn value_mut(&mut self, r: ValueRef) -> &mut [u8] {
        self.values.value_mut(r)
    }

    /// Enter drain mode with the cursor at slot 0. No-op while a drain
    /// is already in progress.
    pub fn clear(&mut self) {
        if !self.drain_mode {
            self.drain_mode = true;
            self.drain_cursor = 0;
        }
    }

    /// Yield the next occupied entry, or `None` once the cursor has
    /// swept the whole table (or no drain was started). This is the
    /// only way to enumerate entries.
    pub fn next_element_to_remove(&mut self) -> Option<KeyValuePair<'_>> {
        if !self.drain_mode {
            return None;
        }
        while self.drain_cursor < self.num_slots {
            let i = self.drain_cursor;
            self.drain_cursor += 1;
            if self.slots[i as usize].occupied {
                let value = ValueRef(self.slots[i as usize].value);
                return Some(KeyValuePair {
                    key: self.key_at(i),
                    value: self.values.value(value),
                });
            }
        }
        None
    }

    pub fn status(&self) -> TableStatus {
        TableStatus {
            max_elems: self.max_elems,
            elems_in_use: self.elems,
            value_slot_size: self.values.slot_size(),
        }
    }

    /// Rebuild into a table with doubled capacity: drain this table and
    /// re-insert every entry, copying its value payload, then let the
    /// rebuilt table take over. All previously returned refs are
    /// reassigned.
    fn grow(&mut self) -> Result<(), Error> {
        let doubled = self.max_elems.checked_mul(2).ok_or(Error::CapacityOverflow)?;
        let mut next = ProbingTable::new(TableConfig {
            load_factor: self.load_factor,
            key_size: self.key_size,
            value_size: self.value_size,
            max_elems: doubled,
            resizable: true,
        })?;

        // full drain, even if a caller-driven drain was in progress
        self.drain_mode = true;
        self.drain_cursor = 0;
        while let Some(pair) = self.next_element_to_remove() {
            let r = next.insert(pair.key)?;
            next.value_mut(r).copy_from_slice(pair.value);
        }
        *self = next;
        Ok(())
    }

    /// Backward-shift pass restoring the probe invariants after `start`
    /// was vacated; `offset` is the probe distance the vacated entry
    /// had. Each round moves the first sufficiently displaced entry of
    /// the remaining run up into the hole and continues from the slot
    /// that entry left, so every entry lands strictly closer to its
    /// home and the walk ends at the first unoccupied slot.
    fn probify(&mut self, mut start: u32, mut offset: u32) {
        let mut i = 0u32;
        let mut bucket = start;
        loop {
            offset += 1;
            i += 1;
            bucket = self.next_index(bucket);
            let b = self.slots[bucket as usize];
            if b.offset >= offset || b.offset >= i {
                // probed at least `i` slots, so moving it up by `i`
                // keeps its offset consistent and closes the hole
                self.swap_slot_values(start, bucket);
                self.copy_key(start, bucket);
                self.slots[start as usize].offset = b.offset - i;
                self.slots[start as usize].occupied = true;
                self.slots[bucket as usize].occupied = false;
                self.slots[bucket as usize].offset = 0;
                start = bucket;
                i = 0;
                continue;
            }
            if !self.slots[bucket as usize].occupied {
                break;
            }
        }
    }

    /// Exchange the value slots of two key slots, keeping both
    /// back-references correct.
    fn swap_slot_values(&mut self, a: u32, b: u32) {
        let va = self.slots[a as usize].value;
        let vb = self.slots[b as usize].value;
        self.slots[a as usize].value = vb;
        self.slots[b as usize].value = va;
        self.values.set_back(ValueRef(vb), a);
        self.values.set_back(ValueRef(va), b);
    }

    #[inline]
    fn home(&self, hash: u64) -> u32 {
        (hash % u64::from(self.num_slots)) as u32
    }

    #[inline]
    fn next_index(&self, i: u32) -> u32 {
        if i + 1 == self.num_slots {
            0
        } else {
            i + 1
        }
    }

    #[inline]
    fn key_at(&self, slot: u32) -> &[u8] {
        let start = slot as usize * self.key_size;
        &self.keys[start..start + self.key_size]
    }

    fn write_key(&mut self, slot: u32, key: &[u8]) {
        let start = slot as usize * self.key_size;
        self.keys[start..start + self.key_size].copy_from_slice(key);
    }

    fn copy_key(&mut self, dst: u32, src: u32) {
        let d = dst as usize * self.key_size;
        let s = src as usize * self.key_size;
        self.keys.copy_within(s..s + self.key_size, d);
    }

    /// Whole-table structural check used by the tests.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let mut occupied = 0u32;
        for i in 0..self.num_slots {
            let slot = self.slots[i as usize];
            if !slot.occupied {
                continue;
            }
            occupied += 1;
            // cached probe offset matches the distance from home
            let home = self.home(self.hasher.hash(self.key_at(i)));
            let dist = ((u64::from(i) + u64::from(self.num_slots) - u64::from(home))
                % u64::from(self.num_slots)) as u32;
            assert_eq!(slot.offset, dist, "probe offset drifted at slot {i}");
            // no hole directly behind a displaced entry
            if slot.offset > 0 {
                let prev = if i == 0 { self.num_slots - 1 } else { i - 1 };
                assert!(
                    self.slots[prev as usize].occupied,
                    "hole in probe run before slot {i}"
                );
            }
            // bidirectional value linkage
            assert_eq!(self.values.back(ValueRef(slot.value)), i);
        }
        assert_eq!(occupied, self.elems);
    }
}
