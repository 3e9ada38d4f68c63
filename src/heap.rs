//! Array-backed binary min-heap with stable payload slots.
//!
//! Heap order is maintained by swapping `(key, value-slot)` pairs; the
//! payload bytes themselves never move, so the [`ValueRef`] returned by
//! [`MinHeap::insert`] keeps identifying the same entry through any
//! number of sifts. Each value slot points back at the heap slot that
//! currently owns it, which is what lets [`MinHeap::change_key`] find
//! an entry in O(1) and re-key it in O(log n) without a re-insert.

use crate::arena::{ValueArena, ValueRef};
use crate::error::Error;

/// Configuration for [`MinHeap::new`].
#[derive(Clone, Debug)]
pub struct HeapConfig {
    /// Payload bytes per entry. Zero is allowed: entries then carry
    /// identity only.
    pub value_size: usize,
    /// Fixed capacity; the heap never grows.
    pub max_elems: u32,
    /// Reserved; resizing is not implemented.
    pub resizable: bool,
}

#[derive(Clone, Copy, Default, Debug)]
struct HeapSlot {
    key: i64,
    /// Arena index of the value slot this entry owns.
    value: u32,
}

#[inline]
fn parent(i: usize) -> usize {
    (i - 1) / 2
}

#[inline]
fn left(i: usize) -> usize {
    2 * i + 1
}

#[inline]
fn right(i: usize) -> usize {
    2 * i + 2
}

#[derive(Debug)]
pub struct MinHeap {
    slots: Box<[HeapSlot]>,
    values: ValueArena,
    elems: u32,
    max_elems: u32,
}

impl MinHeap {
    pub fn new(config: HeapConfig) -> Result<Self, Error> {
        if config.max_elems == 0 {
            return Err(Error::ZeroCapacity);
        }
        (config.max_elems as usize)
            .checked_mul(config.value_size)
            .ok_or(Error::CapacityOverflow)?;

        let mut slots = vec![HeapSlot::default(); config.max_elems as usize].into_boxed_slice();
        // wire heap slot i to value slot i; swaps keep the linkage
        for (i, slot) in slots.iter_mut().enumerate() {
            slot.value = i as u32;
        }

        Ok(Self {
            slots,
            values: ValueArena::new(config.max_elems, config.value_size),
            elems: 0,
            max_elems: config.max_elems,
        })
    }

    pub fn len(&self) -> u32 {
        self.elems
    }

    pub fn is_empty(&self) -> bool {
        self.elems == 0
    }

    /// Place `key` and sift it up. The returned ref is fixed for the
    /// entry's whole lifetime, however far the entry travels.
    pub fn insert(&mut self, key: i64) -> Result<ValueRef, Error> {
        if self.elems >= self.max_elems {
            return Err(Error::CapacityExhausted);
        }

        let mut i = self.elems as usize;
        self.slots[i].key = key;
        while i != 0 && self.slots[parent(i)].key > self.slots[i].key {
            self.swap_slots(i, parent(i));
            i = parent(i);
        }

        self.elems += 1;
        Ok(ValueRef(self.slots[i].value))
    }

    /// Smallest key currently stored, `None` on an empty heap.
    pub fn find_min(&self) -> Option<i64> {
        if self.elems == 0 {
            None
        } else {
            Some(self.slots[0].key)
        }
    }

    /// Smallest entry without popping it.
    pub fn peek_min(&self) -> Option<(i64, ValueRef)> {
        if self.elems == 0 {
            None
        } else {
            Some((self.slots[0].key, ValueRef(self.slots[0].value)))
        }
    }

    /// Pop the smallest entry. The returned slot's bytes stay readable
    /// until an insert reuses the slot.
    pub fn delete_min(&mut self) -> Option<ValueRef> {
        match self.elems {
            0 => None,
            1 => {
                self.elems = 0;
                Some(ValueRef(self.slots[0].value))
            }
            _ => {
                self.elems -= 1;
                let last = self.elems as usize;
                self.swap_slots(0, last);
                self.sift_down(0);
                Some(ValueRef(self.slots[last].value))
            }
        }
    }

    /// Re-key the entry owning `value` and restore heap order around
    /// it: decreased keys sift up, increased keys sift down, an
    /// unchanged key moves nothing. Returns the new key.
    ///
    /// `value` must have been produced by this heap and still be live;
    /// the linkage is asserted in debug builds.
    pub fn change_key(&mut self, value: ValueRef, new_key: i64) -> i64 {
        let mut i = self.values.back(value) as usize;
        debug_assert!(i < self.elems as usize);
        debug_assert_eq!(self.slots[i].value, value.0);

        let old_key = self.slots[i].key;
        self.slots[i].key = new_key;
        if new_key < old_key {
            while i != 0 && self.slots[parent(i)].key > self.slots[i].key {
                self.swap_slots(i, parent(i));
                i = parent(i);
            }
        } else if new_key > old_key {
            self.sift_down(i);
        }
        new_key
    }

    #[inline]
    pub fn value(&self, r: ValueRef) -> &[u8] {
        self.values.value(r)
    }

    #[inline]
    pub fn value_mut(&mut self, r: ValueRef) -> &mut [u8] {
        self.values.value_mut(r)
    }

    /// Walk `i` down, always following the chosen (smaller) child;
    /// ties go left.
    fn sift_down(&mut self, mut i: usize) {
        let elems = self.elems as usize;
        loop {
            let l = left(i);
            let r = right(i);
            let mut smallest = i;
            if l < elems && self.slots[l].key < self.slots[smallest].key {
                smallest = l;
            }
            if r < elems && self.slots[r].key < self.slots[smallest].key {
                smallest = r;
            }
            if smallest == i {
                break;
            }
            self.swap_slots(i, smallest);
            i = smallest;
        }
    }

    /// Swap two heap slots, keeping both value back-references correct.
    fn swap_slots(&mut self, a: usize, b: usize) {
        self.values.set_back(ValueRef(self.slots[a].value), b as u32);
        self.values.set_back(ValueRef(self.slots[b].value), a as u32);
        self.slots.swap(a, b);
    }

    /// Heap order plus back-reference consistency, used by the tests.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        for i in 1..self.elems as usize {
            assert!(
                self.slots[parent(i)].key <= self.slots[i].key,
                "heap order broken at {i}"
            );
        }
        for i in 0..self.elems as usize {
            assert_eq!(self.values.back(ValueRef(self.slots[i].value)), i as u32);
        }
    }
}
