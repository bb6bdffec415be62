//! Fixed-capacity open-addressing hash map with lock-free insert and find.
//!
//! Keys are packed into a `u64` and claimed with a single CAS, so `insert` and
//! `find` may run concurrently with each other. `delete` takes `&mut self` and
//! so never overlaps them. The table does not grow: it is sized once for the
//! largest number of keys it will hold.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering::SeqCst};

use crate::error::{Error, Result};
use crate::random::hash64;

const EMPTY_KEY: u64 = u64::MAX;
const TOMBSTONE: u64 = u64::MAX - 1;

/// Key that packs losslessly into a `u64` other than the two top values.
pub trait PackedKey: Copy {
    fn pack(self) -> u64;
    fn unpack(packed: u64) -> Self;
}

impl PackedKey for u32 {
    fn pack(self) -> u64 {
        self as u64
    }
    fn unpack(packed: u64) -> Self {
        packed as u32
    }
}

/// Pairs of `u32`, with both halves below `u32::MAX`.
impl PackedKey for (u32, u32) {
    fn pack(self) -> u64 {
        debug_assert!(self.0 != u32::MAX && self.1 != u32::MAX);
        ((self.0 as u64) << 32) | self.1 as u64
    }
    fn unpack(packed: u64) -> Self {
        ((packed >> 32) as u32, packed as u32)
    }
}

struct Slot {
    key: AtomicU64,
    value: AtomicUsize,
}

pub struct ConcurrentMap<K> {
    slots: Box<[Slot]>,
    mask: usize,
    len: AtomicUsize,
    _key: PhantomData<K>,
}

impl<K: PackedKey + std::fmt::Debug> std::fmt::Debug for ConcurrentMap<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: PackedKey> ConcurrentMap<K> {
    /// Table able to hold `max_keys` keys with a load factor below 1/1.1.
    pub fn new(max_keys: usize) -> Self {
        let capacity = (100 + max_keys + max_keys / 10).next_power_of_two();
        let slots = (0..capacity)
            .map(|_| Slot {
                key: AtomicU64::new(EMPTY_KEY),
                value: AtomicUsize::new(0),
            })
            .collect();
        Self {
            slots,
            mask: capacity - 1,
            len: AtomicUsize::new(0),
            _key: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
    pub fn len(&self) -> usize {
        self.len.load(SeqCst)
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn first_slot(&self, packed: u64) -> usize {
        hash64(packed) as usize & self.mask
    }

    /// Inserts `key -> value`. Returns `Ok(false)` without overwriting if the key
    /// is already present.
    pub fn insert(&self, key: K, value: usize) -> Result<bool> {
        let packed = key.pack();
        'probe: loop {
            let mut i = self.first_slot(packed);
            let mut target = None;
            for _ in 0..self.slots.len() {
                match self.slots[i].key.load(SeqCst) {
                    k if k == packed => return Ok(false),
                    TOMBSTONE => {
                        // The key may still be further along; keep probing.
                        target.get_or_insert((i, TOMBSTONE));
                    }
                    EMPTY_KEY => {
                        target.get_or_insert((i, EMPTY_KEY));
                        break;
                    }
                    _ => {}
                }
                i = (i + 1) & self.mask;
            }
            let Some((slot, expected)) = target else {
                return Err(Error::MapFull {
                    capacity: self.capacity(),
                });
            };
            let slot = &self.slots[slot];
            if slot
                .key
                .compare_exchange(expected, packed, SeqCst, SeqCst)
                .is_err()
            {
                // Someone took the slot, maybe with this very key.
                continue 'probe;
            }
            slot.value.store(value, SeqCst);
            self.len.fetch_add(1, SeqCst);
            return Ok(true);
        }
    }

    fn position(&self, packed: u64) -> Option<usize> {
        let mut i = self.first_slot(packed);
        for _ in 0..self.slots.len() {
            match self.slots[i].key.load(SeqCst) {
                k if k == packed => return Some(i),
                EMPTY_KEY => return None,
                _ => {}
            }
            i = (i + 1) & self.mask;
        }
        None
    }

    pub fn find(&self, key: K) -> Option<usize> {
        self.position(key.pack())
            .map(|i| self.slots[i].value.load(SeqCst))
    }

    pub fn contains(&self, key: K) -> bool {
        self.position(key.pack()).is_some()
    }

    /// Removes `key`, returning whether it was present.
    pub fn delete(&mut self, key: K) -> bool {
        let Some(i) = self.position(key.pack()) else {
            return false;
        };
        self.len.fetch_sub(1, SeqCst);
        let next = (i + 1) & self.mask;
        if self.slots[next].key.load(SeqCst) != EMPTY_KEY {
            self.slots[i].key.store(TOMBSTONE, SeqCst);
            return true;
        }
        // End of a probe chain: the tombstones right before it are dead too.
        let mut j = i;
        loop {
            self.slots[j].key.store(EMPTY_KEY, SeqCst);
            j = j.wrapping_sub(1) & self.mask;
            if j == i || self.slots[j].key.load(SeqCst) != TOMBSTONE {
                break;
            }
        }
        true
    }

    /// Present entries, in table order.
    pub fn iter(&self) -> impl Iterator<Item = (K, usize)> + '_ {
        self.slots.iter().filter_map(|s| match s.key.load(SeqCst) {
            EMPTY_KEY | TOMBSTONE => None,
            k => Some((K::unpack(k), s.value.load(SeqCst))),
        })
    }
}
