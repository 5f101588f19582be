// Copyright 2019-2022 Clemens Lutz
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The open-addressed `(key, payload)` hash table shape shared by CPU
//! build/probe (§3's "Hash table (per join)"): `2 * num_slots` integers,
//! hashed by `h(k) = (k - key_min) mod num_slots`. Zero is the empty
//! sentinel in both cells; dimensions may not contain key zero.

use ssb_runtime::launchable::{LaunchableMutPtr, LaunchablePtr};
use ssb_runtime::memory::Mem;
use std::sync::atomic::{AtomicI64, Ordering};

pub struct HashTable {
    slots: Vec<AtomicI64>,
    num_slots: usize,
    key_min: i32,
}

impl HashTable {
    pub fn new(num_slots: usize, key_min: i32) -> Self {
        let mut slots = Vec::with_capacity(num_slots * 2);
        slots.resize_with(num_slots * 2, || AtomicI64::new(0));
        HashTable { slots, num_slots, key_min }
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn hash(&self, key: i32) -> usize {
        (key - self.key_min).rem_euclid(self.num_slots as i32) as usize
    }

    /// Claims the slot for `key` if unclaimed (the CPU counterpart of
    /// `atomicCAS(slot.key, 0, key)`), then writes `payload`. Contention
    /// only occurs on duplicate keys, which dimensions are assumed not to
    /// contain; the last writer for a duplicate wins the payload cell.
    pub fn insert(&self, key: i32, payload: i64) {
        debug_assert!(key != 0, "dimensions may not contain key zero");
        let h = self.hash(key);
        let _ = self.slots[h * 2].compare_exchange(0, key as i64, Ordering::SeqCst, Ordering::SeqCst);
        self.slots[h * 2 + 1].store(payload, Ordering::SeqCst);
    }

    /// Looks up `key`; returns its payload if the slot's key matches
    /// (probe-for-offset or probe-for-group-by alike), or `None` if the
    /// slot is empty or holds a different key (never happens when
    /// `num_slots >= cardinality`, but a mismatched key would mean a
    /// bug upstream rather than an absent row).
    pub fn probe(&self, key: i32) -> Option<i64> {
        let h = self.hash(key);
        let slot_key = self.slots[h * 2].load(Ordering::SeqCst);
        if slot_key == 0 || slot_key as i32 != key {
            None
        } else {
            Some(self.slots[h * 2 + 1].load(Ordering::SeqCst))
        }
    }

    /// The raw key held at `key`'s slot, for uniqueness checks (S6:
    /// `ht[hash(k) << 1] == k` for every key present).
    pub fn slot_key(&self, key: i32) -> i64 {
        self.slots[self.hash(key) * 2].load(Ordering::SeqCst)
    }
}

/// The device-resident counterpart of [`HashTable`]: the same `2 *
/// num_slots` layout (`cuda/hash_build.cu`'s `long long *hash_table`),
/// but populated by a kernel launch instead of atomic CPU inserts, so it
/// has no `insert`/`probe` methods of its own.
pub struct GpuHashTable {
    mem: Mem<i64>,
    num_slots: usize,
    key_min: i32,
}

impl GpuHashTable {
    /// `mem` must already be zeroed (zero is the empty-slot sentinel) and
    /// sized to exactly `2 * num_slots` elements.
    pub fn new(mem: Mem<i64>, num_slots: usize, key_min: i32) -> Self {
        assert_eq!(mem.len(), num_slots * 2, "GPU hash table storage must be sized to 2 * num_slots");
        GpuHashTable { mem, num_slots, key_min }
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn key_min(&self) -> i32 {
        self.key_min
    }

    pub fn as_launchable_ptr(&self) -> LaunchablePtr<i64> {
        self.mem.as_launchable_ptr()
    }

    pub fn as_launchable_mut_ptr(&mut self) -> LaunchableMutPtr<i64> {
        self.mem.as_launchable_mut_ptr()
    }
}

/// A build/probe hash table living on whichever device its class pipeline
/// chose, so the dispatcher can thread one reference through CPU/GPU
/// dispatch without the caller re-deriving which variant applies.
pub enum AnyHashTable<'a> {
    Cpu(&'a HashTable),
    Gpu(&'a GpuHashTable),
}

/// Like [`AnyHashTable`], but for the build stage: the GPU variant needs a
/// mutable borrow since building writes into it, while the CPU variant
/// only ever needs `&HashTable` (its inserts go through interior
/// atomics).
pub enum AnyHashTableMut<'a> {
    Cpu(&'a HashTable),
    Gpu(&'a mut GpuHashTable),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_hash_table_reports_its_shape() {
        let table = GpuHashTable::new(Mem::SysMem(vec![0i64; 32]), 16, 100);
        assert_eq!(table.num_slots(), 16);
        assert_eq!(table.key_min(), 100);
    }

    #[test]
    fn insert_then_probe_round_trips_payload() {
        let table = HashTable::new(16, 100);
        table.insert(105, 42);
        assert_eq!(table.probe(105), Some(42));
        assert_eq!(table.probe(106), None);
    }

    #[test]
    fn slot_key_matches_inserted_key() {
        let table = HashTable::new(16, 100);
        table.insert(109, 7);
        assert_eq!(table.slot_key(109), 109);
    }
}
