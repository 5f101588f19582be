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

//! The group-by accumulator (§3): `G` rows of four group keys plus a
//! 64-bit running sum, addressed by the dense hash `h = sum_i (key_i -
//! min_i) * stride_i mod total_val`. The caller (the orchestrator) picks
//! `(mins, strides, total_val)` per query from dimension cardinality so
//! that distinct key tuples never collide for that query's output size;
//! this type only implements the addressing and the atomic add.

use rustacuda::memory::CopyDestination;
use ssb_runtime::launchable::LaunchableMutPtr;
use ssb_runtime::memory::Mem;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};

pub const MAX_GROUP_KEYS: usize = 4;

/// Cells per row of [`GpuGroupByAccumulator`]'s flat layout (`cuda/group_by.cu`'s
/// `ACC_STRIDE`): four group keys, the running sum, and a touched flag.
/// Exported so a caller sizing the backing `Mem` before calling
/// [`GpuGroupByAccumulator::new`] doesn't have to re-derive the layout.
pub const GPU_ACC_STRIDE: usize = 6;

struct Row {
    keys: [AtomicI32; MAX_GROUP_KEYS],
    touched: AtomicI32,
    sum: AtomicI64,
}

pub struct GroupByAccumulator {
    rows: Vec<Row>,
    mins: [i32; MAX_GROUP_KEYS],
    strides: [i64; MAX_GROUP_KEYS],
    total_val: i64,
}

impl GroupByAccumulator {
    pub fn new(total_val: i64, mins: [i32; MAX_GROUP_KEYS], strides: [i64; MAX_GROUP_KEYS]) -> Self {
        let mut rows = Vec::with_capacity(total_val as usize);
        rows.resize_with(total_val as usize, || Row {
            keys: [AtomicI32::new(0), AtomicI32::new(0), AtomicI32::new(0), AtomicI32::new(0)],
            touched: AtomicI32::new(0),
            sum: AtomicI64::new(0),
        });
        GroupByAccumulator { rows, mins, strides, total_val }
    }

    pub fn hash(&self, keys: [i32; MAX_GROUP_KEYS]) -> usize {
        let mut h: i64 = 0;
        for i in 0..MAX_GROUP_KEYS {
            h += (keys[i] - self.mins[i]) as i64 * self.strides[i];
        }
        (h.rem_euclid(self.total_val)) as usize
    }

    /// Adds `value` into the row for `keys`, writing the keys on first
    /// touch. Safe to call concurrently from every placement class's
    /// pipeline: the sum is a genuine atomic add, and every writer for a
    /// given hash computes the same key tuple by construction, so the
    /// idempotent key write needs no synchronisation beyond that.
    pub fn add(&self, keys: [i32; MAX_GROUP_KEYS], value: i64) {
        let h = self.hash(keys);
        let row = &self.rows[h];
        if row.touched.swap(1, Ordering::SeqCst) == 0 {
            for i in 0..MAX_GROUP_KEYS {
                row.keys[i].store(keys[i], Ordering::SeqCst);
            }
        }
        row.sum.fetch_add(value, Ordering::SeqCst);
    }

    /// Combines another accumulator's rows into `self` by key-wise
    /// addition (§4.5 step 5's device-to-host reduction). Both
    /// accumulators must share the same `(mins, strides, total_val)`.
    pub fn merge(&self, other: &GroupByAccumulator) {
        for (dst, src) in self.rows.iter().zip(other.rows.iter()) {
            if src.touched.load(Ordering::SeqCst) == 0 {
                continue;
            }
            if dst.touched.swap(1, Ordering::SeqCst) == 0 {
                for i in 0..MAX_GROUP_KEYS {
                    dst.keys[i].store(src.keys[i].load(Ordering::SeqCst), Ordering::SeqCst);
                }
            }
            dst.sum.fetch_add(src.sum.load(Ordering::SeqCst), Ordering::SeqCst);
        }
    }

    /// Enumerates every non-empty row as `(key1, key2, key3, key4, sum)`,
    /// in hash-table order (§6's result contract).
    pub fn rows(&self) -> Vec<(i32, i32, i32, i32, i64)> {
        self.rows
            .iter()
            .filter(|r| r.touched.load(Ordering::SeqCst) != 0)
            .map(|r| {
                (
                    r.keys[0].load(Ordering::SeqCst),
                    r.keys[1].load(Ordering::SeqCst),
                    r.keys[2].load(Ordering::SeqCst),
                    r.keys[3].load(Ordering::SeqCst),
                    r.sum.load(Ordering::SeqCst),
                )
            })
            .collect()
    }
}

/// The device-resident counterpart of [`GroupByAccumulator`]: `total_val`
/// rows of `ACC_STRIDE` i64 cells (`cuda/group_by.cu`'s flat `long long
/// *accumulator`), written by `group_by_kernel`'s per-row `atomicAdd`
/// instead of this type's atomics. Reduced into a host
/// [`GroupByAccumulator`] after all classes finish (§4.5 step 5) via
/// [`GpuGroupByAccumulator::reduce_into`]. Carries the same `(mins,
/// strides, total_val)` as the host accumulator it will be reduced into,
/// so the two address the same hash domain.
pub struct GpuGroupByAccumulator {
    mem: Mem<i64>,
    mins: [i32; MAX_GROUP_KEYS],
    strides: [i64; MAX_GROUP_KEYS],
    total_val: i64,
}

impl GpuGroupByAccumulator {
    /// `mem` must already be zeroed and sized to `total_val * ACC_STRIDE`.
    pub fn new(mem: Mem<i64>, total_val: i64, mins: [i32; MAX_GROUP_KEYS], strides: [i64; MAX_GROUP_KEYS]) -> Self {
        assert_eq!(mem.len(), total_val as usize * GPU_ACC_STRIDE, "GPU accumulator storage must be sized to total_val * ACC_STRIDE");
        GpuGroupByAccumulator { mem, mins, strides, total_val }
    }

    pub fn total_val(&self) -> i64 {
        self.total_val
    }

    pub fn mins(&self) -> [i32; MAX_GROUP_KEYS] {
        self.mins
    }

    pub fn strides(&self) -> [i64; MAX_GROUP_KEYS] {
        self.strides
    }

    pub fn as_launchable_mut_ptr(&mut self) -> LaunchableMutPtr<i64> {
        self.mem.as_launchable_mut_ptr()
    }

    /// Reads this accumulator's rows back to the host as a flat
    /// `total_val * ACC_STRIDE` buffer. A plain clone for the
    /// host-reachable variants; an explicit `cudaMemcpy` for `CudaDevMem`.
    pub fn copy_to_host(&self) -> ssb_runtime::error::Result<Vec<i64>> {
        Ok(match &self.mem {
            Mem::SysMem(v) => v.clone(),
            Mem::CudaPinnedMem(v) => v.as_slice().to_vec(),
            Mem::CudaUniMem(v) => v.as_slice().to_vec(),
            Mem::CudaDevMem(v) => {
                let mut host = vec![0i64; v.len()];
                v.copy_to(&mut host)?;
                host
            }
        })
    }

    /// Folds every touched row of this device accumulator into `host`,
    /// key-wise (the same operation [`GroupByAccumulator::merge`] performs
    /// between two host accumulators), copying device memory back first
    /// when needed.
    pub fn reduce_into(&self, host: &GroupByAccumulator) -> ssb_runtime::error::Result<()> {
        let rows = self.copy_to_host()?;
        for row in rows.chunks_exact(GPU_ACC_STRIDE) {
            if row[5] == 0 {
                continue;
            }
            let keys = [row[0] as i32, row[1] as i32, row[2] as i32, row[3] as i32];
            host.add(keys, row[4]);
        }
        Ok(())
    }
}

/// A group-by accumulator living on whichever device its class pipeline
/// chose, so the dispatcher can thread one reference through CPU/GPU
/// dispatch without the caller re-deriving which variant applies.
pub enum AnyGroupByAccumulator<'a> {
    Cpu(&'a GroupByAccumulator),
    Gpu(&'a mut GpuGroupByAccumulator),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_accumulator_reduce_into_skips_untouched_rows() {
        let mut raw = vec![0i64; 16 * GPU_ACC_STRIDE];
        // Row 3: keys [7,0,0,0], sum 42, touched.
        raw[3 * GPU_ACC_STRIDE] = 7;
        raw[3 * GPU_ACC_STRIDE + 4] = 42;
        raw[3 * GPU_ACC_STRIDE + 5] = 1;
        let gpu_acc = GpuGroupByAccumulator::new(Mem::SysMem(raw), 16, [0, 0, 0, 0], [1, 0, 0, 0]);

        let host = GroupByAccumulator::new(16, [0, 0, 0, 0], [1, 0, 0, 0]);
        gpu_acc.reduce_into(&host).unwrap();
        let rows = host.rows();
        assert_eq!(rows, vec![(7, 0, 0, 0, 42)]);
    }

    #[test]
    fn add_accumulates_same_key_into_one_row() {
        let acc = GroupByAccumulator::new(16, [0, 0, 0, 0], [1, 0, 0, 0]);
        acc.add([3, 0, 0, 0], 10);
        acc.add([3, 0, 0, 0], 5);
        let rows = acc.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], (3, 0, 0, 0, 15));
    }

    #[test]
    fn merge_combines_two_accumulators_key_wise() {
        let a = GroupByAccumulator::new(16, [0, 0, 0, 0], [1, 0, 0, 0]);
        let b = GroupByAccumulator::new(16, [0, 0, 0, 0], [1, 0, 0, 0]);
        a.add([2, 0, 0, 0], 7);
        b.add([2, 0, 0, 0], 3);
        b.add([5, 0, 0, 0], 1);
        a.merge(&b);
        let mut rows = a.rows();
        rows.sort();
        assert_eq!(rows, vec![(2, 0, 0, 0, 10), (5, 0, 0, 0, 1)]);
    }
}
