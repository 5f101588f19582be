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

//! The flat GPU arena and its packed column-index table (§4.1). Instead of
//! one device allocation per resident segment, the store carves one
//! contiguous [`Mem`] into fixed-size slabs and hands out slab ids; kernels
//! translate `row_offset -> GPU address` through `col_idx[col][segment]`
//! without the store itself tracking per-segment device allocations.

use ssb_catalog::ColumnId;
use ssb_runtime::error::{Error, ErrorKind, Result};
use ssb_runtime::memory::Mem;
use ssb_runtime::SEGMENT_SIZE;

/// Where one segment's GPU copy lives: which slab of the arena, and (for
/// callers that need it, e.g. the dispatcher's transfer sizing) the flat
/// element offset that slab starts at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuAddress {
    pub slab_id: u32,
}

impl GpuAddress {
    pub fn arena_offset(self) -> usize {
        self.slab_id as usize * SEGMENT_SIZE
    }
}

/// A flat arena of `capacity_slabs * SEGMENT_SIZE` elements, with a
/// free-list handing out slab ids to whoever installs a GPU copy.
pub struct GpuArena {
    storage: Mem<i32>,
    capacity_slabs: u32,
    free_slabs: Vec<u32>,
    /// `col_idx[col][segment] -> slab_id`, `None` when not resident.
    col_idx: Vec<Vec<Option<u32>>>,
}

impl GpuArena {
    pub fn new(storage: Mem<i32>, segments_per_column: &[usize]) -> Self {
        let capacity_slabs = (storage.len() / SEGMENT_SIZE) as u32;
        GpuArena {
            storage,
            capacity_slabs,
            free_slabs: (0..capacity_slabs).rev().collect(),
            col_idx: segments_per_column.iter().map(|&n| vec![None; n]).collect(),
        }
    }

    pub fn capacity_slabs(&self) -> u32 {
        self.capacity_slabs
    }

    pub fn slab_id(&self, col: ColumnId, seg: usize) -> Option<u32> {
        self.col_idx[col as usize][seg]
    }

    /// The arena's backing storage, for the dispatcher to mint a kernel
    /// argument pointer into (Form B's `resolve_offset` reads through it).
    pub fn storage(&self) -> &Mem<i32> {
        &self.storage
    }

    /// A flat `col_idx[segment] -> slab_id` table for one column, with
    /// `u32::MAX` standing in for "not resident" segments (Form B only
    /// dereferences entries the planner already proved are resident).
    pub fn col_idx_table(&self, col: ColumnId) -> Vec<u32> {
        self.col_idx[col as usize].iter().map(|s| s.unwrap_or(u32::MAX)).collect()
    }

    /// Assigns a free slab to `(col, seg)` and returns its address. Errors
    /// with `ResourceExhausted` if the arena is full, since that is sized
    /// for the configured `cache_size` and is not grown on demand.
    pub fn assign(&mut self, col: ColumnId, seg: usize) -> Result<GpuAddress> {
        let slab_id = self
            .free_slabs
            .pop()
            .ok_or_else(|| Error::from(ErrorKind::ResourceExhausted("GPU arena has no free slabs".to_string())))?;
        self.col_idx[col as usize][seg] = Some(slab_id);
        Ok(GpuAddress { slab_id })
    }

    /// Releases the slab backing `(col, seg)`, if any, back to the free list.
    pub fn release(&mut self, col: ColumnId, seg: usize) {
        if let Some(slab_id) = self.col_idx[col as usize][seg].take() {
            self.free_slabs.push(slab_id);
        }
    }

    /// Writes a segment's values into its assigned slab. Only meaningful
    /// for host-reachable arena memory (`SysMem`/pinned/unified); a true
    /// `CudaDevMem` arena is populated by the dispatcher's pinned-staging
    /// transfer path instead, so this returns `Precondition` there.
    pub fn write_slab(&mut self, slab_id: u32, data: &[i32]) -> Result<()> {
        if data.len() > SEGMENT_SIZE {
            return Err(Error::from(ErrorKind::InvalidArgument(format!(
                "segment write of {} values exceeds SEGMENT_SIZE {}",
                data.len(),
                SEGMENT_SIZE
            ))));
        }
        match &mut self.storage {
            Mem::SysMem(m) => {
                let start = slab_id as usize * SEGMENT_SIZE;
                m[start..start + data.len()].copy_from_slice(data);
                Ok(())
            }
            Mem::CudaPinnedMem(m) => {
                let start = slab_id as usize * SEGMENT_SIZE;
                m.as_mut_slice()[start..start + data.len()].copy_from_slice(data);
                Ok(())
            }
            Mem::CudaUniMem(m) => {
                let start = slab_id as usize * SEGMENT_SIZE;
                m.as_mut_slice()[start..start + data.len()].copy_from_slice(data);
                Ok(())
            }
            Mem::CudaDevMem(_) => Err(Error::from(ErrorKind::Precondition(
                "writing a device-memory arena requires the dispatcher's staged transfer path".to_string(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_and_release_round_trip_a_slab() {
        let mut arena = GpuArena::new(Mem::SysMem(vec![0; SEGMENT_SIZE * 2]), &[4]);
        assert_eq!(arena.capacity_slabs(), 2);
        let addr = arena.assign(0, 1).unwrap();
        assert_eq!(arena.slab_id(0, 1), Some(addr.slab_id));
        arena.release(0, 1);
        assert_eq!(arena.slab_id(0, 1), None);
    }

    #[test]
    fn assign_fails_once_capacity_exhausted() {
        let mut arena = GpuArena::new(Mem::SysMem(vec![0; SEGMENT_SIZE]), &[4]);
        arena.assign(0, 0).unwrap();
        assert!(arena.assign(0, 1).is_err());
    }

    #[test]
    fn write_slab_places_values_at_slab_offset() {
        let mut arena = GpuArena::new(Mem::SysMem(vec![0; SEGMENT_SIZE * 2]), &[4]);
        let addr = arena.assign(0, 0).unwrap();
        arena.write_slab(addr.slab_id, &[1, 2, 3]).unwrap();
        if let Mem::SysMem(m) = &arena.storage {
            assert_eq!(&m[addr.arena_offset()..addr.arena_offset() + 3], &[1, 2, 3]);
        } else {
            unreachable!()
        }
    }
}
