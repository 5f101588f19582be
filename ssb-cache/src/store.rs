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

//! Segment store & cache (C1): owns the always-present CPU copy of every
//! segment plus the optional GPU copy, and reports residency through
//! [`ResidencyBitmap`]. Policy-free by design (§1): admission and eviction
//! are a caller concern; this type only keeps `bitmap`, `col_idx`, and
//! `tot_seg_in_gpu` consistent with whatever the caller installs or evicts.

use crate::arena::{GpuAddress, GpuArena};
use crate::bitmap::ResidencyBitmap;
use log::debug;
use ssb_catalog::{Catalog, Column, ColumnId};
use ssb_runtime::error::{Error, ErrorKind, Result};
use ssb_runtime::memory::Mem;
use ssb_runtime::SEGMENT_SIZE;

pub struct SegmentStore {
    /// `cpu_slabs[col][seg]`, always populated at load and never mutated.
    cpu_slabs: Vec<Vec<Vec<i32>>>,
    bitmap: ResidencyBitmap,
    arena: GpuArena,
}

impl SegmentStore {
    /// Builds an empty store sized from `catalog`, with a GPU arena backed
    /// by `arena_storage` (typically `Mem::CudaDevMem` in production, a
    /// host-reachable variant in tests that run without a device).
    pub fn new(catalog: &Catalog, arena_storage: Mem<i32>) -> Self {
        let segments_per_column: Vec<usize> = catalog.iter().map(|c| c.total_segment).collect();
        let cpu_slabs = segments_per_column.iter().map(|&n| vec![Vec::new(); n]).collect();
        SegmentStore {
            cpu_slabs,
            bitmap: ResidencyBitmap::new(&segments_per_column),
            arena: GpuArena::new(arena_storage, &segments_per_column),
        }
    }

    /// Loads a segment's CPU copy. `data.len()` must equal the column's
    /// segment length (the last segment of a column may be shorter than
    /// `SEGMENT_SIZE`; callers pass exactly that many values).
    pub fn load_cpu_segment(&mut self, column: &Column, seg: usize, data: Vec<i32>) -> Result<()> {
        let expected = column.segment_len(seg);
        if data.len() != expected {
            return Err(Error::from(ErrorKind::InvalidArgument(format!(
                "segment {} of column {} expected {} values, got {}",
                seg,
                column.column_id,
                expected,
                data.len()
            ))));
        }
        self.cpu_slabs[column.column_id as usize][seg] = data;
        Ok(())
    }

    /// Always valid: the CPU copy exists for every loaded segment.
    pub fn cpu_ptr(&self, col: ColumnId, seg: usize) -> &[i32] {
        &self.cpu_slabs[col as usize][seg]
    }

    pub fn is_gpu_resident(&self, col: ColumnId, seg: usize) -> bool {
        self.bitmap.is_resident(col, seg)
    }

    pub fn bitmap(&self) -> &ResidencyBitmap {
        &self.bitmap
    }

    /// The GPU arena, for the device dispatcher to mint kernel-argument
    /// pointers into (Form A's plain offset, Form B's `col_idx` gather).
    pub fn arena(&self) -> &GpuArena {
        &self.arena
    }

    /// Valid iff `bitmap[col][seg] = 1`. A request against a non-resident
    /// segment indicates a planner bug (§4.1's failure clause), so it is
    /// surfaced as a `Precondition` error rather than silently staging one.
    pub fn gpu_ptr(&self, col: ColumnId, seg: usize) -> Result<GpuAddress> {
        if !self.bitmap.is_resident(col, seg) {
            return Err(Error::from(ErrorKind::Precondition(format!(
                "segment {} of column {} has no GPU copy",
                seg, col
            ))));
        }
        self.arena.slab_id(col, seg).map(|slab_id| GpuAddress { slab_id }).ok_or_else(|| {
            Error::from(ErrorKind::Precondition(format!(
                "segment {} of column {} is marked resident but has no arena slab",
                seg, col
            )))
        })
    }

    /// Installs a GPU copy for `(col, seg)`: assigns an arena slab, copies
    /// the CPU values into it, and sets the bitmap bit. The mechanism the
    /// cache exposes, not a policy decision about when to call it.
    pub fn install_gpu_copy(&mut self, column: &Column, seg: usize) -> Result<()> {
        let col = column.column_id;
        if self.bitmap.is_resident(col, seg) {
            return Ok(());
        }
        let addr = self.arena.assign(col, seg)?;
        let data = self.cpu_ptr(col, seg).to_vec();
        self.arena.write_slab(addr.slab_id, &data)?;
        self.bitmap.set_resident(col, seg, true);
        column.set_tot_seg_in_gpu(self.bitmap.popcount(col));
        debug!("installed GPU copy for column {} segment {} (slab {})", col, seg, addr.slab_id);
        Ok(())
    }

    /// Evicts the GPU copy for `(col, seg)`, if any.
    pub fn evict_gpu_copy(&mut self, column: &Column, seg: usize) {
        let col = column.column_id;
        if !self.bitmap.is_resident(col, seg) {
            return;
        }
        self.arena.release(col, seg);
        self.bitmap.set_resident(col, seg, false);
        column.set_tot_seg_in_gpu(self.bitmap.popcount(col));
    }

    pub fn segment_size(&self) -> usize {
        SEGMENT_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssb_catalog::ColumnSpec;
    use ssb_catalog::Table;

    fn small_catalog() -> Catalog {
        Catalog::load(&[ColumnSpec { table: Table::Lineorder, name: "lo_orderdate", total_tuples: SEGMENT_SIZE * 2, min: 19920101, max: 19981231 }])
    }

    #[test]
    fn cpu_ptr_always_valid_after_load() {
        let catalog = small_catalog();
        let mut store = SegmentStore::new(&catalog, Mem::SysMem(vec![0; SEGMENT_SIZE * 2]));
        let col = catalog.column(0);
        store.load_cpu_segment(col, 0, vec![7; SEGMENT_SIZE]).unwrap();
        assert_eq!(store.cpu_ptr(0, 0).len(), SEGMENT_SIZE);
        assert_eq!(store.cpu_ptr(0, 0)[0], 7);
    }

    #[test]
    fn gpu_ptr_fails_precondition_when_not_resident() {
        let catalog = small_catalog();
        let store = SegmentStore::new(&catalog, Mem::SysMem(vec![0; SEGMENT_SIZE * 2]));
        let res = store.gpu_ptr(0, 0);
        assert!(res.is_err());
        match res.unwrap_err().kind() {
            ssb_runtime::error::ErrorKind::Precondition(_) => {}
            other => panic!("expected Precondition, got {:?}", other),
        }
    }

    #[test]
    fn install_then_evict_keeps_tot_seg_in_gpu_in_sync() {
        let catalog = small_catalog();
        let mut store = SegmentStore::new(&catalog, Mem::SysMem(vec![0; SEGMENT_SIZE * 2]));
        let col = catalog.column(0);
        store.load_cpu_segment(col, 0, vec![1; SEGMENT_SIZE]).unwrap();
        store.install_gpu_copy(col, 0).unwrap();
        assert!(store.is_gpu_resident(0, 0));
        assert_eq!(col.tot_seg_in_gpu(), 1);
        assert!(store.gpu_ptr(0, 0).is_ok());

        store.evict_gpu_copy(col, 0);
        assert!(!store.is_gpu_resident(0, 0));
        assert_eq!(col.tot_seg_in_gpu(), 0);
        assert!(store.gpu_ptr(0, 0).is_err());
    }
}
