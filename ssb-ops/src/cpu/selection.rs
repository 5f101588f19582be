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

//! CPU selection (sigma): tile the row source across a rayon work-sharing
//! pool, compact each tile locally, then claim a contiguous slice of the
//! output via one atomic fetch-add per non-empty tile — the same
//! tile/prefix-sum shape the GPU kernel uses, minus the block scan.

use crate::offset_stream::OffsetStream;
use crate::row_source::{column_value, RowSource};
use rayon::prelude::*;
use ssb_cache::SegmentStore;
use ssb_runtime::error::{Error, ErrorKind, Result};
use ssb_runtime::memory::Mem;
use ssb_planner::Selection;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Rows processed per rayon work item; analogous to the GPU kernel's
/// `BLOCK_THREADS * ITEMS_PER_THREAD` tile size.
const TILE_SIZE: usize = 1 << 14;

/// Emits the offsets of rows satisfying every predicate in `predicates`
/// (a conjunction of range predicates). `out` must wrap host-reachable
/// memory; it is the CPU-kernel family's counterpart to the GPU kernels'
/// device buffers.
pub fn select<S: RowSource>(store: &SegmentStore, predicates: &[Selection], source: &S, out: &mut OffsetStream) -> Result<()> {
    let capacity = out.capacity();
    let n = source.len();
    let tile_starts: Vec<usize> = (0..n).step_by(TILE_SIZE).collect();

    let tiles: Vec<Vec<i64>> = tile_starts
        .par_iter()
        .map(|&start| {
            let end = (start + TILE_SIZE).min(n);
            let mut local = Vec::new();
            for row_idx in start..end {
                let offset = source.offset_at(row_idx);
                let passes = predicates.iter().all(|p| {
                    let v = column_value(store, p.column, offset);
                    v >= p.lo && v <= p.hi
                });
                if passes {
                    local.push(offset);
                }
            }
            local
        })
        .collect();

    let counter = AtomicUsize::new(0);
    let out_slice = match out.mem_mut() {
        Mem::SysMem(v) => v.as_mut_slice(),
        Mem::CudaPinnedMem(v) => v.as_mut_slice(),
        Mem::CudaUniMem(v) => v.as_mut_slice(),
        Mem::CudaDevMem(_) => {
            return Err(Error::from(ErrorKind::InvalidArgument(
                "CPU selection requires a host-reachable output stream".to_string(),
            )))
        }
    };

    for tile in &tiles {
        if tile.is_empty() {
            continue;
        }
        let start = counter.fetch_add(tile.len(), Ordering::Relaxed);
        if start + tile.len() > capacity {
            return Err(Error::from(ErrorKind::ResourceExhausted(format!(
                "selection output exceeded its capacity of {}",
                capacity
            ))));
        }
        out_slice[start..start + tile.len()].copy_from_slice(tile);
    }

    out.set_len(counter.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row_source::SegmentGroupSource;
    use ssb_catalog::{Catalog, ColumnSpec, Table};
    use ssb_runtime::SEGMENT_SIZE;

    #[test]
    fn select_keeps_only_rows_within_range() {
        let catalog = Catalog::load(&[ColumnSpec { table: Table::Lineorder, name: "lo_discount", total_tuples: 8, min: 0, max: 10 }]);
        let mut store = SegmentStore::new(&catalog, Mem::SysMem(vec![0; SEGMENT_SIZE]));
        let col = catalog.column(0);
        store.load_cpu_segment(col, 0, vec![0, 1, 2, 3, 4, 5, 6, 7]).unwrap();

        let source = SegmentGroupSource { base_offset: 0, len: 8 };
        let predicates = vec![Selection { column: 0, lo: 2, hi: 4 }];
        let mut out = OffsetStream::new(Mem::SysMem(vec![0i64; 8]));
        select(&store, &predicates, &source, &mut out).unwrap();

        assert_eq!(out.len(), 3);
        if let Mem::SysMem(v) = out.mem() {
            let mut got = v[..out.len()].to_vec();
            got.sort();
            assert_eq!(got, vec![2, 3, 4]);
        }
    }

    #[test]
    fn select_reports_resource_exhausted_when_output_too_small() {
        let catalog = Catalog::load(&[ColumnSpec { table: Table::Lineorder, name: "lo_discount", total_tuples: 4, min: 0, max: 10 }]);
        let mut store = SegmentStore::new(&catalog, Mem::SysMem(vec![0; SEGMENT_SIZE]));
        let col = catalog.column(0);
        store.load_cpu_segment(col, 0, vec![1, 1, 1, 1]).unwrap();

        let source = SegmentGroupSource { base_offset: 0, len: 4 };
        let predicates = vec![Selection { column: 0, lo: 0, hi: 10 }];
        let mut out = OffsetStream::new(Mem::SysMem(vec![0i64; 2]));
        assert!(select(&store, &predicates, &source, &mut out).is_err());
    }
}
