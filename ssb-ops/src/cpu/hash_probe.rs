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

//! CPU hash probe with up to four fused joins and an optional fused
//! group-by payload per join. A fact row that fails any join is
//! discarded from every downstream operator (inner-join semantics).

use crate::hash_table::HashTable;
use crate::offset_stream::{GroupKeyStream, OffsetStream};
use crate::row_source::{column_value, RowSource};
use rayon::prelude::*;
use ssb_cache::SegmentStore;
use ssb_catalog::ColumnId;
use ssb_runtime::error::{Error, ErrorKind, Result};
use ssb_runtime::memory::Mem;

const TILE_SIZE: usize = 1 << 14;
pub const MAX_JOINS: usize = 4;

/// One join slot in the fused probe. `table = None` means this join is
/// absent for the query (the Design Notes' replacement for a NULL hash
/// table): the row passes through and its group-key cell stays zero.
pub struct JoinSlot<'a> {
    pub probe_column: ColumnId,
    pub table: Option<&'a HashTable>,
    pub emits_group_key: bool,
}

struct ProbeHit {
    offset: i64,
    group_keys: [i32; MAX_JOINS],
}

/// Probes `joins` in order against `source`'s rows, writing surviving
/// offsets to `out_offsets` and each join's fused group key to the
/// matching entry of `out_group_keys` (`None` entries are joins that
/// don't feed a group-by attribute).
pub fn probe<S: RowSource>(
    store: &SegmentStore,
    joins: &[JoinSlot],
    source: &S,
    out_offsets: &mut OffsetStream,
    out_group_keys: &mut [Option<&mut GroupKeyStream>],
) -> Result<()> {
    assert!(joins.len() <= MAX_JOINS, "at most {} fused joins are supported", MAX_JOINS);
    assert_eq!(joins.len(), out_group_keys.len());

    let n = source.len();
    let tile_starts: Vec<usize> = (0..n).step_by(TILE_SIZE).collect();

    let tiles: Vec<Vec<ProbeHit>> = tile_starts
        .par_iter()
        .map(|&start| {
            let end = (start + TILE_SIZE).min(n);
            let mut local = Vec::new();
            'rows: for row_idx in start..end {
                let offset = source.offset_at(row_idx);
                let mut group_keys = [0i32; MAX_JOINS];
                for (j, join) in joins.iter().enumerate() {
                    if let Some(table) = join.table {
                        let key = column_value(store, join.probe_column, offset);
                        match table.probe(key) {
                            Some(payload) => {
                                if join.emits_group_key {
                                    group_keys[j] = payload as i32;
                                }
                            }
                            None => continue 'rows,
                        }
                    }
                }
                local.push(ProbeHit { offset, group_keys });
            }
            local
        })
        .collect();

    let total: usize = tiles.iter().map(|t| t.len()).sum();
    if total > out_offsets.capacity() {
        return Err(Error::from(ErrorKind::ResourceExhausted(format!(
            "probe output of {} rows exceeds offset stream capacity {}",
            total,
            out_offsets.capacity()
        ))));
    }

    let offsets_slice = host_slice_mut(out_offsets.mem_mut())?;
    let mut write_idx = 0;
    for tile in &tiles {
        for hit in tile {
            offsets_slice[write_idx] = hit.offset;
            write_idx += 1;
        }
    }
    out_offsets.set_len(total)?;

    for (j, stream_opt) in out_group_keys.iter_mut().enumerate() {
        if let Some(stream) = stream_opt {
            if total > stream.capacity() {
                return Err(Error::from(ErrorKind::ResourceExhausted(format!(
                    "group-key stream {} capacity {} too small for {} rows",
                    j,
                    stream.capacity(),
                    total
                ))));
            }
            let slice = host_slice_mut_i32(stream.mem_mut())?;
            let mut idx = 0;
            for tile in &tiles {
                for hit in tile {
                    slice[idx] = hit.group_keys[j];
                    idx += 1;
                }
            }
            stream.set_len(total)?;
        }
    }

    Ok(())
}

fn host_slice_mut(mem: &mut Mem<i64>) -> Result<&mut [i64]> {
    match mem {
        Mem::SysMem(v) => Ok(v.as_mut_slice()),
        Mem::CudaPinnedMem(v) => Ok(v.as_mut_slice()),
        Mem::CudaUniMem(v) => Ok(v.as_mut_slice()),
        Mem::CudaDevMem(_) => Err(Error::from(ErrorKind::InvalidArgument("CPU probe requires a host-reachable offset stream".to_string()))),
    }
}

fn host_slice_mut_i32(mem: &mut Mem<i32>) -> Result<&mut [i32]> {
    match mem {
        Mem::SysMem(v) => Ok(v.as_mut_slice()),
        Mem::CudaPinnedMem(v) => Ok(v.as_mut_slice()),
        Mem::CudaUniMem(v) => Ok(v.as_mut_slice()),
        Mem::CudaDevMem(_) => Err(Error::from(ErrorKind::InvalidArgument("CPU probe requires a host-reachable group-key stream".to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row_source::SegmentGroupSource;
    use ssb_catalog::{Catalog, ColumnSpec, Table};
    use ssb_runtime::SEGMENT_SIZE;

    #[test]
    fn probe_discards_rows_that_fail_the_join() {
        let catalog = Catalog::load(&[ColumnSpec { table: Table::Lineorder, name: "lo_orderdate", total_tuples: 4, min: 1, max: 400 }]);
        let mut store = SegmentStore::new(&catalog, Mem::SysMem(vec![0; SEGMENT_SIZE]));
        store.load_cpu_segment(catalog.column(0), 0, vec![101, 999, 103, 104]).unwrap();

        let table = HashTable::new(8, 1);
        table.insert(101, 2024);
        table.insert(103, 2025);
        table.insert(104, 2026);

        let source = SegmentGroupSource { base_offset: 0, len: 4 };
        let joins = vec![JoinSlot { probe_column: 0, table: Some(&table), emits_group_key: true }];
        let mut out_offsets = OffsetStream::new(Mem::SysMem(vec![0i64; 4]));
        let mut gk = GroupKeyStream::new(Mem::SysMem(vec![0i32; 4]));
        let mut out_group_keys: Vec<Option<&mut GroupKeyStream>> = vec![Some(&mut gk)];

        probe(&store, &joins, &source, &mut out_offsets, &mut out_group_keys).unwrap();

        assert_eq!(out_offsets.len(), 3);
        if let Mem::SysMem(v) = out_offsets.mem() {
            assert_eq!(&v[..3], &[0, 2, 3]);
        }
        if let Mem::SysMem(v) = gk.mem() {
            assert_eq!(&v[..3], &[2024, 2025, 2026]);
        }
    }
}
