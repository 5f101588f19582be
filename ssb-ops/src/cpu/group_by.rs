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

//! CPU group-by / aggregate (gamma/Sigma): up to four group-key streams
//! feed the dense-hash accumulator; up to two value columns are combined
//! per `mode` before the atomic add.

use crate::accumulator::{GroupByAccumulator, MAX_GROUP_KEYS};
use crate::offset_stream::GroupKeyStream;
use crate::row_source::{column_value, RowSource};
use rayon::prelude::*;
use ssb_cache::SegmentStore;
use ssb_catalog::ColumnId;
use ssb_planner::AggregateMode;
use ssb_runtime::error::{Error, ErrorKind, Result};
use ssb_runtime::memory::Mem;

fn host_slice(mem: &Mem<i32>) -> Result<&[i32]> {
    match mem {
        Mem::SysMem(v) => Ok(v.as_slice()),
        Mem::CudaPinnedMem(v) => Ok(v.as_slice()),
        Mem::CudaUniMem(v) => Ok(v.as_slice()),
        Mem::CudaDevMem(_) => Err(Error::from(ErrorKind::InvalidArgument("CPU group-by requires host-reachable group-key streams".to_string()))),
    }
}

/// Runs the group-by/aggregate stage over `source`'s rows, reading group
/// keys from `group_keys[j]` (by position, aligned with `source`) and
/// aggregate values directly from the fact columns named in
/// `value_columns`.
pub fn group_by_aggregate<S: RowSource>(
    store: &SegmentStore,
    mode: AggregateMode,
    value_columns: &[ColumnId],
    group_keys: &[Option<&GroupKeyStream>],
    source: &S,
    acc: &GroupByAccumulator,
) -> Result<()> {
    assert!(group_keys.len() <= MAX_GROUP_KEYS);
    let mut key_slices: [Option<&[i32]>; MAX_GROUP_KEYS] = [None, None, None, None];
    for (j, gk) in group_keys.iter().enumerate() {
        if let Some(stream) = gk {
            key_slices[j] = Some(host_slice(stream.mem())?);
        }
    }

    let n = source.len();
    (0..n).into_par_iter().for_each(|row_idx| {
        let offset = source.offset_at(row_idx);
        let mut keys = [0i32; MAX_GROUP_KEYS];
        for j in 0..MAX_GROUP_KEYS {
            if let Some(slice) = key_slices[j] {
                keys[j] = slice[row_idx];
            }
        }

        let v1 = column_value(store, value_columns[0], offset) as i64;
        let value = match mode {
            AggregateMode::V1 => v1,
            AggregateMode::V1MinusV2 => v1 - column_value(store, value_columns[1], offset) as i64,
            AggregateMode::V1TimesV2 => v1 * column_value(store, value_columns[1], offset) as i64,
        };
        acc.add(keys, value);
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row_source::OffsetStreamSource;
    use ssb_catalog::{Catalog, ColumnSpec, Table};
    use ssb_runtime::SEGMENT_SIZE;

    #[test]
    fn group_by_aggregate_sums_by_group_key() {
        let catalog = Catalog::load(&[
            ColumnSpec { table: Table::Lineorder, name: "lo_extendedprice", total_tuples: 4, min: 0, max: 1000 },
            ColumnSpec { table: Table::Lineorder, name: "lo_discount", total_tuples: 4, min: 0, max: 10 },
        ]);
        let mut store = SegmentStore::new(&catalog, Mem::SysMem(vec![0; SEGMENT_SIZE * 2]));
        store.load_cpu_segment(catalog.column(0), 0, vec![100, 200, 300, 400]).unwrap();
        store.load_cpu_segment(catalog.column(1), 0, vec![1, 1, 2, 2]).unwrap();

        let offsets = vec![0i64, 1, 2, 3];
        let source = OffsetStreamSource { offsets: &offsets };
        let group_key_values = vec![1993i32, 1993, 1994, 1994];
        let gk_mem = Mem::SysMem(group_key_values);
        let mut gk_stream = GroupKeyStream::new(gk_mem);
        gk_stream.set_len(4).unwrap();

        let acc = GroupByAccumulator::new(16, [1993, 0, 0, 0], [1, 0, 0, 0]);
        group_by_aggregate(&store, AggregateMode::V1TimesV2, &[0, 1], &[Some(&gk_stream)], &source, &acc).unwrap();

        let mut rows = acc.rows();
        rows.sort();
        assert_eq!(rows, vec![(1993, 0, 0, 0, 300), (1994, 0, 0, 0, 1400)]);
    }
}
