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

//! CPU hash build (beta): one dimension row per rayon work item, racing
//! only on duplicate keys (disallowed by the data model).

use crate::hash_table::HashTable;
use crate::row_source::{column_value, RowSource};
use rayon::prelude::*;
use ssb_cache::SegmentStore;
use ssb_planner::{JoinPayload, Selection};

/// Builds `table` from `source`, optionally gated by an inline filter
/// predicate on the dimension side (`HashBuild::Filtered`).
pub fn build<S: RowSource>(
    store: &SegmentStore,
    key_col: ssb_catalog::ColumnId,
    payload: &JoinPayload,
    filter: Option<&Selection>,
    source: &S,
    table: &HashTable,
) {
    (0..source.len()).into_par_iter().for_each(|row_idx| {
        let offset = source.offset_at(row_idx);

        if let Some(f) = filter {
            let v = column_value(store, f.column, offset);
            if v < f.lo || v > f.hi {
                return;
            }
        }

        let key = column_value(store, key_col, offset);
        if key == 0 {
            return;
        }

        let payload_value = match payload {
            JoinPayload::Offset => offset + 1,
            JoinPayload::GroupKey(col) => column_value(store, *col, offset) as i64,
        };
        table.insert(key, payload_value);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row_source::SegmentGroupSource;
    use ssb_catalog::{Catalog, ColumnSpec, Table};
    use ssb_runtime::memory::Mem;
    use ssb_runtime::SEGMENT_SIZE;

    #[test]
    fn build_populates_table_with_offset_payloads() {
        let catalog = Catalog::load(&[ColumnSpec { table: Table::Date, name: "d_datekey", total_tuples: 4, min: 1, max: 400 }]);
        let mut store = SegmentStore::new(&catalog, Mem::SysMem(vec![0; SEGMENT_SIZE]));
        let col = catalog.column(0);
        store.load_cpu_segment(col, 0, vec![101, 102, 103, 104]).unwrap();

        let table = HashTable::new(8, 1);
        let source = SegmentGroupSource { base_offset: 0, len: 4 };
        build(&store, 0, &JoinPayload::Offset, None, &source, &table);

        assert_eq!(table.probe(102), Some(2));
        assert_eq!(table.slot_key(103), 103);
    }

    #[test]
    fn filtered_build_skips_rows_outside_predicate() {
        let catalog = Catalog::load(&[
            ColumnSpec { table: Table::Supplier, name: "s_suppkey", total_tuples: 4, min: 1, max: 400 },
            ColumnSpec { table: Table::Supplier, name: "s_region", total_tuples: 4, min: 0, max: 4 },
        ]);
        let mut store = SegmentStore::new(&catalog, Mem::SysMem(vec![0; SEGMENT_SIZE * 2]));
        store.load_cpu_segment(catalog.column(0), 0, vec![11, 12, 13, 14]).unwrap();
        store.load_cpu_segment(catalog.column(1), 0, vec![1, 2, 1, 3]).unwrap();

        let table = HashTable::new(8, 1);
        let source = SegmentGroupSource { base_offset: 0, len: 4 };
        let filter = Selection { column: 1, lo: 1, hi: 1 };
        build(&store, 0, &JoinPayload::Offset, Some(&filter), &source, &table);

        assert_eq!(table.probe(11), Some(1));
        assert_eq!(table.probe(13), Some(3));
        assert_eq!(table.probe(12), None);
    }
}
