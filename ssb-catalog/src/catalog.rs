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

use crate::column::{Column, ColumnId};
use crate::table::Table;
use ssb_runtime::error::{Error, ErrorKind, Result};
use std::collections::HashMap;

/// One row of the catalog's load-time input: a column's name, owning
/// table, row count, and value range. The catalog never inspects the
/// underlying data itself; everything it needs is handed in up front.
pub struct ColumnSpec {
    pub table: Table,
    pub name: &'static str,
    pub total_tuples: usize,
    pub min: i32,
    pub max: i32,
}

/// The column/schema catalog: every column known to the engine, indexed
/// both by its stable [`ColumnId`] and by `(table, name)`.
///
/// Column ids are assigned in the order the specs are given to
/// [`Catalog::load`] and never change afterwards, so a `ColumnId` doubles
/// as a dense index into bitmap rows and per-column segment-index tables
/// kept by the cache and the dispatch layer.
pub struct Catalog {
    columns: Vec<Column>,
    by_name: HashMap<(Table, &'static str), ColumnId>,
}

impl Catalog {
    /// Builds a catalog from a fixed list of column specs, assigning
    /// column ids densely starting at zero.
    pub fn load(specs: &[ColumnSpec]) -> Self {
        let mut columns = Vec::with_capacity(specs.len());
        let mut by_name = HashMap::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            let column_id = i as ColumnId;
            columns.push(Column::new(column_id, spec.table, spec.name, spec.total_tuples, spec.min, spec.max));
            by_name.insert((spec.table, spec.name), column_id);
        }
        Catalog { columns, by_name }
    }

    pub fn column(&self, id: ColumnId) -> &Column {
        &self.columns[id as usize]
    }

    pub fn find(&self, table: Table, name: &str) -> Result<&Column> {
        self.by_name
            .get(&(table, name))
            .map(|&id| self.column(id))
            .ok_or_else(|| Error::from(ErrorKind::InvalidArgument(format!("no such column: {:?}.{}", table, name))))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Number of segments in the fact table, the unit every placement
    /// class's segment-group count is measured in. All `Lineorder`
    /// columns share this value by construction.
    pub fn fact_total_segment(&self) -> Result<usize> {
        self.columns
            .iter()
            .find(|c| c.table.is_fact())
            .map(|c| c.total_segment)
            .ok_or_else(|| Error::from(ErrorKind::Precondition("catalog has no fact-table column".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssb_runtime::SEGMENT_SIZE;

    fn sample_specs() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec { table: Table::Lineorder, name: "lo_orderdate", total_tuples: SEGMENT_SIZE * 2, min: 19920101, max: 19981231 },
            ColumnSpec { table: Table::Lineorder, name: "lo_discount", total_tuples: SEGMENT_SIZE * 2, min: 0, max: 10 },
            ColumnSpec { table: Table::Date, name: "d_datekey", total_tuples: 2556, min: 19920101, max: 19981231 },
        ]
    }

    #[test]
    fn find_resolves_by_table_and_name() {
        let cat = Catalog::load(&sample_specs());
        let col = cat.find(Table::Date, "d_datekey").unwrap();
        assert_eq!(col.table, Table::Date);
        assert_eq!(cat.find(Table::Lineorder, "d_datekey").is_err(), true);
    }

    #[test]
    fn fact_total_segment_matches_lineorder_columns() {
        let cat = Catalog::load(&sample_specs());
        assert_eq!(cat.fact_total_segment().unwrap(), 2);
    }

    #[test]
    fn column_ids_are_dense_and_stable() {
        let cat = Catalog::load(&sample_specs());
        for (i, col) in cat.iter().enumerate() {
            assert_eq!(col.column_id, i as ColumnId);
        }
    }
}
