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

/// The star-schema benchmark's one fact table and four dimension tables.
///
/// `total_segment` (the fact-table-wide count of segment indices a query's
/// whole pipeline operates over) is shared across all columns of the same
/// table: a tuple at row `r` of any column of `Lineorder` lives at segment
/// `r / SEGMENT_SIZE`, the same segment index as every other `Lineorder`
/// column's row `r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Table {
    Lineorder,
    Part,
    Supplier,
    Customer,
    Date,
}

impl Table {
    /// True for the single fact table; every other table is a dimension.
    pub fn is_fact(self) -> bool {
        matches!(self, Table::Lineorder)
    }
}
