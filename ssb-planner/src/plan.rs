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

//! Explicit sum-type operator descriptors for a query's relational plan,
//! replacing the original's NULL-branching ("NULL hash table = no join,
//! NULL aggregate = skip"): a [`QueryPlan`] is built once, by whatever
//! translates a query id into a plan (out of this crate's scope), and
//! consumed here and by the orchestrator.

use ssb_catalog::{ColumnId, Table};

/// A range predicate `lo <= v <= hi` over a single fact-table column.
#[derive(Debug, Clone, Copy)]
pub struct Selection {
    pub column: ColumnId,
    pub lo: i32,
    pub hi: i32,
}

/// What a join's hash-table payload carries downstream.
#[derive(Debug, Clone, Copy)]
pub enum JoinPayload {
    /// The matched dimension row's offset, for a further join/selection.
    Offset,
    /// A dimension attribute value, read directly into a group-by key
    /// (e.g. Q1.1/Q2.1's `d_year`, Q2.1's `p_brand1`).
    GroupKey(ColumnId),
}

/// One hash join: a fact-side probe column against a dimension-side
/// build column, with an optional inline filter on the dimension build
/// (`HashBuild::Filtered`, e.g. Q2.1's `s_region = 'AMERICA'`).
#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub probe_column: ColumnId,
    pub build_column: ColumnId,
    pub dim_table: Table,
    pub filter: Option<Selection>,
    pub payload: JoinPayload,
}

/// The per-row arithmetic the group-by/aggregate stage performs before
/// the 64-bit `atomicAdd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateMode {
    V1,
    V1MinusV2,
    V1TimesV2,
}

/// The aggregate stage: a mode and the fact-side value column(s) it reads
/// directly from the segment (Form A) or offset stream (Form B). These
/// columns double as the classification step's "group-by-probe" bits
/// (§4.4 point 4), since they are the fact-resident data the group-by
/// stage consumes without going through a join.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub mode: AggregateMode,
    pub value_columns: Vec<ColumnId>,
}

/// A complete relational plan for one query: a total order of
/// selections, then joins (in declaration order), then the group-by and
/// aggregate. Built once per query by an external translator; this crate
/// never interprets a bare query id.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub selections: Vec<Selection>,
    pub joins: Vec<JoinSpec>,
    pub aggregate: Aggregate,
}

impl QueryPlan {
    /// Total number of residency bits a placement class needs: one per
    /// selection, one per join, one per aggregate value column. Must be
    /// `<= 6` so classes stay in `[0, 64)`.
    pub fn class_bit_count(&self) -> usize {
        self.selections.len() + self.joins.len() + self.aggregate.value_columns.len()
    }
}
