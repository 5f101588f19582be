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

//! Properties that span more than one crate boundary (C1's residency
//! bitmap, C5's classifier/scheduler, C6's orchestrator) and so don't fit
//! naturally as a unit test owned by any single one of them.

use ssb_cache::SegmentStore;
use ssb_catalog::{Catalog, ColumnSpec, Table};
use ssb_engine::orchestrator::AccumulatorShape;
use ssb_engine::{run_query, EngineConfig};
use ssb_planner::{classify, Aggregate, AggregateMode, JoinPayload, JoinSpec, QueryPlan};
use ssb_runtime::memory::Mem;
use ssb_runtime::SEGMENT_SIZE;

fn fixture_catalog() -> Catalog {
    Catalog::load(&[
        ColumnSpec { table: Table::Lineorder, name: "lo_partkey", total_tuples: 4096, min: 1, max: 50 },
        ColumnSpec { table: Table::Lineorder, name: "lo_revenue", total_tuples: 4096, min: 0, max: 100_000 },
        ColumnSpec { table: Table::Part, name: "p_partkey", total_tuples: 50, min: 1, max: 50 },
        ColumnSpec { table: Table::Part, name: "p_brand1", total_tuples: 50, min: 100, max: 104 },
    ])
}

/// Builds a store over [`fixture_catalog`] with 4096 fact rows whose
/// partkey cycles through all 50 dimension keys, joined to a dimension
/// that buckets those 50 parts into 5 brands. Every fact row finds a
/// match: no row is dropped by the join.
fn load_fixture(catalog: &Catalog) -> SegmentStore {
    let mut store = SegmentStore::new(catalog, Mem::SysMem(vec![0; SEGMENT_SIZE]));

    let partkeys: Vec<i32> = (0..4096).map(|i| (i % 50) + 1).collect();
    let revenues: Vec<i32> = (0..4096).map(|i| (i % 17) * 10 + 5).collect();
    store.load_cpu_segment(catalog.column(0), 0, partkeys).unwrap();
    store.load_cpu_segment(catalog.column(1), 0, revenues).unwrap();

    let dim_partkeys: Vec<i32> = (1..=50).collect();
    let dim_brands: Vec<i32> = (0..50).map(|i| 100 + (i % 5)).collect();
    store.load_cpu_segment(catalog.column(2), 0, dim_partkeys).unwrap();
    store.load_cpu_segment(catalog.column(3), 0, dim_brands).unwrap();

    store
}

fn fixture_plan() -> QueryPlan {
    QueryPlan {
        selections: vec![],
        joins: vec![JoinSpec { probe_column: 0, build_column: 2, dim_table: Table::Part, filter: None, payload: JoinPayload::GroupKey(3) }],
        aggregate: Aggregate { mode: AggregateMode::V1, value_columns: vec![1] },
    }
}

/// A plain nested-loop computation of the same join + group-by the
/// orchestrator runs, used as the ground truth a scheduled run is checked
/// against rather than a hand-computed literal.
fn naive_reference(catalog: &Catalog, store: &SegmentStore) -> Vec<(i32, i32, i32, i32, i64)> {
    let partkeys = store.cpu_ptr(0, 0);
    let revenues = store.cpu_ptr(1, 0);
    let dim_partkeys = store.cpu_ptr(2, 0);
    let dim_brands = store.cpu_ptr(3, 0);

    let mut sums = std::collections::BTreeMap::new();
    for i in 0..partkeys.len() {
        let pk = partkeys[i];
        if let Some(dim_row) = dim_partkeys.iter().position(|&k| k == pk) {
            let brand = dim_brands[dim_row];
            *sums.entry(brand).or_insert(0i64) += revenues[i] as i64;
        }
    }
    let _ = catalog;
    sums.into_iter().map(|(brand, sum)| (brand, 0, 0, 0, sum)).collect()
}

#[test]
fn group_by_result_matches_a_naive_reference_computation() {
    let catalog = fixture_catalog();
    let mut store = load_fixture(&catalog);
    let plan = fixture_plan();
    let reference = naive_reference(&catalog, &store);

    let shape = AccumulatorShape { total_val: 5, mins: [100, 0, 0, 0], strides: [1, 0, 0, 0] };
    let mut rows = run_query(&EngineConfig::default(), &plan, &catalog, &mut store, shape, None).unwrap();
    rows.sort();

    assert_eq!(rows, reference);
}

/// The placement classifier packs one bit per fact-side residency signal
/// (a join's probe column, never its dimension-side build column). Marking
/// the fact probe column's one and only segment GPU-resident therefore
/// changes that segment's class, but the dimension table stays CPU-only
/// (it is never touched here), so `join_dimension_ready` stays false and
/// every class's join/group-by stage still resolves to the CPU regardless
/// of which class a segment lands in. The result must not depend on which
/// placement class a segment was classified into.
#[test]
fn group_by_result_is_independent_of_fact_side_gpu_residency() {
    let catalog = fixture_catalog();
    let plan = fixture_plan();
    let shape = AccumulatorShape { total_val: 5, mins: [100, 0, 0, 0], strides: [1, 0, 0, 0] };

    let mut baseline_store = load_fixture(&catalog);
    let mut baseline_rows = run_query(&EngineConfig::default(), &plan, &catalog, &mut baseline_store, shape, None).unwrap();
    baseline_rows.sort();

    let mut resident_store = load_fixture(&catalog);
    let probe_column = catalog.column(plan.joins[0].probe_column);
    resident_store.install_gpu_copy(probe_column, 0).unwrap();

    let baseline_class = classify(&plan, baseline_store.bitmap(), 0);
    let resident_class = classify(&plan, resident_store.bitmap(), 0);
    assert_ne!(baseline_class.0, resident_class.0, "installing a GPU copy of the probe column should change its placement class");

    let mut resident_rows = run_query(&EngineConfig::default(), &plan, &catalog, &mut resident_store, shape, None).unwrap();
    resident_rows.sort();

    assert_eq!(baseline_rows, resident_rows);
}
