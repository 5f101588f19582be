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

//! Turns a [`QueryPlan`] plus a residency bitmap into a [`Schedule`]: for
//! each of the 64 placement classes that actually has segments, a device
//! decision per selection, per join and for the group-by/aggregate stage.

use crate::placement::{bit_at, classify, PlacementClass};
use crate::plan::{JoinPayload, QueryPlan};
use log::debug;
use ssb_cache::ResidencyBitmap;
use ssb_catalog::{Catalog, ColumnId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Gpu,
}

/// Everything the orchestrator needs to run one placement class's
/// pipeline: its segment group and a device choice per stage. A class's
/// device choice never varies within a pipeline execution (§4.4).
#[derive(Debug, Clone)]
pub struct ClassPipeline {
    pub class: PlacementClass,
    pub segments: Vec<usize>,
    pub selection_device: Vec<Device>,
    pub join_device: Vec<Device>,
    pub groupby_device: Device,
}

/// The planner's output for one query: every non-empty placement class's
/// pipeline. Classes with zero segments are dropped (§4.4).
#[derive(Debug, Clone)]
pub struct Schedule {
    pub classes: Vec<ClassPipeline>,
}

impl Schedule {
    pub fn total_segments(&self) -> usize {
        self.classes.iter().map(|c| c.segments.len()).sum()
    }
}

/// Whether every segment of `column` has a GPU copy. Exported so the
/// orchestrator can use the same test when deciding what device to build
/// a dimension's hash table on, instead of re-deriving it from the raw
/// bitmap/catalog.
pub fn dimension_fully_resident(catalog: &Catalog, column: ColumnId) -> bool {
    let col = catalog.column(column);
    col.tot_seg_in_gpu() as usize == col.total_segment
}

/// A join runs on GPU for a class iff all dimension-side data for that
/// join (its build column, optional filter column, and optional
/// group-key payload column) is fully resident on GPU.
pub fn join_dimension_ready(catalog: &Catalog, join: &crate::plan::JoinSpec) -> bool {
    let mut ready = dimension_fully_resident(catalog, join.build_column);
    if let Some(filter) = &join.filter {
        ready &= dimension_fully_resident(catalog, filter.column);
    }
    if let JoinPayload::GroupKey(gk) = join.payload {
        ready &= dimension_fully_resident(catalog, gk);
    }
    ready
}

/// `groupGPUcheck`: all dimension-resident group-by attributes (the
/// group-key payload columns of every join) are fully resident on GPU.
fn group_dimension_ready(catalog: &Catalog, plan: &QueryPlan) -> bool {
    plan.joins
        .iter()
        .filter_map(|j| match j.payload {
            JoinPayload::GroupKey(gk) => Some(gk),
            JoinPayload::Offset => None,
        })
        .all(|gk| dimension_fully_resident(catalog, gk))
}

/// Builds the schedule for `plan` against `bitmap`, bucketing the fact
/// table's `total_segment` segments into their placement classes.
pub fn build_schedule(plan: &QueryPlan, bitmap: &ResidencyBitmap, catalog: &Catalog, total_segment: usize) -> Schedule {
    let n_sel = plan.selections.len();
    let n_join = plan.joins.len();
    let total_bits = plan.class_bit_count();
    assert!(total_bits <= 6, "placement class needs {} bits, but only 6 are available", total_bits);

    let mut segment_groups: Vec<Vec<usize>> = vec![Vec::new(); 64];
    for seg in 0..total_segment {
        let class = classify(plan, bitmap, seg);
        segment_groups[class.0 as usize].push(seg);
    }

    let join_dimension_ready: Vec<bool> = plan.joins.iter().map(|j| join_dimension_ready(catalog, j)).collect();
    let group_dimension_ready = group_dimension_ready(catalog, plan);

    let mut classes = Vec::new();
    for (c, segments) in segment_groups.into_iter().enumerate() {
        if segments.is_empty() {
            continue;
        }
        let class = PlacementClass(c as u8);

        let selection_device = (0..n_sel)
            .map(|i| if bit_at(class, total_bits, i) { Device::Gpu } else { Device::Cpu })
            .collect();

        let join_device = (0..n_join)
            .map(|i| {
                let fact_bit = bit_at(class, total_bits, n_sel + i);
                if fact_bit && join_dimension_ready[i] {
                    Device::Gpu
                } else {
                    Device::Cpu
                }
            })
            .collect();

        let n_agg = plan.aggregate.value_columns.len();
        let groupby_bits_all_set = (0..n_agg).all(|i| bit_at(class, total_bits, n_sel + n_join + i));
        let groupby_device = if groupby_bits_all_set && group_dimension_ready { Device::Gpu } else { Device::Cpu };

        debug!("class {} ({} segments): groupby on {:?}", c, segments.len(), groupby_device);

        classes.push(ClassPipeline { class, segments, selection_device, join_device, groupby_device });
    }

    Schedule { classes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Aggregate, AggregateMode, JoinPayload, JoinSpec, Selection};
    use ssb_catalog::{ColumnSpec, Table};
    use ssb_runtime::SEGMENT_SIZE;

    fn catalog_and_plan() -> (Catalog, QueryPlan) {
        let catalog = Catalog::load(&[
            ColumnSpec { table: Table::Lineorder, name: "lo_orderdate", total_tuples: SEGMENT_SIZE * 4, min: 19920101, max: 19981231 },
            ColumnSpec { table: Table::Lineorder, name: "lo_revenue", total_tuples: SEGMENT_SIZE * 4, min: 0, max: 1_000_000 },
            ColumnSpec { table: Table::Date, name: "d_datekey", total_tuples: 2556, min: 19920101, max: 19981231 },
            ColumnSpec { table: Table::Date, name: "d_year", total_tuples: 2556, min: 1992, max: 1998 },
        ]);
        let plan = QueryPlan {
            selections: vec![],
            joins: vec![JoinSpec {
                probe_column: 0,
                build_column: 2,
                dim_table: Table::Date,
                filter: None,
                payload: JoinPayload::GroupKey(3),
            }],
            aggregate: Aggregate { mode: AggregateMode::V1, value_columns: vec![1] },
        };
        (catalog, plan)
    }

    #[test]
    fn segment_group_counts_sum_to_total_segment() {
        let (catalog, plan) = catalog_and_plan();
        let bitmap = ResidencyBitmap::checkerboard(&[4, 4, 1, 1]);
        let schedule = build_schedule(&plan, &bitmap, &catalog, 4);
        assert_eq!(schedule.total_segments(), 4);
    }

    #[test]
    fn join_stays_on_cpu_when_dimension_not_fully_resident() {
        let (catalog, plan) = catalog_and_plan();
        // Fact columns fully resident, dimension only partially so.
        let mut bitmap = ResidencyBitmap::new(&[4, 4, 1, 1]);
        for seg in 0..4 {
            bitmap.set_resident(0, seg, true);
            bitmap.set_resident(1, seg, true);
        }
        bitmap.set_resident(2, 0, true);
        catalog.column(2).set_tot_seg_in_gpu(1);
        catalog.column(3).set_tot_seg_in_gpu(0);

        let schedule = build_schedule(&plan, &bitmap, &catalog, 4);
        assert_eq!(schedule.classes.len(), 1);
        assert_eq!(schedule.classes[0].join_device[0], Device::Cpu);
        assert_eq!(schedule.classes[0].groupby_device, Device::Cpu);
    }

    #[test]
    fn all_gpu_resident_dimension_allows_gpu_join_and_groupby() {
        let (catalog, plan) = catalog_and_plan();
        let mut bitmap = ResidencyBitmap::new(&[4, 4, 1, 1]);
        for seg in 0..4 {
            bitmap.set_resident(0, seg, true);
            bitmap.set_resident(1, seg, true);
        }
        bitmap.set_resident(2, 0, true);
        bitmap.set_resident(3, 0, true);
        catalog.column(2).set_tot_seg_in_gpu(1);
        catalog.column(3).set_tot_seg_in_gpu(1);

        let schedule = build_schedule(&plan, &bitmap, &catalog, 4);
        assert_eq!(schedule.classes.len(), 1);
        assert_eq!(schedule.classes[0].join_device[0], Device::Gpu);
        assert_eq!(schedule.classes[0].groupby_device, Device::Gpu);
    }
}
