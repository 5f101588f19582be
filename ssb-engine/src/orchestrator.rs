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

//! The query orchestrator: turns a [`QueryPlan`] and a residency-aware
//! [`SegmentStore`] into result rows.
//!
//! 1. Stage GPU data for the all-GPU baseline, if `config.custom` is off.
//! 2. Classify the fact table's segments into a [`ssb_planner::Schedule`].
//! 3. Build every join's dimension hash table(s).
//! 4. Run each placement class's selection/join stage through C4 dispatch.
//! 5. Run each class's group-by/aggregate stage, folding GPU accumulators
//!    into the host accumulator.
//! 6. Read out the host accumulator's rows; the [`QueryContext`] dropped
//!    at the end of the call frees every GPU buffer it owns.
//!
//! A class pipeline fuses either the selection stage or the join stage,
//! never both (§4.4 never classifies a segment by both selection and join
//! residency bits for the four benchmark queries this engine targets);
//! [`run_query`] rejects a plan that mixes the two up front.

use crate::context::{DimensionTables, QueryContext};
use crate::config::EngineConfig;
use ssb_cache::SegmentStore;
use ssb_catalog::{Catalog, ColumnId};
use ssb_ops::{
    call_group_by, call_hash_build, call_hash_probe_form_a, call_selection_form_a,
    call_selection_form_b, switch_device_group_keys, switch_device_offsets,
    AnyGroupByAccumulator, AnyHashTableMut, GpuContext, GpuGroupByAccumulator, GroupByAccumulator,
    GroupKeyStream, GpuHashTable, HashTable, OffsetStream, ProbeJoin, GPU_ACC_STRIDE,
};
use ssb_planner::{build_schedule, join_dimension_ready, ClassPipeline, Device, JoinPayload, JoinSpec, QueryPlan, Schedule};
use ssb_runtime::allocator::{Allocator, MemType};
use ssb_runtime::error::{Error, ErrorKind, Result};
use ssb_runtime::memory::Mem;
use ssb_runtime::SEGMENT_SIZE;
use std::collections::HashSet;
use std::time::Instant;

/// The dense group-by hash domain a query's translator sizes from its
/// dimensions' cardinality (e.g. Q2.1's `(d_year, p_brand1)` pair), the
/// same `(total_val, mins, strides)` triple [`GroupByAccumulator::new`]
/// takes. Deciding this is outside this crate's scope (it needs per-query
/// knowledge the orchestrator doesn't have); the caller passes it in.
#[derive(Debug, Clone, Copy)]
pub struct AccumulatorShape {
    pub total_val: i64,
    pub mins: [i32; 4],
    pub strides: [i64; 4],
}

/// Runs `plan` to completion and returns its result rows as `(key1, key2,
/// key3, key4, sum)`, unsorted group-by order. `gpu` is `None` for a
/// CPU-only run; every placement class whose schedule picks `Device::Gpu`
/// for any stage then fails with a `Precondition` error instead of
/// silently falling back to the CPU.
pub fn run_query(
    config: &EngineConfig,
    plan: &QueryPlan,
    catalog: &Catalog,
    store: &mut SegmentStore,
    shape: AccumulatorShape,
    gpu: Option<GpuContext<'_>>,
) -> Result<Vec<(i32, i32, i32, i32, i64)>> {
    if !plan.selections.is_empty() && !plan.joins.is_empty() {
        return Err(Error::from(ErrorKind::InvalidArgument(
            "a class pipeline cannot fuse a selection stage and a join stage in the same run; split the query".to_string(),
        )));
    }
    if plan.selections.is_empty() && plan.joins.is_empty() {
        return Err(Error::from(ErrorKind::InvalidArgument(
            "a plan needs at least one selection or join to classify its fact segments by".to_string(),
        )));
    }
    let fact_col = *plan
        .aggregate
        .value_columns
        .first()
        .ok_or_else(|| Error::from(ErrorKind::InvalidArgument("aggregate stage needs at least one value column".to_string())))?;

    let mut ctx = QueryContext::new();
    let total_segment = catalog.fact_total_segment()?;

    if !config.custom {
        stage_gpu_baseline(store, catalog, plan, total_segment, config.ondemand_size)?;
    }
    let schedule = build_schedule(plan, store.bitmap(), catalog, total_segment);

    if config.skipping {
        warn_on_dropped_classes(plan, &schedule);
    }

    for join in &plan.joins {
        let (tables, cpu_elapsed, gpu_elapsed) = build_dimension_tables(catalog, store, gpu.as_ref(), join)?;
        ctx.add_cpu_time(cpu_elapsed);
        ctx.add_gpu_time(gpu_elapsed);
        ctx.push_table(tables);
    }

    let host_acc = GroupByAccumulator::new(shape.total_val, shape.mins, shape.strides);

    for pipeline in &schedule.classes {
        if config.verbose {
            log::debug!("class {}: {} segment(s), groupby on {:?}", pipeline.class.0, pipeline.segments.len(), pipeline.groupby_device);
        }
        run_class(config, plan, catalog, store, gpu.as_ref(), pipeline, fact_col, &shape, &host_acc, &mut ctx)?;
    }

    let rows = host_acc.rows();
    Ok(rows)
}

/// Stages every column this plan reads onto the GPU, up to `ondemand_size`
/// newly-installed segments, so that the ordinary residency-driven
/// schedule below resolves to one all-GPU class (§4.4's original
/// baseline). Used when `config.custom` is off instead of a third
/// `Device` variant, so C4's dispatch functions keep their exhaustive
/// two-variant match.
fn stage_gpu_baseline(store: &mut SegmentStore, catalog: &Catalog, plan: &QueryPlan, total_segment: usize, ondemand_size: usize) -> Result<()> {
    let mut columns: Vec<ColumnId> = plan.selections.iter().map(|s| s.column).collect();
    for join in &plan.joins {
        columns.push(join.probe_column);
        columns.push(join.build_column);
        if let Some(filter) = &join.filter {
            columns.push(filter.column);
        }
        if let JoinPayload::GroupKey(gk) = join.payload {
            columns.push(gk);
        }
    }
    columns.extend(plan.aggregate.value_columns.iter().copied());
    columns.sort_unstable();
    columns.dedup();

    let mut staged = 0usize;
    for col in columns {
        let column = catalog.column(col);
        let segments = if column.table.is_fact() { total_segment } else { column.total_segment };
        for seg in 0..segments {
            if store.is_gpu_resident(col, seg) {
                continue;
            }
            if staged >= ondemand_size {
                return Err(Error::from(ErrorKind::ResourceExhausted(format!(
                    "all-GPU baseline needs more than the configured ondemand_size of {} staged segments",
                    ondemand_size
                ))));
            }
            store.install_gpu_copy(column, seg)?;
            staged += 1;
        }
    }
    Ok(())
}

/// Logs every placement class absent from `schedule` because it held no
/// segments, instead of the planner's silent drop.
fn warn_on_dropped_classes(plan: &QueryPlan, schedule: &Schedule) {
    let present: HashSet<u8> = schedule.classes.iter().map(|c| c.class.0).collect();
    let total_bits = plan.class_bit_count();
    for class in 0..(1u32 << total_bits) {
        if !present.contains(&(class as u8)) {
            log::warn!("placement class {} has no segments; dropped from the schedule", class);
        }
    }
}

/// Builds one join's dimension-side hash tables: a CPU table
/// unconditionally (every fact class may need to probe on CPU, and a
/// dimension's CPU copy always exists), and a GPU table when the
/// dimension is fully GPU-resident ([`join_dimension_ready`]).
fn build_dimension_tables(
    catalog: &Catalog,
    store: &SegmentStore,
    gpu: Option<&GpuContext<'_>>,
    join: &JoinSpec,
) -> Result<(DimensionTables, std::time::Duration, std::time::Duration)> {
    let dim_col = catalog.column(join.build_column);
    let num_slots = dim_col.value_range() as usize;
    let segments: Vec<usize> = (0..dim_col.total_segment).collect();
    let num_items = dim_col.total_tuples as i64;

    let cpu_start = Instant::now();
    let cpu_table = HashTable::new(num_slots, dim_col.min);
    {
        let mut target = AnyHashTableMut::Cpu(&cpu_table);
        call_hash_build(Device::Cpu, None, store, join.build_column, &join.payload, join.filter.as_ref(), 0, num_items, &segments, &mut target)?;
    }
    let cpu_elapsed = cpu_start.elapsed();

    let mut gpu_elapsed = std::time::Duration::ZERO;
    let gpu_table = if join_dimension_ready(catalog, join) {
        let gpu_ctx = gpu.ok_or_else(|| {
            Error::from(ErrorKind::Precondition("a dimension is fully GPU-resident but no GpuContext was given".to_string()))
        })?;
        let gpu_start = Instant::now();
        let mem = zeroed_dev_i64(num_slots * 2)?;
        let mut table = GpuHashTable::new(mem, num_slots, dim_col.min);
        {
            let mut target = AnyHashTableMut::Gpu(&mut table);
            call_hash_build(Device::Gpu, Some(gpu_ctx), store, join.build_column, &join.payload, join.filter.as_ref(), 0, num_items, &segments, &mut target)?;
        }
        gpu_elapsed = gpu_start.elapsed();
        Some(table)
    } else {
        None
    };

    Ok((DimensionTables { cpu: cpu_table, gpu: gpu_table }, cpu_elapsed, gpu_elapsed))
}

/// Splits a class's (ascending, possibly gappy) segment list into maximal
/// contiguous runs. Form A addressing and the GPU arena both require one
/// contiguous span per call, so a class that straddles a gap in its own
/// residency pattern runs as several calls instead of one.
fn contiguous_runs(segments: &[usize]) -> Vec<Vec<usize>> {
    let mut runs = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    for &seg in segments {
        if let Some(&last) = current.last() {
            if seg != last + 1 {
                runs.push(std::mem::take(&mut current));
            }
        }
        current.push(seg);
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// A fused multi-predicate/multi-join call takes one device for the whole
/// call; it runs on GPU only if every one of its bits chose GPU.
fn collapse_device(devices: &[Device]) -> Device {
    if devices.iter().all(|d| *d == Device::Gpu) {
        Device::Gpu
    } else {
        Device::Cpu
    }
}

fn zeroed_dev_i64(len: usize) -> Result<Mem<i64>> {
    Ok(Mem::CudaDevMem(rustacuda::memory::DeviceBuffer::from_slice(&vec![0i64; len])?))
}

#[allow(clippy::too_many_arguments)]
fn run_class(
    config: &EngineConfig,
    plan: &QueryPlan,
    catalog: &Catalog,
    store: &SegmentStore,
    gpu: Option<&GpuContext<'_>>,
    pipeline: &ClassPipeline,
    fact_col: ColumnId,
    shape: &AccumulatorShape,
    host_acc: &GroupByAccumulator,
    ctx: &mut QueryContext,
) -> Result<()> {
    for run in contiguous_runs(&pipeline.segments) {
        let base_offset = (run[0] * SEGMENT_SIZE) as i64;
        let num_items: i64 = run.iter().map(|&seg| catalog.column(fact_col).segment_len(seg) as i64).sum();
        if num_items == 0 {
            continue;
        }
        if num_items as usize > config.processing_size {
            return Err(Error::from(ErrorKind::ResourceExhausted(format!(
                "class {} segment run starting at segment {} has {} rows, exceeding the configured processing_size of {}",
                pipeline.class.0, run[0], num_items, config.processing_size
            ))));
        }

        let (offsets, group_keys) = if !plan.joins.is_empty() {
            run_joins(plan, store, gpu, pipeline, &run, base_offset, num_items, ctx)?
        } else {
            (run_selections(plan, store, gpu, pipeline, &run, base_offset, num_items, ctx)?, Vec::new())
        };
        if offsets.is_empty() {
            continue;
        }

        run_group_by(plan, store, gpu, pipeline, &offsets, &group_keys, shape, host_acc, ctx)?;
    }
    Ok(())
}

/// The selection-only pipeline shape (§4.4's "no joins" class): up to two
/// fused predicates via Form A over the whole run, then every remaining
/// predicate via Form B, chained through the previous stage's survivors.
/// C4's GPU Form B is unimplemented (see `ssb_ops::dispatch`), so every
/// chained stage after the first runs on CPU regardless of its own
/// residency bit.
fn run_selections(
    plan: &QueryPlan,
    store: &SegmentStore,
    gpu: Option<&GpuContext<'_>>,
    pipeline: &ClassPipeline,
    run: &[usize],
    base_offset: i64,
    num_items: i64,
    ctx: &mut QueryContext,
) -> Result<OffsetStream> {
    let mut pred_chunks = plan.selections.chunks(2);
    let first_preds = pred_chunks.next().unwrap_or(&[]);
    let device = collapse_device(&pipeline.selection_device[..first_preds.len()]);

    let mut current = OffsetStream::new(Mem::SysMem(vec![0i64; num_items as usize]));
    let start = Instant::now();
    call_selection_form_a(device, gpu, store, first_preds, base_offset, num_items, run, &mut current)?;
    match device {
        Device::Cpu => ctx.add_cpu_time(start.elapsed()),
        Device::Gpu => ctx.add_gpu_time(start.elapsed()),
    }

    for preds in pred_chunks {
        if current.is_empty() {
            break;
        }
        let mut next = OffsetStream::new(Mem::SysMem(vec![0i64; current.len()]));
        let start = Instant::now();
        call_selection_form_b(Device::Cpu, None, store, preds, &current, &mut next)?;
        ctx.add_cpu_time(start.elapsed());
        current = next;
    }
    Ok(current)
}

/// The join-only pipeline shape (§4.4's "at least one join" class): every
/// join fuses into a single probe call, since `call_hash_probe_form_a`
/// supports up to four.
fn run_joins(
    plan: &QueryPlan,
    store: &SegmentStore,
    gpu: Option<&GpuContext<'_>>,
    pipeline: &ClassPipeline,
    run: &[usize],
    base_offset: i64,
    num_items: i64,
    ctx: &mut QueryContext,
) -> Result<(OffsetStream, Vec<Option<GroupKeyStream>>)> {
    let device = collapse_device(&pipeline.join_device);

    let mut out_offsets = OffsetStream::new(Mem::SysMem(vec![0i64; num_items as usize]));
    let mut gk_streams: Vec<Option<GroupKeyStream>> = plan
        .joins
        .iter()
        .map(|j| matches!(j.payload, JoinPayload::GroupKey(_)).then(|| GroupKeyStream::new(Mem::SysMem(vec![0i32; num_items as usize]))))
        .collect();

    {
        let joins: Vec<ProbeJoin> = plan
            .joins
            .iter()
            .enumerate()
            .map(|(i, j)| {
                let table = ctx.table(i).for_device(device)?;
                Ok(ProbeJoin { probe_column: j.probe_column, table: Some(table), emits_group_key: matches!(j.payload, JoinPayload::GroupKey(_)) })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut gk_refs: Vec<Option<&mut GroupKeyStream>> = gk_streams.iter_mut().map(|s| s.as_mut()).collect();
        let start = Instant::now();
        call_hash_probe_form_a(device, gpu, store, &joins, base_offset, num_items, run, &mut out_offsets, &mut gk_refs)?;
        match device {
            Device::Cpu => ctx.add_cpu_time(start.elapsed()),
            Device::Gpu => ctx.add_gpu_time(start.elapsed()),
        }
    }

    Ok((out_offsets, gk_streams))
}

#[allow(clippy::too_many_arguments)]
fn run_group_by(
    plan: &QueryPlan,
    store: &SegmentStore,
    gpu: Option<&GpuContext<'_>>,
    pipeline: &ClassPipeline,
    offsets: &OffsetStream,
    group_keys: &[Option<GroupKeyStream>],
    shape: &AccumulatorShape,
    host_acc: &GroupByAccumulator,
    ctx: &mut QueryContext,
) -> Result<()> {
    let mode = plan.aggregate.mode;
    let value_columns = &plan.aggregate.value_columns;

    match pipeline.groupby_device {
        Device::Cpu => {
            let key_refs: Vec<Option<&GroupKeyStream>> = group_keys.iter().map(|k| k.as_ref()).collect();
            let mut acc = AnyGroupByAccumulator::Cpu(host_acc);
            let start = Instant::now();
            call_group_by(Device::Cpu, None, store, mode, value_columns, &key_refs, offsets, &mut acc)?;
            ctx.add_cpu_time(start.elapsed());
        }
        Device::Gpu => {
            let gpu_ctx = gpu.ok_or_else(|| Error::from(ErrorKind::Precondition("group-by scheduled on GPU but no GpuContext was given".to_string())))?;

            let transfer_start = Instant::now();
            let dev_offsets = switch_device_offsets(offsets, Allocator::mem_alloc_fn::<i64>(MemType::CudaDevMem), gpu_ctx.stream)?;
            let mut dev_keys: Vec<Option<GroupKeyStream>> = Vec::with_capacity(group_keys.len());
            for key in group_keys {
                dev_keys.push(match key {
                    Some(s) => Some(switch_device_group_keys(s, Allocator::mem_alloc_fn::<i32>(MemType::CudaDevMem), gpu_ctx.stream)?),
                    None => None,
                });
            }
            ctx.add_transfer_time(transfer_start.elapsed());

            let key_refs: Vec<Option<&GroupKeyStream>> = dev_keys.iter().map(|k| k.as_ref()).collect();
            let acc_mem = zeroed_dev_i64(shape.total_val as usize * GPU_ACC_STRIDE)?;
            let mut gpu_acc = GpuGroupByAccumulator::new(acc_mem, shape.total_val, shape.mins, shape.strides);
            let mut acc = AnyGroupByAccumulator::Gpu(&mut gpu_acc);

            let gpu_start = Instant::now();
            call_group_by(Device::Gpu, Some(gpu_ctx), store, mode, value_columns, &key_refs, &dev_offsets, &mut acc)?;
            ctx.add_gpu_time(gpu_start.elapsed());

            let reduce_start = Instant::now();
            gpu_acc.reduce_into(host_acc)?;
            ctx.add_transfer_time(reduce_start.elapsed());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssb_catalog::{ColumnSpec, Table};
    use ssb_planner::{Aggregate, AggregateMode, Selection};

    #[test]
    fn contiguous_runs_splits_on_gaps() {
        assert_eq!(contiguous_runs(&[0, 1, 2, 4, 5, 7]), vec![vec![0, 1, 2], vec![4, 5], vec![7]]);
        assert_eq!(contiguous_runs(&[3]), vec![vec![3]]);
        assert_eq!(contiguous_runs(&[]), Vec::<Vec<usize>>::new());
    }

    #[test]
    fn collapse_device_is_gpu_only_when_every_bit_is_gpu() {
        assert_eq!(collapse_device(&[Device::Gpu, Device::Gpu]), Device::Gpu);
        assert_eq!(collapse_device(&[Device::Gpu, Device::Cpu]), Device::Cpu);
        assert_eq!(collapse_device(&[]), Device::Gpu);
    }

    fn single_segment_shape(total_val: i64, min0: i32) -> AccumulatorShape {
        AccumulatorShape { total_val, mins: [min0, 0, 0, 0], strides: [1, 0, 0, 0] }
    }

    #[test]
    fn run_query_rejects_a_plan_with_neither_selections_nor_joins() {
        let catalog = Catalog::load(&[ColumnSpec { table: Table::Lineorder, name: "lo_revenue", total_tuples: 4, min: 0, max: 1000 }]);
        let mut store = SegmentStore::new(&catalog, Mem::SysMem(vec![0; SEGMENT_SIZE]));
        store.load_cpu_segment(catalog.column(0), 0, vec![1, 2, 3, 4]).unwrap();
        let plan = QueryPlan { selections: vec![], joins: vec![], aggregate: Aggregate { mode: AggregateMode::V1, value_columns: vec![0] } };

        let err = run_query(&EngineConfig::default(), &plan, &catalog, &mut store, single_segment_shape(1, 0), None).unwrap_err();
        match err.kind() {
            ErrorKind::InvalidArgument(_) => {}
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
    }

    #[test]
    fn run_query_rejects_a_plan_mixing_selections_and_joins() {
        let catalog = Catalog::load(&[
            ColumnSpec { table: Table::Lineorder, name: "lo_quantity", total_tuples: 4, min: 0, max: 50 },
            ColumnSpec { table: Table::Lineorder, name: "lo_revenue", total_tuples: 4, min: 0, max: 1000 },
            ColumnSpec { table: Table::Lineorder, name: "lo_partkey", total_tuples: 4, min: 1, max: 4 },
            ColumnSpec { table: Table::Part, name: "p_partkey", total_tuples: 4, min: 1, max: 4 },
        ]);
        let mut store = SegmentStore::new(&catalog, Mem::SysMem(vec![0; SEGMENT_SIZE]));
        for (col, data) in [(0, vec![1, 2, 3, 4]), (1, vec![1, 2, 3, 4]), (2, vec![1, 2, 3, 4]), (3, vec![1, 2, 3, 4])] {
            store.load_cpu_segment(catalog.column(col), 0, data).unwrap();
        }
        let plan = QueryPlan {
            selections: vec![Selection { column: 0, lo: 0, hi: 50 }],
            joins: vec![JoinSpec { probe_column: 2, build_column: 3, dim_table: Table::Part, filter: None, payload: JoinPayload::Offset }],
            aggregate: Aggregate { mode: AggregateMode::V1, value_columns: vec![1] },
        };

        let err = run_query(&EngineConfig::default(), &plan, &catalog, &mut store, single_segment_shape(1, 0), None).unwrap_err();
        match err.kind() {
            ErrorKind::InvalidArgument(_) => {}
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
    }

    #[test]
    fn selection_only_plan_sums_the_rows_that_pass() {
        let catalog = Catalog::load(&[
            ColumnSpec { table: Table::Lineorder, name: "lo_quantity", total_tuples: 8, min: 0, max: 50 },
            ColumnSpec { table: Table::Lineorder, name: "lo_extendedprice", total_tuples: 8, min: 0, max: 100_000 },
            ColumnSpec { table: Table::Lineorder, name: "lo_discount", total_tuples: 8, min: 0, max: 10 },
        ]);
        let mut store = SegmentStore::new(&catalog, Mem::SysMem(vec![0; SEGMENT_SIZE]));
        store.load_cpu_segment(catalog.column(0), 0, vec![1, 26, 10, 24, 25, 5, 30, 12]).unwrap();
        store.load_cpu_segment(catalog.column(1), 0, vec![100, 200, 300, 400, 500, 600, 700, 800]).unwrap();
        store.load_cpu_segment(catalog.column(2), 0, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        let plan = QueryPlan {
            selections: vec![Selection { column: 0, lo: 1, hi: 24 }],
            joins: vec![],
            aggregate: Aggregate { mode: AggregateMode::V1TimesV2, value_columns: vec![1, 2] },
        };

        // Rows 0, 2, 3, 5, 7 pass lo_quantity in [1, 24]: 100*1 + 300*3 + 400*4 + 600*6 + 800*8.
        let rows = run_query(&EngineConfig::default(), &plan, &catalog, &mut store, single_segment_shape(1, 0), None).unwrap();
        assert_eq!(rows, vec![(0, 0, 0, 0, 12_600)]);
    }

    #[test]
    fn join_plan_groups_by_the_dimension_attribute_the_join_carries() {
        let catalog = Catalog::load(&[
            ColumnSpec { table: Table::Lineorder, name: "lo_partkey", total_tuples: 8, min: 1, max: 5 },
            ColumnSpec { table: Table::Lineorder, name: "lo_revenue", total_tuples: 8, min: 0, max: 100_000 },
            ColumnSpec { table: Table::Part, name: "p_partkey", total_tuples: 4, min: 1, max: 4 },
            ColumnSpec { table: Table::Part, name: "p_brand1", total_tuples: 4, min: 100, max: 103 },
        ]);
        let mut store = SegmentStore::new(&catalog, Mem::SysMem(vec![0; SEGMENT_SIZE]));
        store.load_cpu_segment(catalog.column(0), 0, vec![1, 2, 3, 4, 1, 2, 5, 3]).unwrap();
        store.load_cpu_segment(catalog.column(1), 0, vec![10, 20, 30, 40, 50, 60, 70, 80]).unwrap();
        store.load_cpu_segment(catalog.column(2), 0, vec![1, 2, 3, 4]).unwrap();
        store.load_cpu_segment(catalog.column(3), 0, vec![100, 101, 102, 103]).unwrap();

        let plan = QueryPlan {
            selections: vec![],
            joins: vec![JoinSpec { probe_column: 0, build_column: 2, dim_table: Table::Part, filter: None, payload: JoinPayload::GroupKey(3) }],
            aggregate: Aggregate { mode: AggregateMode::V1, value_columns: vec![1] },
        };

        // Fact row with partkey 5 (row 6) has no matching dimension row and is dropped.
        let mut rows = run_query(&EngineConfig::default(), &plan, &catalog, &mut store, single_segment_shape(4, 100), None).unwrap();
        rows.sort();
        assert_eq!(rows, vec![(100, 0, 0, 0, 60), (101, 0, 0, 0, 80), (102, 0, 0, 0, 110), (103, 0, 0, 0, 40)]);
    }
}
