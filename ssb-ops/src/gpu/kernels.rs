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

//! Thin `launch!` wrappers around the kernel families in `cuda/*.cu`. Each
//! function takes already-resolved [`LaunchablePtr`]/[`LaunchableMutPtr`]
//! arguments (minted by the dispatcher from the `Mem` it owns) and a grid
//! it computes from the tile size the kernels were compiled with.

use super::module::{
    KernelModule, AGGREGATE, GATHER, GROUP_BY, HASH_BUILD, HASH_BUILD_FILTERED, HASH_PROBE_FORM_A,
    SELECTION_FORM_A, SELECTION_FORM_B,
};
use rustacuda::launch;
use rustacuda::memory::{DeviceBuffer, DeviceCopy};
use rustacuda::stream::Stream;
use ssb_runtime::error::Result;
use ssb_runtime::launchable::{LaunchableMutPtr, LaunchablePtr};

/// Tile size the `.cu` kernels were explicitly instantiated with
/// (`BLOCK_THREADS=128, ITEMS_PER_THREAD=4`).
const SCAN_BLOCK_THREADS: u32 = 128;
const SCAN_TILE_SIZE: u32 = 512;
/// Block size used by the one-thread-per-row kernels (hash build,
/// group-by) and required exactly by `aggregate_kernel`'s
/// `cub::BlockReduce<long long, 256>`.
const ROW_BLOCK_THREADS: u32 = 256;

fn grid_for(num_items: i64, tile: u32) -> u32 {
    (((num_items.max(0) as u64) + tile as u64 - 1) / tile as u64).max(1) as u32
}

pub const MAX_JOINS: usize = 4;

/// Mirrors `cuda/hash_probe.cu`'s `JoinTable`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct JoinTableArg {
    pub table: LaunchablePtr<i64>,
    pub num_slots: i32,
    pub key_min: i32,
    pub emits_group_key: i32,
}

unsafe impl DeviceCopy for JoinTableArg {}

impl JoinTableArg {
    pub fn absent() -> Self {
        JoinTableArg {
            table: LaunchablePtr::null(),
            num_slots: 0,
            key_min: 0,
            emits_group_key: 0,
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn launch_selection_form_a(
    module: &KernelModule,
    stream: &Stream,
    col1: LaunchablePtr<i32>,
    lo1: i32,
    hi1: i32,
    col2: LaunchablePtr<i32>,
    lo2: i32,
    hi2: i32,
    base_offset: i64,
    num_items: i64,
    out_offsets: LaunchableMutPtr<i64>,
    out_count: LaunchableMutPtr<u64>,
) -> Result<()> {
    let function = module.function(SELECTION_FORM_A)?;
    let grid = grid_for(num_items, SCAN_TILE_SIZE);
    unsafe {
        launch!(function<<<grid, SCAN_BLOCK_THREADS, 0, stream>>>(
            col1, lo1, hi1, col2, lo2, hi2, base_offset, num_items, out_offsets, out_count
        ))?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn launch_selection_form_b(
    module: &KernelModule,
    stream: &Stream,
    in_offsets: LaunchablePtr<i64>,
    num_items: i64,
    arena1: LaunchablePtr<i32>,
    col_idx1: LaunchablePtr<u32>,
    lo1: i32,
    hi1: i32,
    arena2: LaunchablePtr<i32>,
    col_idx2: LaunchablePtr<u32>,
    lo2: i32,
    hi2: i32,
    out_offsets: LaunchableMutPtr<i64>,
    out_count: LaunchableMutPtr<u64>,
) -> Result<()> {
    let function = module.function(SELECTION_FORM_B)?;
    let grid = grid_for(num_items, SCAN_TILE_SIZE);
    unsafe {
        launch!(function<<<grid, SCAN_BLOCK_THREADS, 0, stream>>>(
            in_offsets, num_items, arena1, col_idx1, lo1, hi1, arena2, col_idx2, lo2, hi2,
            out_offsets, out_count
        ))?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn launch_hash_build(
    module: &KernelModule,
    stream: &Stream,
    key_col: LaunchablePtr<i32>,
    payload_col: LaunchablePtr<i32>,
    num_items: i64,
    base_offset: i64,
    key_min: i32,
    num_slots: i32,
    hash_table: LaunchableMutPtr<i64>,
) -> Result<()> {
    let function = module.function(HASH_BUILD)?;
    let grid = grid_for(num_items, ROW_BLOCK_THREADS);
    unsafe {
        launch!(function<<<grid, ROW_BLOCK_THREADS, 0, stream>>>(
            key_col, payload_col, num_items, base_offset, key_min, num_slots, hash_table
        ))?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn launch_hash_build_filtered(
    module: &KernelModule,
    stream: &Stream,
    key_col: LaunchablePtr<i32>,
    payload_col: LaunchablePtr<i32>,
    filter_col: LaunchablePtr<i32>,
    filter_lo: i32,
    filter_hi: i32,
    num_items: i64,
    base_offset: i64,
    key_min: i32,
    num_slots: i32,
    hash_table: LaunchableMutPtr<i64>,
) -> Result<()> {
    let function = module.function(HASH_BUILD_FILTERED)?;
    let grid = grid_for(num_items, ROW_BLOCK_THREADS);
    unsafe {
        launch!(function<<<grid, ROW_BLOCK_THREADS, 0, stream>>>(
            key_col, payload_col, filter_col, filter_lo, filter_hi, num_items, base_offset,
            key_min, num_slots, hash_table
        ))?;
    }
    Ok(())
}

/// Uploads the per-join parameters and fact-column pointers as small device
/// arrays (the kernel's array-of-pointer parameters decay to these), then
/// launches the fused probe.
#[allow(clippy::too_many_arguments)]
pub fn launch_hash_probe_form_a(
    module: &KernelModule,
    stream: &Stream,
    fact_cols: [LaunchablePtr<i32>; MAX_JOINS],
    joins: [JoinTableArg; MAX_JOINS],
    num_joins: i32,
    base_offset: i64,
    num_items: i64,
    out_offsets: LaunchableMutPtr<i64>,
    out_group_keys: [LaunchableMutPtr<i32>; MAX_JOINS],
    out_count: LaunchableMutPtr<u64>,
) -> Result<()> {
    let function = module.function(HASH_PROBE_FORM_A)?;
    let grid = grid_for(num_items, SCAN_TILE_SIZE);

    let fact_cols_dev = DeviceBuffer::from_slice(&fact_cols)?;
    let joins_dev = DeviceBuffer::from_slice(&joins)?;
    let out_group_keys_dev = DeviceBuffer::from_slice(&out_group_keys)?;

    unsafe {
        launch!(function<<<grid, SCAN_BLOCK_THREADS, 0, stream>>>(
            fact_cols_dev.as_device_ptr(),
            joins_dev.as_device_ptr(),
            num_joins,
            base_offset,
            num_items,
            out_offsets,
            out_group_keys_dev.as_device_ptr(),
            out_count
        ))?;
    }
    Ok(())
}

pub const MAX_GROUP_KEYS: usize = 4;

#[allow(clippy::too_many_arguments)]
pub fn launch_group_by(
    module: &KernelModule,
    stream: &Stream,
    group_keys: [LaunchablePtr<i32>; MAX_GROUP_KEYS],
    value1: LaunchablePtr<i32>,
    value2: LaunchablePtr<i32>,
    mode: i32,
    num_items: i64,
    mins: [i32; MAX_GROUP_KEYS],
    strides: [i64; MAX_GROUP_KEYS],
    total_val: i64,
    accumulator: LaunchableMutPtr<i64>,
) -> Result<()> {
    let function = module.function(GROUP_BY)?;
    let grid = grid_for(num_items, ROW_BLOCK_THREADS);

    let group_keys_dev = DeviceBuffer::from_slice(&group_keys)?;
    let mins_dev = DeviceBuffer::from_slice(&mins)?;
    let strides_dev = DeviceBuffer::from_slice(&strides)?;

    unsafe {
        launch!(function<<<grid, ROW_BLOCK_THREADS, 0, stream>>>(
            group_keys_dev.as_device_ptr(),
            value1,
            value2,
            mode,
            num_items,
            mins_dev.as_device_ptr(),
            strides_dev.as_device_ptr(),
            total_val,
            accumulator
        ))?;
    }
    Ok(())
}

/// Materialises a dense per-survivor value stream for one fact column
/// (`cuda/gather.cu`), the same `resolve_offset` addressing Form B
/// selection uses. Group-by's `value1`/`value2` kernel parameters are
/// plain contiguous arrays indexed by output row, so any value column
/// that isn't already dense (i.e. every GPU group-by once a prior
/// selection or join has filtered rows) needs this gather first.
pub fn launch_gather_column(
    module: &KernelModule,
    stream: &Stream,
    offsets: LaunchablePtr<i64>,
    num_items: i64,
    arena: LaunchablePtr<i32>,
    col_idx: LaunchablePtr<u32>,
    out: LaunchableMutPtr<i32>,
) -> Result<()> {
    let function = module.function(GATHER)?;
    let grid = grid_for(num_items, ROW_BLOCK_THREADS);
    unsafe {
        launch!(function<<<grid, ROW_BLOCK_THREADS, 0, stream>>>(
            offsets, num_items, arena, col_idx, out
        ))?;
    }
    Ok(())
}

pub fn launch_aggregate(
    module: &KernelModule,
    stream: &Stream,
    value1: LaunchablePtr<i32>,
    value2: LaunchablePtr<i32>,
    mode: i32,
    num_items: i64,
    accumulator: LaunchableMutPtr<i64>,
) -> Result<()> {
    let function = module.function(AGGREGATE)?;
    let grid = grid_for(num_items, ROW_BLOCK_THREADS);
    unsafe {
        launch!(function<<<grid, ROW_BLOCK_THREADS, 0, stream>>>(
            value1, value2, mode, num_items, accumulator
        ))?;
    }
    Ok(())
}
