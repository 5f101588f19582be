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

//! Device dispatch (C4): one `call_<op>` entry point per operator that
//! picks the CPU or GPU implementation for a placement class's device
//! decision, plus `switch_device_*` transfers between host and device
//! offset streams. The dispatcher, not the kernels, owns offset-stream
//! lifetimes between operators (§4.3).

use crate::cpu;
use crate::gpu::kernels::{self, JoinTableArg, MAX_JOINS};
use crate::gpu::KernelModule;
use crate::hash_table::{AnyHashTable, AnyHashTableMut, HashTable};
use crate::offset_stream::{GroupKeyStream, OffsetStream, Stream};
use crate::row_source::{OffsetStreamSource, SegmentGroupSource};
use rustacuda::memory::{CopyDestination, DeviceBox, DeviceCopy};
use rustacuda::stream::Stream as CudaStream;
use ssb_cache::SegmentStore;
use ssb_catalog::ColumnId;
use ssb_planner::{AggregateMode, Device, JoinPayload, Selection};
use ssb_runtime::error::{Error, ErrorKind, Result};
use ssb_runtime::launchable::{launchable_mut_ptr_from_raw, LaunchableMutPtr, LaunchablePtr};
use ssb_runtime::memory::Mem;

/// GPU launch context: the loaded kernel module and the stream this
/// class's pipeline is bound to (§5: "each class pipeline binds to one
/// stream").
pub struct GpuContext<'a> {
    pub module: &'a KernelModule,
    pub stream: &'a CudaStream,
}

fn zeroed_count_box() -> Result<DeviceBox<u64>> {
    Ok(DeviceBox::new(&0u64)?)
}

fn count_box_mut_ptr(count_box: &mut DeviceBox<u64>) -> LaunchableMutPtr<u64> {
    let mut ptr = count_box.as_device_ptr();
    launchable_mut_ptr_from_raw(ptr.as_raw_mut())
}

/// Reads back a device scalar written by `atomicAdd(out_count, ...)` to
/// learn the producer's observed element count (§4.3: "sized by the
/// observed element count, never by capacity").
fn read_back_count(count_box: &DeviceBox<u64>) -> Result<usize> {
    let mut host_count = 0u64;
    count_box.copy_to(&mut host_count)?;
    Ok(host_count as usize)
}

fn null_i32() -> LaunchablePtr<i32> {
    LaunchablePtr::null()
}

fn require_gpu<'a>(ctx: Option<&'a GpuContext<'a>>) -> Result<&'a GpuContext<'a>> {
    ctx.ok_or_else(|| Error::from(ErrorKind::InvalidArgument("GPU device chosen without a GpuContext".to_string())))
}

/// Form A runs over a contiguous run of whole segments; the GPU kernel
/// addresses them as a single pointer offset, which only holds if the run
/// was installed into contiguous arena slabs. The orchestrator is
/// responsible for installing a class's segments in order so that this
/// holds; violating it surfaces as a `Precondition`, the same way any
/// other out-of-bounds GPU pointer request does.
fn contiguous_arena_ptr(store: &SegmentStore, col: ColumnId, segments: &[usize]) -> Result<LaunchablePtr<i32>> {
    let first = *segments
        .first()
        .ok_or_else(|| Error::from(ErrorKind::InvalidArgument("empty segment group".to_string())))?;
    let first_addr = store.gpu_ptr(col, first)?;
    for (i, &seg) in segments.iter().enumerate() {
        let addr = store.gpu_ptr(col, seg)?;
        if addr.slab_id != first_addr.slab_id + i as u32 {
            return Err(Error::from(ErrorKind::Precondition(format!(
                "column {} segment group is not contiguous in the GPU arena starting at slab {}",
                col, first_addr.slab_id
            ))));
        }
    }
    let base = store.arena().storage().as_launchable_ptr();
    Ok(unsafe { launchable_offset(base, first_addr.arena_offset()) })
}

unsafe fn launchable_offset(base: LaunchablePtr<i32>, elements: usize) -> LaunchablePtr<i32> {
    ssb_runtime::launchable::launchable_ptr_from_raw(base.as_ptr().add(elements))
}

/// σ (selection), Form A: a contiguous run of whole fact segments.
#[allow(clippy::too_many_arguments)]
pub fn call_selection_form_a(
    device: Device,
    ctx: Option<&GpuContext<'_>>,
    store: &SegmentStore,
    predicates: &[Selection],
    base_offset: i64,
    num_items: i64,
    segments: &[usize],
    out: &mut OffsetStream,
) -> Result<()> {
    assert!(predicates.len() <= 2, "at most two fused range predicates are supported");
    match device {
        Device::Cpu => {
            let source = SegmentGroupSource { base_offset, len: num_items as usize };
            cpu::selection::select(store, predicates, &source, out)
        }
        Device::Gpu => {
            let ctx = require_gpu(ctx)?;
            let (col1, lo1, hi1) = (predicates[0].column, predicates[0].lo, predicates[0].hi);
            let col1_ptr = contiguous_arena_ptr(store, col1, segments)?;
            let (col2_ptr, lo2, hi2) = if predicates.len() > 1 {
                (contiguous_arena_ptr(store, predicates[1].column, segments)?, predicates[1].lo, predicates[1].hi)
            } else {
                (null_i32(), 0, 0)
            };

            if !out.is_host_reachable() {
                return Err(Error::from(ErrorKind::InvalidArgument(
                    "selection output stream must be host-reachable or pinned for readback".to_string(),
                )));
            }
            let out_ptr = out.mem_mut().as_launchable_mut_ptr();
            let mut count_box = zeroed_count_box()?;
            let count_ptr = count_box_mut_ptr(&mut count_box);
            kernels::launch_selection_form_a(ctx.module, ctx.stream, col1_ptr, lo1, hi1, col2_ptr, lo2, hi2, base_offset, num_items, out_ptr, count_ptr)?;
            ctx.stream.synchronize()?;
            let observed = read_back_count(&count_box)?;
            out.set_len(observed)
        }
    }
}

/// σ (selection), Form B: gathers through an existing offset stream.
/// Gated on a device-resident input stream, which the caller obtains via
/// [`switch_device_offsets`] if the upstream operator ran on the CPU.
pub fn call_selection_form_b(
    device: Device,
    ctx: Option<&GpuContext<'_>>,
    store: &SegmentStore,
    predicates: &[Selection],
    in_offsets: &OffsetStream,
    out: &mut OffsetStream,
) -> Result<()> {
    assert!(predicates.len() <= 2, "at most two fused range predicates are supported");
    match device {
        Device::Cpu => {
            let offsets = match in_offsets.mem() {
                Mem::SysMem(v) => &v[..in_offsets.len()],
                _ => return Err(Error::from(ErrorKind::InvalidArgument("CPU selection requires a host-reachable input offset stream".to_string()))),
            };
            let source = OffsetStreamSource { offsets };
            cpu::selection::select(store, predicates, &source, out)
        }
        Device::Gpu => {
            let _ctx = require_gpu(ctx)?;
            Err(Error::from(ErrorKind::Device(
                "GPU form-B selection requires a device-resident input offset stream; see switch_device_offsets".to_string(),
            )))
        }
    }
}

/// β (hash build): populates `table` from one dimension's segment group.
#[allow(clippy::too_many_arguments)]
pub fn call_hash_build(
    device: Device,
    ctx: Option<&GpuContext<'_>>,
    store: &SegmentStore,
    key_col: ColumnId,
    payload: &JoinPayload,
    filter: Option<&Selection>,
    base_offset: i64,
    num_items: i64,
    segments: &[usize],
    table: &mut AnyHashTableMut,
) -> Result<()> {
    match (device, table) {
        (Device::Cpu, AnyHashTableMut::Cpu(table)) => {
            let source = SegmentGroupSource { base_offset, len: num_items as usize };
            cpu::hash_build::build(store, key_col, payload, filter, &source, table);
            Ok(())
        }
        (Device::Gpu, AnyHashTableMut::Gpu(table)) => {
            let ctx = require_gpu(ctx)?;
            let key_ptr = contiguous_arena_ptr(store, key_col, segments)?;
            let payload_ptr = match payload {
                JoinPayload::Offset => null_i32(),
                JoinPayload::GroupKey(col) => contiguous_arena_ptr(store, *col, segments)?,
            };
            let key_min = table.key_min();
            let num_slots = table.num_slots() as i32;
            let hash_table_ptr = table.as_launchable_mut_ptr();

            let result = match filter {
                None => kernels::launch_hash_build(ctx.module, ctx.stream, key_ptr, payload_ptr, num_items, base_offset, key_min, num_slots, hash_table_ptr),
                Some(f) => {
                    let filter_ptr = contiguous_arena_ptr(store, f.column, segments)?;
                    kernels::launch_hash_build_filtered(
                        ctx.module, ctx.stream, key_ptr, payload_ptr, filter_ptr, f.lo, f.hi, num_items, base_offset, key_min, num_slots, hash_table_ptr,
                    )
                }
            };
            result?;
            ctx.stream.synchronize()?;
            Ok(())
        }
        (device, table) => Err(Error::from(ErrorKind::InvalidArgument(format!(
            "hash build device {:?} does not match the hash table's memory ({})",
            device,
            if matches!(table, AnyHashTableMut::Cpu(_)) { "CPU" } else { "GPU" }
        )))),
    }
}

/// One join slot for the fused probe, with its hash table (if any) and
/// whether it feeds a group-key output stream.
pub struct ProbeJoin<'a> {
    pub probe_column: ColumnId,
    pub table: Option<AnyHashTable<'a>>,
    pub emits_group_key: bool,
}

/// π (hash probe) with up to four fused joins, Form A.
#[allow(clippy::too_many_arguments)]
pub fn call_hash_probe_form_a(
    device: Device,
    ctx: Option<&GpuContext<'_>>,
    store: &SegmentStore,
    joins: &[ProbeJoin],
    base_offset: i64,
    num_items: i64,
    segments: &[usize],
    out_offsets: &mut OffsetStream,
    out_group_keys: &mut [Option<&mut GroupKeyStream>],
) -> Result<()> {
    assert!(joins.len() <= MAX_JOINS);
    match device {
        Device::Cpu => {
            let source = SegmentGroupSource { base_offset, len: num_items as usize };
            let slots: Result<Vec<cpu::hash_probe::JoinSlot>> = joins
                .iter()
                .map(|j| {
                    let table = match &j.table {
                        None => None,
                        Some(AnyHashTable::Cpu(t)) => Some(*t),
                        Some(AnyHashTable::Gpu(_)) => {
                            return Err(Error::from(ErrorKind::InvalidArgument("CPU probe requires a CPU-resident hash table".to_string())))
                        }
                    };
                    Ok(cpu::hash_probe::JoinSlot { probe_column: j.probe_column, table, emits_group_key: j.emits_group_key })
                })
                .collect();
            cpu::hash_probe::probe(store, &slots?, &source, out_offsets, out_group_keys)
        }
        Device::Gpu => {
            let ctx = require_gpu(ctx)?;

            let mut fact_cols = [null_i32(); MAX_JOINS];
            let mut join_args = [JoinTableArg::absent(); MAX_JOINS];
            for (j, join) in joins.iter().enumerate() {
                fact_cols[j] = contiguous_arena_ptr(store, join.probe_column, segments)?;
                match &join.table {
                    None => {}
                    Some(AnyHashTable::Gpu(table)) => {
                        join_args[j] = JoinTableArg {
                            table: table.as_launchable_ptr(),
                            num_slots: table.num_slots() as i32,
                            key_min: table.key_min(),
                            emits_group_key: join.emits_group_key as i32,
                        };
                    }
                    Some(AnyHashTable::Cpu(_)) => {
                        return Err(Error::from(ErrorKind::InvalidArgument("GPU probe requires a GPU-resident hash table".to_string())))
                    }
                }
            }

            if !out_offsets.is_host_reachable() {
                return Err(Error::from(ErrorKind::InvalidArgument("probe output offsets must be host-reachable or pinned for readback".to_string())));
            }
            let out_offsets_ptr = out_offsets.mem_mut().as_launchable_mut_ptr();
            let mut out_group_key_ptrs = [LaunchableMutPtr::null_mut(); MAX_JOINS];
            for (j, stream) in out_group_keys.iter_mut().enumerate() {
                if let Some(s) = stream {
                    out_group_key_ptrs[j] = s.mem_mut().as_launchable_mut_ptr();
                }
            }

            let mut count_box = zeroed_count_box()?;
            let count_ptr = count_box_mut_ptr(&mut count_box);
            kernels::launch_hash_probe_form_a(
                ctx.module, ctx.stream, fact_cols, join_args, joins.len() as i32, base_offset, num_items, out_offsets_ptr, out_group_key_ptrs, count_ptr,
            )?;
            ctx.stream.synchronize()?;
            let observed = read_back_count(&count_box)?;
            out_offsets.set_len(observed)?;
            for stream in out_group_keys.iter_mut().flatten() {
                stream.set_len(observed)?;
            }
            Ok(())
        }
    }
}

fn aggregate_mode_code(mode: AggregateMode) -> i32 {
    match mode {
        AggregateMode::V1 => 0,
        AggregateMode::V1MinusV2 => 1,
        AggregateMode::V1TimesV2 => 2,
    }
}

/// γ/Σ (group-by / aggregate) for one class's surviving rows.
///
/// The GPU branch first gathers each aggregate value column into a dense
/// device-resident stream aligned with `source_offsets` (group-by's kernel
/// indexes `value1`/`value2` by output row, not by arena offset), exactly
/// parallel to how [`call_hash_probe_form_a`] already produces dense
/// [`GroupKeyStream`]s.
#[allow(clippy::too_many_arguments)]
pub fn call_group_by(
    device: Device,
    ctx: Option<&GpuContext<'_>>,
    store: &SegmentStore,
    mode: AggregateMode,
    value_columns: &[ColumnId],
    group_keys: &[Option<&GroupKeyStream>],
    source_offsets: &OffsetStream,
    acc: &mut crate::accumulator::AnyGroupByAccumulator,
) -> Result<()> {
    use crate::accumulator::AnyGroupByAccumulator;

    match (device, acc) {
        (Device::Cpu, AnyGroupByAccumulator::Cpu(acc)) => {
            let offsets = match source_offsets.mem() {
                Mem::SysMem(v) => &v[..source_offsets.len()],
                _ => {
                    return Err(Error::from(ErrorKind::InvalidArgument(
                        "CPU group-by requires a host-reachable input offset stream".to_string(),
                    )))
                }
            };
            let source = OffsetStreamSource { offsets };
            cpu::group_by::group_by_aggregate(store, mode, value_columns, group_keys, &source, acc)
        }
        (Device::Gpu, AnyGroupByAccumulator::Gpu(acc)) => {
            let ctx = require_gpu(ctx)?;
            if !matches!(source_offsets.mem(), Mem::CudaDevMem(_)) {
                return Err(Error::from(ErrorKind::InvalidArgument(
                    "GPU group-by requires a device-resident input offset stream; see switch_device_offsets".to_string(),
                )));
            }
            let num_items = source_offsets.len() as i64;
            let offsets_ptr = source_offsets.mem().as_launchable_ptr();
            let arena_ptr = store.arena().storage().as_launchable_ptr();

            let mut col_idx_mems: Vec<Mem<u32>> = Vec::new();
            let mut gathered_mems: Vec<Mem<i32>> = Vec::new();
            for &col in value_columns.iter().take(2) {
                let col_idx_table = store.arena().col_idx_table(col);
                col_idx_mems.push(Mem::CudaDevMem(rustacuda::memory::DeviceBuffer::from_slice(&col_idx_table)?));
                gathered_mems.push(Mem::CudaDevMem(unsafe { rustacuda::memory::DeviceBuffer::uninitialized(num_items.max(0) as usize) }?));
            }
            for i in 0..col_idx_mems.len() {
                let col_idx_ptr = col_idx_mems[i].as_launchable_ptr();
                let out_ptr = gathered_mems[i].as_launchable_mut_ptr();
                kernels::launch_gather_column(ctx.module, ctx.stream, offsets_ptr, num_items, arena_ptr, col_idx_ptr, out_ptr)?;
            }
            ctx.stream.synchronize()?;
            let mut value_ptrs = [null_i32(); 2];
            for (i, mem) in gathered_mems.iter().enumerate() {
                value_ptrs[i] = mem.as_launchable_ptr();
            }

            let mut group_key_ptrs = [null_i32(); kernels::MAX_GROUP_KEYS];
            for (j, gk) in group_keys.iter().enumerate() {
                if let Some(stream) = gk {
                    if !matches!(stream.mem(), Mem::CudaDevMem(_)) {
                        return Err(Error::from(ErrorKind::InvalidArgument(
                            "GPU group-by requires device-resident group-key streams; see switch_device_group_keys".to_string(),
                        )));
                    }
                    group_key_ptrs[j] = stream.mem().as_launchable_ptr();
                }
            }

            let mins = acc.mins();
            let strides = acc.strides();
            let total_val = acc.total_val();
            kernels::launch_group_by(
                ctx.module,
                ctx.stream,
                group_key_ptrs,
                value_ptrs[0],
                value_ptrs[1],
                aggregate_mode_code(mode),
                num_items,
                mins,
                strides,
                total_val,
                acc.as_launchable_mut_ptr(),
            )?;
            ctx.stream.synchronize()?;
            Ok(())
        }
        (device, acc) => Err(Error::from(ErrorKind::InvalidArgument(format!(
            "group-by device {:?} does not match the accumulator's memory ({})",
            device,
            if matches!(acc, AnyGroupByAccumulator::Cpu(_)) { "CPU" } else { "GPU" }
        )))),
    }
}

/// Transfers an offset stream to different memory via pinned host memory
/// (§4.3: transfers are sized by the observed length, never the
/// capacity), then waits on `stream` so the caller can treat the new
/// stream as immediately consumable.
pub fn switch_device_offsets(src: &OffsetStream, dst_alloc: impl FnOnce(usize) -> Mem<i64>, stream: &CudaStream) -> Result<OffsetStream> {
    let len = src.len();
    let mut dst_mem = dst_alloc(len);
    copy_len(src.mem(), &mut dst_mem, len)?;
    stream.synchronize()?;
    let mut dst = Stream::new(dst_mem);
    dst.set_len(len)?;
    Ok(dst)
}

pub fn switch_device_group_keys(src: &GroupKeyStream, dst_alloc: impl FnOnce(usize) -> Mem<i32>, stream: &CudaStream) -> Result<GroupKeyStream> {
    let len = src.len();
    let mut dst_mem = dst_alloc(len);
    copy_len(src.mem(), &mut dst_mem, len)?;
    stream.synchronize()?;
    let mut dst = Stream::new(dst_mem);
    dst.set_len(len)?;
    Ok(dst)
}

fn copy_len<T: DeviceCopy + Clone>(src: &Mem<T>, dst: &mut Mem<T>, len: usize) -> Result<()> {
    match (src, dst) {
        (Mem::SysMem(s), Mem::CudaDevMem(d)) => Ok(d.copy_from(&s[..len])?),
        (Mem::CudaDevMem(s), Mem::SysMem(d)) => Ok(s.copy_to(&mut d[..len])?),
        (Mem::SysMem(s), Mem::SysMem(d)) => {
            d[..len].clone_from_slice(&s[..len]);
            Ok(())
        }
        _ => Err(Error::from(ErrorKind::InvalidArgument("unsupported switch_device_* memory-type pair".to_string()))),
    }
}
