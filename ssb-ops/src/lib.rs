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

//! Operator kernels (C4): selection, hash build/probe and group-by/
//! aggregate, each with a CPU implementation ([`cpu`]) and a GPU kernel
//! family ([`gpu`]) behind the same [`dispatch`] entry points. [`accumulator`],
//! [`hash_table`], [`offset_stream`] and [`row_source`] are the shared
//! value types every operator reads or writes.

pub mod accumulator;
pub mod cpu;
pub mod dispatch;
pub mod gpu;
pub mod hash_table;
pub mod offset_stream;
pub mod row_source;

pub use accumulator::{AnyGroupByAccumulator, GpuGroupByAccumulator, GroupByAccumulator, GPU_ACC_STRIDE};
pub use dispatch::{
    call_group_by, call_hash_build, call_hash_probe_form_a, call_selection_form_a,
    call_selection_form_b, switch_device_group_keys, switch_device_offsets, GpuContext, ProbeJoin,
};
pub use hash_table::{AnyHashTable, AnyHashTableMut, GpuHashTable, HashTable};
pub use offset_stream::{GroupKeyStream, OffsetStream};
