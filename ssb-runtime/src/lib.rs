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

//! Device-agnostic memory primitives shared by every crate in the
//! workspace: the [`memory::Mem`]/[`memory::DerefMem`] value types, the
//! [`allocator::Allocator`] front-end, the [`launchable`] pointer wrappers
//! used inside CUDA kernel argument structs, and the workspace's
//! hand-rolled [`error`] module.

pub mod allocator;
pub mod error;
pub mod launchable;
pub mod memory;

/// Number of 32-bit values per segment. A compile-time constant shared by
/// every crate: the cache's slab size, the kernels' tile-to-segment
/// divisibility requirement, and the planner's per-table segment counts
/// all derive from it.
pub const SEGMENT_SIZE: usize = 1 << 20;
