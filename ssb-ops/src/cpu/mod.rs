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

//! CPU operator kernels. Each mirrors the structure of its GPU
//! counterpart (tile across a work-sharing pool, local compaction, one
//! atomic claim of the output range) rather than being written from
//! scratch, so the two stay in lock-step as the operator set evolves.

pub mod group_by;
pub mod hash_build;
pub mod hash_probe;
pub mod selection;
