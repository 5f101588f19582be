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

//! Segment store & cache (C1): [`bitmap::ResidencyBitmap`] tracks which
//! segments have a GPU copy, [`arena::GpuArena`] owns the flat device
//! arena and column-index table those copies live in, and
//! [`store::SegmentStore`] ties the two to the always-present CPU copies.

pub mod arena;
pub mod bitmap;
pub mod store;

pub use arena::{GpuAddress, GpuArena};
pub use bitmap::ResidencyBitmap;
pub use store::SegmentStore;
