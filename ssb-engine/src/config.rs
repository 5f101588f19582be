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

//! Engine-wide configuration: the sizes the cache, the per-class
//! processing buffers and the pinned transfer staging are bounded by,
//! plus the two flags that select between the placement-driven schedule
//! and the original's all-GPU baseline and that gate the empty-class log
//! line. Built directly in code (`EngineConfig::default()` or a literal);
//! this crate has no file-format loader of its own.

/// Tunable sizes and flags for one engine instance. Cheap to copy, so a
/// caller can hold one `EngineConfig` and pass it by value to every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    /// Slabs the GPU arena is sized to hold (`ssb_cache::GpuArena`'s
    /// backing `Mem` capacity, in `SEGMENT_SIZE` units).
    pub cache_size: usize,

    /// Upper bound, in slabs, on segments staged on demand for one query
    /// when `custom` is `false`.
    pub ondemand_size: usize,

    /// Worst-case element count a class's offset streams, group-key
    /// streams and hash tables are allocated at.
    pub processing_size: usize,

    /// Size of the pinned host staging buffer `switch_device_*` transfers
    /// move data through.
    pub pinned_memsize: usize,

    /// Enables per-class `log::debug!` tracing of device decisions and
    /// row counts.
    pub verbose: bool,

    /// Selects the placement planner's per-class schedule (`true`, this
    /// crate's default) or the original's all-GPU baseline (`false`):
    /// every fact segment is staged onto the device, bounded by
    /// `ondemand_size`, and the whole query runs as one GPU-only class.
    pub custom: bool,

    /// Logs a `log::warn!` for every placement class the schedule drops
    /// for holding zero segments, instead of dropping it silently.
    pub skipping: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cache_size: 1 << 20,
            ondemand_size: 1 << 18,
            processing_size: 1 << 20,
            pinned_memsize: 1 << 16,
            verbose: false,
            custom: true,
            skipping: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_selects_the_placement_driven_schedule() {
        let config = EngineConfig::default();
        assert!(config.custom);
        assert!(config.skipping);
    }
}
