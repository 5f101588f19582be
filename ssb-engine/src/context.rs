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

//! Per-query state: the dimension hash tables a run builds once up front
//! and probes from every placement class, plus the running time split
//! between host and device work. A `QueryContext` lives for exactly one
//! [`crate::orchestrator::run_query`] call; dropping it frees the hash
//! tables (device memory included, through `Mem`'s own `Drop`) and logs
//! the time split.

use ssb_ops::{AnyHashTable, GpuHashTable, HashTable};
use ssb_planner::Device;
use ssb_runtime::error::{Error, ErrorKind, Result};
use std::time::{Duration, Instant};

/// One join's dimension-side hash tables. A class probes this join on
/// CPU or GPU depending only on whether *that class's fact segments* are
/// GPU-resident (`ssb_planner::classify`); the dimension's own GPU
/// residency is a separate, query-wide property
/// ([`ssb_planner::join_dimension_ready`]). The two decisions are
/// independent, so a join generally needs both tables built up front:
/// `cpu` unconditionally (every fact segment has a CPU copy), `gpu` only
/// when the dimension is fully GPU-resident.
pub struct DimensionTables {
    pub cpu: HashTable,
    pub gpu: Option<GpuHashTable>,
}

impl DimensionTables {
    pub fn for_device(&self, device: Device) -> Result<AnyHashTable<'_>> {
        match device {
            Device::Cpu => Ok(AnyHashTable::Cpu(&self.cpu)),
            Device::Gpu => self
                .gpu
                .as_ref()
                .map(AnyHashTable::Gpu)
                .ok_or_else(|| Error::from(ErrorKind::Precondition("join scheduled on GPU but its dimension has no GPU-resident hash table".to_string()))),
        }
    }
}

/// State a single query run carries from start to finish: each join's
/// dimension hash tables, built in plan-join order (so a join's index
/// into [`ssb_planner::QueryPlan::joins`] is also its index into
/// `tables`), and the three time buckets §4.6's reporting expects.
pub struct QueryContext {
    tables: Vec<DimensionTables>,
    started: Instant,
    cpu_time: Duration,
    gpu_time: Duration,
    transfer_time: Duration,
}

impl QueryContext {
    pub fn new() -> Self {
        QueryContext {
            tables: Vec::new(),
            started: Instant::now(),
            cpu_time: Duration::ZERO,
            gpu_time: Duration::ZERO,
            transfer_time: Duration::ZERO,
        }
    }

    pub fn push_table(&mut self, table: DimensionTables) {
        self.tables.push(table);
    }

    pub fn table(&self, join_idx: usize) -> &DimensionTables {
        &self.tables[join_idx]
    }

    pub fn add_cpu_time(&mut self, d: Duration) {
        self.cpu_time += d;
    }

    pub fn add_gpu_time(&mut self, d: Duration) {
        self.gpu_time += d;
    }

    pub fn add_transfer_time(&mut self, d: Duration) {
        self.transfer_time += d;
    }

    pub fn cpu_time(&self) -> Duration {
        self.cpu_time
    }

    pub fn gpu_time(&self) -> Duration {
        self.gpu_time
    }

    pub fn transfer_time(&self) -> Duration {
        self.transfer_time
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for QueryContext {
    fn drop(&mut self) {
        log::debug!(
            "query finished in {:?} (cpu {:?}, gpu {:?}, transfer {:?}), {} dimension table(s)",
            self.started.elapsed(),
            self.cpu_time,
            self.gpu_time,
            self.transfer_time,
            self.tables.len(),
        );
    }
}
