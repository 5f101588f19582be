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

//! Query orchestrator (C6): [`config::EngineConfig`] is the engine's
//! tunable sizes and flags, [`context::QueryContext`] is the per-query
//! state a run allocates at entry and drops at exit (dimension hash
//! tables, timers), and [`orchestrator::run_query`] is the six-step
//! pipeline that turns a [`ssb_planner::QueryPlan`] plus a residency
//! bitmap into result rows through C5's schedule and C4's dispatch.

pub mod config;
pub mod context;
pub mod orchestrator;

pub use config::EngineConfig;
pub use context::QueryContext;
pub use orchestrator::{run_query, AccumulatorShape};
