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

//! Operator-placement planner (C5): [`plan::QueryPlan`] describes a
//! query's relational shape, [`placement`] turns per-segment residency
//! into a [`placement::PlacementClass`], and [`schedule`] buckets the
//! fact table's segments into classes with a per-stage device decision.

pub mod placement;
pub mod plan;
pub mod schedule;

pub use placement::{classify, PlacementClass};
pub use plan::{Aggregate, AggregateMode, JoinPayload, JoinSpec, QueryPlan, Selection};
pub use schedule::{build_schedule, dimension_fully_resident, join_dimension_ready, ClassPipeline, Device, Schedule};
