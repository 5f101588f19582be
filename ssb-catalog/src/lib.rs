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

//! The column/schema catalog: [`Table`], [`Column`] and [`Catalog`]
//! describe the star-schema benchmark's five tables and their columns,
//! and are the shared vocabulary every other crate in the workspace
//! speaks in terms of.

pub mod catalog;
pub mod column;
pub mod table;

pub use catalog::{Catalog, ColumnSpec};
pub use column::{Column, ColumnId};
pub use table::Table;
