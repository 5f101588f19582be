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

//! GPU kernel launch wrappers: loading the device-linked fatbin
//! ([`module`]) and issuing `launch!` calls against it ([`kernels`]).

pub mod kernels;
pub mod module;

pub use kernels::{JoinTableArg, MAX_GROUP_KEYS, MAX_JOINS};
pub use module::KernelModule;
