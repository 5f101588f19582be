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

//! Loads the fatbin that `build.rs` device-links from `cuda/*.cu` and
//! resolves kernel functions out of it by name.

use cstr::cstr;
use rustacuda::function::Function;
use rustacuda::module::Module;
use ssb_runtime::error::Result;
use std::ffi::{CStr, CString};

/// The kernel families' linkable names (see the `extern "C"` launch entry
/// points in `cuda/selection.cu`, `cuda/hash_build.cu`, `cuda/hash_probe.cu`,
/// `cuda/group_by.cu` and `cuda/gather.cu`).
pub const SELECTION_FORM_A: &CStr = cstr!("selection_form_a_kernel");
pub const SELECTION_FORM_B: &CStr = cstr!("selection_form_b_kernel");
pub const HASH_BUILD: &CStr = cstr!("hash_build_kernel");
pub const HASH_BUILD_FILTERED: &CStr = cstr!("hash_build_filtered_kernel");
pub const HASH_PROBE_FORM_A: &CStr = cstr!("hash_probe_form_a_kernel");
pub const GROUP_BY: &CStr = cstr!("group_by_kernel");
pub const AGGREGATE: &CStr = cstr!("aggregate_kernel");
pub const GATHER: &CStr = cstr!("gather_column_kernel");

/// Owns the loaded module and looks up its kernel functions on demand.
/// Kept for the lifetime of the dispatcher: reloading the fatbin per
/// query would be wasted device-driver work.
pub struct KernelModule {
    module: Module,
}

impl KernelModule {
    /// Loads the fatbin written by `build.rs` at `SSB_OPS_FATBIN_PATH`.
    pub fn load() -> Result<Self> {
        let path = CString::new(env!("SSB_OPS_FATBIN_PATH"))
            .expect("fatbin path set by build.rs must not contain a NUL byte");
        let module = Module::load_from_file(&path)?;
        Ok(KernelModule { module })
    }

    pub fn function(&self, name: &CStr) -> Result<Function> {
        Ok(self.module.get_function(name)?)
    }
}
