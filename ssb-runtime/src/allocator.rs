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

//! Allocation front-end for [`crate::memory::Mem`]/[`crate::memory::DerefMem`].
//!
//! Mirrors the `Allocator`/`MemAllocFn`/`MemType` trio from the runtime
//! crate this workspace is built around: callers pick a [`MemType`] once
//! (driven by `EngineConfig`) and get back a boxed allocation closure they
//! can hand to code that shouldn't otherwise know which kind of memory it
//! is filling.

use crate::error::{Error, ErrorKind, Result};
use crate::memory::{DerefMem, Mem};
use rustacuda::memory::DeviceCopy;
use rustacuda::memory::{DeviceBuffer, LockedBuffer, UnifiedBuffer};

/// The kinds of memory the cache and the device dispatcher can allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MemType {
    /// Plain pageable host memory (`Vec<T>`).
    SysMem,
    /// Page-locked host memory, used for the pinned staging buffers that
    /// the device dispatcher transfers through (`pinned_memsize`).
    CudaPinnedMem,
    /// CUDA unified memory, addressable from host and device.
    CudaUniMem,
    /// CUDA device memory, addressable only from the device.
    CudaDevMem,
}

pub type MemAllocFn<T> = Box<dyn Fn(usize) -> Mem<T>>;
pub type DerefMemAllocFn<T> = Box<dyn Fn(usize) -> DerefMem<T>>;

pub struct Allocator;

impl Allocator {
    /// Returns a closure allocating `Mem<T>` of the given type.
    pub fn mem_alloc_fn<T: DeviceCopy + Default + Clone + 'static>(
        mem_type: MemType,
    ) -> MemAllocFn<T> {
        match mem_type {
            MemType::SysMem => Box::new(|len| Mem::SysMem(vec![T::default(); len])),
            MemType::CudaPinnedMem => Box::new(|len| {
                Mem::CudaPinnedMem(
                    LockedBuffer::new(&T::default(), len)
                        .expect("failed to allocate pinned host memory"),
                )
            }),
            MemType::CudaUniMem => Box::new(|len| {
                Mem::CudaUniMem(
                    UnifiedBuffer::new(&T::default(), len)
                        .expect("failed to allocate CUDA unified memory"),
                )
            }),
            MemType::CudaDevMem => Box::new(|len| {
                Mem::CudaDevMem(unsafe {
                    DeviceBuffer::uninitialized(len)
                        .expect("failed to allocate CUDA device memory")
                })
            }),
        }
    }

    /// Returns a closure allocating `DerefMem<T>` (host-reachable only).
    ///
    /// Returns an error up front if asked for `CudaDevMem`, since that
    /// variant can never be host-dereferenced; this keeps the mistake a
    /// caller-visible `Result` instead of a panic deep in a kernel.
    pub fn deref_mem_alloc_fn<T: DeviceCopy + Default + Clone + 'static>(
        mem_type: MemType,
    ) -> Result<DerefMemAllocFn<T>> {
        match mem_type {
            MemType::SysMem => Ok(Box::new(|len| DerefMem::SysMem(vec![T::default(); len]))),
            MemType::CudaPinnedMem => Ok(Box::new(|len| {
                DerefMem::CudaPinnedMem(
                    LockedBuffer::new(&T::default(), len)
                        .expect("failed to allocate pinned host memory"),
                )
            })),
            MemType::CudaUniMem => Ok(Box::new(|len| {
                DerefMem::CudaUniMem(
                    UnifiedBuffer::new(&T::default(), len)
                        .expect("failed to allocate CUDA unified memory"),
                )
            })),
            MemType::CudaDevMem => Err(Error::from(ErrorKind::InvalidArgument(
                "CudaDevMem is not host-dereferenceable".to_string(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sysmem_alloc_fn_produces_requested_length() {
        let alloc = Allocator::deref_mem_alloc_fn::<i32>(MemType::SysMem).unwrap();
        let mem = alloc(128);
        assert_eq!(mem.len(), 128);
    }

    #[test]
    fn dev_mem_rejected_for_deref_alloc() {
        let res = Allocator::deref_mem_alloc_fn::<i32>(MemType::CudaDevMem);
        assert!(res.is_err());
    }
}
