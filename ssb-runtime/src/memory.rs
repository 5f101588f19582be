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

//! Value-typed memory ownership, replacing the `int**` grids of the
//! original C++ (see the "Raw pointer grids" re-architecture note): every
//! buffer carried between operators is a [`Mem`] or [`DerefMem`] value that
//! knows its own device tag, length and (for host-reachable memory) slice
//! access, instead of a bare pointer plus an externally-tracked length.

use crate::launchable::{
    launchable_mut_ptr, launchable_mut_ptr_from_raw, launchable_ptr_from_raw, LaunchableMutPtr,
    LaunchablePtr, LaunchableSlice,
};
use rustacuda::memory::{DeviceBuffer, DeviceCopy, LockedBuffer, UnifiedBuffer};
use std::ops::{Deref, DerefMut};

pub use self::Mem::*;

/// Any memory this executor can address: host-only, pinned host, or CUDA
/// device/unified.
///
/// `CudaDevMem` is not host-dereferenceable; kernels address it only
/// through device pointers. The other three variants are dereferenceable
/// and are captured by [`DerefMem`].
#[derive(Debug)]
pub enum Mem<T> {
    SysMem(Vec<T>),
    CudaPinnedMem(LockedBuffer<T>),
    CudaDevMem(DeviceBuffer<T>),
    CudaUniMem(UnifiedBuffer<T>),
}

impl<T> Mem<T> {
    pub fn len(&self) -> usize {
        match self {
            Mem::SysMem(m) => m.len(),
            Mem::CudaPinnedMem(m) => m.len(),
            Mem::CudaDevMem(m) => m.len(),
            Mem::CudaUniMem(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True for memory a CPU kernel can walk directly.
    pub fn is_host_reachable(&self) -> bool {
        !matches!(self, Mem::CudaDevMem(_))
    }
}

impl<T: DeviceCopy> Mem<T> {
    /// Mints a kernel-argument pointer into this buffer, resolving through
    /// a host slice for the three host-reachable variants and through the
    /// device pointer for `CudaDevMem`.
    pub fn as_launchable_ptr(&self) -> LaunchablePtr<T> {
        match self {
            Mem::SysMem(v) => LaunchableSlice::new(v).as_launchable_ptr(),
            Mem::CudaPinnedMem(v) => LaunchableSlice::new(v).as_launchable_ptr(),
            Mem::CudaUniMem(v) => LaunchableSlice::new(v).as_launchable_ptr(),
            Mem::CudaDevMem(v) => launchable_ptr_from_raw(v.as_device_ptr().as_raw()),
        }
    }

    pub fn as_launchable_mut_ptr(&mut self) -> LaunchableMutPtr<T> {
        match self {
            Mem::SysMem(v) => launchable_mut_ptr(v.as_mut_slice()),
            Mem::CudaPinnedMem(v) => launchable_mut_ptr(v.as_mut_slice()),
            Mem::CudaUniMem(v) => launchable_mut_ptr(v.as_mut_slice()),
            Mem::CudaDevMem(v) => {
                let mut ptr = v.as_device_ptr();
                launchable_mut_ptr_from_raw(ptr.as_raw_mut())
            }
        }
    }
}

impl<T> From<DerefMem<T>> for Mem<T> {
    fn from(deref_mem: DerefMem<T>) -> Mem<T> {
        match deref_mem {
            DerefMem::SysMem(m) => Mem::SysMem(m),
            DerefMem::CudaPinnedMem(m) => Mem::CudaPinnedMem(m),
            DerefMem::CudaUniMem(m) => Mem::CudaUniMem(m),
        }
    }
}

/// The host-dereferenceable subset of [`Mem`]. CPU operator kernels and
/// the device dispatcher's pinned-staging path both work against this type
/// so they never need a `match` to discover whether a slice is reachable.
#[derive(Debug)]
pub enum DerefMem<T> {
    SysMem(Vec<T>),
    CudaPinnedMem(LockedBuffer<T>),
    CudaUniMem(UnifiedBuffer<T>),
}

impl<T> DerefMem<T> {
    pub fn len(&self) -> usize {
        match self {
            DerefMem::SysMem(m) => m.len(),
            DerefMem::CudaPinnedMem(m) => m.len(),
            DerefMem::CudaUniMem(m) => m.len(),
        }
    }
}

impl<T> Deref for DerefMem<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match self {
            DerefMem::SysMem(m) => m.as_slice(),
            DerefMem::CudaPinnedMem(m) => m.as_slice(),
            DerefMem::CudaUniMem(m) => m.as_slice(),
        }
    }
}

impl<T> DerefMut for DerefMem<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        match self {
            DerefMem::SysMem(m) => m.as_mut_slice(),
            DerefMem::CudaPinnedMem(m) => m.as_mut_slice(),
            DerefMem::CudaUniMem(m) => m.as_mut_slice(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sysmem_len_and_slice_agree() {
        let m: DerefMem<i32> = DerefMem::SysMem(vec![1, 2, 3, 4]);
        assert_eq!(m.len(), 4);
        assert_eq!(&*m, &[1, 2, 3, 4]);
    }

    #[test]
    fn mem_from_derefmem_preserves_len() {
        let d: DerefMem<i32> = DerefMem::SysMem(vec![0; 7]);
        let m: Mem<i32> = d.into();
        assert_eq!(m.len(), 7);
        assert!(m.is_host_reachable());
    }

    #[test]
    fn sysmem_launchable_ptr_points_at_backing_vec() {
        let mut m: Mem<i32> = Mem::SysMem(vec![10, 20, 30]);
        let p = m.as_launchable_ptr();
        if let Mem::SysMem(v) = &m {
            assert_eq!(p.as_ptr(), v.as_ptr());
        }
        let mp = m.as_launchable_mut_ptr();
        assert!(!mp.is_null());
    }
}
