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

//! Thin, `DeviceCopy` pointer wrappers that go inside `#[repr(C)]` kernel
//! argument structs. A bare `*const T`/`*mut T` isn't `DeviceCopy`, so
//! kernel argument structs (see `ssb_ops::gpu::kernel_args`) hold these
//! instead; they carry no lifetime, matching the C ABI the CUDA kernels are
//! launched against, and methods that mint them borrow from a `Mem`/
//! `DerefMem`/slice to keep provenance visible at the call site.

use rustacuda::memory::DeviceCopy;
use std::marker::PhantomData;
use std::os::raw::c_void;

#[repr(transparent)]
#[derive(Debug)]
pub struct LaunchablePtr<T> {
    ptr: *const T,
    _marker: PhantomData<T>,
}

unsafe impl<T> DeviceCopy for LaunchablePtr<T> {}
impl<T> Copy for LaunchablePtr<T> {}
impl<T> Clone for LaunchablePtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> LaunchablePtr<T> {
    pub fn null() -> Self {
        Self {
            ptr: std::ptr::null(),
            _marker: PhantomData,
        }
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    pub fn as_void(&self) -> *const c_void {
        self.ptr as *const c_void
    }
}

#[repr(transparent)]
#[derive(Debug)]
pub struct LaunchableMutPtr<T> {
    ptr: *mut T,
    _marker: PhantomData<T>,
}

unsafe impl<T> DeviceCopy for LaunchableMutPtr<T> {}
impl<T> Copy for LaunchableMutPtr<T> {}
impl<T> Clone for LaunchableMutPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> LaunchableMutPtr<T> {
    pub fn null_mut() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            _marker: PhantomData,
        }
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    pub fn as_mut_ptr(&self) -> *mut T {
        self.ptr
    }
}

/// A borrowed view used only to mint [`LaunchablePtr`]/[`LaunchableMutPtr`]
/// values; it does not outlive the slice it was built from.
#[derive(Debug, Clone, Copy)]
pub struct LaunchableSlice<'a, T> {
    ptr: *const T,
    len: usize,
    _marker: PhantomData<&'a [T]>,
}

impl<'a, T> LaunchableSlice<'a, T> {
    pub fn new(slice: &'a [T]) -> Self {
        Self {
            ptr: slice.as_ptr(),
            len: slice.len(),
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_launchable_ptr(&self) -> LaunchablePtr<T> {
        LaunchablePtr {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

/// Mints a [`LaunchableMutPtr`] from a mutable slice, for kernel output
/// buffers that live in `Mem`/`DerefMem`.
pub fn launchable_mut_ptr<T>(slice: &mut [T]) -> LaunchableMutPtr<T> {
    LaunchableMutPtr {
        ptr: slice.as_mut_ptr(),
        _marker: PhantomData,
    }
}

/// Wraps a raw device pointer (from `DevicePointer::as_raw`) without going
/// through a host slice; used for the `Mem::CudaDevMem` arm of
/// `Mem::as_launchable_ptr`, where there is no host-side slice to borrow.
pub fn launchable_ptr_from_raw<T>(ptr: *const T) -> LaunchablePtr<T> {
    LaunchablePtr { ptr, _marker: PhantomData }
}

pub fn launchable_mut_ptr_from_raw<T>(ptr: *mut T) -> LaunchableMutPtr<T> {
    LaunchableMutPtr { ptr, _marker: PhantomData }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_pointers_report_null() {
        let p: LaunchablePtr<i32> = LaunchablePtr::null();
        assert!(p.is_null());
        let m: LaunchableMutPtr<i32> = LaunchableMutPtr::null_mut();
        assert!(m.is_null());
    }

    #[test]
    fn launchable_slice_preserves_len_and_ptr() {
        let data = [1, 2, 3];
        let ls = LaunchableSlice::new(&data);
        assert_eq!(ls.len(), 3);
        let lp = ls.as_launchable_ptr();
        assert_eq!(lp.as_ptr(), data.as_ptr());
    }
}
