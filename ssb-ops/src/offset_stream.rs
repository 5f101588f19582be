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

//! Value-typed replacement for the original's raw `int**` offset-stream
//! grids (Design Notes, "Raw pointer grids"): a [`Stream`] carries its own
//! device tag, allocated capacity, and observed length, instead of a bare
//! pointer plus externally-tracked counters.

use ssb_runtime::error::{Error, ErrorKind, Result};
use ssb_runtime::memory::Mem;

/// A dense array produced by one operator and consumed by the next.
/// `capacity` is the worst-case size the producer was allocated with
/// (class segment count times `SEGMENT_SIZE`); `len` is the number of
/// elements the producer actually wrote, discovered only after it
/// finishes (§4.3: "transfers are sized by the observed element count").
pub struct Stream<T> {
    mem: Mem<T>,
    capacity: usize,
    len: usize,
}

impl<T> Stream<T> {
    pub fn new(mem: Mem<T>) -> Self {
        let capacity = mem.len();
        Stream { mem, capacity, len: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_host_reachable(&self) -> bool {
        self.mem.is_host_reachable()
    }

    pub fn mem(&self) -> &Mem<T> {
        &self.mem
    }

    pub fn mem_mut(&mut self) -> &mut Mem<T> {
        &mut self.mem
    }

    /// Records the producer's observed element count. Invariant 2's
    /// `len <= n * SEGMENT_SIZE` bound is the caller's to check (it needs
    /// the class's segment count, which this type doesn't know).
    pub fn set_len(&mut self, len: usize) -> Result<()> {
        if len > self.capacity {
            return Err(Error::from(ErrorKind::ResourceExhausted(format!(
                "stream wrote {} elements, exceeding its capacity of {}",
                len, self.capacity
            ))));
        }
        self.len = len;
        Ok(())
    }

    pub fn into_mem(self) -> Mem<T> {
        self.mem
    }
}

/// Fact-table row offsets carried between operators.
pub type OffsetStream = Stream<i64>;

/// A parallel stream recording one join's group-by attribute value per
/// surviving fact row (`dim_off_k` in the spec's offset-stream family,
/// specialised to the group-key-fused probe).
pub type GroupKeyStream = Stream<i32>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_len_within_capacity_succeeds() {
        let mut s = OffsetStream::new(Mem::SysMem(vec![0i64; 1024]));
        assert_eq!(s.capacity(), 1024);
        s.set_len(512).unwrap();
        assert_eq!(s.len(), 512);
    }

    #[test]
    fn set_len_beyond_capacity_is_resource_exhausted() {
        let mut s = OffsetStream::new(Mem::SysMem(vec![0i64; 16]));
        let err = s.set_len(17).unwrap_err();
        match err.kind() {
            ErrorKind::ResourceExhausted(_) => {}
            other => panic!("expected ResourceExhausted, got {:?}", other),
        }
    }
}
