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

//! The row-source abstraction from the Design Notes: one CPU operator
//! implementation works against either a segment group (Form A) or an
//! existing offset stream (Form B) by going through this trait instead of
//! two near-identical operator bodies.

use ssb_cache::SegmentStore;
use ssb_catalog::ColumnId;
use ssb_runtime::SEGMENT_SIZE;

/// Yields, for each logical row index in `0..len()`, the fact-table row
/// offset that row corresponds to. Column values are then read on demand
/// through [`column_value`], exactly as the spec's offset-stream
/// invariant describes (`cache[column_at_segment(off)][off mod
/// SEGMENT_SIZE]`).
pub trait RowSource: Sync {
    fn len(&self) -> usize;
    fn offset_at(&self, row_idx: usize) -> i64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Form A: a contiguous run of whole segments starting at `base_offset`.
pub struct SegmentGroupSource {
    pub base_offset: i64,
    pub len: usize,
}

impl RowSource for SegmentGroupSource {
    fn len(&self) -> usize {
        self.len
    }

    fn offset_at(&self, row_idx: usize) -> i64 {
        self.base_offset + row_idx as i64
    }
}

/// Form B: an existing offset stream produced by an upstream operator.
pub struct OffsetStreamSource<'a> {
    pub offsets: &'a [i64],
}

impl<'a> RowSource for OffsetStreamSource<'a> {
    fn len(&self) -> usize {
        self.offsets.len()
    }

    fn offset_at(&self, row_idx: usize) -> i64 {
        self.offsets[row_idx]
    }
}

/// Reads a column's value at a fact-table row offset, resolving the
/// owning segment and the in-segment position the way every cache
/// consumer does.
pub fn column_value(store: &SegmentStore, col: ColumnId, offset: i64) -> i32 {
    let offset = offset as usize;
    let seg = offset / SEGMENT_SIZE;
    let within_segment = offset % SEGMENT_SIZE;
    store.cpu_ptr(col, seg)[within_segment]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_group_source_offsets_are_contiguous() {
        let src = SegmentGroupSource { base_offset: 100, len: 3 };
        assert_eq!(src.offset_at(0), 100);
        assert_eq!(src.offset_at(2), 102);
    }

    #[test]
    fn offset_stream_source_passes_through_verbatim() {
        let offsets = vec![5i64, 9, 3];
        let src = OffsetStreamSource { offsets: &offsets };
        assert_eq!(src.len(), 3);
        assert_eq!(src.offset_at(1), 9);
    }
}
