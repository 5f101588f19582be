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

use crate::table::Table;
use ssb_runtime::SEGMENT_SIZE;
use std::sync::atomic::{AtomicU32, Ordering};

/// A stable handle into the catalog. Columns are never renumbered after
/// load, so `ColumnId` doubles as the index into bitmap rows and
/// per-column segment-index tables.
pub type ColumnId = u32;

/// Metadata for one column: an ordered sequence of 32-bit values belonging
/// to a table, segmented into fixed-size runs.
///
/// `tot_seg_in_gpu` is a cached popcount of the column's residency bitmap
/// row (§3's cache-entry invariant); it is updated by the cache whenever a
/// segment's residency changes and read by the placement planner without
/// re-scanning the bitmap. It is an atomic because multiple query threads
/// may read it concurrently while a loader thread updates it; the
/// invariant that it equals the live popcount only has to hold at
/// operator-pipeline boundaries (§4.1), not instant-by-instant.
#[derive(Debug)]
pub struct Column {
    pub column_id: ColumnId,
    pub table: Table,
    pub name: String,
    pub total_tuples: usize,
    pub total_segment: usize,
    /// Length of the last segment, which may be short.
    pub last_segment_len: usize,
    pub min: i32,
    pub max: i32,
    tot_seg_in_gpu: AtomicU32,
}

impl Column {
    pub fn new(column_id: ColumnId, table: Table, name: impl Into<String>, total_tuples: usize, min: i32, max: i32) -> Self {
        let total_segment = (total_tuples + SEGMENT_SIZE - 1) / SEGMENT_SIZE;
        let last_segment_len = total_tuples - (total_segment.saturating_sub(1)) * SEGMENT_SIZE;
        Column {
            column_id,
            table,
            name: name.into(),
            total_tuples,
            total_segment,
            last_segment_len,
            min,
            max,
            tot_seg_in_gpu: AtomicU32::new(0),
        }
    }

    /// Length, in tuples, of segment `seg` (the last segment may be short).
    pub fn segment_len(&self, seg: usize) -> usize {
        if seg + 1 == self.total_segment {
            self.last_segment_len
        } else {
            SEGMENT_SIZE
        }
    }

    pub fn tot_seg_in_gpu(&self) -> u32 {
        self.tot_seg_in_gpu.load(Ordering::Acquire)
    }

    pub fn set_tot_seg_in_gpu(&self, count: u32) {
        self.tot_seg_in_gpu.store(count, Ordering::Release);
    }

    /// Cardinality of the value range, used to size hash tables
    /// (`num_slots` must be at least this).
    pub fn value_range(&self) -> u32 {
        (self.max - self.min + 1) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_segment_accounts_for_short_last_segment() {
        let c = Column::new(0, Table::Lineorder, "lo_orderdate", SEGMENT_SIZE + 5, 19920101, 19981231);
        assert_eq!(c.total_segment, 2);
        assert_eq!(c.last_segment_len, 5);
        assert_eq!(c.segment_len(0), SEGMENT_SIZE);
        assert_eq!(c.segment_len(1), 5);
    }

    #[test]
    fn exact_multiple_has_full_last_segment() {
        let c = Column::new(0, Table::Part, "p_partkey", SEGMENT_SIZE * 3, 0, 200_000);
        assert_eq!(c.total_segment, 3);
        assert_eq!(c.last_segment_len, SEGMENT_SIZE);
    }
}
