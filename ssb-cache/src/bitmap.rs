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

//! The device-residency bitmap: `segment_bitmap[column_id][segment_index]`,
//! owned outside the core and handed in by reference. The core only ever
//! reads it; the setters here exist for the loader/admission mechanism
//! (installing or evicting a GPU copy), not for any replacement policy,
//! which remains the caller's concern.

use ssb_catalog::ColumnId;

/// One bit per `(column, segment)`, set iff the segment has a GPU copy.
#[derive(Debug, Clone)]
pub struct ResidencyBitmap {
    rows: Vec<Vec<bool>>,
}

impl ResidencyBitmap {
    /// Builds an all-zero bitmap, one row per column, sized to that
    /// column's segment count.
    pub fn new(segments_per_column: &[usize]) -> Self {
        ResidencyBitmap {
            rows: segments_per_column.iter().map(|&n| vec![false; n]).collect(),
        }
    }

    pub fn is_resident(&self, col: ColumnId, seg: usize) -> bool {
        self.rows[col as usize][seg]
    }

    pub fn set_resident(&mut self, col: ColumnId, seg: usize, resident: bool) {
        self.rows[col as usize][seg] = resident;
    }

    /// `tot_seg_in_GPU`: popcount of one column's bitmap row.
    pub fn popcount(&self, col: ColumnId) -> u32 {
        self.rows[col as usize].iter().filter(|&&b| b).count() as u32
    }

    pub fn row(&self, col: ColumnId) -> &[bool] {
        &self.rows[col as usize]
    }

    /// A checkerboard bitmap (segment parity alternates residency), used by
    /// the residency-stress scenario: every fact column has the same
    /// segment count, so one shared pattern suffices.
    pub fn checkerboard(segments_per_column: &[usize]) -> Self {
        let rows = segments_per_column
            .iter()
            .map(|&n| (0..n).map(|seg| seg % 2 == 0).collect())
            .collect();
        ResidencyBitmap { rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_bitmap_is_all_zero() {
        let bm = ResidencyBitmap::new(&[4, 8]);
        assert_eq!(bm.popcount(0), 0);
        assert_eq!(bm.popcount(1), 0);
    }

    #[test]
    fn popcount_tracks_set_bits() {
        let mut bm = ResidencyBitmap::new(&[4]);
        bm.set_resident(0, 1, true);
        bm.set_resident(0, 3, true);
        assert_eq!(bm.popcount(0), 2);
        assert!(bm.is_resident(0, 1));
        assert!(!bm.is_resident(0, 0));
    }

    #[test]
    fn checkerboard_alternates() {
        let bm = ResidencyBitmap::checkerboard(&[4]);
        assert_eq!(bm.row(0), &[true, false, true, false]);
    }
}
