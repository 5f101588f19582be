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

//! Placement-class construction (§4.4, steps 1-4): a fact segment's class
//! packs the residency bits of its selection, join and group-by-probe
//! columns, most significant first.

use crate::plan::QueryPlan;
use ssb_cache::ResidencyBitmap;

/// A label in `[0, 64)`. Two segments with the same class are scheduled
/// identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlacementClass(pub u8);

/// Builds segment `seg`'s placement class from `plan`'s column lists, in
/// the order selections, then joins, then aggregate value columns.
pub fn classify(plan: &QueryPlan, bitmap: &ResidencyBitmap, seg: usize) -> PlacementClass {
    let mut bits: u32 = 0;
    for s in &plan.selections {
        bits = (bits << 1) | bitmap.is_resident(s.column, seg) as u32;
    }
    for j in &plan.joins {
        bits = (bits << 1) | bitmap.is_resident(j.probe_column, seg) as u32;
    }
    for &col in &plan.aggregate.value_columns {
        bits = (bits << 1) | bitmap.is_resident(col, seg) as u32;
    }
    debug_assert!(bits < 64, "placement class {} exceeds 6 bits; plan has {} classification columns", bits, plan.class_bit_count());
    PlacementClass(bits as u8)
}

/// Reads bit `index_from_msb` out of a `total_bits`-wide class label.
///
/// The original source decodes these bits with `temp && (1 << j)`
/// (logical AND), which collapses every nonzero bit to `1` before the
/// shift ever runs and silently mis-scores any class above the first bit.
/// This uses bitwise AND, the behaviour the surrounding placement logic
/// assumes.
pub fn bit_at(class: PlacementClass, total_bits: usize, index_from_msb: usize) -> bool {
    let shift = total_bits - 1 - index_from_msb;
    (class.0 as u32 & (1 << shift)) != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Aggregate, AggregateMode, JoinPayload, JoinSpec, Selection};
    use ssb_catalog::Table;
    use ssb_runtime::SEGMENT_SIZE;

    fn q11_like_plan() -> QueryPlan {
        QueryPlan {
            selections: vec![Selection { column: 1, lo: 1, hi: 3 }],
            joins: vec![JoinSpec {
                probe_column: 0,
                build_column: 10,
                dim_table: Table::Date,
                filter: None,
                payload: JoinPayload::GroupKey(11),
            }],
            aggregate: Aggregate { mode: AggregateMode::V1TimesV2, value_columns: vec![2, 3] },
        }
    }

    #[test]
    fn classify_packs_bits_msb_first() {
        let plan = q11_like_plan();
        let mut bitmap = ResidencyBitmap::new(&[1; 12]);
        // selection col 1 resident, join col 0 not, aggregate cols 2,3 both resident.
        bitmap.set_resident(1, 0, true);
        bitmap.set_resident(2, 0, true);
        bitmap.set_resident(3, 0, true);
        let class = classify(&plan, &bitmap, 0);
        // bit order: [sel=1][join=0][agg1=1][agg2=1] = 0b1011 = 11
        assert_eq!(class.0, 0b1011);
    }

    #[test]
    fn bit_at_uses_bitwise_and_not_logical_and() {
        let class = PlacementClass(0b0101);
        assert!(bit_at(class, 4, 0));
        assert!(!bit_at(class, 4, 1));
        assert!(bit_at(class, 4, 2));
        assert!(!bit_at(class, 4, 3));
    }

    #[test]
    fn decoded_bits_agree_with_direct_bitmap_lookup() {
        let plan = q11_like_plan();
        let mut bitmap = ResidencyBitmap::new(&[1; 12]);
        bitmap.set_resident(0, 0, true);
        bitmap.set_resident(2, 0, true);
        let class = classify(&plan, &bitmap, 0);
        let total_bits = plan.class_bit_count();
        assert_eq!(bit_at(class, total_bits, 0), bitmap.is_resident(1, 0));
        assert_eq!(bit_at(class, total_bits, 1), bitmap.is_resident(0, 0));
        assert_eq!(bit_at(class, total_bits, 2), bitmap.is_resident(2, 0));
        assert_eq!(bit_at(class, total_bits, 3), bitmap.is_resident(3, 0));
    }

    #[test]
    fn same_residency_pattern_yields_same_class() {
        let plan = q11_like_plan();
        let mut bitmap = ResidencyBitmap::new(&[SEGMENT_SIZE; 12]);
        bitmap.set_resident(1, 5, true);
        bitmap.set_resident(1, 100, true);
        assert_eq!(classify(&plan, &bitmap, 5), classify(&plan, &bitmap, 100));
    }
}
