/// On-ratio planning: how many points to skip per piece to meet a point budget.
use crate::source::{PieceCount, PieceId};
use constants::decimation::{FULL_RESOLUTION_RATIO, MIN_DECIMATING_STRIDE};
use std::collections::BTreeMap;

/// Source-wide stride for `target` points out of `total`.
/// Returns 1 when the budget covers most of the data, otherwise at least 2.
pub fn main_on_ratio(target: u64, total: u64) -> u32 {
    if total == 0 {
        return 1;
    }

    let raw_ratio = target as f64 / total as f64;
    if raw_ratio > FULL_RESOLUTION_RATIO {
        return 1;
    }

    // Saturates for a zero target.
    let rounded = (1.0 / raw_ratio + 0.5) as u32;
    rounded.max(MIN_DECIMATING_STRIDE)
}

/// Lower `main_ratio` so a piece keeps at least `min_points` where it can.
pub fn piece_on_ratio(main_ratio: u32, count: u64, min_points: u64) -> u32 {
    let ratio = u64::from(main_ratio.max(1));
    if min_points == 0 || count / ratio >= min_points {
        return ratio as u32;
    }

    (count / min_points).clamp(1, ratio) as u32
}

/// One stride per piece in input order, empty when there is nothing to read.
pub fn plan(target: u64, per_piece_counts: &[u64], min_points_per_piece: u64) -> Vec<u32> {
    let total: u64 = per_piece_counts.iter().sum();
    if total == 0 {
        return Vec::new();
    }

    let main_ratio = main_on_ratio(target, total);
    per_piece_counts
        .iter()
        .map(|&count| piece_on_ratio(main_ratio, count, min_points_per_piece))
        .collect()
}

/// Strides for one pass, keyed by piece.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecimationPlan {
    pub main_ratio: u32,
    pub strides: BTreeMap<PieceId, u32>,
}

impl DecimationPlan {
    pub fn from_counts(target: u64, counts: &[PieceCount], min_points_per_piece: u64) -> Self {
        let points: Vec<u64> = counts.iter().map(|count| count.points).collect();
        let strides = plan(target, &points, min_points_per_piece);
        let total = points.iter().sum();

        Self {
            main_ratio: main_on_ratio(target, total),
            strides: counts
                .iter()
                .zip(strides)
                .map(|(count, stride)| (count.id, stride))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.strides.is_empty()
    }

    pub fn stride(&self, piece: PieceId) -> Option<u32> {
        self.strides.get(&piece).copied()
    }
}
