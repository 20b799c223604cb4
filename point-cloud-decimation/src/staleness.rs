/// Decides whether cached piece geometry still matches the requested clip, transform and ratio.
use crate::clip::ClipSpec;
use crate::registry::{MaterializationState, PieceDescriptor};
use crate::transform::PieceTransform;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which ratio an output is assembled at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadMode {
    Display,
    Save,
}

impl FromStr for ReadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "display" => Ok(Self::Display),
            "save" => Ok(Self::Save),
            _ => Err(format!("unknown read mode '{}'", s)),
        }
    }
}

pub struct ClipTransformEngine;

impl ClipTransformEngine {
    /// True when the cached geometry cannot stand in for a fresh read under
    /// `clip`, `transform` and `ratio`. Pieces never read are always stale.
    pub fn is_stale(
        piece: &PieceDescriptor,
        clip: &ClipSpec,
        transform: &PieceTransform,
        ratio: u32,
    ) -> bool {
        let Some(state) = piece.materialization.as_ref() else {
            return true;
        };

        state.dirty
            || state.ratio != ratio
            || !Self::is_clip_up_to_date(state, clip, transform)
            || !transform.same_effect(&state.transform)
    }

    /// Staleness against the piece's own transform and the ratio for `mode`.
    pub fn is_stale_for(piece: &PieceDescriptor, clip: &ClipSpec, mode: ReadMode) -> bool {
        Self::is_stale(
            piece,
            clip,
            &piece.transform,
            Self::effective_read_ratio(piece, mode),
        )
    }

    /// Clip state matches when both are off, or both are on with the same box
    /// and the points were placed by the same transform.
    pub fn is_clip_up_to_date(
        state: &MaterializationState,
        clip: &ClipSpec,
        transform: &PieceTransform,
    ) -> bool {
        match (clip.active(), state.clip.as_ref()) {
            (None, None) => true,
            (Some(current), Some(cached)) => {
                current == cached && transform.same_effect(&state.transform)
            }
            _ => false,
        }
    }

    pub fn effective_read_ratio(piece: &PieceDescriptor, mode: ReadMode) -> u32 {
        match mode {
            ReadMode::Display => piece.display_ratio,
            ReadMode::Save => piece.save_ratio,
        }
    }

    /// Points the piece will show at its display ratio.
    pub fn estimate_display_points(piece: &PieceDescriptor, clip: &ClipSpec) -> u64 {
        let display_ratio = u64::from(piece.display_ratio.max(1));
        if !Self::is_stale_for(piece, clip, ReadMode::Display) {
            return piece.read_points();
        }

        let unclipped = piece.raw_points / display_ratio;
        if !clip.enabled {
            return unclipped;
        }

        match piece.materialization.as_ref() {
            Some(state) if Self::is_clip_up_to_date(state, clip, &piece.transform) => {
                state.point_count * u64::from(state.ratio) / display_ratio
            }
            _ => unclipped,
        }
    }

    /// Points a save at the save ratio will write.
    pub fn estimate_save_points(piece: &PieceDescriptor, clip: &ClipSpec) -> u64 {
        let save_ratio = u64::from(piece.save_ratio.max(1));
        if !clip.enabled {
            return piece.raw_points / save_ratio;
        }

        let display = Self::estimate_display_points(piece, clip);
        (display * u64::from(piece.display_ratio) / save_ratio).min(piece.raw_points)
    }
}
