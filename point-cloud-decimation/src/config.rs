use crate::precision::PrecisionAdvisor;
use crate::result::DecimationResult;
use constants::decimation::{
    DEFAULT_MIN_POINTS_PER_PIECE, DEFAULT_PLAIN_PIECE_SIZE, DEFAULT_RASTER_ROWS_PER_PIECE,
    DEFAULT_TARGET_POINTS,
};
use constants::precision::{MIN_FLOAT_DIGITS, ORIGIN_SHIFT_RATIO};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tunables for an import session. Missing JSON fields fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecimationConfig {
    pub target_total_points: u64,
    pub min_points_per_piece: u64,
    pub min_float_digits: i32,
    pub interactive_precision: bool,
    pub origin_shift_ratio: f64,
    pub plain_piece_size: u64,
    pub raster_rows_per_piece: u32,
}

impl Default for DecimationConfig {
    fn default() -> Self {
        Self {
            target_total_points: DEFAULT_TARGET_POINTS,
            min_points_per_piece: DEFAULT_MIN_POINTS_PER_PIECE,
            min_float_digits: MIN_FLOAT_DIGITS,
            interactive_precision: true,
            origin_shift_ratio: ORIGIN_SHIFT_RATIO,
            plain_piece_size: DEFAULT_PLAIN_PIECE_SIZE,
            raster_rows_per_piece: DEFAULT_RASTER_ROWS_PER_PIECE,
        }
    }
}

impl DecimationConfig {
    pub fn load_file<P: AsRef<Path>>(path: P) -> DecimationResult<Self> {
        let encoded = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&encoded)?)
    }

    pub fn save_file<P: AsRef<Path>>(&self, path: P) -> DecimationResult<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn precision_advisor(&self) -> PrecisionAdvisor {
        PrecisionAdvisor::new(self.min_float_digits, self.interactive_precision)
    }
}
