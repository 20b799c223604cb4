/// Coordinate precision selection for imported geometry.
use crate::bounds::PointCloudBounds;
use constants::precision::{
    DIGIT_ROUNDING_SLACK, FLOAT_SIGNIFICANT_DIGITS, MIN_FLOAT_DIGITS, ORIGIN_SHIFT_RATIO,
};
use serde::{Deserialize, Serialize};

/// Storage width of cached coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    Float,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrecisionRecommendation {
    Float,
    Double,
    AskUser,
}

/// Approximate significant digits left after the decimal point when values
/// in `[min, max]` are stored as 32 bit floats.
pub fn approximate_float_digits(min: f64, max: f64) -> i32 {
    let max_component = if min.abs() > max { min.abs() } else { max };
    let log_max = if max_component == 0.0 {
        0.0
    } else {
        max_component.log10()
    };

    let range = max - min;
    let log_range = if range == 0.0 { 0.0 } else { range.log10() };

    (FLOAT_SIGNIFICANT_DIGITS - (log_max - log_range - DIGIT_ROUNDING_SLACK).ceil()) as i32
}

/// Worst axis of `[min_x, max_x, min_y, max_y, min_z, max_z]`.
pub fn min_float_digits(bounds: [f64; 6]) -> i32 {
    (0..3)
        .map(|axis| approximate_float_digits(bounds[axis * 2], bounds[axis * 2 + 1]))
        .min()
        .unwrap_or(FLOAT_SIGNIFICANT_DIGITS as i32)
}

/// Decides whether a dataset can be cached with float coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrecisionAdvisor {
    pub min_float_digits: i32,
    pub interactive: bool,
}

impl Default for PrecisionAdvisor {
    fn default() -> Self {
        Self {
            min_float_digits: MIN_FLOAT_DIGITS,
            interactive: true,
        }
    }
}

impl PrecisionAdvisor {
    pub fn new(min_float_digits: i32, interactive: bool) -> Self {
        Self {
            min_float_digits,
            interactive,
        }
    }

    /// Recommend a precision for the given bounds.
    /// Non-interactive advisors answer `Double` wherever a question would be asked.
    pub fn recommend(&self, bounds: [f64; 6]) -> PrecisionRecommendation {
        if !PointCloudBounds::from_array(bounds).is_valid() {
            // Nothing read yet.
            return PrecisionRecommendation::Float;
        }

        if min_float_digits(bounds) >= self.min_float_digits {
            PrecisionRecommendation::Float
        } else if self.interactive {
            PrecisionRecommendation::AskUser
        } else {
            PrecisionRecommendation::Double
        }
    }
}

/// Recommend a precision with the default digit threshold.
pub fn recommend_precision(bounds: [f64; 6]) -> PrecisionRecommendation {
    PrecisionAdvisor::default().recommend(bounds)
}

/// Suggest moving the origin to the minimum corner when the data sits so far
/// from zero that its extent is lost in float rounding.
pub fn recommend_origin_shift(bounds: [f64; 6], ratio_threshold: f64) -> Option<[f64; 3]> {
    let worst = (0..3)
        .filter_map(|axis| {
            let (min, max) = (bounds[axis * 2], bounds[axis * 2 + 1]);
            let extent = max - min;
            (extent > 0.0).then(|| (min / extent).abs())
        })
        .fold(0.0_f64, f64::max);

    (worst > ratio_threshold).then(|| [bounds[0], bounds[2], bounds[4]])
}

/// Origin shift check with the default ratio.
pub fn default_origin_shift(bounds: [f64; 6]) -> Option<[f64; 3]> {
    recommend_origin_shift(bounds, ORIGIN_SHIFT_RATIO)
}
