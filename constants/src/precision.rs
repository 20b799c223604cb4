/// Coordinate precision heuristics

/// Decimal digits an f32 mantissa holds.
pub const FLOAT_SIGNIFICANT_DIGITS: f64 = 7.0;

/// Offset applied before rounding up so ranges close to a digit boundary still pass.
pub const DIGIT_ROUNDING_SLACK: f64 = 0.2;

/// Fewer retained digits than this triggers a double precision prompt.
pub const MIN_FLOAT_DIGITS: i32 = 4;

/// Offset to extent ratio above which moving the origin is suggested.
pub const ORIGIN_SHIFT_RATIO: f64 = 10_000.0;
