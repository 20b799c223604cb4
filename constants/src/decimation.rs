/// Point budget planning defaults

/// Smallest number of points a non-empty piece keeps after decimation.
pub const DEFAULT_MIN_POINTS_PER_PIECE: u64 = 50;

/// Budget to total ratio above which the source is read at full resolution.
pub const FULL_RESOLUTION_RATIO: f64 = 0.8;

/// Smallest global stride once decimation is requested at all.
pub const MIN_DECIMATING_STRIDE: u32 = 2;

/// Point budget used when the caller does not supply one.
pub const DEFAULT_TARGET_POINTS: u64 = 1_000_000;

/// Points per numeric piece when splitting plain point files.
pub const DEFAULT_PLAIN_PIECE_SIZE: u64 = 1_000_000;

/// Raster rows grouped into one numeric piece.
pub const DEFAULT_RASTER_ROWS_PER_PIECE: u32 = 256;

/// Points between abort polls while scanning a single pass over a file.
pub const SCAN_POLL_INTERVAL: u64 = 50_000;
