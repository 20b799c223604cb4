/// Shared tuning constants for point cloud decimation
pub mod class;
pub mod decimation;
pub mod precision;
