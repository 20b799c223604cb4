/// Point cloud decimation: per piece on-ratio planning, cached reads and output assembly
pub mod assembler;
pub mod bounds;
pub mod cli;
pub mod clip;
pub mod config;
pub mod geometry;
pub mod laz;
pub mod pipeline;
pub mod planner;
pub mod precision;
pub mod progress;
pub mod raster;
pub mod registry;
pub mod report;
pub mod result;
pub mod source;
pub mod staleness;
pub mod transform;

pub mod prelude {
    pub use crate::{
        assembler::{OutputAssembler, StageKind, piece_output_path, write_xyz},
        bounds::PointCloudBounds,
        cli::{Cli, ImportBar},
        clip::{ClipBox, ClipSpec, ContourMode, ContourPolygon, ContourSet},
        config::DecimationConfig,
        geometry::{Geometry, Positions},
        pipeline::{
            ImportAnswer, ImportOptions, ImportOutcome, ImportPass, ImportRequest, ImportState,
            ImportStep, import_source,
        },
        planner::{DecimationPlan, main_on_ratio, piece_on_ratio, plan},
        precision::{
            Precision, PrecisionAdvisor, PrecisionRecommendation, recommend_origin_shift,
            recommend_precision,
        },
        progress::{AbortFlag, ImportProgress},
        registry::{MaterializationState, PieceDescriptor, PieceRef, PieceRegistry, SourceId},
        report::{CompletionReport, PieceReport},
        result::{DecimationError, DecimationResult, ReadError},
        source::{PieceCount, PieceId, PointSource, ScanResult, SourceKind},
        staleness::{ClipTransformEngine, ReadMode},
        transform::PieceTransform,
    };
}
