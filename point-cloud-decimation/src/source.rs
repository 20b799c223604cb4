/// Format handles that can count and read pieces of a point dataset.
use crate::clip::ClipBox;
use crate::config::DecimationConfig;
use crate::geometry::Geometry;
use crate::laz::LasSource;
use crate::progress::ImportProgress;
use crate::raster::RasterSource;
use crate::result::{DecimationResult, ReadError};
use crate::transform::PieceTransform;
use constants::class::get_class_name;
use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Identifies a piece inside its source.
/// Plain and raster sources number their pieces, classified sources key them by class code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PieceId {
    Index(u32),
    Classification(u8),
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PieceId::Index(index) => write!(f, "#{}", index),
            PieceId::Classification(code) => write!(f, "class {}", code),
        }
    }
}

impl PieceId {
    /// Display name used for new descriptors.
    pub fn default_name(&self) -> String {
        match self {
            PieceId::Index(index) => format!("piece {}", index),
            PieceId::Classification(code) => get_class_name(*code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    PlainPoints,
    ClassifiedPoints,
    Raster,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::PlainPoints),
            "classified" => Ok(Self::ClassifiedPoints),
            "raster" => Ok(Self::Raster),
            _ => Err(format!("unknown source kind '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PieceCount {
    pub id: PieceId,
    pub points: u64,
}

/// Point counts gathered by a scan, one entry per piece in ascending id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub total_points: u64,
    pub per_piece_counts: Vec<PieceCount>,
}

impl ScanResult {
    pub fn from_counts(mut counts: Vec<PieceCount>) -> Self {
        counts.sort_by_key(|count| count.id);
        let total_points = counts.iter().map(|count| count.points).sum();
        Self {
            total_points,
            per_piece_counts: counts,
        }
    }

    pub fn points(&self) -> Vec<u64> {
        self.per_piece_counts.iter().map(|count| count.points).collect()
    }
}

/// Capabilities every importable format provides.
pub trait PointSource: Send + Sync {
    fn path(&self) -> &Path;

    fn kind(&self) -> SourceKind;

    /// Count points per piece. Must poll `progress` for aborts on large inputs.
    fn scan(&self, progress: &dyn ImportProgress) -> Result<ScanResult, ReadError>;

    /// Read every `stride`th point of a piece, transformed then clipped.
    fn read_piece(
        &self,
        piece: PieceId,
        stride: u32,
        clip: Option<&ClipBox>,
        transform: Option<&PieceTransform>,
    ) -> Result<Geometry, ReadError>;

    /// Header bounds as `[min_x, max_x, min_y, max_y, min_z, max_z]`.
    fn bounds(&self) -> [f64; 6];
}

/// Open the format handle matching `kind`.
pub fn open_source(
    path: &Path,
    kind: SourceKind,
    config: &DecimationConfig,
) -> DecimationResult<Arc<dyn PointSource>> {
    let handle: Arc<dyn PointSource> = match kind {
        SourceKind::PlainPoints | SourceKind::ClassifiedPoints => {
            Arc::new(LasSource::open(path, kind, config.plain_piece_size)?)
        }
        SourceKind::Raster => Arc::new(RasterSource::open(path, config.raster_rows_per_piece)?),
    };
    Ok(handle)
}

/// Stride, transform and clip applied to the raw point stream of one piece.
pub struct SampleFilter<'a> {
    stride: u64,
    clip: Option<&'a ClipBox>,
    matrix: Option<DMat4>,
}

impl<'a> SampleFilter<'a> {
    pub fn new(stride: u32, clip: Option<&'a ClipBox>, transform: Option<&PieceTransform>) -> Self {
        Self {
            stride: u64::from(stride.max(1)),
            clip,
            matrix: transform
                .filter(|transform| transform.is_transformed())
                .map(PieceTransform::matrix),
        }
    }

    /// `index` counts points within the piece, starting at zero.
    pub fn sample(&self, index: u64, point: [f64; 3]) -> Option<[f64; 3]> {
        if index % self.stride != 0 {
            return None;
        }

        let point = match &self.matrix {
            Some(matrix) => matrix.transform_point3(DVec3::from_array(point)).to_array(),
            None => point,
        };

        match self.clip {
            Some(clip) if !clip.contains(point) => None,
            _ => Some(point),
        }
    }
}
