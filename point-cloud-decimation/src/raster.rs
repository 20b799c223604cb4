/// Heightmap rasters imported as point grids, one piece per band of rows.
use crate::bounds::PointCloudBounds;
use crate::clip::ClipBox;
use crate::geometry::Geometry;
use crate::progress::{CountingProgress, ImportProgress};
use crate::result::{DecimationError, DecimationResult, ReadError};
use crate::source::{PieceCount, PieceId, PointSource, SampleFilter, ScanResult, SourceKind};
use crate::transform::PieceTransform;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RasterSource {
    path: PathBuf,
    width: u32,
    height: u32,
    elevations: Vec<f64>,
    origin: [f64; 3],
    spacing: f64,
    vertical_scale: f64,
    rows_per_piece: u32,
    bounds: [f64; 6],
}

impl RasterSource {
    /// Load a greyscale heightmap. Samples are read as 16 bit elevations.
    pub fn open(path: &Path, rows_per_piece: u32) -> DecimationResult<Self> {
        let image = image::open(path).map_err(|error| DecimationError::invalid_file(path, error))?;
        let heightmap = image.into_luma16();
        let (width, height) = heightmap.dimensions();

        debug!(path = %path.display(), width, height, "opened raster source");

        let elevations = heightmap.into_raw().into_iter().map(f64::from).collect();
        Self::from_grid(path, width, height, elevations, rows_per_piece)
    }

    /// Wrap a row-major elevation grid.
    pub fn from_grid(
        path: impl Into<PathBuf>,
        width: u32,
        height: u32,
        elevations: Vec<f64>,
        rows_per_piece: u32,
    ) -> DecimationResult<Self> {
        let path = path.into();
        if elevations.len() as u64 != u64::from(width) * u64::from(height) {
            return Err(DecimationError::invalid_file(
                path,
                format!(
                    "expected {}x{} samples, found {}",
                    width,
                    height,
                    elevations.len()
                ),
            ));
        }

        let mut raster = Self {
            path,
            width,
            height,
            elevations,
            origin: [0.0; 3],
            spacing: 1.0,
            vertical_scale: 1.0,
            rows_per_piece: rows_per_piece.max(1),
            bounds: [0.0; 6],
        };
        raster.bounds = raster.compute_bounds();
        Ok(raster)
    }

    /// Place the grid in world space.
    pub fn with_georeference(mut self, origin: [f64; 3], spacing: f64, vertical_scale: f64) -> Self {
        self.origin = origin;
        self.spacing = spacing;
        self.vertical_scale = vertical_scale;
        self.bounds = self.compute_bounds();
        self
    }

    fn sample_position(&self, column: u32, row: u32) -> [f64; 3] {
        let elevation = self.elevations[cell_index(self.width, column, row)];
        [
            self.origin[0] + f64::from(column) * self.spacing,
            self.origin[1] + f64::from(row) * self.spacing,
            self.origin[2] + elevation * self.vertical_scale,
        ]
    }

    fn compute_bounds(&self) -> [f64; 6] {
        let mut bounds = PointCloudBounds::new();
        for row in 0..self.height {
            for column in 0..self.width {
                let [x, y, z] = self.sample_position(column, row);
                bounds.update(x, y, z);
            }
        }
        bounds.to_array()
    }

    fn piece_count(&self) -> u32 {
        self.height.div_ceil(self.rows_per_piece)
    }

    fn piece_rows(&self, index: u32) -> std::ops::Range<u32> {
        let start = index * self.rows_per_piece;
        start..(start + self.rows_per_piece).min(self.height)
    }
}

/// Row-major cell offset, wide enough for grids past `u32::MAX` cells.
fn cell_index(width: u32, column: u32, row: u32) -> usize {
    row as usize * width as usize + column as usize
}

impl PointSource for RasterSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Raster
    }

    fn scan(&self, progress: &dyn ImportProgress) -> Result<ScanResult, ReadError> {
        let pieces = self.piece_count();
        let counter = CountingProgress::new(progress, u64::from(pieces));
        let mut counts = Vec::with_capacity(pieces as usize);

        for index in 0..pieces {
            let rows = self.piece_rows(index);
            counts.push(PieceCount {
                id: PieceId::Index(index),
                points: u64::from(rows.end - rows.start) * u64::from(self.width),
            });
            if !counter.advance("Counting raster rows", 1) {
                return Err(ReadError::Aborted);
            }
        }

        Ok(ScanResult::from_counts(counts))
    }

    fn read_piece(
        &self,
        piece: PieceId,
        stride: u32,
        clip: Option<&ClipBox>,
        transform: Option<&PieceTransform>,
    ) -> Result<Geometry, ReadError> {
        let index = match piece {
            PieceId::Index(index) if index < self.piece_count() => index,
            _ => return Err(ReadError::UnknownPiece(piece)),
        };

        let filter = SampleFilter::new(stride, clip, transform);
        let mut points = Vec::new();
        let mut sample_index = 0_u64;
        for row in self.piece_rows(index) {
            for column in 0..self.width {
                if let Some(position) = filter.sample(sample_index, self.sample_position(column, row))
                {
                    points.push(position);
                }
                sample_index += 1;
            }
        }

        Ok(Geometry::new(points, None))
    }

    fn bounds(&self) -> [f64; 6] {
        self.bounds
    }
}
