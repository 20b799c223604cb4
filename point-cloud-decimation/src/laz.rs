use crate::clip::ClipBox;
use crate::geometry::Geometry;
use crate::progress::{CountingProgress, ImportProgress};
use crate::result::{DecimationError, DecimationResult, ReadError};
use crate::source::{PieceCount, PieceId, PointSource, SampleFilter, ScanResult, SourceKind};
use crate::transform::PieceTransform;
use constants::decimation::SCAN_POLL_INTERVAL;
use las::Reader;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Create LAS file reader for point cloud access.
/// Handles both .las and .laz compressed formats.
pub fn create_reader(file_path: &Path) -> Result<Reader, ReadError> {
    let file = File::open(file_path)?;
    let buf_reader = BufReader::new(file);
    Ok(Reader::new(buf_reader)?)
}

/// LAS/LAZ dataset split either into fixed size chunks or by classification code.
#[derive(Debug)]
pub struct LasSource {
    path: PathBuf,
    kind: SourceKind,
    number_of_points: u64,
    bounds: [f64; 6],
    piece_size: u64,
}

impl LasSource {
    /// Validate the file by reading its header.
    pub fn open(path: &Path, kind: SourceKind, piece_size: u64) -> DecimationResult<Self> {
        if kind == SourceKind::Raster {
            return Err(DecimationError::invalid_file(
                path,
                "LAS data cannot be imported as a raster",
            ));
        }

        let reader =
            create_reader(path).map_err(|error| DecimationError::invalid_file(path, error))?;
        let header = reader.header();
        let header_bounds = header.bounds();

        debug!(
            path = %path.display(),
            points = header.number_of_points(),
            "opened LAS source"
        );

        Ok(Self {
            path: path.to_path_buf(),
            kind,
            number_of_points: header.number_of_points(),
            bounds: [
                header_bounds.min.x,
                header_bounds.max.x,
                header_bounds.min.y,
                header_bounds.max.y,
                header_bounds.min.z,
                header_bounds.max.z,
            ],
            piece_size: piece_size.max(1),
        })
    }

    fn chunk_count(&self) -> u64 {
        self.number_of_points.div_ceil(self.piece_size)
    }

    /// Count points per class in one pass over the file.
    fn scan_classes(&self, progress: &dyn ImportProgress) -> Result<ScanResult, ReadError> {
        let mut reader = create_reader(&self.path)?;
        let counter = CountingProgress::new(progress, self.number_of_points);
        let mut class_counts: BTreeMap<u8, u64> = BTreeMap::new();

        for (idx, point_result) in reader.points().enumerate() {
            let point = point_result?;
            *class_counts
                .entry(u8::from(point.classification))
                .or_insert(0) += 1;

            if (idx as u64 + 1) % SCAN_POLL_INTERVAL == 0
                && !counter.advance("Counting classes", SCAN_POLL_INTERVAL)
            {
                return Err(ReadError::Aborted);
            }
        }

        Ok(ScanResult::from_counts(
            class_counts
                .into_iter()
                .map(|(code, points)| PieceCount {
                    id: PieceId::Classification(code),
                    points,
                })
                .collect(),
        ))
    }

    fn read_chunk(&self, index: u32, filter: &SampleFilter) -> Result<Geometry, ReadError> {
        let start = u64::from(index) * self.piece_size;
        if start >= self.number_of_points {
            return Err(ReadError::UnknownPiece(PieceId::Index(index)));
        }
        let len = self.piece_size.min(self.number_of_points - start);

        let mut reader = create_reader(&self.path)?;
        reader.seek(start)?;

        let mut points = Vec::new();
        let mut classifications = Vec::new();
        for (idx, point_result) in reader.points().take(len as usize).enumerate() {
            let point = point_result?;
            if let Some(position) = filter.sample(idx as u64, [point.x, point.y, point.z]) {
                points.push(position);
                classifications.push(u8::from(point.classification));
            }
        }

        Ok(Geometry::new(points, Some(classifications)))
    }

    fn read_class(&self, code: u8, filter: &SampleFilter) -> Result<Geometry, ReadError> {
        let mut reader = create_reader(&self.path)?;

        let mut points = Vec::new();
        let mut class_index = 0_u64;
        for point_result in reader.points() {
            let point = point_result?;
            if u8::from(point.classification) != code {
                continue;
            }
            if let Some(position) = filter.sample(class_index, [point.x, point.y, point.z]) {
                points.push(position);
            }
            class_index += 1;
        }

        let classifications = vec![code; points.len()];
        Ok(Geometry::new(points, Some(classifications)))
    }
}

impl PointSource for LasSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn scan(&self, progress: &dyn ImportProgress) -> Result<ScanResult, ReadError> {
        match self.kind {
            SourceKind::ClassifiedPoints => self.scan_classes(progress),
            _ => {
                // Chunk sizes follow from the header alone.
                let chunks = self.chunk_count();
                let counts = (0..chunks)
                    .map(|chunk| PieceCount {
                        id: PieceId::Index(chunk as u32),
                        points: self
                            .piece_size
                            .min(self.number_of_points - chunk * self.piece_size),
                    })
                    .collect();
                progress.on_progress("Counting chunks", 1.0);
                Ok(ScanResult::from_counts(counts))
            }
        }
    }

    fn read_piece(
        &self,
        piece: PieceId,
        stride: u32,
        clip: Option<&ClipBox>,
        transform: Option<&PieceTransform>,
    ) -> Result<Geometry, ReadError> {
        let filter = SampleFilter::new(stride, clip, transform);
        match (self.kind, piece) {
            (SourceKind::ClassifiedPoints, PieceId::Classification(code)) => {
                self.read_class(code, &filter)
            }
            (SourceKind::PlainPoints, PieceId::Index(index)) => self.read_chunk(index, &filter),
            _ => Err(ReadError::UnknownPiece(piece)),
        }
    }

    fn bounds(&self) -> [f64; 6] {
        self.bounds
    }
}
