#![allow(dead_code)]

use point_cloud_decimation::prelude::*;
use point_cloud_decimation::source::SampleFilter;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory classified source that counts its scans and reads.
pub struct MockSource {
    path: PathBuf,
    pieces: Vec<(PieceId, Vec<[f64; 3]>)>,
    bounds: Option<[f64; 6]>,
    failing: Mutex<HashSet<PieceId>>,
    abort_after: Option<(usize, AbortFlag)>,
    scans: AtomicUsize,
    reads: AtomicUsize,
}

impl MockSource {
    /// Class `code` gets `count` points along x, at y = code.
    pub fn classified(classes: &[(u8, usize)]) -> Self {
        let pieces = classes
            .iter()
            .map(|&(code, count)| {
                let points = (0..count)
                    .map(|index| [index as f64, f64::from(code), 0.0])
                    .collect();
                (PieceId::Classification(code), points)
            })
            .collect();

        Self {
            path: PathBuf::from("mock.laz"),
            pieces,
            bounds: None,
            failing: Mutex::new(HashSet::new()),
            abort_after: None,
            scans: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn with_bounds(mut self, bounds: [f64; 6]) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Raise `flag` once `reads` piece reads have happened.
    pub fn aborting_after(mut self, reads: usize, flag: AbortFlag) -> Self {
        self.abort_after = Some((reads, flag));
        self
    }

    pub fn fail_piece(&self, piece: PieceId) {
        self.failing.lock().unwrap().insert(piece);
    }

    pub fn heal_piece(&self, piece: PieceId) {
        self.failing.lock().unwrap().remove(&piece);
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl PointSource for MockSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ClassifiedPoints
    }

    fn scan(&self, progress: &dyn ImportProgress) -> Result<ScanResult, ReadError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let mut counts = Vec::with_capacity(self.pieces.len());
        for (id, points) in &self.pieces {
            if progress.is_abort_requested() {
                return Err(ReadError::Aborted);
            }
            counts.push(PieceCount {
                id: *id,
                points: points.len() as u64,
            });
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
        let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, flag)) = &self.abort_after {
            if reads >= *limit {
                flag.request_abort();
            }
        }

        if self.failing.lock().unwrap().contains(&piece) {
            return Err(ReadError::Format(format!("corrupt piece {}", piece)));
        }

        let (_, raw) = self
            .pieces
            .iter()
            .find(|(id, _)| *id == piece)
            .ok_or(ReadError::UnknownPiece(piece))?;

        let filter = SampleFilter::new(stride, clip, transform);
        let points: Vec<[f64; 3]> = raw
            .iter()
            .enumerate()
            .filter_map(|(index, point)| filter.sample(index as u64, *point))
            .collect();
        Ok(Geometry::new(points, None))
    }

    fn bounds(&self) -> [f64; 6] {
        self.bounds.unwrap_or_else(|| {
            let mut bounds = PointCloudBounds::new();
            for (_, points) in &self.pieces {
                for &[x, y, z] in points {
                    bounds.update(x, y, z);
                }
            }
            bounds.to_array()
        })
    }
}

pub fn register(registry: &mut PieceRegistry, mock: &Arc<MockSource>) -> SourceId {
    let handle: Arc<dyn PointSource> = mock.clone();
    registry.register_handle(handle)
}

pub fn options(target: u64) -> ImportOptions {
    ImportOptions {
        target_total_points: target,
        ..ImportOptions::default()
    }
}

/// Run a pass that answers every request the way a non-interactive caller would.
pub fn import(
    registry: &mut PieceRegistry,
    source: SourceId,
    clip: ClipSpec,
    options: ImportOptions,
    progress: &dyn ImportProgress,
) -> ImportOutcome {
    import_source(registry, source, clip, options, progress, |request| match request {
        ImportRequest::Precision { .. } => ImportAnswer::UseDouble(true),
        ImportRequest::PieceReadFailed { .. } => ImportAnswer::AbortSource,
    })
    .unwrap()
}

pub fn expect_cached(outcome: ImportOutcome) -> CompletionReport {
    match outcome {
        ImportOutcome::Cached(report) => report,
        other => panic!("expected a cached outcome, got {:?}", other),
    }
}
