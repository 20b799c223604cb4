/// Builds output geometry for pieces, reusing clean caches and re-deriving the rest.
use crate::clip::{ClipSpec, ContourPolygon, ContourSet};
use crate::geometry::Geometry;
use crate::precision::Precision;
use crate::registry::{PieceRef, PieceRegistry};
use crate::result::{DecimationError, DecimationResult};
use crate::staleness::{ClipTransformEngine, ReadMode};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Derived stages created while re-reading a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    RawRead,
    PolygonClip,
    Threshold,
}

/// Temporary geometries for one piece. Dropping the chain releases them newest first.
struct DerivedChain<'log> {
    stages: Vec<(StageKind, Arc<Geometry>)>,
    teardown: &'log mut Vec<StageKind>,
}

impl<'log> DerivedChain<'log> {
    fn new(teardown: &'log mut Vec<StageKind>) -> Self {
        Self {
            stages: Vec::new(),
            teardown,
        }
    }

    fn push(&mut self, kind: StageKind, geometry: Geometry) -> Arc<Geometry> {
        let geometry = Arc::new(geometry);
        self.stages.push((kind, Arc::clone(&geometry)));
        geometry
    }
}

impl Drop for DerivedChain<'_> {
    fn drop(&mut self) {
        while let Some((kind, geometry)) = self.stages.pop() {
            trace!(?kind, points = geometry.len(), "releasing derived stage");
            drop(geometry);
            self.teardown.push(kind);
        }
    }
}

pub struct OutputAssembler<'a> {
    registry: &'a PieceRegistry,
    clip: ClipSpec,
    contours: Option<&'a ContourSet>,
    teardown: Vec<StageKind>,
}

impl<'a> OutputAssembler<'a> {
    pub fn new(registry: &'a PieceRegistry, clip: ClipSpec) -> Self {
        Self {
            registry,
            clip,
            contours: None,
            teardown: Vec::new(),
        }
    }

    pub fn with_contours(mut self, contours: &'a ContourSet) -> Self {
        self.contours = Some(contours);
        self
    }

    /// Stages released by the last `assemble` call, in release order.
    pub fn teardown_log(&self) -> &[StageKind] {
        &self.teardown
    }

    /// One geometry per requested piece, in request order.
    pub fn assemble(
        &mut self,
        pieces: &[PieceRef],
        mode: ReadMode,
        force_update: bool,
    ) -> DecimationResult<Vec<Arc<Geometry>>> {
        let registry = self.registry;
        let clip = self.clip;
        let contours = self.contours;
        self.teardown.clear();

        let mut outputs = Vec::with_capacity(pieces.len());
        for piece_ref in pieces {
            let source = registry.source(piece_ref.source)?;
            let descriptor = source
                .piece(piece_ref.piece)
                .ok_or(DecimationError::UnknownPiece {
                    source_id: piece_ref.source,
                    piece: piece_ref.piece,
                })?;
            let ratio = ClipTransformEngine::effective_read_ratio(descriptor, mode);
            let polygons: &[ContourPolygon] = contours
                .map(|contours| contours.for_piece(piece_ref))
                .unwrap_or(&[]);

            let clean = !force_update
                && polygons.is_empty()
                && !ClipTransformEngine::is_stale(descriptor, &clip, &descriptor.transform, ratio);
            if let (true, Some(geometry)) = (clean, descriptor.geometry()) {
                trace!(piece = %piece_ref.piece, "using cached geometry");
                outputs.push(Arc::clone(geometry));
                continue;
            }

            debug!(piece = %piece_ref.piece, ratio, ?mode, "re-deriving piece");
            let mut chain = DerivedChain::new(&mut self.teardown);

            let raw = source
                .handle()
                .read_piece(piece_ref.piece, ratio, None, Some(&descriptor.transform))
                .map_err(|error| DecimationError::from_piece_read(piece_ref.piece, error))?;
            let precision = source.precision().unwrap_or(Precision::Float);
            let mut current = chain.push(StageKind::RawRead, raw.with_precision(precision));

            if !polygons.is_empty() {
                let clipped = current.filter(|point| ContourSet::keeps(polygons, point));
                current = chain.push(StageKind::PolygonClip, clipped);
            }

            if let Some(clip_box) = clip.active() {
                let thresholded = current.filter(|point| clip_box.contains(point));
                current = chain.push(StageKind::Threshold, thresholded);
            }

            outputs.push(current);
        }

        Ok(outputs)
    }
}

/// Write points as `x y z` lines.
pub fn write_xyz<W: Write>(writer: &mut W, geometries: &[Arc<Geometry>]) -> io::Result<()> {
    for geometry in geometries {
        for [x, y, z] in geometry.iter_points() {
            writeln!(writer, "{} {} {}", x, y, z)?;
        }
    }
    Ok(())
}

/// Output path for one piece when saving pieces separately: `out.xyz` and
/// piece "low vegetation" give `out_low_vegetation.xyz`.
pub fn piece_output_path(base: &Path, piece_name: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix: String = piece_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    let mut file_name = format!("{}_{}", stem, suffix);
    if let Some(extension) = base.extension() {
        file_name.push('.');
        file_name.push_str(&extension.to_string_lossy());
    }
    base.with_file_name(file_name)
}
