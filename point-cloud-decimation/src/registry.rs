/// Registry of imported sources and their pieces.
use crate::bounds::PointCloudBounds;
use crate::clip::{ClipBox, ClipSpec};
use crate::config::DecimationConfig;
use crate::geometry::Geometry;
use crate::planner::plan;
use crate::precision::Precision;
use crate::result::{DecimationError, DecimationResult};
use crate::source::{PieceId, PointSource, ScanResult, SourceKind, open_source};
use crate::staleness::{ClipTransformEngine, ReadMode};
use crate::transform::PieceTransform;
use serde::Serialize;
use slab::Slab;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Handle to a registered source. Stale handles never resolve to a newer source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceId {
    key: usize,
    generation: u32,
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.key, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PieceRef {
    pub source: SourceId,
    pub piece: PieceId,
}

impl PieceRef {
    pub fn new(source: SourceId, piece: PieceId) -> Self {
        Self { source, piece }
    }
}

/// Snapshot of the parameters a cached geometry was read under.
#[derive(Debug, Clone)]
pub struct MaterializationState {
    pub point_count: u64,
    pub ratio: u32,
    pub clip: Option<ClipBox>,
    pub transform: PieceTransform,
    /// Set when the cached points must be re-read regardless of parameters.
    pub dirty: bool,
    pub geometry: Arc<Geometry>,
}

impl MaterializationState {
    pub fn new(
        geometry: Geometry,
        ratio: u32,
        clip: Option<ClipBox>,
        transform: PieceTransform,
    ) -> Self {
        Self {
            point_count: geometry.len() as u64,
            ratio,
            clip,
            transform,
            dirty: false,
            geometry: Arc::new(geometry),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PieceDescriptor {
    pub id: PieceId,
    pub name: String,
    pub raw_points: u64,
    pub read_ratio: u32,
    pub display_ratio: u32,
    pub save_ratio: u32,
    pub bounds: PointCloudBounds,
    pub transform: PieceTransform,
    pub visible: bool,
    pub display_estimate: u64,
    pub save_estimate: u64,
    pub materialization: Option<MaterializationState>,
}

impl PieceDescriptor {
    /// Pieces at or below the floor start hidden.
    pub fn new(id: PieceId, raw_points: u64, ratio: u32, min_points: u64) -> Self {
        Self {
            id,
            name: id.default_name(),
            raw_points,
            read_ratio: ratio,
            display_ratio: ratio,
            save_ratio: 1,
            bounds: PointCloudBounds::new(),
            transform: PieceTransform::default(),
            visible: raw_points > min_points,
            display_estimate: 0,
            save_estimate: 0,
            materialization: None,
        }
    }

    pub fn read_points(&self) -> u64 {
        self.materialization
            .as_ref()
            .map_or(0, |state| state.point_count)
    }

    pub fn geometry(&self) -> Option<&Arc<Geometry>> {
        self.materialization.as_ref().map(|state| &state.geometry)
    }

    pub fn is_transformed(&self) -> bool {
        self.transform.is_transformed()
    }
}

/// One registered dataset.
pub struct DataSource {
    generation: u32,
    handle: Arc<dyn PointSource>,
    scan: Option<ScanResult>,
    pieces: Vec<PieceDescriptor>,
    precision: Option<Precision>,
}

impl DataSource {
    pub fn path(&self) -> &Path {
        self.handle.path()
    }

    pub fn kind(&self) -> SourceKind {
        self.handle.kind()
    }

    pub fn handle(&self) -> &Arc<dyn PointSource> {
        &self.handle
    }

    /// Counts from the last completed pass, if any.
    pub fn scan(&self) -> Option<&ScanResult> {
        self.scan.as_ref()
    }

    pub fn total_points(&self) -> Option<u64> {
        self.scan.as_ref().map(|scan| scan.total_points)
    }

    pub fn pieces(&self) -> &[PieceDescriptor] {
        &self.pieces
    }

    pub fn precision(&self) -> Option<Precision> {
        self.precision
    }

    pub fn piece(&self, id: PieceId) -> Option<&PieceDescriptor> {
        self.pieces
            .binary_search_by_key(&id, |piece| piece.id)
            .ok()
            .map(|index| &self.pieces[index])
    }

    fn piece_mut(&mut self, id: PieceId) -> Option<&mut PieceDescriptor> {
        self.pieces
            .binary_search_by_key(&id, |piece| piece.id)
            .ok()
            .map(|index| &mut self.pieces[index])
    }

    /// Bounds of everything read so far.
    pub fn realized_bounds(&self) -> Option<PointCloudBounds> {
        self.pieces
            .iter()
            .filter_map(|piece| piece.geometry())
            .filter(|geometry| !geometry.is_empty())
            .map(|geometry| *geometry.bounds())
            .reduce(|mut a, b| {
                a.merge(&b);
                a
            })
    }
}

/// Result of a finished import pass, swapped in as a whole.
pub(crate) struct CommittedPass {
    pub scan: ScanResult,
    pub pieces: Vec<PieceDescriptor>,
    pub precision: Precision,
}

#[derive(Default)]
pub struct PieceRegistry {
    sources: Slab<DataSource>,
    next_generation: u32,
}

impl PieceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `path` with the handle for `kind` and register it with no pieces.
    /// A path that is already loaded resolves to its existing source.
    pub fn register_source(
        &mut self,
        path: &Path,
        kind: SourceKind,
        config: &DecimationConfig,
    ) -> DecimationResult<SourceId> {
        if let Some(id) = self.find_source(path) {
            debug!(source = %id, path = %path.display(), "source already loaded");
            return Ok(id);
        }
        let handle = open_source(path, kind, config)?;
        Ok(self.register_handle(handle))
    }

    pub fn find_source(&self, path: &Path) -> Option<SourceId> {
        self.sources
            .iter()
            .find(|(_, source)| source.handle.path() == path)
            .map(|(key, source)| SourceId {
                key,
                generation: source.generation,
            })
    }

    /// Register an already opened format handle.
    pub fn register_handle(&mut self, handle: Arc<dyn PointSource>) -> SourceId {
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);

        let path = handle.path().display().to_string();
        let key = self.sources.insert(DataSource {
            generation,
            handle,
            scan: None,
            pieces: Vec::new(),
            precision: None,
        });

        let id = SourceId { key, generation };
        info!(source = %id, path = %path, "registered source");
        id
    }

    /// Drop a source and everything cached for it. Removing twice is a no-op.
    pub fn remove_source(&mut self, id: SourceId) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.sources.remove(id.key);
        info!(source = %id, "removed source");
        true
    }

    pub fn contains(&self, id: SourceId) -> bool {
        self.sources
            .get(id.key)
            .is_some_and(|source| source.generation == id.generation)
    }

    pub fn source(&self, id: SourceId) -> DecimationResult<&DataSource> {
        self.sources
            .get(id.key)
            .filter(|source| source.generation == id.generation)
            .ok_or(DecimationError::UnknownSource(id))
    }

    fn source_mut(&mut self, id: SourceId) -> DecimationResult<&mut DataSource> {
        self.sources
            .get_mut(id.key)
            .filter(|source| source.generation == id.generation)
            .ok_or(DecimationError::UnknownSource(id))
    }

    pub fn get_pieces(&self, id: SourceId) -> DecimationResult<&[PieceDescriptor]> {
        Ok(self.source(id)?.pieces())
    }

    pub fn piece(&self, id: SourceId, piece: PieceId) -> DecimationResult<&PieceDescriptor> {
        self.source(id)?
            .piece(piece)
            .ok_or(DecimationError::UnknownPiece {
                source_id: id,
                piece,
            })
    }

    fn piece_mut(&mut self, id: SourceId, piece: PieceId) -> DecimationResult<&mut PieceDescriptor> {
        self.source_mut(id)?
            .piece_mut(piece)
            .ok_or(DecimationError::UnknownPiece {
                source_id: id,
                piece,
            })
    }

    /// Replace the cached geometry of one piece.
    pub fn update_materialization(
        &mut self,
        id: SourceId,
        piece: PieceId,
        state: MaterializationState,
    ) -> DecimationResult<()> {
        let descriptor = self.piece_mut(id, piece)?;
        descriptor.read_ratio = state.ratio;
        if !state.geometry.is_empty() {
            descriptor.bounds = *state.geometry.bounds();
        }
        descriptor.materialization = Some(state);
        Ok(())
    }

    /// Force the next pass to re-read a piece.
    pub fn invalidate(&mut self, id: SourceId, piece: PieceId) -> DecimationResult<()> {
        if let Some(state) = self.piece_mut(id, piece)?.materialization.as_mut() {
            state.dirty = true;
        }
        Ok(())
    }

    /// Zero ratios are ignored.
    pub fn set_display_ratio(
        &mut self,
        id: SourceId,
        piece: PieceId,
        ratio: u32,
    ) -> DecimationResult<()> {
        let descriptor = self.piece_mut(id, piece)?;
        if ratio > 0 {
            descriptor.display_ratio = ratio;
        }
        Ok(())
    }

    /// Zero ratios are ignored.
    pub fn set_save_ratio(&mut self, id: SourceId, piece: PieceId, ratio: u32) -> DecimationResult<()> {
        let descriptor = self.piece_mut(id, piece)?;
        if ratio > 0 {
            descriptor.save_ratio = ratio;
        }
        Ok(())
    }

    pub fn set_transform(
        &mut self,
        id: SourceId,
        piece: PieceId,
        transform: PieceTransform,
    ) -> DecimationResult<()> {
        self.piece_mut(id, piece)?.transform = transform;
        Ok(())
    }

    pub fn set_visible(&mut self, id: SourceId, piece: PieceId, visible: bool) -> DecimationResult<()> {
        self.piece_mut(id, piece)?.visible = visible;
        Ok(())
    }

    /// Re-plan display ratios over the visible pieces for a new budget.
    pub fn apply_point_budget(
        &mut self,
        id: SourceId,
        target: u64,
        min_points: u64,
    ) -> DecimationResult<()> {
        let source = self.source_mut(id)?;
        let visible: Vec<usize> = source
            .pieces
            .iter()
            .enumerate()
            .filter(|(_, piece)| piece.visible && piece.raw_points > 0)
            .map(|(index, _)| index)
            .collect();

        let counts: Vec<u64> = visible
            .iter()
            .map(|&index| source.pieces[index].raw_points)
            .collect();
        let strides = plan(target, &counts, min_points);

        for (index, stride) in visible.into_iter().zip(strides) {
            source.pieces[index].display_ratio = stride;
        }
        debug!(source = %id, target, "applied point budget");
        Ok(())
    }

    /// Refresh the display and save estimates of every piece.
    pub fn update_estimates(&mut self, id: SourceId, clip: &ClipSpec) -> DecimationResult<()> {
        for piece in self.source_mut(id)?.pieces.iter_mut() {
            piece.display_estimate = ClipTransformEngine::estimate_display_points(piece, clip);
            piece.save_estimate = ClipTransformEngine::estimate_save_points(piece, clip);
        }
        Ok(())
    }

    /// Whether any visible piece needs a re-read to display under `clip`.
    pub fn update_needed(&self, id: SourceId, clip: &ClipSpec) -> DecimationResult<bool> {
        Ok(self.source(id)?.pieces.iter().any(|piece| {
            piece.visible && ClipTransformEngine::is_stale_for(piece, clip, ReadMode::Display)
        }))
    }

    pub(crate) fn commit_pass(&mut self, id: SourceId, pass: CommittedPass) -> DecimationResult<()> {
        let source = self.source_mut(id)?;
        source.scan = Some(pass.scan);
        source.pieces = pass.pieces;
        source.pieces.sort_by_key(|piece| piece.id);
        source.precision = Some(pass.precision);
        Ok(())
    }
}
