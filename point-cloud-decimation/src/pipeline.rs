//! Streaming import: scan, plan, read piece by piece, then commit to the registry in one go.
//!
//! A pass is driven with [`ImportPass::step`]. Questions for the caller (float
//! precision, what to do about a failed piece) are yielded as
//! [`ImportStep::Request`] and answered through [`ImportPass::resolve`]. Nothing
//! reaches the registry until every piece has been read.

use crate::clip::ClipSpec;
use crate::config::DecimationConfig;
use crate::planner::DecimationPlan;
use crate::precision::{
    Precision, PrecisionAdvisor, PrecisionRecommendation, min_float_digits, recommend_origin_shift,
};
use crate::progress::ImportProgress;
use crate::registry::{
    CommittedPass, MaterializationState, PieceDescriptor, PieceRegistry, SourceId,
};
use crate::report::CompletionReport;
use crate::result::{DecimationError, DecimationResult, ReadError};
use crate::source::{PieceId, PointSource, ScanResult};
use crate::staleness::ClipTransformEngine;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Idle,
    Scanning,
    Planning,
    Reading,
    Cached,
    Aborted,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportOptions {
    pub target_total_points: u64,
    pub min_points_per_piece: u64,
    pub precision: PrecisionAdvisor,
    pub origin_shift_ratio: f64,
    /// Re-read pieces even when their cache is clean.
    pub force_read: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::from_config(&DecimationConfig::default())
    }
}

impl ImportOptions {
    pub fn from_config(config: &DecimationConfig) -> Self {
        Self {
            target_total_points: config.target_total_points,
            min_points_per_piece: config.min_points_per_piece,
            precision: config.precision_advisor(),
            origin_shift_ratio: config.origin_shift_ratio,
            force_read: false,
        }
    }
}

/// Decision the caller has to make before the pass can continue.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportRequest {
    /// Float storage would keep only `min_digits` digits on the worst axis.
    Precision { min_digits: i32 },
    PieceReadFailed { piece: PieceId, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportAnswer {
    /// Answer to a precision request.
    UseDouble(bool),
    /// Leave the failed piece out and keep going.
    SkipPiece,
    /// Discard everything read in this pass.
    AbortSource,
}

#[derive(Debug)]
pub enum ImportOutcome {
    Cached(CompletionReport),
    Aborted,
    Failed(DecimationError),
}

#[derive(Debug)]
pub enum ImportStep {
    Continue,
    Request(ImportRequest),
    Finished(ImportOutcome),
    /// The outcome was already delivered.
    Done,
}

enum Pending {
    Precision { min_digits: i32 },
    PieceFailure { piece: PieceId, error: ReadError },
}

impl Pending {
    fn request(&self) -> ImportRequest {
        match self {
            Pending::Precision { min_digits } => ImportRequest::Precision {
                min_digits: *min_digits,
            },
            Pending::PieceFailure { piece, error } => ImportRequest::PieceReadFailed {
                piece: *piece,
                reason: error.to_string(),
            },
        }
    }
}

struct QueuedPiece {
    id: PieceId,
    raw_points: u64,
    stride: u32,
}

/// One import pass over a registered source.
pub struct ImportPass {
    source: SourceId,
    handle: Arc<dyn PointSource>,
    clip: ClipSpec,
    options: ImportOptions,
    state: ImportState,
    scan: Option<ScanResult>,
    precision: Option<Precision>,
    previous: BTreeMap<PieceId, PieceDescriptor>,
    queue: Vec<QueuedPiece>,
    cursor: usize,
    staged: Vec<PieceDescriptor>,
    skipped: Vec<PieceId>,
    pieces_read: usize,
    pieces_reused: usize,
    pending: Option<Pending>,
    outcome: Option<ImportOutcome>,
}

impl ImportPass {
    /// Prepare a pass. Sources imported before reuse their counts and skip the scan.
    pub fn new(
        registry: &PieceRegistry,
        source: SourceId,
        clip: ClipSpec,
        options: ImportOptions,
    ) -> DecimationResult<Self> {
        let data = registry.source(source)?;

        Ok(Self {
            source,
            handle: Arc::clone(data.handle()),
            clip,
            options,
            state: ImportState::Idle,
            scan: data.scan().cloned(),
            precision: data.precision(),
            previous: data
                .pieces()
                .iter()
                .map(|piece| (piece.id, piece.clone()))
                .collect(),
            queue: Vec::new(),
            cursor: 0,
            staged: Vec::new(),
            skipped: Vec::new(),
            pieces_read: 0,
            pieces_reused: 0,
            pending: None,
            outcome: None,
        })
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Advance the pass by one unit of work.
    pub fn step(&mut self, registry: &mut PieceRegistry, progress: &dyn ImportProgress) -> ImportStep {
        if let Some(outcome) = self.outcome.take() {
            return ImportStep::Finished(outcome);
        }
        if let Some(pending) = &self.pending {
            return ImportStep::Request(pending.request());
        }

        match self.state {
            ImportState::Idle => {
                self.state = if self.scan.is_some() {
                    ImportState::Planning
                } else {
                    ImportState::Scanning
                };
                debug!(source = %self.source, state = ?self.state, "import pass started");
                ImportStep::Continue
            }
            ImportState::Scanning => self.scan_step(progress),
            ImportState::Planning => self.plan_step(),
            ImportState::Reading => self.read_step(registry, progress),
            ImportState::Cached | ImportState::Aborted | ImportState::Failed => ImportStep::Done,
        }
    }

    /// Answer the request yielded by the last step.
    pub fn resolve(&mut self, answer: ImportAnswer) -> DecimationResult<()> {
        match (self.pending.take(), answer) {
            (Some(Pending::Precision { .. }), ImportAnswer::UseDouble(double)) => {
                let precision = if double {
                    Precision::Double
                } else {
                    Precision::Float
                };
                debug!(?precision, "precision chosen");
                self.precision = Some(precision);
            }
            (Some(Pending::PieceFailure { piece, .. }), ImportAnswer::SkipPiece) => {
                warn!(%piece, "skipping unreadable piece");
                // A piece known from an earlier pass keeps its settings and
                // stale cache so a later pass can re-read it.
                if let Some(mut previous) = self.previous.get(&piece).cloned() {
                    if let Some(state) = previous.materialization.as_mut() {
                        state.dirty = true;
                    }
                    self.staged.push(previous);
                }
                self.skipped.push(piece);
                self.cursor += 1;
            }
            (Some(Pending::PieceFailure { piece, error }), ImportAnswer::AbortSource) => {
                self.staged.clear();
                self.state = ImportState::Failed;
                self.outcome = Some(ImportOutcome::Failed(DecimationError::from_piece_read(
                    piece, error,
                )));
            }
            (Some(Pending::Precision { .. }), ImportAnswer::AbortSource) => {
                self.staged.clear();
                self.state = ImportState::Aborted;
                self.outcome = Some(ImportOutcome::Aborted);
            }
            (pending, _) => {
                self.pending = pending;
                return Err(DecimationError::UnexpectedAnswer);
            }
        }
        Ok(())
    }

    /// Drive the pass to completion, answering requests with `decide`.
    pub fn run<F>(
        mut self,
        registry: &mut PieceRegistry,
        progress: &dyn ImportProgress,
        mut decide: F,
    ) -> ImportOutcome
    where
        F: FnMut(&ImportRequest) -> ImportAnswer,
    {
        loop {
            match self.step(registry, progress) {
                ImportStep::Continue => {}
                ImportStep::Request(request) => {
                    if let Err(error) = self.resolve(decide(&request)) {
                        return ImportOutcome::Failed(error);
                    }
                }
                ImportStep::Finished(outcome) => return outcome,
                ImportStep::Done => return ImportOutcome::Failed(DecimationError::PassFinished),
            }
        }
    }

    fn scan_step(&mut self, progress: &dyn ImportProgress) -> ImportStep {
        progress.on_progress("Scanning", 0.0);
        match self.handle.scan(progress) {
            Ok(scan) => {
                info!(
                    source = %self.source,
                    total = scan.total_points,
                    pieces = scan.per_piece_counts.len(),
                    "scan complete"
                );
                self.scan = Some(scan);
                self.state = ImportState::Planning;
                ImportStep::Continue
            }
            Err(ReadError::Aborted) => self.abort(),
            Err(error) => self.fail(DecimationError::ScanFailed(error)),
        }
    }

    fn plan_step(&mut self) -> ImportStep {
        if self.precision.is_none() {
            let bounds = self.handle.bounds();
            match self.options.precision.recommend(bounds) {
                PrecisionRecommendation::Float => self.precision = Some(Precision::Float),
                PrecisionRecommendation::Double => self.precision = Some(Precision::Double),
                PrecisionRecommendation::AskUser => {
                    let pending = Pending::Precision {
                        min_digits: min_float_digits(bounds),
                    };
                    let request = pending.request();
                    self.pending = Some(pending);
                    return ImportStep::Request(request);
                }
            }
        }

        let Some(scan) = self.scan.as_ref() else {
            return self.fail(DecimationError::ScanFailed(ReadError::Format(
                "no point counts available".to_string(),
            )));
        };

        if scan.total_points == 0 {
            warn!(source = %self.source, "source has no points, nothing to read");
        }

        let plan = DecimationPlan::from_counts(
            self.options.target_total_points,
            &scan.per_piece_counts,
            self.options.min_points_per_piece,
        );
        self.queue = if plan.is_empty() {
            Vec::new()
        } else {
            scan.per_piece_counts
                .iter()
                .map(|count| QueuedPiece {
                    id: count.id,
                    raw_points: count.points,
                    stride: plan.stride(count.id).unwrap_or(1),
                })
                .collect()
        };

        debug!(main_ratio = plan.main_ratio, pieces = self.queue.len(), "planned pass");
        self.state = ImportState::Reading;
        ImportStep::Continue
    }

    fn read_step(&mut self, registry: &mut PieceRegistry, progress: &dyn ImportProgress) -> ImportStep {
        if progress.is_abort_requested() {
            return self.abort();
        }

        let Some(queued) = self.queue.get(self.cursor) else {
            return match self.commit(registry) {
                Ok(report) => {
                    self.state = ImportState::Cached;
                    ImportStep::Finished(ImportOutcome::Cached(report))
                }
                Err(error) => self.fail(error),
            };
        };
        let (id, stride) = (queued.id, queued.stride);

        let mut descriptor = match self.previous.get(&id) {
            Some(previous) => PieceDescriptor {
                raw_points: queued.raw_points,
                display_ratio: stride,
                ..previous.clone()
            },
            None => PieceDescriptor::new(
                id,
                queued.raw_points,
                stride,
                self.options.min_points_per_piece,
            ),
        };

        let clean = !self.options.force_read
            && !ClipTransformEngine::is_stale(&descriptor, &self.clip, &descriptor.transform, stride);

        if clean {
            debug!(piece = %id, "cache is clean, reusing");
            self.pieces_reused += 1;
        } else {
            let transform = descriptor.transform;
            match self
                .handle
                .read_piece(id, stride, self.clip.active(), Some(&transform))
            {
                Ok(geometry) => {
                    let geometry = geometry.with_precision(self.precision.unwrap_or(Precision::Float));
                    debug!(piece = %id, stride, points = geometry.len(), "read piece");
                    if !geometry.is_empty() {
                        descriptor.bounds = *geometry.bounds();
                    }
                    descriptor.read_ratio = stride;
                    descriptor.materialization = Some(MaterializationState::new(
                        geometry,
                        stride,
                        self.clip.active().copied(),
                        transform,
                    ));
                    self.pieces_read += 1;
                }
                Err(ReadError::Aborted) => return self.abort(),
                Err(error) => {
                    warn!(piece = %id, %error, "piece read failed");
                    let pending = Pending::PieceFailure { piece: id, error };
                    let request = pending.request();
                    self.pending = Some(pending);
                    return ImportStep::Request(request);
                }
            }
        }

        self.staged.push(descriptor);
        self.cursor += 1;
        progress.on_progress(
            &format!("Read {}", id),
            self.cursor as f64 / self.queue.len() as f64,
        );
        ImportStep::Continue
    }

    /// Swap the staged pieces into the registry.
    fn commit(&mut self, registry: &mut PieceRegistry) -> DecimationResult<CompletionReport> {
        let pass = CommittedPass {
            scan: self.scan.clone().unwrap_or_default(),
            pieces: std::mem::take(&mut self.staged),
            precision: self.precision.unwrap_or(Precision::Float),
        };
        registry.commit_pass(self.source, pass)?;
        registry.update_estimates(self.source, &self.clip)?;

        let origin_shift =
            recommend_origin_shift(self.handle.bounds(), self.options.origin_shift_ratio);
        let report = CompletionReport::from_source(
            registry.source(self.source)?,
            self.pieces_read,
            self.pieces_reused,
            std::mem::take(&mut self.skipped),
            origin_shift,
        );

        info!(
            source = %self.source,
            read = self.pieces_read,
            reused = self.pieces_reused,
            points = report.read_points,
            "import pass committed"
        );
        Ok(report)
    }

    fn abort(&mut self) -> ImportStep {
        info!(source = %self.source, "import aborted, discarding pass");
        self.staged.clear();
        self.state = ImportState::Aborted;
        ImportStep::Finished(ImportOutcome::Aborted)
    }

    fn fail(&mut self, error: DecimationError) -> ImportStep {
        warn!(source = %self.source, %error, "import failed");
        self.staged.clear();
        self.state = ImportState::Failed;
        ImportStep::Finished(ImportOutcome::Failed(error))
    }
}

/// Run a complete pass over `source`.
pub fn import_source<F>(
    registry: &mut PieceRegistry,
    source: SourceId,
    clip: ClipSpec,
    options: ImportOptions,
    progress: &dyn ImportProgress,
    decide: F,
) -> DecimationResult<ImportOutcome>
where
    F: FnMut(&ImportRequest) -> ImportAnswer,
{
    let pass = ImportPass::new(registry, source, clip, options)?;
    Ok(pass.run(registry, progress, decide))
}
