/// Completion report written after a successful import pass.
use crate::bounds::PointCloudBounds;
use crate::precision::Precision;
use crate::registry::{DataSource, PieceDescriptor};
use crate::result::DecimationResult;
use crate::source::{PieceId, SourceKind};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct PieceReport {
    pub piece: PieceId,
    pub name: String,
    pub raw_points: u64,
    pub read_points: u64,
    pub read_ratio: u32,
    pub display_ratio: u32,
    pub save_ratio: u32,
    pub display_estimate: u64,
    pub save_estimate: u64,
    pub visible: bool,
}

impl From<&PieceDescriptor> for PieceReport {
    fn from(piece: &PieceDescriptor) -> Self {
        Self {
            piece: piece.id,
            name: piece.name.clone(),
            raw_points: piece.raw_points,
            read_points: piece.read_points(),
            read_ratio: piece.read_ratio,
            display_ratio: piece.display_ratio,
            save_ratio: piece.save_ratio,
            display_estimate: piece.display_estimate,
            save_estimate: piece.save_estimate,
            visible: piece.visible,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionReport {
    pub path: String,
    pub kind: SourceKind,
    pub precision: Precision,
    pub total_points: u64,
    pub read_points: u64,
    pub pieces_read: usize,
    pub pieces_reused: usize,
    pub skipped: Vec<PieceId>,
    pub bounds: Option<PointCloudBounds>,
    /// Suggested new origin when the data sits far from zero.
    pub origin_shift: Option<[f64; 3]>,
    pub pieces: Vec<PieceReport>,
}

impl CompletionReport {
    pub(crate) fn from_source(
        source: &DataSource,
        pieces_read: usize,
        pieces_reused: usize,
        skipped: Vec<PieceId>,
        origin_shift: Option<[f64; 3]>,
    ) -> Self {
        let pieces: Vec<PieceReport> = source.pieces().iter().map(PieceReport::from).collect();

        Self {
            path: source.path().display().to_string(),
            kind: source.kind(),
            precision: source.precision().unwrap_or(Precision::Float),
            total_points: source.total_points().unwrap_or(0),
            read_points: pieces.iter().map(|piece| piece.read_points).sum(),
            pieces_read,
            pieces_reused,
            skipped,
            bounds: source.realized_bounds(),
            origin_shift,
            pieces,
        }
    }

    /// Save the report as pretty printed JSON.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> DecimationResult<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Print report summary for debugging.
    pub fn log_summary(&self) {
        info!(
            path = %self.path,
            total = self.total_points,
            read = self.read_points,
            precision = ?self.precision,
            "import complete"
        );
        for piece in &self.pieces {
            info!(
                "  {}: {} of {} points (read 1/{}, display 1/{}, save 1/{}){}",
                piece.name,
                piece.read_points,
                piece.raw_points,
                piece.read_ratio,
                piece.display_ratio,
                piece.save_ratio,
                if piece.visible { "" } else { " hidden" }
            );
        }
        if !self.skipped.is_empty() {
            info!("  skipped pieces: {:?}", self.skipped);
        }
        if let Some(origin) = self.origin_shift {
            info!(
                "  data is far from the origin, consider shifting to ({:.3}, {:.3}, {:.3})",
                origin[0], origin[1], origin[2]
            );
        }
    }
}
