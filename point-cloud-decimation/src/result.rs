use crate::registry::SourceId;
use crate::source::PieceId;
use std::path::PathBuf;
use thiserror::Error;

/// Failure raised by a format handle while scanning or reading a piece.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("LAS error: {0}")]
    Las(#[from] las::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("piece {0} does not exist in this source")]
    UnknownPiece(PieceId),
    #[error("read aborted")]
    Aborted,
    #[error("{0}")]
    Format(String),
}

#[derive(Error, Debug)]
pub enum DecimationError {
    #[error("invalid file {}: {reason}", path.display())]
    InvalidFile { path: PathBuf, reason: String },
    #[error("read aborted")]
    ReadAborted,
    #[error("failed to read piece {piece}")]
    PieceReadFailed {
        piece: PieceId,
        #[source]
        source: ReadError,
    },
    #[error("failed to scan source")]
    ScanFailed(#[source] ReadError),
    #[error("unknown source {0}")]
    UnknownSource(SourceId),
    #[error("unknown piece {piece} in source {source_id}")]
    UnknownPiece { source_id: SourceId, piece: PieceId },
    #[error("clip box needs six values, got {0}")]
    InvalidClip(usize),
    #[error("answer does not match the pending import request")]
    UnexpectedAnswer,
    #[error("import pass already finished")]
    PassFinished,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl DecimationError {
    /// Wrap a piece read failure, keeping aborts distinguishable from faults.
    pub fn from_piece_read(piece: PieceId, error: ReadError) -> Self {
        match error {
            ReadError::Aborted => DecimationError::ReadAborted,
            source => DecimationError::PieceReadFailed { piece, source },
        }
    }

    pub fn invalid_file(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        DecimationError::InvalidFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type DecimationResult<T> = Result<T, DecimationError>;
