use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Pipeline errors – caller bugs, never recovered inside the pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("trace length mismatch: expected {expected} samples, got {found}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("{name} must be positive, got {value}")]
    InvalidParameter { name: &'static str, value: usize },

    #[error("no samples between {low} and {high} cm-1")]
    InvalidWindow { low: f64, high: f64 },
}

// ---------------------------------------------------------------------------
// Review errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReviewError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("reviewer stopped answering before a verdict was given")]
    Abandoned,
}

// ---------------------------------------------------------------------------
// Persistence errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("creating result directory {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writing result table {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

// ---------------------------------------------------------------------------
// Scan-level errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("point {point}: {source}")]
    Point {
        point: usize,
        #[source]
        source: PipelineError,
    },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The review activity went away while a point was waiting on it.
    #[error("review channel closed while point {point} was awaiting a verdict")]
    ReviewClosed { point: usize },

    #[error("persisting scan results failed; results are kept in memory for retry")]
    Persist(#[from] PersistError),
}
