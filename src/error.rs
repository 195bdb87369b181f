//! Error types for skymask queries.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, SkymaskError>;

/// Failure of a single occlusion query or of world/config construction.
///
/// Collinear (degenerate) lines and lines whose sweep is exactly π are not
/// errors: they are dropped from the candidate set.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkymaskError {
    /// Sample azimuth, distance threshold, or geometry outside its domain.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The spatial index could not answer a radius query.
    #[error("Spatial index unavailable: {0}")]
    IndexUnavailable(String),

    /// Configuration could not be read, parsed, or is out of range.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The batch was cancelled before this position completed.
    #[error("Computation cancelled")]
    Cancelled,
}

impl SkymaskError {
    /// Stable snake_case name of the variant, for callers that cannot match
    /// on the enum.
    pub fn kind(&self) -> &'static str {
        match self {
            SkymaskError::InvalidInput(_) => "invalid_input",
            SkymaskError::IndexUnavailable(_) => "index_unavailable",
            SkymaskError::Config(_) => "config",
            SkymaskError::Cancelled => "cancelled",
        }
    }
}

/// A per-position failure inside a batch, keyed by submission index.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("position {index}: {source}")]
pub struct PositionError {
    pub index: usize,
    #[source]
    pub source: SkymaskError,
}

impl PositionError {
    pub fn new(index: usize, source: SkymaskError) -> Self {
        Self { index, source }
    }
}

impl From<ndarray::ShapeError> for SkymaskError {
    fn from(e: ndarray::ShapeError) -> Self {
        SkymaskError::InvalidInput(e.to_string())
    }
}
