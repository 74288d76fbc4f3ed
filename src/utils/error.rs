use thiserror::Error;

/// Error type for every stage of the analysis pipeline
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    /// Input file does not exist
    #[error("NotFoundError: {0}")]
    NotFound(String),
    /// Malformed rows, undecodable cells or unknown labels
    #[error("ParseError: {0}")]
    Parse(String),
    /// Empty or NA cell in the observation table
    #[error("MissingValueError: column '{column}' row {row}")]
    MissingValue { column: String, row: usize },
    /// Zero-variance column where a range or variance is required
    #[error("DegenerateColumnError: column '{0}' has max == min")]
    DegenerateColumn(String),
    /// Two vectors that must be aligned have different lengths
    #[error("DimensionMismatchError: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Validation errors (e.g., invalid threshold, empty dataset)
    #[error("ValidationError: {0}")]
    ValidationError(String),
    /// Model training/prediction errors
    #[error("ModelError: {0}")]
    ModelError(String),
    /// Filesystem errors other than a missing input
    #[error("IoError: {0}")]
    Io(String),
    /// Plot generation errors
    #[error("RenderError: {0}")]
    RenderError(String),
}

impl From<std::io::Error> for AnalysisError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => AnalysisError::NotFound(err.to_string()),
            _ => AnalysisError::Io(err.to_string()),
        }
    }
}
