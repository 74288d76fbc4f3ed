/// Utility modules for error handling, cell conversions and scaling
pub mod error;
pub mod type_convert;
pub mod scaling;

// Re-export commonly used types
pub use error::AnalysisError;
pub use type_convert::{is_missing, parse_numeric_cell, validate_threshold};
pub use scaling::{min_max_scale, MinMaxParams};
