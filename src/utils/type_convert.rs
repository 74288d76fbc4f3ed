use super::error::AnalysisError;

/// Cell spellings treated as missing values
const MISSING_MARKERS: [&str; 4] = ["", "NA", "NaN", "null"];

/// Validate threshold is within valid range [0, 1]
///
/// # Arguments
/// * `threshold` - The threshold value to validate
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(AnalysisError::ValidationError)` if out of range
pub fn validate_threshold(threshold: f64) -> Result<(), AnalysisError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(AnalysisError::ValidationError(format!(
            "threshold must be 0-1, got {}",
            threshold
        )));
    }
    Ok(())
}

/// Whether a raw CSV cell marks a missing value
pub fn is_missing(raw: &str) -> bool {
    let trimmed = raw.trim();
    MISSING_MARKERS
        .iter()
        .any(|marker| trimmed.eq_ignore_ascii_case(marker))
}

/// Parse a raw CSV cell as a finite `f64`
///
/// # Arguments
/// * `column` - Column name, used in diagnostics
/// * `row` - 1-based data row number, used in diagnostics
/// * `raw` - Cell text
///
/// # Returns
/// * `Ok(value)` for a finite number
/// * `Err(AnalysisError::MissingValue)` for empty/NA cells
/// * `Err(AnalysisError::Parse)` for anything else that is not a finite number
pub fn parse_numeric_cell(column: &str, row: usize, raw: &str) -> Result<f64, AnalysisError> {
    if is_missing(raw) {
        return Err(AnalysisError::MissingValue {
            column: column.to_string(),
            row,
        });
    }

    let value: f64 = raw.trim().parse().map_err(|_| {
        AnalysisError::Parse(format!(
            "column '{}' row {}: '{}' is not numeric",
            column, row, raw
        ))
    })?;

    if !value.is_finite() {
        return Err(AnalysisError::Parse(format!(
            "column '{}' row {}: '{}' is not finite",
            column, row, raw
        )));
    }

    Ok(value)
}
