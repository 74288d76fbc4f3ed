use ndarray::Array2;

use crate::utils::AnalysisError;

/// Validate feature matrix dimensions and values
///
/// # Arguments
/// * `features` - Feature matrix to validate
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(AnalysisError::ValidationError)` if empty or not finite
pub fn validate_features(features: &Array2<f64>) -> Result<(), AnalysisError> {
    if features.nrows() == 0 {
        return Err(AnalysisError::ValidationError(
            "feature matrix cannot be empty".to_string(),
        ));
    }

    if features.ncols() == 0 {
        return Err(AnalysisError::ValidationError(
            "feature matrix must have at least one column".to_string(),
        ));
    }

    if features.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::ValidationError(
            "feature matrix contains NaN or Inf values".to_string(),
        ));
    }

    Ok(())
}

/// Check that rows to predict have the width the model was trained on
pub fn check_width(expected: usize, features: &Array2<f64>) -> Result<(), AnalysisError> {
    if features.ncols() != expected {
        return Err(AnalysisError::DimensionMismatch {
            expected,
            actual: features.ncols(),
        });
    }
    Ok(())
}
