use ndarray::{Array1, Array2, Axis};
use serde::Serialize;

use crate::utils::AnalysisError;

/// Per-column parameters of a fitted MinMax scaling
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MinMaxParams {
    pub mins: Array1<f64>,
    pub ranges: Array1<f64>,
}

impl MinMaxParams {
    /// Fit MinMax parameters on a feature matrix
    ///
    /// # Arguments
    /// * `features` - Feature matrix (rows=samples, cols=features)
    /// * `names` - Column names, used to report degenerate columns
    ///
    /// # Returns
    /// * `Ok(params)` - Column minimums and ranges
    /// * `Err(AnalysisError::DegenerateColumn)` - If any column has max == min
    /// * `Err(AnalysisError::ValidationError)` - If the matrix is empty or not finite
    pub fn fit(features: &Array2<f64>, names: &[String]) -> Result<Self, AnalysisError> {
        if features.nrows() == 0 {
            return Err(AnalysisError::ValidationError(
                "cannot scale an empty feature matrix".to_string(),
            ));
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::ValidationError(
                "feature matrix contains NaN or Inf values".to_string(),
            ));
        }

        let mut mins = Array1::zeros(features.ncols());
        let mut ranges = Array1::zeros(features.ncols());

        for (col_idx, col) in features.axis_iter(Axis(1)).enumerate() {
            let min = col.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = col.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let range = max - min;

            if range == 0.0 {
                let name = names
                    .get(col_idx)
                    .cloned()
                    .unwrap_or_else(|| format!("#{}", col_idx));
                return Err(AnalysisError::DegenerateColumn(name));
            }

            mins[col_idx] = min;
            ranges[col_idx] = range;
        }

        Ok(Self { mins, ranges })
    }

    /// Apply the fitted scaling to rows with the same column layout
    pub fn transform(&self, features: &Array2<f64>) -> Result<Array2<f64>, AnalysisError> {
        if features.ncols() != self.mins.len() {
            return Err(AnalysisError::DimensionMismatch {
                expected: self.mins.len(),
                actual: features.ncols(),
            });
        }

        let mut scaled = features.clone();
        for mut row in scaled.axis_iter_mut(Axis(0)) {
            row -= &self.mins;
            row /= &self.ranges;
        }
        Ok(scaled)
    }
}

/// Apply MinMax scaling: (x - min) / (max - min)
///
/// # Arguments
/// * `features` - Feature matrix to scale
/// * `names` - Column names for diagnostics
///
/// # Returns
/// * `Ok((scaled, params))` - Scaled matrix with every column spanning [0, 1]
/// * `Err(AnalysisError::DegenerateColumn)` - If a column is constant
pub fn min_max_scale(
    features: &Array2<f64>,
    names: &[String],
) -> Result<(Array2<f64>, MinMaxParams), AnalysisError> {
    let params = MinMaxParams::fit(features, names)?;
    let scaled = params.transform(features)?;
    Ok((scaled, params))
}
