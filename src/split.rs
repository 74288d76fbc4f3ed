//! Random train/test partitioning

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use tracing::info;

use crate::dataset::Diagnosis;
use crate::utils::AnalysisError;

/// Disjoint training and test partitions of one feature matrix
#[derive(Debug, Clone)]
pub struct Split {
    /// Row indices into the source matrix, in draw order
    pub train_indices: Vec<usize>,
    /// Remaining row indices, in ascending order
    pub test_indices: Vec<usize>,
    pub x_train: Array2<f64>,
    pub y_train: Vec<Diagnosis>,
    pub x_test: Array2<f64>,
    pub y_test: Vec<Diagnosis>,
}

/// Partition rows uniformly at random without replacement
///
/// # Arguments
/// * `features` - Feature matrix (rows=samples); must not contain the label
/// * `labels` - Labels aligned with `features` rows
/// * `train_fraction` - Share of rows used for training, in (0, 1)
/// * `seed` - Seed for the split generator
///
/// # Returns
/// * `Ok(split)` - `floor(n * train_fraction)` training rows, the rest for testing
/// * `Err(AnalysisError)` - If lengths disagree or a side would be empty
pub fn train_test_split(
    features: &Array2<f64>,
    labels: &[Diagnosis],
    train_fraction: f64,
    seed: u64,
) -> Result<Split, AnalysisError> {
    let n = features.nrows();
    if labels.len() != n {
        return Err(AnalysisError::DimensionMismatch {
            expected: n,
            actual: labels.len(),
        });
    }
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(AnalysisError::ValidationError(format!(
            "train_fraction must be in (0, 1), got {}",
            train_fraction
        )));
    }

    let n_train = (n as f64 * train_fraction).floor() as usize;
    if n_train == 0 || n_train == n {
        return Err(AnalysisError::ValidationError(format!(
            "splitting {} rows at {} leaves an empty partition",
            n, train_fraction
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let train_indices = sample(&mut rng, n, n_train).into_vec();

    let mut in_train = vec![false; n];
    for &i in &train_indices {
        in_train[i] = true;
    }
    let test_indices: Vec<usize> = (0..n).filter(|&i| !in_train[i]).collect();

    let x_train = features.select(Axis(0), &train_indices);
    let x_test = features.select(Axis(0), &test_indices);
    let y_train = train_indices.iter().map(|&i| labels[i]).collect();
    let y_test = test_indices.iter().map(|&i| labels[i]).collect();

    info!(
        train = train_indices.len(),
        test = test_indices.len(),
        seed,
        "split observations"
    );

    Ok(Split {
        train_indices,
        test_indices,
        x_train,
        y_train,
        x_test,
        y_test,
    })
}
