use linfa::prelude::*;
use linfa_logistic::LogisticRegression;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::Diagnosis;
use crate::insight_core::feature::{check_width, validate_features};
use crate::utils::AnalysisError;

/// A label predicted together with the share of evidence behind it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredPrediction {
    pub label: Diagnosis,
    /// Confidence in `label`, in [0, 1]
    pub confidence: f64,
}

impl ScoredPrediction {
    /// Score of the positive (malignant) class, for ROC sweeps
    pub fn positive_score(&self) -> f64 {
        if self.label.is_positive() {
            self.confidence
        } else {
            1.0 - self.confidence
        }
    }
}

/// A fitted binary classifier
pub trait Classifier {
    fn name(&self) -> &str;

    /// Predict one label per row of `features`
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<Diagnosis>, AnalysisError>;

    /// Predict with a confidence per row, for models that provide one
    fn predict_with_confidence(
        &self,
        _features: &Array2<f64>,
    ) -> Result<Option<Vec<ScoredPrediction>>, AnalysisError> {
        Ok(None)
    }
}

/// Hyperparameters of a model family; `train` fits a fresh model
pub trait Trainer {
    type Model: Classifier;

    fn train(
        &self,
        features: &Array2<f64>,
        labels: &[Diagnosis],
        seed: u64,
    ) -> Result<Self::Model, AnalysisError>;
}

/// Shared input checks for every trainer
pub fn validate_training_input(
    features: &Array2<f64>,
    labels: &[Diagnosis],
) -> Result<(), AnalysisError> {
    validate_features(features)?;
    if features.nrows() != labels.len() {
        return Err(AnalysisError::DimensionMismatch {
            expected: features.nrows(),
            actual: labels.len(),
        });
    }
    Ok(())
}

/// Labels as class indices through the single encoding boundary
pub fn class_targets(labels: &[Diagnosis]) -> Array1<usize> {
    labels.iter().map(|l| l.class_index()).collect()
}

fn decode_classes(classes: &Array1<usize>) -> Result<Vec<Diagnosis>, AnalysisError> {
    classes.iter().map(|&c| Diagnosis::from_class_index(c)).collect()
}

/// Entropy-based decision tree induction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    /// `None` lets the stopping rule alone decide the depth
    pub max_depth: Option<usize>,
    pub min_weight_split: f32,
    pub min_weight_leaf: f32,
    pub min_impurity_decrease: f64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_weight_split: 2.0,
            min_weight_leaf: 1.0,
            min_impurity_decrease: 1e-5,
        }
    }
}

/// Fitted decision tree
pub struct TreeClassifier {
    tree: DecisionTree<f64, usize>,
    n_features: usize,
}

impl TreeClassifier {
    pub fn depth(&self) -> usize {
        self.tree.max_depth()
    }

    pub fn leaves(&self) -> usize {
        self.tree.num_leaves()
    }
}

impl Trainer for TreeParams {
    type Model = TreeClassifier;

    /// Tree induction is deterministic; `seed` is accepted for interface parity
    fn train(
        &self,
        features: &Array2<f64>,
        labels: &[Diagnosis],
        _seed: u64,
    ) -> Result<TreeClassifier, AnalysisError> {
        validate_training_input(features, labels)?;

        let dataset = Dataset::new(features.clone(), class_targets(labels));
        let tree = DecisionTree::params()
            .split_quality(SplitQuality::Entropy)
            .max_depth(self.max_depth)
            .min_weight_split(self.min_weight_split)
            .min_weight_leaf(self.min_weight_leaf)
            .min_impurity_decrease(self.min_impurity_decrease)
            .fit(&dataset)
            .map_err(|e| AnalysisError::ModelError(format!("decision tree induction failed: {}", e)))?;

        info!(
            depth = tree.max_depth(),
            leaves = tree.num_leaves(),
            "fitted decision tree"
        );

        Ok(TreeClassifier {
            tree,
            n_features: features.ncols(),
        })
    }
}

impl Classifier for TreeClassifier {
    fn name(&self) -> &str {
        "decision_tree"
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<Diagnosis>, AnalysisError> {
        check_width(self.n_features, features)?;
        let classes: Array1<usize> = self.tree.predict(features);
        decode_classes(&classes)
    }
}

/// Binomial logistic regression
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticParams {
    /// L2 penalty; near zero for plain maximum likelihood
    pub alpha: f64,
    pub max_iterations: u64,
    pub gradient_tolerance: f64,
    /// Probability at or above which a row is called malignant
    pub threshold: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            alpha: 1e-4,
            max_iterations: 100,
            gradient_tolerance: 1e-4,
            threshold: 0.5,
        }
    }
}

/// Fitted logistic regression
pub struct LogisticClassifier {
    coefficients: Array1<f64>,
    intercept: f64,
    threshold: f64,
}

impl LogisticClassifier {
    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Probability of the malignant class per row
    pub fn predict_probability(&self, features: &Array2<f64>) -> Result<Vec<f64>, AnalysisError> {
        check_width(self.coefficients.len(), features)?;
        let z = features.dot(&self.coefficients) + self.intercept;
        Ok(z.iter().map(|&v| sigmoid(v)).collect())
    }
}

impl Trainer for LogisticParams {
    type Model = LogisticClassifier;

    /// The L-BFGS solver starts from zero weights; `seed` is unused
    fn train(
        &self,
        features: &Array2<f64>,
        labels: &[Diagnosis],
        _seed: u64,
    ) -> Result<LogisticClassifier, AnalysisError> {
        validate_training_input(features, labels)?;

        let targets: Array1<bool> = labels.iter().map(|l| l.is_positive()).collect();
        let dataset = Dataset::new(features.clone(), targets);

        let fitted = LogisticRegression::default()
            .alpha(self.alpha)
            .max_iterations(self.max_iterations)
            .gradient_tolerance(self.gradient_tolerance)
            .with_intercept(true)
            .fit(&dataset)
            .map_err(|e| AnalysisError::ModelError(format!("logistic regression failed: {}", e)))?;

        // linfa scores its positive class, which is the more frequent label
        let (coefficients, intercept) = if fitted.labels().pos.class {
            (fitted.params().clone(), fitted.intercept())
        } else {
            (fitted.params().mapv(|w| -w), -fitted.intercept())
        };

        info!(
            intercept,
            features = coefficients.len(),
            "fitted logistic regression"
        );

        Ok(LogisticClassifier {
            coefficients,
            intercept,
            threshold: self.threshold,
        })
    }
}

impl Classifier for LogisticClassifier {
    fn name(&self) -> &str {
        "logistic_regression"
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<Diagnosis>, AnalysisError> {
        Ok(self
            .predict_probability(features)?
            .into_iter()
            .map(|p| {
                if p >= self.threshold {
                    Diagnosis::Malignant
                } else {
                    Diagnosis::Benign
                }
            })
            .collect())
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// 30 benign rows around 0.1 and 10 malignant rows around 0.9 on the first
/// feature; the second feature is noise shared by both classes
#[cfg(test)]
pub(crate) fn benign_majority() -> (Array2<f64>, Vec<Diagnosis>) {
    let features = Array2::from_shape_fn((40, 2), |(i, j)| match (j, i >= 30) {
        (0, false) => 0.05 + 0.01 * (i % 10) as f64,
        (0, true) => 0.85 + 0.01 * (i - 30) as f64,
        _ => 0.2 + 0.05 * (i % 7) as f64,
    });
    let labels = (0..40)
        .map(|i| if i < 30 { Diagnosis::Benign } else { Diagnosis::Malignant })
        .collect();
    (features, labels)
}
