//! Classification metrics shared by every model
//!
//! Malignant is the positive class throughout.

use serde::Serialize;
use std::fmt::Write as _;

use crate::dataset::Diagnosis;
use crate::utils::AnalysisError;

/// 2x2 confusion matrix with malignant as the positive class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    /// Count (predicted, actual) pairs
    pub fn from_labels(
        predicted: &[Diagnosis],
        truth: &[Diagnosis],
    ) -> Result<Self, AnalysisError> {
        check_aligned(predicted.len(), truth.len())?;

        let mut cm = ConfusionMatrix::default();
        for (&p, &t) in predicted.iter().zip(truth) {
            match (p.is_positive(), t.is_positive()) {
                (true, true) => cm.true_positives += 1,
                (false, false) => cm.true_negatives += 1,
                (true, false) => cm.false_positives += 1,
                (false, true) => cm.false_negatives += 1,
            }
        }
        Ok(cm)
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    pub fn actual_positives(&self) -> usize {
        self.true_positives + self.false_negatives
    }

    pub fn actual_negatives(&self) -> usize {
        self.true_negatives + self.false_positives
    }

    /// Correct predictions / total; 0.0 for an empty matrix
    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    /// TP / (TP + FN)
    pub fn sensitivity(&self) -> f64 {
        ratio(self.true_positives, self.actual_positives())
    }

    /// TN / (TN + FP)
    pub fn specificity(&self) -> f64 {
        ratio(self.true_negatives, self.actual_negatives())
    }

    /// TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.sensitivity();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// Cell count for a (predicted, actual) pair
    pub fn get(&self, predicted: Diagnosis, actual: Diagnosis) -> usize {
        match (predicted, actual) {
            (Diagnosis::Malignant, Diagnosis::Malignant) => self.true_positives,
            (Diagnosis::Benign, Diagnosis::Benign) => self.true_negatives,
            (Diagnosis::Malignant, Diagnosis::Benign) => self.false_positives,
            (Diagnosis::Benign, Diagnosis::Malignant) => self.false_negatives,
        }
    }

    /// Predicted x actual cross-tabulation as text
    pub fn cross_tab(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<12}{:>12}", "", "actual");
        let _ = writeln!(out, "{:<12}{:>10}{:>11}", "predicted", "benign", "malignant");
        for predicted in Diagnosis::ALL {
            let _ = writeln!(
                out,
                "  {:<10}{:>10}{:>11}",
                predicted.to_string(),
                self.get(predicted, Diagnosis::Benign),
                self.get(predicted, Diagnosis::Malignant)
            );
        }
        out
    }
}

/// Metrics of one model on the test partition
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub model: String,
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
    pub sensitivity: f64,
    pub specificity: f64,
    pub precision: f64,
    pub f1: f64,
    pub roc: Option<RocCurve>,
}

impl Evaluation {
    /// Attach an ROC curve built from positive-class scores
    pub fn with_roc(mut self, roc: RocCurve) -> Self {
        self.roc = Some(roc);
        self
    }

    pub fn cross_tab(&self) -> String {
        self.confusion.cross_tab()
    }
}

/// Compare predictions against ground truth
///
/// # Arguments
/// * `model` - Model name carried into the result
/// * `predicted` - Predicted labels, aligned with `truth`
/// * `truth` - Test-set labels
///
/// # Returns
/// * `Ok(evaluation)` - Accuracy, confusion matrix and derived rates
/// * `Err(AnalysisError::DimensionMismatch)` - If lengths differ
/// * `Err(AnalysisError::ValidationError)` - If both are empty
pub fn evaluate(
    model: &str,
    predicted: &[Diagnosis],
    truth: &[Diagnosis],
) -> Result<Evaluation, AnalysisError> {
    let confusion = ConfusionMatrix::from_labels(predicted, truth)?;

    Ok(Evaluation {
        model: model.to_string(),
        accuracy: confusion.accuracy(),
        sensitivity: confusion.sensitivity(),
        specificity: confusion.specificity(),
        precision: confusion.precision(),
        f1: confusion.f1(),
        confusion,
        roc: None,
    })
}

/// One operating point of an ROC curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RocPoint {
    pub false_positive_rate: f64,
    pub true_positive_rate: f64,
    /// Rows scoring at or above this value are called positive
    pub threshold: f64,
}

/// Receiver operating characteristic from (0, 0) to (1, 1)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RocCurve {
    pub points: Vec<RocPoint>,
    pub auc: f64,
}

/// Sweep every distinct score as a threshold
///
/// # Arguments
/// * `scores` - Positive-class (malignant) score per row; higher = more malignant
/// * `truth` - Labels aligned with `scores`
///
/// # Returns
/// * `Ok(curve)` - Points ordered by decreasing threshold, with trapezoidal AUC
/// * `Err(AnalysisError)` - On length mismatch, or when a class is absent
pub fn roc_curve(scores: &[f64], truth: &[Diagnosis]) -> Result<RocCurve, AnalysisError> {
    check_aligned(scores.len(), truth.len())?;
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(AnalysisError::ValidationError(
            "ROC scores must be finite".to_string(),
        ));
    }

    let positives = truth.iter().filter(|t| t.is_positive()).count();
    let negatives = truth.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(AnalysisError::ValidationError(
            "ROC curve needs both classes in the ground truth".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut points = vec![RocPoint {
        false_positive_rate: 0.0,
        true_positive_rate: 0.0,
        threshold: f64::INFINITY,
    }];
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        // tied scores move the curve in one step
        while i < order.len() && scores[order[i]] == threshold {
            if truth[order[i]].is_positive() {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        points.push(RocPoint {
            false_positive_rate: fp as f64 / negatives as f64,
            true_positive_rate: tp as f64 / positives as f64,
            threshold,
        });
    }

    let auc = trapezoid_auc(&points);
    Ok(RocCurve { points, auc })
}

fn trapezoid_auc(points: &[RocPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| {
            let dx = w[1].false_positive_rate - w[0].false_positive_rate;
            dx * (w[0].true_positive_rate + w[1].true_positive_rate) / 2.0
        })
        .sum()
}

fn check_aligned(predicted: usize, truth: usize) -> Result<(), AnalysisError> {
    if predicted != truth {
        return Err(AnalysisError::DimensionMismatch {
            expected: truth,
            actual: predicted,
        });
    }
    if truth == 0 {
        return Err(AnalysisError::ValidationError(
            "cannot evaluate an empty test set".to_string(),
        ));
    }
    Ok(())
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}
