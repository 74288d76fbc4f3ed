//! Single hidden layer feed-forward network
//!
//! input -> logistic hidden units -> one logistic output unit. The weights
//! minimise the sum of squared errors plus `decay * sum(w^2)` over every
//! weight and bias, using BFGS with a backtracking line search.

use ndarray::{s, Array1, Array2, Axis};
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::Diagnosis;
use crate::insight_core::feature::check_width;
use crate::insight_core::model::{sigmoid, validate_training_input, Classifier, Trainer};
use crate::utils::AnalysisError;

/// Armijo sufficient-decrease constant
const ARMIJO: f64 = 1e-4;
const MAX_LINE_SEARCH_STEPS: usize = 40;

/// Network hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpParams {
    pub hidden: usize,
    /// Weight-decay coefficient
    pub decay: f64,
    /// BFGS iteration cap
    pub max_iter: usize,
    /// Initial weights are drawn uniformly from [-init_range, init_range]
    pub init_range: f64,
    /// Stop once the relative loss decrease falls below this
    pub rel_tolerance: f64,
    /// Output at or above which a row is called malignant
    pub threshold: f64,
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            hidden: 15,
            decay: 8e-4,
            max_iter: 100,
            init_range: 0.7,
            rel_tolerance: 1e-8,
            threshold: 0.5,
        }
    }
}

/// Weights of a fitted network
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MlpWeights {
    /// hidden x inputs
    pub input_hidden: Array2<f64>,
    pub hidden_bias: Array1<f64>,
    pub hidden_output: Array1<f64>,
    pub output_bias: f64,
}

impl MlpWeights {
    fn n_params(n_inputs: usize, hidden: usize) -> usize {
        hidden * n_inputs + 2 * hidden + 1
    }

    /// Unpack `[input_hidden (row-major), hidden_bias, hidden_output, output_bias]`
    fn from_flat(theta: &Array1<f64>, n_inputs: usize, hidden: usize) -> Result<Self, AnalysisError> {
        let w1_len = hidden * n_inputs;
        let input_hidden =
            Array2::from_shape_vec((hidden, n_inputs), theta.slice(s![..w1_len]).to_vec())
                .map_err(|e| AnalysisError::ModelError(format!("bad weight layout: {}", e)))?;
        let hidden_bias = theta.slice(s![w1_len..w1_len + hidden]).to_owned();
        let hidden_output = theta
            .slice(s![w1_len + hidden..w1_len + 2 * hidden])
            .to_owned();
        let output_bias = theta[w1_len + 2 * hidden];

        Ok(Self {
            input_hidden,
            hidden_bias,
            hidden_output,
            output_bias,
        })
    }

    fn forward(&self, features: &Array2<f64>) -> (Array2<f64>, Array1<f64>) {
        let hidden = (features.dot(&self.input_hidden.t()) + &self.hidden_bias).mapv(sigmoid);
        let output = (hidden.dot(&self.hidden_output) + self.output_bias).mapv(sigmoid);
        (hidden, output)
    }

    pub fn n_inputs(&self) -> usize {
        self.input_hidden.ncols()
    }

    pub fn n_hidden(&self) -> usize {
        self.input_hidden.nrows()
    }
}

/// Penalised squared-error objective over a fixed training set
struct Objective<'a> {
    features: &'a Array2<f64>,
    targets: Array1<f64>,
    hidden: usize,
    decay: f64,
}

impl Objective<'_> {
    fn value_and_gradient(&self, theta: &Array1<f64>) -> Result<(f64, Array1<f64>), AnalysisError> {
        let n_inputs = self.features.ncols();
        let weights = MlpWeights::from_flat(theta, n_inputs, self.hidden)?;
        let (hidden, output) = weights.forward(self.features);

        let err = &output - &self.targets;
        let loss = err.dot(&err) + self.decay * theta.dot(theta);

        let d_out = &err * &output.mapv(|o| o * (1.0 - o)) * 2.0;
        let grad_w2 = hidden.t().dot(&d_out);
        let grad_b2 = d_out.sum();

        let back = d_out
            .view()
            .insert_axis(Axis(1))
            .dot(&weights.hidden_output.view().insert_axis(Axis(0)));
        let d_hidden = back * hidden.mapv(|a| a * (1.0 - a));
        let grad_w1 = d_hidden.t().dot(self.features);
        let grad_b1 = d_hidden.sum_axis(Axis(0));

        let mut grad: Array1<f64> = Array1::zeros(theta.len());
        let w1_len = self.hidden * n_inputs;
        grad.slice_mut(s![..w1_len])
            .assign(&Array1::from_iter(grad_w1.iter().cloned()));
        grad.slice_mut(s![w1_len..w1_len + self.hidden]).assign(&grad_b1);
        grad.slice_mut(s![w1_len + self.hidden..w1_len + 2 * self.hidden])
            .assign(&grad_w2);
        grad[w1_len + 2 * self.hidden] = grad_b2;
        grad.scaled_add(2.0 * self.decay, theta);

        Ok((loss, grad))
    }
}

/// Fitted network
pub struct MlpClassifier {
    weights: MlpWeights,
    threshold: f64,
    iterations: usize,
    loss: f64,
}

impl MlpClassifier {
    pub fn weights(&self) -> &MlpWeights {
        &self.weights
    }

    /// BFGS iterations actually run
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Final value of the penalised objective
    pub fn loss(&self) -> f64 {
        self.loss
    }

    /// Output unit activation per row
    pub fn predict_probability(&self, features: &Array2<f64>) -> Result<Vec<f64>, AnalysisError> {
        check_width(self.weights.n_inputs(), features)?;
        let (_, output) = self.weights.forward(features);
        Ok(output.to_vec())
    }
}

impl Trainer for MlpParams {
    type Model = MlpClassifier;

    fn train(
        &self,
        features: &Array2<f64>,
        labels: &[Diagnosis],
        seed: u64,
    ) -> Result<MlpClassifier, AnalysisError> {
        validate_training_input(features, labels)?;
        if self.hidden == 0 {
            return Err(AnalysisError::ValidationError(
                "hidden layer needs at least one unit".to_string(),
            ));
        }
        if !(self.init_range >= 0.0 && self.init_range.is_finite()) {
            return Err(AnalysisError::ValidationError(format!(
                "init_range must be finite and >= 0, got {}",
                self.init_range
            )));
        }

        let n_params = MlpWeights::n_params(features.ncols(), self.hidden);
        let mut rng = StdRng::seed_from_u64(seed);
        let init = Uniform::new_inclusive(-self.init_range, self.init_range);
        let theta: Array1<f64> = (0..n_params).map(|_| rng.sample(init)).collect();

        let objective = Objective {
            features,
            targets: labels.iter().map(|l| l.target()).collect(),
            hidden: self.hidden,
            decay: self.decay,
        };

        let (theta, loss, iterations) = self.minimise(&objective, theta)?;
        let weights = MlpWeights::from_flat(&theta, features.ncols(), self.hidden)?;

        info!(
            hidden = self.hidden,
            weights = n_params,
            iterations,
            loss,
            "fitted neural network"
        );

        Ok(MlpClassifier {
            weights,
            threshold: self.threshold,
            iterations,
            loss,
        })
    }
}

impl MlpParams {
    /// BFGS on the flattened weight vector
    fn minimise(
        &self,
        objective: &Objective<'_>,
        mut theta: Array1<f64>,
    ) -> Result<(Array1<f64>, f64, usize), AnalysisError> {
        let n = theta.len();
        let (mut loss, mut grad) = objective.value_and_gradient(&theta)?;
        let mut inv_hessian = Array2::<f64>::eye(n);
        let mut iterations = 0;

        while iterations < self.max_iter {
            let mut direction = -inv_hessian.dot(&grad);
            let mut slope = grad.dot(&direction);
            if slope >= 0.0 {
                // lost descent; restart from steepest descent
                inv_hessian = Array2::eye(n);
                direction = grad.mapv(|g| -g);
                slope = -grad.dot(&grad);
            }
            if slope == 0.0 {
                break;
            }

            let mut step = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_LINE_SEARCH_STEPS {
                let candidate = &theta + &(&direction * step);
                let (c_loss, c_grad) = objective.value_and_gradient(&candidate)?;
                if c_loss <= loss + ARMIJO * step * slope {
                    accepted = Some((candidate, c_loss, c_grad));
                    break;
                }
                step *= 0.5;
            }
            let Some((candidate, c_loss, c_grad)) = accepted else {
                debug!(iterations, "line search made no progress");
                break;
            };
            iterations += 1;

            let s = &candidate - &theta;
            let y = &c_grad - &grad;
            let sy = s.dot(&y);
            if sy > 1e-12 {
                let rho = 1.0 / sy;
                let hy = inv_hessian.dot(&y);
                let yhy = y.dot(&hy);
                let s_col = s.view().insert_axis(Axis(1));
                let s_row = s.view().insert_axis(Axis(0));
                let hy_col = hy.view().insert_axis(Axis(1));
                let hy_row = hy.view().insert_axis(Axis(0));
                inv_hessian.scaled_add(rho + rho * rho * yhy, &s_col.dot(&s_row));
                inv_hessian.scaled_add(-rho, &hy_col.dot(&s_row));
                inv_hessian.scaled_add(-rho, &s_col.dot(&hy_row));
            }

            let decrease = loss - c_loss;
            theta = candidate;
            loss = c_loss;
            grad = c_grad;

            if decrease <= self.rel_tolerance * (loss.abs() + self.rel_tolerance) {
                debug!(iterations, loss, "converged");
                break;
            }
        }

        Ok((theta, loss, iterations))
    }
}

impl Classifier for MlpClassifier {
    fn name(&self) -> &str {
        "neural_network"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight_core::model::benign_majority;
    use ndarray::arr2;
    use Diagnosis::{Benign as B, Malignant as M};

    fn separable() -> (Array2<f64>, Vec<Diagnosis>) {
        let features = Array2::from_shape_fn((40, 3), |(i, j)| {
            let base = if i < 20 { 0.15 } else { 0.85 };
            base + ((i * 7 + j * 3) % 10) as f64 * 0.01
        });
        let labels = (0..40).map(|i| if i < 20 { B } else { M }).collect();
        (features, labels)
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let features = arr2(&[[0.1, 0.9], [0.4, 0.2], [0.8, 0.6]]);
        let objective = Objective {
            features: &features,
            targets: Array1::from(vec![0.0, 1.0, 1.0]),
            hidden: 2,
            decay: 0.01,
        };
        let n = MlpWeights::n_params(2, 2);
        let theta: Array1<f64> = (0..n).map(|i| ((i as f64) * 0.37).sin() * 0.5).collect();

        let (_, grad) = objective.value_and_gradient(&theta).unwrap();
        let eps = 1e-6;
        for i in 0..n {
            let mut up = theta.clone();
            up[i] += eps;
            let mut down = theta.clone();
            down[i] -= eps;
            let (f_up, _) = objective.value_and_gradient(&up).unwrap();
            let (f_down, _) = objective.value_and_gradient(&down).unwrap();
            let numeric = (f_up - f_down) / (2.0 * eps);
            assert!(
                (numeric - grad[i]).abs() < 1e-6,
                "param {}: numeric {} analytic {}",
                i,
                numeric,
                grad[i]
            );
        }
    }

    #[test]
    fn test_fits_separable_data() {
        let (features, labels) = separable();
        let params = MlpParams {
            hidden: 4,
            ..MlpParams::default()
        };
        let model = params.train(&features, &labels, 1234).unwrap();

        assert!(model.iterations() <= params.max_iter);
        assert_eq!(model.predict(&features).unwrap(), labels);
        let probs = model.predict_probability(&features).unwrap();
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_benign_majority_orientation() {
        let (features, labels) = benign_majority();
        let model = MlpParams::default().train(&features, &labels, 1234).unwrap();

        assert_eq!(model.predict(&features).unwrap(), labels);
        let probs = model.predict_probability(&features).unwrap();
        let max_benign = probs[..30].iter().cloned().fold(f64::MIN, f64::max);
        let min_malignant = probs[30..].iter().cloned().fold(f64::MAX, f64::min);
        assert!(max_benign < min_malignant);
    }

    #[test]
    fn test_training_reduces_loss() {
        let (features, labels) = separable();
        let untrained = MlpParams {
            hidden: 3,
            max_iter: 0,
            ..MlpParams::default()
        }
        .train(&features, &labels, 5)
        .unwrap();
        let trained = MlpParams {
            hidden: 3,
            ..MlpParams::default()
        }
        .train(&features, &labels, 5)
        .unwrap();

        assert_eq!(untrained.iterations(), 0);
        assert!(trained.loss() < untrained.loss());
    }

    #[test]
    fn test_same_seed_same_weights() {
        let (features, labels) = separable();
        let params = MlpParams {
            hidden: 5,
            max_iter: 20,
            ..MlpParams::default()
        };
        let a = params.train(&features, &labels, 99).unwrap();
        let b = params.train(&features, &labels, 99).unwrap();
        let c = params.train(&features, &labels, 100).unwrap();

        assert_eq!(a.weights(), b.weights());
        assert_ne!(a.weights(), c.weights());
    }

    #[test]
    fn test_initial_weights_within_range() {
        let (features, labels) = separable();
        let model = MlpParams {
            hidden: 6,
            max_iter: 0,
            init_range: 0.3,
            ..MlpParams::default()
        }
        .train(&features, &labels, 3)
        .unwrap();

        let w = model.weights();
        assert_eq!(w.n_hidden(), 6);
        assert_eq!(w.n_inputs(), 3);
        assert!(w.input_hidden.iter().all(|v| v.abs() <= 0.3));
        assert!(w.output_bias.abs() <= 0.3);
    }

    #[test]
    fn test_rejects_zero_hidden_units() {
        let (features, labels) = separable();
        let params = MlpParams {
            hidden: 0,
            ..MlpParams::default()
        };
        assert!(params.train(&features, &labels, 0).is_err());
    }
}
