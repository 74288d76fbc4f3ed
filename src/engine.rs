//! The end-to-end analysis run
//!
//! load -> clean -> describe/correlate -> normalize -> split -> fit four
//! models -> evaluate. Artifacts are written separately by
//! [`InsightEngine::write_artifacts`] so a run can be inspected in memory.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::dataset::{Observations, RawTable};
use crate::insight_core::correlation::{numeric_projection, CorrelatedPair, CorrelationMatrix};
use crate::insight_core::metrics::{evaluate, roc_curve, Evaluation};
use crate::insight_core::model::{Classifier, Trainer};
use crate::insight_core::neural::MlpWeights;
use crate::render;
use crate::split::{train_test_split, Split};
use crate::stats::{describe, Statistics};
use crate::utils::{min_max_scale, AnalysisError, MinMaxParams};

/// Benign/malignant counts of the cleaned table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassBalance {
    pub benign: usize,
    pub malignant: usize,
}

/// Everything a run produces
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub dataset: String,
    pub rows: usize,
    pub feature_names: Vec<String>,
    pub dropped_columns: Vec<String>,
    pub class_balance: ClassBalance,
    pub statistics: Vec<Statistics>,
    /// Correlation matrix in display order
    pub correlation: CorrelationMatrix,
    pub strongest_pairs: Vec<CorrelatedPair>,
    pub normalization: MinMaxParams,
    pub train_size: usize,
    pub test_size: usize,
    /// KNN, decision tree, neural network, logistic regression
    pub evaluations: Vec<Evaluation>,
    pub network: MlpWeights,
}

impl PipelineReport {
    pub fn evaluation(&self, model: &str) -> Option<&Evaluation> {
        self.evaluations.iter().find(|e| e.model == model)
    }
}

/// Drives one configured analysis
#[derive(Debug, Clone, Default)]
pub struct InsightEngine {
    config: PipelineConfig,
}

impl InsightEngine {
    /// Create an engine; the configuration is validated up front
    pub fn new(config: PipelineConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load a CSV file and run the full analysis on it
    pub fn analyze_file(&self, path: &Path) -> Result<PipelineReport, AnalysisError> {
        let raw = RawTable::from_path(path)?;
        self.analyze_table(&raw)
    }

    /// Run the full analysis on an already loaded table
    pub fn analyze_table(&self, raw: &RawTable) -> Result<PipelineReport, AnalysisError> {
        let cfg = &self.config;
        let observations = Observations::from_raw(raw, &cfg.schema)?;
        let (benign, malignant) = observations.class_balance();
        info!(
            rows = observations.len(),
            features = observations.n_features(),
            benign,
            malignant,
            "cleaned dataset"
        );

        let statistics = describe(&observations);

        let (names, columns) = numeric_projection(&observations, &cfg.schema.label_column)?;
        let full = CorrelationMatrix::compute(&names, &columns)?;
        let strongest_pairs = full.strongest_pairs(cfg.top_correlations);
        let correlation = full.reordered(&full.order(cfg.correlation_order));

        // scaling is fitted on the whole table before the split
        let (scaled, normalization) =
            min_max_scale(&observations.features, &observations.feature_names)?;
        let split = train_test_split(
            &scaled,
            &observations.labels,
            cfg.train_fraction,
            cfg.seeds.split,
        )?;
        info!(
            train = split.train_indices.len(),
            test = split.test_indices.len(),
            "split dataset"
        );

        let knn = fit_and_evaluate(&cfg.knn, &split, cfg.seeds.knn)?.1;
        let tree = fit_and_evaluate(&cfg.tree, &split, cfg.seeds.tree)?.1;
        let (network, neural) = fit_and_evaluate(&cfg.neural, &split, cfg.seeds.neural)?;
        let logistic = fit_and_evaluate(&cfg.logistic, &split, cfg.seeds.logistic)?.1;

        Ok(PipelineReport {
            dataset: observations.name.clone(),
            rows: observations.len(),
            feature_names: observations.feature_names.clone(),
            dropped_columns: observations.dropped_columns.clone(),
            class_balance: ClassBalance { benign, malignant },
            statistics,
            correlation,
            strongest_pairs,
            normalization,
            train_size: split.train_indices.len(),
            test_size: split.test_indices.len(),
            evaluations: vec![knn, tree, neural, logistic],
            network: network.weights().clone(),
        })
    }

    /// Write `report.json` and, when `plots` is set, the SVG artifacts into `out_dir`
    ///
    /// # Returns
    /// * `Ok(paths)` - Every file written, report first
    /// * `Err(AnalysisError)` - If the directory or any file cannot be written
    pub fn write_artifacts(
        &self,
        report: &PipelineReport,
        out_dir: &Path,
        plots: bool,
    ) -> Result<Vec<PathBuf>, AnalysisError> {
        fs::create_dir_all(out_dir)?;
        let mut written = Vec::new();

        let json = serde_json::to_string_pretty(report)
            .map_err(|e| AnalysisError::Io(format!("failed to serialize report: {}", e)))?;
        let report_path = out_dir.join("report.json");
        fs::write(&report_path, json)?;
        written.push(report_path);

        if !plots {
            return Ok(written);
        }

        let heat = out_dir.join("correlation.svg");
        render::render_correlation_heatmap(&report.correlation, &heat)?;
        written.push(heat);

        for evaluation in &report.evaluations {
            let path = out_dir.join(format!("confusion_{}.svg", evaluation.model));
            render::render_confusion_matrix(evaluation, &path)?;
            written.push(path);

            if let Some(roc) = &evaluation.roc {
                let path = out_dir.join(format!("roc_{}.svg", evaluation.model));
                render::render_roc(roc, &format!("{} ROC", evaluation.model), &path)?;
                written.push(path);
            }
        }

        let network = out_dir.join("network.svg");
        render::render_network(&report.network, &report.feature_names, &network)?;
        written.push(network);

        info!(dir = %out_dir.display(), files = written.len(), "wrote artifacts");
        Ok(written)
    }
}

/// Train on the split's training side and score its test side
///
/// Models that provide a confidence get an ROC curve over it.
fn fit_and_evaluate<T: Trainer>(
    params: &T,
    split: &Split,
    seed: u64,
) -> Result<(T::Model, Evaluation), AnalysisError> {
    let model = params.train(&split.x_train, &split.y_train, seed)?;

    let Some(scored) = model.predict_with_confidence(&split.x_test)? else {
        let predicted = model.predict(&split.x_test)?;
        let evaluation = evaluate(model.name(), &predicted, &split.y_test)?;
        info!(model = model.name(), accuracy = evaluation.accuracy, "evaluated model");
        return Ok((model, evaluation));
    };

    let predicted: Vec<_> = scored.iter().map(|s| s.label).collect();
    let mut evaluation = evaluate(model.name(), &predicted, &split.y_test)?;
    let scores: Vec<f64> = scored.iter().map(|s| s.positive_score()).collect();
    match roc_curve(&scores, &split.y_test) {
        Ok(roc) => {
            info!(model = model.name(), auc = roc.auc, "computed ROC curve");
            evaluation = evaluation.with_roc(roc);
        }
        Err(e) => warn!(model = model.name(), error = %e, "skipping ROC curve"),
    }

    info!(
        model = model.name(),
        accuracy = evaluation.accuracy,
        "evaluated model"
    );
    Ok((model, evaluation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Diagnosis;
    use crate::insight_core::knn_kdtree::KnnParams;
    use crate::insight_core::model::ScoredPrediction;
    use ndarray::Array2;
    use std::cell::Cell;

    /// Two features plus an id column; malignant rows sit high on both
    fn sample_table() -> RawTable {
        let mut csv = String::from("id,diagnosis,radius,texture\n");
        for i in 0..40 {
            let malignant = i % 2 == 0;
            let base = if malignant { 20.0 } else { 10.0 };
            let jitter = (i * 7 % 11) as f64 * 0.3;
            csv.push_str(&format!(
                "{},{},{:.2},{:.2}\n",
                1000 + i,
                if malignant { "M" } else { "B" },
                base + jitter,
                base * 1.5 - jitter
            ));
        }
        RawTable::from_csv_str("sample".to_string(), &csv).unwrap()
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            knn: KnnParams { k: 5 },
            ..PipelineConfig::default()
        }
    }

    /// Scores every row malignant with confidence 0.9 and counts queries
    struct CountingModel {
        predict_calls: Cell<usize>,
        scored_calls: Cell<usize>,
    }

    impl Classifier for CountingModel {
        fn name(&self) -> &str {
            "counting"
        }

        fn predict(&self, features: &Array2<f64>) -> Result<Vec<Diagnosis>, AnalysisError> {
            self.predict_calls.set(self.predict_calls.get() + 1);
            Ok(vec![Diagnosis::Malignant; features.nrows()])
        }

        fn predict_with_confidence(
            &self,
            features: &Array2<f64>,
        ) -> Result<Option<Vec<ScoredPrediction>>, AnalysisError> {
            self.scored_calls.set(self.scored_calls.get() + 1);
            Ok(Some(
                (0..features.nrows())
                    .map(|i| ScoredPrediction {
                        label: Diagnosis::Malignant,
                        confidence: 0.5 + i as f64 / (2 * features.nrows()) as f64,
                    })
                    .collect(),
            ))
        }
    }

    struct CountingParams;

    impl Trainer for CountingParams {
        type Model = CountingModel;

        fn train(
            &self,
            _features: &Array2<f64>,
            _labels: &[Diagnosis],
            _seed: u64,
        ) -> Result<CountingModel, AnalysisError> {
            Ok(CountingModel {
                predict_calls: Cell::new(0),
                scored_calls: Cell::new(0),
            })
        }
    }

    #[test]
    fn test_scored_models_are_queried_once() {
        let features = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
        let labels: Vec<Diagnosis> = (0..20)
            .map(|i| if i % 2 == 0 { Diagnosis::Malignant } else { Diagnosis::Benign })
            .collect();
        let split = train_test_split(&features, &labels, 0.5, 3).unwrap();

        let (model, evaluation) = fit_and_evaluate(&CountingParams, &split, 0).unwrap();
        assert_eq!(model.scored_calls.get(), 1);
        assert_eq!(model.predict_calls.get(), 0);
        assert_eq!(evaluation.confusion.true_positives + evaluation.confusion.false_positives, 10);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = PipelineConfig {
            train_fraction: 1.5,
            ..PipelineConfig::default()
        };
        assert!(InsightEngine::new(config).is_err());
    }

    #[test]
    fn test_analyze_table_runs_every_model() {
        let engine = InsightEngine::new(small_config()).unwrap();
        let report = engine.analyze_table(&sample_table()).unwrap();

        assert_eq!(report.rows, 40);
        assert_eq!(report.dropped_columns, vec!["id".to_string()]);
        assert_eq!(report.class_balance, ClassBalance { benign: 20, malignant: 20 });
        assert_eq!(report.train_size, 30);
        assert_eq!(report.test_size, 10);
        assert_eq!(report.correlation.len(), 3);

        let names: Vec<&str> = report.evaluations.iter().map(|e| e.model.as_str()).collect();
        assert_eq!(
            names,
            vec!["knn", "decision_tree", "neural_network", "logistic_regression"]
        );
        for eval in &report.evaluations {
            assert_eq!(eval.confusion.total(), 10);
            assert!((0.0..=1.0).contains(&eval.accuracy));
        }

        let knn = report.evaluation("knn").unwrap();
        assert!(knn.roc.is_some());
        assert!(report.evaluation("decision_tree").unwrap().roc.is_none());
        assert!(knn.accuracy > 0.9);
    }

    #[test]
    fn test_write_artifacts_without_plots() {
        let engine = InsightEngine::new(small_config()).unwrap();
        let report = engine.analyze_table(&sample_table()).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let written = engine.write_artifacts(&report, dir.path(), false).unwrap();
        assert_eq!(written, vec![dir.path().join("report.json")]);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(json["rows"], 40);
        assert_eq!(json["evaluations"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_write_artifacts_with_plots() {
        let engine = InsightEngine::new(small_config()).unwrap();
        let report = engine.analyze_table(&sample_table()).unwrap();
        let dir = tempfile::tempdir().unwrap();

        engine.write_artifacts(&report, dir.path(), true).unwrap();
        for file in [
            "correlation.svg",
            "confusion_knn.svg",
            "confusion_decision_tree.svg",
            "confusion_neural_network.svg",
            "confusion_logistic_regression.svg",
            "roc_knn.svg",
            "network.svg",
        ] {
            assert!(dir.path().join(file).exists(), "missing {}", file);
        }
    }
}
