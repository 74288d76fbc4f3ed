//! Pipeline configuration
//!
//! Every knob of a run lives in [`PipelineConfig`]. Files are JSON and every
//! field is optional; missing fields fall back to the values used for the
//! reference report (k = 21, 15 hidden units, 75/25 split).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::insight_core::correlation::CorrelationOrder;
use crate::insight_core::knn_kdtree::KnnParams;
use crate::insight_core::model::{LogisticParams, TreeParams};
use crate::insight_core::neural::MlpParams;
use crate::utils::{validate_threshold, AnalysisError};

/// Which columns carry the label and which are identifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub label_column: String,
    /// Identifier columns to drop; names absent from the file are ignored
    pub id_columns: Vec<String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            label_column: "diagnosis".to_string(),
            id_columns: vec![
                String::new(),
                "X".to_string(),
                "Unnamed: 0".to_string(),
                "id".to_string(),
            ],
        }
    }
}

/// One seed per random-dependent stage
///
/// Each stage builds its own generator from its seed, so changing one stage
/// never shifts the random stream of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedPolicy {
    pub split: u64,
    pub knn: u64,
    pub tree: u64,
    pub neural: u64,
    pub logistic: u64,
}

impl SeedPolicy {
    /// Use the same seed for every stage
    pub fn uniform(seed: u64) -> Self {
        Self {
            split: seed,
            knn: seed,
            tree: seed,
            neural: seed,
            logistic: seed,
        }
    }
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self::uniform(1234)
    }
}

/// Full configuration of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub schema: SchemaConfig,
    pub seeds: SeedPolicy,
    /// Fraction of rows used for training, in (0, 1)
    pub train_fraction: f64,
    pub correlation_order: CorrelationOrder,
    /// Number of strongest feature pairs listed in the text report
    pub top_correlations: usize,
    pub knn: KnnParams,
    pub tree: TreeParams,
    pub neural: MlpParams,
    pub logistic: LogisticParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema: SchemaConfig::default(),
            seeds: SeedPolicy::default(),
            train_fraction: 0.75,
            correlation_order: CorrelationOrder::default(),
            top_correlations: 5,
            knn: KnnParams::default(),
            tree: TreeParams::default(),
            neural: MlpParams::default(),
            logistic: LogisticParams::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file and validate it
    pub fn from_json_file(path: &Path) -> Result<Self, AnalysisError> {
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                AnalysisError::NotFound(format!("config file {}", path.display()))
            }
            _ => AnalysisError::Io(format!("{}: {}", path.display(), e)),
        })?;
        Self::from_json_str(&content)
    }

    /// Parse a configuration from JSON text and validate it
    pub fn from_json_str(content: &str) -> Result<Self, AnalysisError> {
        let config: PipelineConfig = serde_json::from_str(content)
            .map_err(|e| AnalysisError::Parse(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(AnalysisError::ValidationError(format!(
                "train_fraction must be in (0, 1), got {}",
                self.train_fraction
            )));
        }
        if self.schema.label_column.is_empty() {
            return Err(AnalysisError::ValidationError(
                "label_column must not be empty".to_string(),
            ));
        }
        if self.knn.k == 0 {
            return Err(AnalysisError::ValidationError("knn.k must be > 0".to_string()));
        }
        if self.neural.hidden == 0 {
            return Err(AnalysisError::ValidationError(
                "neural.hidden must be > 0".to_string(),
            ));
        }
        if self.neural.decay < 0.0 || self.logistic.alpha < 0.0 {
            return Err(AnalysisError::ValidationError(
                "regularisation coefficients must be >= 0".to_string(),
            ));
        }
        validate_threshold(self.neural.threshold)?;
        validate_threshold(self.logistic.threshold)?;
        Ok(())
    }
}
