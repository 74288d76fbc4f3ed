//! Tumor Insight - breast cancer exploratory analysis and classifier comparison
//!
//! Loads the diagnostic CSV, summarises and correlates its features, min-max
//! normalizes them, makes a seeded train/test split and compares KNN, a
//! decision tree, a small neural network and logistic regression.

pub mod config;
pub mod dataset;
pub mod engine;
pub mod insight_core;
pub mod render;
pub mod split;
pub mod stats;
pub mod utils;

pub use config::{PipelineConfig, SchemaConfig, SeedPolicy};
pub use dataset::{Diagnosis, Observations, RawTable};
pub use engine::{ClassBalance, InsightEngine, PipelineReport};
pub use split::{train_test_split, Split};
pub use stats::Statistics;
pub use utils::AnalysisError;
