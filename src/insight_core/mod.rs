/// Correlation, model and metric modules
pub mod correlation;
pub mod feature;
pub mod knn_kdtree;
pub mod metrics;
pub mod model;
pub mod neural;

// Re-export commonly used types
pub use correlation::{CorrelationMatrix, CorrelationOrder};
pub use knn_kdtree::{KnnClassifier, KnnParams};
pub use metrics::{evaluate, roc_curve, ConfusionMatrix, Evaluation, RocCurve};
pub use model::{Classifier, LogisticParams, ScoredPrediction, Trainer, TreeParams};
pub use neural::{MlpClassifier, MlpParams};
