//! KD-Tree based K-Nearest Neighbors classification
//!
//! Training rows are indexed once in a KD-Tree; each query pulls its nearest
//! training rows in O(log n) instead of scanning the whole training set.
//! Tables with heavily tied columns fall back to the exact scan.

use kiddo::float::kdtree::KdTree;
use kiddo::SquaredEuclidean;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataset::Diagnosis;
use crate::insight_core::feature::check_width;
use crate::insight_core::model::{validate_training_input, Classifier, ScoredPrediction, Trainer};
use crate::utils::AnalysisError;

/// Maximum number of features supported by KD-Tree implementation
///
/// Matches the width of the diagnostic table; narrower inputs are zero padded.
pub const MAX_FEATURES: usize = 30;

/// Leaf bucket size
const BUCKET_SIZE: usize = 256;

/// Extra candidates fetched beyond k so equal distances are ordered by row index
const TIE_CANDIDATES: usize = 8;

type NeighbourTree = KdTree<f64, u64, MAX_FEATURES, BUCKET_SIZE, u32>;

/// KNN hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnParams {
    pub k: usize,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self { k: 21 }
    }
}

enum NeighbourIndex {
    Tree(Box<NeighbourTree>),
    /// Exact scan, for rows kiddo cannot bucket
    Exact(Array2<f64>),
}

/// Stored training set plus its neighbour index
pub struct KnnClassifier {
    index: NeighbourIndex,
    labels: Vec<Diagnosis>,
    k: usize,
    n_features: usize,
}

fn to_point(row: ArrayView1<'_, f64>) -> [f64; MAX_FEATURES] {
    // unused axes stay 0.0 and add nothing to the distance
    let mut point = [0.0; MAX_FEATURES];
    for (j, &val) in row.iter().enumerate().take(MAX_FEATURES) {
        point[j] = val;
    }
    point
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .fold(0.0, |acc, (x, y)| acc + (x - y) * (x - y))
}

/// Longest run of equal values in a column
fn largest_tie(column: ArrayView1<'_, f64>) -> usize {
    let mut values = column.to_vec();
    values.sort_by(f64::total_cmp);

    let (mut best, mut run) = (0, 0);
    for (i, v) in values.iter().enumerate() {
        run = if i > 0 && values[i - 1] == *v { run + 1 } else { 1 };
        best = best.max(run);
    }
    best
}

/// Whether kiddo can bucket these rows
///
/// A leaf at depth d splits on axis `d % MAX_FEATURES` and fails when all
/// `BUCKET_SIZE` of its points share one value there. No split happens below
/// `BUCKET_SIZE + 1` rows, and s splits need at least `BUCKET_SIZE + s` rows,
/// so the zero padded axes are only reachable past `BUCKET_SIZE + n_features`.
fn tree_can_index(features: &Array2<f64>) -> bool {
    let (n_samples, n_features) = features.dim();
    if n_samples <= BUCKET_SIZE {
        return true;
    }
    if n_features < MAX_FEATURES && n_samples >= BUCKET_SIZE + n_features {
        return false;
    }
    features
        .columns()
        .into_iter()
        .all(|col| largest_tie(col) < BUCKET_SIZE)
}

impl Trainer for KnnParams {
    type Model = KnnClassifier;

    /// Index the training rows; neighbour ordering is fully deterministic, so
    /// `seed` is not consumed
    fn train(
        &self,
        features: &Array2<f64>,
        labels: &[Diagnosis],
        _seed: u64,
    ) -> Result<KnnClassifier, AnalysisError> {
        validate_training_input(features, labels)?;
        let (n_samples, n_features) = features.dim();

        if n_features > MAX_FEATURES {
            return Err(AnalysisError::ValidationError(format!(
                "Feature count {} exceeds maximum supported dimension {}",
                n_features, MAX_FEATURES
            )));
        }
        if self.k == 0 {
            return Err(AnalysisError::ValidationError("k must be > 0".to_string()));
        }
        if self.k > n_samples {
            return Err(AnalysisError::ValidationError(format!(
                "k ({}) cannot exceed number of training samples ({})",
                self.k, n_samples
            )));
        }

        let index = if tree_can_index(features) {
            let mut tree = NeighbourTree::new();
            for (i, row) in features.rows().into_iter().enumerate() {
                tree.add(&to_point(row), i as u64);
            }
            NeighbourIndex::Tree(Box::new(tree))
        } else {
            warn!("too many tied feature values for the KD-Tree, using an exact scan");
            NeighbourIndex::Exact(features.to_owned())
        };

        info!(samples = n_samples, features = n_features, k = self.k, "built KNN index");

        Ok(KnnClassifier {
            index,
            labels: labels.to_vec(),
            k: self.k,
            n_features,
        })
    }
}

impl KnnClassifier {
    pub fn k(&self) -> usize {
        self.k
    }

    /// Whether queries go through the KD-Tree rather than an exact scan
    pub fn uses_tree(&self) -> bool {
        matches!(self.index, NeighbourIndex::Tree(_))
    }

    /// Training row indices of the k nearest neighbours, nearest first
    ///
    /// Equal distances are ordered by training row index.
    pub fn neighbours(&self, row: ArrayView1<'_, f64>) -> Vec<usize> {
        let mut found = match &self.index {
            NeighbourIndex::Tree(tree) => self.tree_candidates(tree, row),
            NeighbourIndex::Exact(rows) => rows
                .rows()
                .into_iter()
                .enumerate()
                .map(|(i, r)| (squared_distance(r, row), i))
                .collect(),
        };
        found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        found.truncate(self.k);
        found.into_iter().map(|(_, idx)| idx).collect()
    }

    /// Candidates that contain every row tied with the k-th nearest
    fn tree_candidates(&self, tree: &NeighbourTree, row: ArrayView1<'_, f64>) -> Vec<(f64, usize)> {
        let point = to_point(row);
        let n_samples = self.labels.len();
        let mut n_query = (self.k + TIE_CANDIDATES).min(n_samples);
        loop {
            let mut found: Vec<(f64, usize)> = tree
                .nearest_n::<SquaredEuclidean>(&point, n_query)
                .into_iter()
                .map(|n| (n.distance, n.item as usize))
                .collect();
            found.sort_by(|a, b| a.0.total_cmp(&b.0));

            let kth = found[self.k - 1].0;
            let farthest = found[found.len() - 1].0;
            if n_query == n_samples || farthest > kth {
                return found;
            }
            n_query = (n_query * 2).min(n_samples);
        }
    }

    /// Majority vote among the neighbours
    ///
    /// A tied vote, only possible for even k, goes to the nearest neighbour's label.
    fn vote(&self, neighbours: &[usize]) -> ScoredPrediction {
        let malignant = neighbours
            .iter()
            .filter(|&&i| self.labels[i].is_positive())
            .count();
        let benign = neighbours.len() - malignant;

        let label = if malignant > benign {
            Diagnosis::Malignant
        } else if benign > malignant {
            Diagnosis::Benign
        } else {
            self.labels[neighbours[0]]
        };

        let agreeing = if label.is_positive() { malignant } else { benign };
        ScoredPrediction {
            label,
            confidence: agreeing as f64 / neighbours.len() as f64,
        }
    }

    fn score_rows(&self, features: &Array2<f64>) -> Result<Vec<ScoredPrediction>, AnalysisError> {
        check_width(self.n_features, features)?;
        let scored: Vec<ScoredPrediction> = features
            .rows()
            .into_iter()
            .map(|row| self.vote(&self.neighbours(row)))
            .collect();
        debug!(rows = scored.len(), "scored KNN queries");
        Ok(scored)
    }
}

impl Classifier for KnnClassifier {
    fn name(&self) -> &str {
        "knn"
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<Diagnosis>, AnalysisError> {
        Ok(self
            .score_rows(features)?
            .into_iter()
            .map(|s| s.label)
            .collect())
    }

    fn predict_with_confidence(
        &self,
        features: &Array2<f64>,
    ) -> Result<Option<Vec<ScoredPrediction>>, AnalysisError> {
        self.score_rows(features).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight_core::model::benign_majority;
    use ndarray::arr2;
    use Diagnosis::{Benign as B, Malignant as M};

    fn train(features: &Array2<f64>, labels: &[Diagnosis], k: usize) -> KnnClassifier {
        KnnParams { k }.train(features, labels, 0).unwrap()
    }

    #[test]
    fn test_knn_simple_case() {
        let features = arr2(&[[0.0, 0.0], [0.1, 0.1], [0.2, 0.0], [1.0, 1.0], [0.9, 0.9]]);
        let labels = [B, B, B, M, M];
        let knn = train(&features, &labels, 3);

        let queries = arr2(&[[0.05, 0.05], [0.95, 0.95]]);
        assert_eq!(knn.predict(&queries).unwrap(), vec![B, M]);
    }

    #[test]
    fn test_confidence_is_agreeing_fraction() {
        let features = arr2(&[[0.0], [0.1], [0.2], [0.3], [5.0]]);
        let labels = [B, B, M, M, M];
        let knn = train(&features, &labels, 3);

        // nearest three to 0.0 are rows 0, 1, 2: two benign, one malignant
        let scored = knn
            .predict_with_confidence(&arr2(&[[0.0]]))
            .unwrap()
            .unwrap();
        assert_eq!(scored[0].label, B);
        assert!((scored[0].confidence - 2.0 / 3.0).abs() < 1e-12);
        assert!((scored[0].positive_score() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_equal_distances_ordered_by_row() {
        // rows 0..4 all sit at distance 1 from the query
        let features = arr2(&[[1.0, 0.0], [0.0, 1.0], [-1.0, 0.0], [0.0, -1.0], [3.0, 3.0]]);
        let labels = [M, B, B, M, B];
        let knn = train(&features, &labels, 2);

        let query = arr2(&[[0.0, 0.0]]);
        assert_eq!(knn.neighbours(query.row(0)), vec![0, 1]);
    }

    #[test]
    fn test_even_k_tie_uses_nearest_neighbour() {
        let features = arr2(&[[0.0], [0.5], [3.0]]);
        let labels = [M, B, B];
        let knn = train(&features, &labels, 2);

        let scored = knn
            .predict_with_confidence(&arr2(&[[0.1]]))
            .unwrap()
            .unwrap();
        assert_eq!(scored[0].label, M);
        assert!((scored[0].confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_ties_beyond_candidate_window_ordered_by_row() {
        // twenty rows at distance 1, more than k + TIE_CANDIDATES
        let features = Array2::from_shape_fn((20, 1), |(i, _)| if i % 2 == 0 { 1.0 } else { -1.0 });
        let labels: Vec<Diagnosis> = (0..20).map(|i| if i < 2 { M } else { B }).collect();
        let knn = train(&features, &labels, 2);
        assert!(knn.uses_tree());

        let query = arr2(&[[0.0]]);
        assert_eq!(knn.neighbours(query.row(0)), vec![0, 1]);
    }

    /// 426 x 30 rows, mostly-zero first column
    fn tied_training_set() -> (Array2<f64>, Vec<Diagnosis>) {
        let features = Array2::from_shape_fn((426, 30), |(i, j)| {
            let malignant = i % 3 == 0;
            let base = if malignant { 0.7 } else { 0.2 };
            if j == 0 {
                if i < 300 { 0.0 } else { base }
            } else {
                base + ((i * 13 + j * 7) % 17) as f64 * 0.005
            }
        });
        let labels = (0..426).map(|i| if i % 3 == 0 { M } else { B }).collect();
        (features, labels)
    }

    #[test]
    fn test_heavily_tied_column_uses_exact_scan() {
        let (features, labels) = tied_training_set();
        assert_eq!(largest_tie(features.column(0)), 300);

        let knn = train(&features, &labels, 21);
        assert!(!knn.uses_tree());
        assert_eq!(knn.predict(&features).unwrap(), labels);
    }

    #[test]
    fn test_tree_and_exact_scan_agree() {
        let features = Array2::from_shape_fn((400, 30), |(i, j)| {
            ((i * 31 + j * 17) % 97) as f64 / 97.0 + (i % 5) as f64 * 0.001
        });
        let labels: Vec<Diagnosis> = (0..400).map(|i| if i % 4 == 0 { M } else { B }).collect();
        let knn = train(&features, &labels, 7);
        assert!(knn.uses_tree());

        let exact = KnnClassifier {
            index: NeighbourIndex::Exact(features.clone()),
            labels: labels.clone(),
            k: 7,
            n_features: 30,
        };
        for row in features.rows().into_iter().step_by(9) {
            assert_eq!(knn.neighbours(row), exact.neighbours(row));
        }
    }

    #[test]
    fn test_tree_can_index_rules() {
        assert!(tree_can_index(&Array2::zeros((BUCKET_SIZE, 2))));
        // padded axes become reachable on a narrow table
        assert!(!tree_can_index(&Array2::from_shape_fn((BUCKET_SIZE + 2, 2), |(i, j)| (i + j) as f64)));
        let wide = Array2::from_shape_fn((BUCKET_SIZE + 50, MAX_FEATURES), |(i, j)| (i * (j + 1)) as f64);
        assert!(tree_can_index(&wide));
    }

    #[test]
    fn test_benign_majority_orientation() {
        let (features, labels) = benign_majority();
        let knn = train(&features, &labels, 5);

        let scored = knn.predict_with_confidence(&features).unwrap().unwrap();
        let predicted: Vec<Diagnosis> = scored.iter().map(|s| s.label).collect();
        assert_eq!(predicted, labels);

        let max_benign = scored[..30].iter().map(|s| s.positive_score()).fold(f64::MIN, f64::max);
        let min_malignant = scored[30..].iter().map(|s| s.positive_score()).fold(f64::MAX, f64::min);
        assert!(max_benign < min_malignant);
    }

    #[test]
    fn test_knn_feature_limit() {
        let features = Array2::from_elem((10, 33), 0.5);
        let result = KnnParams { k: 3 }.train(&features, &vec![B; 10], 0);

        match result {
            Err(AnalysisError::ValidationError(msg)) => {
                assert!(msg.contains("33"));
                assert!(msg.contains("30"));
            }
            _ => panic!("expected a validation error"),
        }
    }

    #[test]
    fn test_invalid_k() {
        let features = arr2(&[[0.0], [1.0]]);
        assert!(KnnParams { k: 0 }.train(&features, &[B, M], 0).is_err());
        assert!(KnnParams { k: 3 }.train(&features, &[B, M], 0).is_err());
    }

    #[test]
    fn test_predict_width_mismatch() {
        let features = arr2(&[[0.0, 0.0], [1.0, 1.0]]);
        let knn = train(&features, &[B, M], 1);
        assert!(matches!(
            knn.predict(&arr2(&[[0.0]])),
            Err(AnalysisError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_knn_thirty_features() {
        // 60 samples x 30 features, two shifted clouds
        let features = Array2::from_shape_fn((60, 30), |(i, j)| {
            let base = if i < 30 { 0.2 } else { 0.8 };
            base + ((i * 31 + j * 7) % 13) as f64 * 0.005
        });
        let labels: Vec<Diagnosis> = (0..60).map(|i| if i < 30 { B } else { M }).collect();
        let knn = train(&features, &labels, 21);

        let predicted = knn.predict(&features).unwrap();
        assert_eq!(predicted, labels);
    }
}
