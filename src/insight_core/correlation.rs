//! Pearson correlation matrix and display orderings
//!
//! The ordering only groups related variables for the heat map; nothing
//! downstream depends on it.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::Observations;
use crate::utils::AnalysisError;

const POWER_ITERATIONS: usize = 500;

/// How rows/columns of the heat map are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationOrder {
    /// Column order of the input file
    Original,
    /// Dendrogram leaf order of complete-linkage clustering on `1 - r`
    #[default]
    HierarchicalClustering,
    /// Descending loading on the leading eigenvector
    FirstPrincipalComponent,
}

/// Symmetric matrix of pairwise Pearson coefficients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub names: Vec<String>,
    pub values: Array2<f64>,
}

/// A pair of distinct variables and their coefficient
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelatedPair {
    pub first: String,
    pub second: String,
    pub r: f64,
}

/// Numeric projection of the cleaned table: the label (0/1) followed by every feature
pub fn numeric_projection(
    observations: &Observations,
    label_name: &str,
) -> Result<(Vec<String>, Array2<f64>), AnalysisError> {
    let mut names = Vec::with_capacity(observations.n_features() + 1);
    names.push(label_name.to_string());
    names.extend(observations.feature_names.iter().cloned());

    let label = Array1::from(observations.label_targets()).insert_axis(Axis(1));
    let columns = ndarray::concatenate(Axis(1), &[label.view(), observations.features.view()])
        .map_err(|e| AnalysisError::ValidationError(format!("failed to assemble numeric columns: {}", e)))?;
    Ok((names, columns))
}

impl CorrelationMatrix {
    /// Correlate every pair of columns
    ///
    /// # Arguments
    /// * `names` - One name per column
    /// * `columns` - rows=samples, cols=variables
    ///
    /// # Returns
    /// * `Ok(matrix)` - Unit diagonal, values clamped to [-1, 1]
    /// * `Err(AnalysisError::DegenerateColumn)` - If a column has zero variance
    pub fn compute(names: &[String], columns: &Array2<f64>) -> Result<Self, AnalysisError> {
        let (n_rows, n_cols) = columns.dim();
        if names.len() != n_cols {
            return Err(AnalysisError::DimensionMismatch {
                expected: n_cols,
                actual: names.len(),
            });
        }
        if n_rows < 2 {
            return Err(AnalysisError::ValidationError(
                "correlation needs at least two rows".to_string(),
            ));
        }

        let means = columns
            .mean_axis(Axis(0))
            .ok_or_else(|| AnalysisError::ValidationError("empty column set".to_string()))?;
        let centered = columns - &means;
        let cov = centered.t().dot(&centered);

        let sds: Vec<f64> = (0..n_cols).map(|i| cov[[i, i]].sqrt()).collect();
        if let Some(i) = sds.iter().position(|&sd| sd == 0.0) {
            return Err(AnalysisError::DegenerateColumn(names[i].clone()));
        }

        let values = Array2::from_shape_fn((n_cols, n_cols), |(i, j)| {
            if i == j {
                1.0
            } else {
                (cov[[i, j]] / (sds[i] * sds[j])).clamp(-1.0, 1.0)
            }
        });

        Ok(Self {
            names: names.to_vec(),
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Coefficient between two named variables
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.names.iter().position(|n| n == a)?;
        let j = self.names.iter().position(|n| n == b)?;
        Some(self.values[[i, j]])
    }

    /// Index permutation for display
    pub fn order(&self, method: CorrelationOrder) -> Vec<usize> {
        match method {
            CorrelationOrder::Original => (0..self.len()).collect(),
            CorrelationOrder::HierarchicalClustering => self.hierarchical_order(),
            CorrelationOrder::FirstPrincipalComponent => self.first_component_order(),
        }
    }

    /// Copy of the matrix with rows and columns permuted
    pub fn reordered(&self, order: &[usize]) -> Self {
        let names = order.iter().map(|&i| self.names[i].clone()).collect();
        let values = self.values.select(Axis(0), order).select(Axis(1), order);
        Self { names, values }
    }

    /// The `n` distinct pairs with the largest |r|
    pub fn strongest_pairs(&self, n: usize) -> Vec<CorrelatedPair> {
        let mut pairs = Vec::new();
        for i in 0..self.len() {
            for j in i + 1..self.len() {
                pairs.push(CorrelatedPair {
                    first: self.names[i].clone(),
                    second: self.names[j].clone(),
                    r: self.values[[i, j]],
                });
            }
        }
        pairs.sort_by(|a, b| b.r.abs().total_cmp(&a.r.abs()));
        pairs.truncate(n);
        pairs
    }

    fn hierarchical_order(&self) -> Vec<usize> {
        let n = self.len();
        let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
        let mut dist: Vec<Vec<f64>> = (0..n)
            .map(|i| (0..n).map(|j| 1.0 - self.values[[i, j]]).collect())
            .collect();

        while clusters.len() > 1 {
            let (mut best_a, mut best_b, mut best) = (0, 1, f64::INFINITY);
            for a in 0..clusters.len() {
                for b in a + 1..clusters.len() {
                    if dist[a][b] < best {
                        best = dist[a][b];
                        best_a = a;
                        best_b = b;
                    }
                }
            }

            // complete linkage: merged distance is the farther of the two
            for k in 0..clusters.len() {
                let merged = dist[best_a][k].max(dist[best_b][k]);
                dist[best_a][k] = merged;
                dist[k][best_a] = merged;
            }
            dist[best_a][best_a] = 0.0;
            dist.remove(best_b);
            for row in dist.iter_mut() {
                row.remove(best_b);
            }

            let absorbed = clusters.remove(best_b);
            clusters[best_a].extend(absorbed);
            debug!(height = best, remaining = clusters.len(), "merged clusters");
        }

        clusters.pop().unwrap_or_default()
    }

    fn first_component_order(&self) -> Vec<usize> {
        let n = self.len();
        if n == 0 {
            return Vec::new();
        }

        let mut v = Array1::from_elem(n, 1.0 / (n as f64).sqrt());
        for _ in 0..POWER_ITERATIONS {
            let next = self.values.dot(&v);
            let norm = next.dot(&next).sqrt();
            if norm == 0.0 {
                break;
            }
            let next = next / norm;
            let delta = (&next - &v).mapv(f64::abs).sum();
            v = next;
            if delta < 1e-12 {
                break;
            }
        }
        if v.sum() < 0.0 {
            v.mapv_inplace(|x| -x);
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| v[b].total_cmp(&v[a]).then(a.cmp(&b)));
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Diagnosis;
    use ndarray::arr2;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pearson_basic_properties() {
        let columns = arr2(&[
            [1.0, 2.0, -1.0, 3.0],
            [2.0, 4.0, -2.0, 1.0],
            [3.0, 6.0, -3.0, 4.0],
            [4.0, 8.0, -4.0, 1.0],
            [5.0, 10.0, -5.0, 5.0],
        ]);
        let m = CorrelationMatrix::compute(&names(&["a", "b", "c", "d"]), &columns).unwrap();

        assert!((m.get("a", "b").unwrap() - 1.0).abs() < 1e-12);
        assert!((m.get("a", "c").unwrap() + 1.0).abs() < 1e-12);
        for i in 0..4 {
            assert_eq!(m.values[[i, i]], 1.0);
            for j in 0..4 {
                assert_eq!(m.values[[i, j]], m.values[[j, i]]);
                assert!((-1.0..=1.0).contains(&m.values[[i, j]]));
            }
        }
    }

    #[test]
    fn test_degenerate_column() {
        let columns = arr2(&[[1.0, 7.0], [2.0, 7.0], [3.0, 7.0]]);
        let result = CorrelationMatrix::compute(&names(&["a", "flat"]), &columns);
        assert!(matches!(result, Err(AnalysisError::DegenerateColumn(name)) if name == "flat"));
    }

    #[test]
    fn test_name_count_mismatch() {
        let columns = arr2(&[[1.0, 2.0], [2.0, 1.0]]);
        assert!(CorrelationMatrix::compute(&names(&["a"]), &columns).is_err());
    }

    fn block_matrix() -> CorrelationMatrix {
        let t = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let u = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];
        // columns interleave the two groups: a, c, b, d
        let columns = Array2::from_shape_fn((8, 4), |(i, j)| {
            let wiggle = if i % 2 == 0 { 0.1 } else { -0.1 };
            match j {
                0 => t[i],
                1 => u[i],
                2 => t[i] + wiggle,
                _ => 2.0 * u[i] + wiggle,
            }
        });
        CorrelationMatrix::compute(&names(&["a", "c", "b", "d"]), &columns).unwrap()
    }

    #[test]
    fn test_hierarchical_order_groups_blocks() {
        let m = block_matrix();
        let order = m.order(CorrelationOrder::HierarchicalClustering);

        assert_eq!(order.len(), 4);
        let pos = |idx: usize| order.iter().position(|&o| o == idx).unwrap();
        assert_eq!((pos(0) as i64 - pos(2) as i64).abs(), 1);
        assert_eq!((pos(1) as i64 - pos(3) as i64).abs(), 1);

        let reordered = m.reordered(&order);
        assert_eq!(reordered.len(), 4);
        assert_eq!(
            reordered.get("a", "b"),
            m.get("a", "b"),
        );
    }

    #[test]
    fn test_first_component_order() {
        let t = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let columns = Array2::from_shape_fn((6, 3), |(i, j)| {
            let wiggle = if i % 2 == 0 { 0.05 } else { -0.05 };
            match j {
                0 => -t[i] + wiggle,
                1 => t[i],
                _ => t[i] - wiggle,
            }
        });
        let m = CorrelationMatrix::compute(&names(&["anti", "x", "y"]), &columns).unwrap();
        let order = m.order(CorrelationOrder::FirstPrincipalComponent);
        assert_eq!(order.len(), 3);
        assert_eq!(order[2], 0);
    }

    #[test]
    fn test_original_order() {
        assert_eq!(block_matrix().order(CorrelationOrder::Original), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_strongest_pairs() {
        let pairs = block_matrix().strongest_pairs(2);
        assert_eq!(pairs.len(), 2);
        assert!(pairs[0].r.abs() >= pairs[1].r.abs());
        let first = (pairs[0].first.as_str(), pairs[0].second.as_str());
        assert!(first == ("a", "b") || first == ("c", "d"));
    }

    #[test]
    fn test_numeric_projection_codes_label() {
        let obs = Observations {
            name: "t".to_string(),
            feature_names: names(&["radius"]),
            features: arr2(&[[1.0], [2.0], [3.0]]),
            labels: vec![Diagnosis::Benign, Diagnosis::Malignant, Diagnosis::Malignant],
            dropped_columns: Vec::new(),
        };
        let (cols, data) = numeric_projection(&obs, "diagnosis").unwrap();
        assert_eq!(cols, names(&["diagnosis", "radius"]));
        assert_eq!(data.column(0).to_vec(), vec![0.0, 1.0, 1.0]);
        assert_eq!(data.column(1).to_vec(), vec![1.0, 2.0, 3.0]);
    }
}
