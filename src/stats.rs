use serde::Serialize;

use crate::dataset::Observations;

/// Summary statistics for one numeric column
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub field: String,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator); 0.0 for a single value
    pub std_dev: f64,
    pub min: f64,
    pub median: f64,
    pub max: f64,
    pub sum: f64,
}

impl Statistics {
    /// Compute statistics for a column of values
    pub fn compute(field: &str, values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let sum: f64 = values.iter().sum();
        let mean = sum / count as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let std_dev = if count > 1 {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        } else {
            0.0
        };

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let median = if count % 2 == 0 {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        } else {
            sorted[count / 2]
        };

        Some(Statistics {
            field: field.to_string(),
            count,
            mean,
            std_dev,
            min,
            median,
            max,
            sum,
        })
    }
}

/// Statistics for every feature column, in column order
pub fn describe(observations: &Observations) -> Vec<Statistics> {
    observations
        .feature_names
        .iter()
        .enumerate()
        .filter_map(|(idx, name)| {
            let values: Vec<f64> = observations.column(idx).to_vec();
            Statistics::compute(name, &values)
        })
        .collect()
}

/// Statistics for one named feature
pub fn describe_field(observations: &Observations, field: &str) -> Option<Statistics> {
    let idx = observations.feature_names.iter().position(|n| n == field)?;
    let values: Vec<f64> = observations.column(idx).to_vec();
    Statistics::compute(field, &values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Diagnosis;
    use ndarray::arr2;

    fn create_test_observations() -> Observations {
        Observations {
            name: "test".to_string(),
            feature_names: vec!["radius".to_string(), "area".to_string()],
            features: arr2(&[
                [10.0, 1.0],
                [20.0, 2.0],
                [30.0, 3.0],
                [40.0, 4.0],
                [50.0, 100.0],
            ]),
            labels: vec![Diagnosis::Benign; 5],
            dropped_columns: Vec::new(),
        }
    }

    #[test]
    fn test_statistics_compute() {
        let stats = Statistics::compute("value", &[10.0, 20.0, 30.0, 40.0, 50.0]).unwrap();

        assert_eq!(stats.count, 5);
        assert_eq!(stats.mean, 30.0);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 50.0);
        assert_eq!(stats.sum, 150.0);
        assert_eq!(stats.median, 30.0);
        // sqrt(1000 / 4)
        assert!((stats.std_dev - 15.811388300841896).abs() < 1e-12);
    }

    #[test]
    fn test_statistics_even_median() {
        let stats = Statistics::compute("value", &[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(stats.median, 2.5);
    }

    #[test]
    fn test_statistics_single_value() {
        let stats = Statistics::compute("value", &[7.0]).unwrap();
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.median, 7.0);
    }

    #[test]
    fn test_statistics_empty() {
        assert!(Statistics::compute("value", &[]).is_none());
    }

    #[test]
    fn test_describe_all_columns() {
        let obs = create_test_observations();
        let all = describe(&obs);

        assert_eq!(all.len(), 2);
        assert_eq!(all[0].field, "radius");
        assert_eq!(all[1].max, 100.0);
        assert_eq!(all[1].median, 3.0);
    }

    #[test]
    fn test_describe_field() {
        let obs = create_test_observations();
        assert_eq!(describe_field(&obs, "radius").unwrap().mean, 30.0);
        assert!(describe_field(&obs, "missing").is_none());
    }
}
