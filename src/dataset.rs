use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::SchemaConfig;
use crate::utils::{is_missing, parse_numeric_cell, AnalysisError};

/// Tumour diagnosis, the binary label of every observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Diagnosis {
    Benign,
    Malignant,
}

impl Diagnosis {
    pub const ALL: [Diagnosis; 2] = [Diagnosis::Benign, Diagnosis::Malignant];

    /// Integer class used by every model: benign = 0, malignant = 1
    ///
    /// This and [`Diagnosis::from_class_index`] are the only place the
    /// encoding is defined.
    pub fn class_index(self) -> usize {
        match self {
            Diagnosis::Benign => 0,
            Diagnosis::Malignant => 1,
        }
    }

    /// Inverse of [`Diagnosis::class_index`]
    pub fn from_class_index(index: usize) -> Result<Self, AnalysisError> {
        match index {
            0 => Ok(Diagnosis::Benign),
            1 => Ok(Diagnosis::Malignant),
            other => Err(AnalysisError::ModelError(format!(
                "class index {} is outside the binary label domain",
                other
            ))),
        }
    }

    /// Malignant is the positive class for every metric
    pub fn is_positive(self) -> bool {
        self == Diagnosis::Malignant
    }

    /// Class index as a float target (0.0 / 1.0)
    pub fn target(self) -> f64 {
        self.class_index() as f64
    }
}

impl FromStr for Diagnosis {
    type Err = AnalysisError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "b" | "benign" | "0" | "false" => Ok(Diagnosis::Benign),
            "m" | "malignant" | "1" | "true" => Ok(Diagnosis::Malignant),
            _ => Err(AnalysisError::Parse(format!(
                "'{}' is not a recognised diagnosis",
                raw
            ))),
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnosis::Benign => write!(f, "benign"),
            Diagnosis::Malignant => write!(f, "malignant"),
        }
    }
}

/// Delimited text as read from disk: a header row plus string cells
#[derive(Debug, Clone)]
pub struct RawTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Read a CSV file with a header row
    pub fn from_path(path: &Path) -> Result<Self, AnalysisError> {
        if !path.exists() {
            return Err(AnalysisError::NotFound(format!(
                "input file {} does not exist",
                path.display()
            )));
        }

        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidData => {
                AnalysisError::Parse(format!("{} is not valid UTF-8", path.display()))
            }
            _ => AnalysisError::from(e),
        })?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());

        Self::from_csv_str(name, &content)
    }

    /// Parse CSV text with a header row
    ///
    /// Every record must have as many fields as the header.
    pub fn from_csv_str(name: String, csv_data: &str) -> Result<Self, AnalysisError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(csv_data.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| AnalysisError::Parse(format!("failed to read header: {}", e)))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if headers.is_empty() || (headers.len() == 1 && headers[0].is_empty()) {
            return Err(AnalysisError::Parse("missing header row".to_string()));
        }

        let mut rows = Vec::new();
        for (i, result) in reader.records().enumerate() {
            let record = result
                .map_err(|e| AnalysisError::Parse(format!("data row {}: {}", i + 1, e)))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        if rows.is_empty() {
            return Err(AnalysisError::Parse(format!("'{}' has no data rows", name)));
        }

        info!(dataset = %name, rows = rows.len(), columns = headers.len(), "loaded table");
        Ok(Self {
            name,
            headers,
            rows,
        })
    }

    /// Get the number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no data rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_is_blank(&self, col_idx: usize) -> bool {
        self.rows
            .iter()
            .all(|row| row.get(col_idx).map_or(true, |cell| cell.trim().is_empty()))
    }
}

/// Cleaned observation table: labelled numeric features only
#[derive(Debug, Clone)]
pub struct Observations {
    pub name: String,
    pub feature_names: Vec<String>,
    /// rows=samples, cols=features, in file column order
    pub features: Array2<f64>,
    pub labels: Vec<Diagnosis>,
    pub dropped_columns: Vec<String>,
}

impl Observations {
    /// Drop identifier columns, type the label and every feature cell
    pub fn from_raw(raw: &RawTable, schema: &SchemaConfig) -> Result<Self, AnalysisError> {
        let label_idx = raw
            .headers
            .iter()
            .position(|h| h == &schema.label_column)
            .ok_or_else(|| {
                AnalysisError::Parse(format!(
                    "label column '{}' not found in header",
                    schema.label_column
                ))
            })?;

        let mut feature_cols = Vec::new();
        let mut dropped_columns = Vec::new();
        for (col_idx, header) in raw.headers.iter().enumerate() {
            if col_idx == label_idx {
                continue;
            }
            if schema.id_columns.iter().any(|id| id == header) {
                debug!(column = %header, "dropping identifier column");
                dropped_columns.push(header.clone());
            } else if raw.column_is_blank(col_idx) {
                warn!(column = %header, "dropping column with no values");
                dropped_columns.push(header.clone());
            } else {
                feature_cols.push(col_idx);
            }
        }

        for id in &schema.id_columns {
            if !raw.headers.contains(id) {
                debug!(column = %id, "identifier column not present");
            }
        }

        if feature_cols.is_empty() {
            return Err(AnalysisError::Parse(
                "no feature columns left after dropping identifiers".to_string(),
            ));
        }

        let n_rows = raw.len();
        let n_features = feature_cols.len();
        let mut values = Vec::with_capacity(n_rows * n_features);
        let mut labels = Vec::with_capacity(n_rows);

        for (row_idx, row) in raw.rows.iter().enumerate() {
            let row_no = row_idx + 1;
            let label_cell = &row[label_idx];
            if is_missing(label_cell) {
                return Err(AnalysisError::MissingValue {
                    column: schema.label_column.clone(),
                    row: row_no,
                });
            }
            let label = label_cell.parse::<Diagnosis>().map_err(|e| {
                AnalysisError::Parse(format!("row {}: {}", row_no, e))
            })?;
            labels.push(label);

            for &col_idx in &feature_cols {
                values.push(parse_numeric_cell(&raw.headers[col_idx], row_no, &row[col_idx])?);
            }
        }

        let features = Array2::from_shape_vec((n_rows, n_features), values)
            .map_err(|e| AnalysisError::Parse(format!("failed to build feature matrix: {}", e)))?;
        let feature_names = feature_cols
            .iter()
            .map(|&i| raw.headers[i].clone())
            .collect();

        info!(
            rows = n_rows,
            features = n_features,
            dropped = dropped_columns.len(),
            "cleaned observation table"
        );

        Ok(Self {
            name: raw.name.clone(),
            feature_names,
            features,
            labels,
            dropped_columns,
        })
    }

    /// Get the number of observations
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if there are no observations
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// View one feature column
    pub fn column(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.features.column(idx)
    }

    /// Labels as 0.0 / 1.0 targets
    pub fn label_targets(&self) -> Vec<f64> {
        self.labels.iter().map(|l| l.target()).collect()
    }

    /// Count of (benign, malignant) observations
    pub fn class_balance(&self) -> (usize, usize) {
        let malignant = self.labels.iter().filter(|l| l.is_positive()).count();
        (self.labels.len() - malignant, malignant)
    }
}
