//! Training dataset
//!
//! Wraps a schema-ordered feature matrix and its lap-time labels. Missing
//! feature values (NaN) are allowed; missing labels are not.

use racr_core::FeatureMatrix;
use serde::{Deserialize, Serialize};

use crate::errors::TrainerError;

#[derive(Clone, Debug)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub feature_count: usize,
}

/// Per-column summary written to the training report
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub name: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub missing: usize,
}

impl Dataset {
    pub fn new(matrix: FeatureMatrix, targets: Vec<f64>) -> Result<Self, TrainerError> {
        if matrix.is_empty() {
            return Err(TrainerError::Dataset("Dataset is empty".to_string()));
        }
        if matrix.n_rows() != targets.len() {
            return Err(TrainerError::Dataset(format!(
                "{} rows but {} labels",
                matrix.n_rows(),
                targets.len()
            )));
        }

        let feature_count = matrix.n_features();
        if let Some(i) = matrix.rows.iter().position(|r| r.len() != feature_count) {
            return Err(TrainerError::Dataset(format!(
                "Row {}: expected {} features, got {}",
                i,
                feature_count,
                matrix.rows[i].len()
            )));
        }
        if let Some(i) = targets.iter().position(|t| !t.is_finite()) {
            return Err(TrainerError::Dataset(format!("Row {i}: label is missing")));
        }

        Ok(Self {
            columns: matrix.columns,
            features: matrix.rows,
            targets,
            feature_count,
        })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn mean_target(&self) -> f64 {
        self.targets.iter().sum::<f64>() / self.targets.len() as f64
    }

    /// Min, max and missing count per feature
    pub fn feature_stats(&self) -> Vec<FeatureStats> {
        (0..self.feature_count)
            .map(|j| {
                let mut stats = FeatureStats {
                    name: self.columns[j].clone(),
                    min: None,
                    max: None,
                    missing: 0,
                };
                for row in &self.features {
                    let v = row[j];
                    if v.is_nan() {
                        stats.missing += 1;
                        continue;
                    }
                    stats.min = Some(stats.min.map_or(v, |m| m.min(v)));
                    stats.max = Some(stats.max.map_or(v, |m| m.max(v)));
                }
                stats
            })
            .collect()
    }
}
