//! Versioned feature schema shared by the training and inference paths
//!
//! The schema is the single source of truth for column names and order. It
//! is embedded in the model artifact and checked whenever a feature matrix is
//! written (training) or read back (artifact load, scenario filling).

use crate::errors::SchemaError;
use crate::types::Compound;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current schema version compiled into this build
pub const SCHEMA_VERSION: u32 = 1;

/// Name of the target-encoded track column
pub const TRACK_ENCODED: &str = "track_te";

/// Name of the label column
pub const LAP_TIME: &str = "lap_time_sec";

/// Semantic type of a feature column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Real-valued measurement
    Continuous,
    /// Non-negative integer count stored as a float
    Count,
    /// 0/1 flag
    Flag,
    /// One-hot indicator for a categorical value
    Indicator,
    /// Target-encoded categorical value
    Encoded,
}

/// A named, typed column of the feature vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureField {
    pub name: String,
    pub kind: FieldKind,
}

impl FeatureField {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered list of feature fields with a version tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fields: Vec<FeatureField>,
}

impl FeatureSchema {
    /// The lap-time schema (version 1).
    pub fn lap_time_v1() -> Self {
        use FieldKind::*;

        let mut fields = vec![
            FeatureField::new("tire_age_squared", Continuous),
            FeatureField::new("fuel_effect", Continuous),
            FeatureField::new("temp_delta", Continuous),
            FeatureField::new("race_lap", Count),
            FeatureField::new("tire_age", Count),
            FeatureField::new("stint", Count),
            FeatureField::new("track_temp", Continuous),
            FeatureField::new("air_temp", Continuous),
            FeatureField::new("is_rain", Flag),
            FeatureField::new(TRACK_ENCODED, Encoded),
        ];
        fields.extend(
            Compound::ALL
                .iter()
                .map(|c| FeatureField::new(c.indicator_column(), Indicator)),
        );
        fields.push(FeatureField::new("circuit_length_km", Continuous));

        Self {
            version: SCHEMA_VERSION,
            fields,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Column names in schema order
    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Reject a schema persisted by an incompatible build
    pub fn check_version(&self) -> Result<(), SchemaError> {
        if self.version != SCHEMA_VERSION {
            return Err(SchemaError::VersionMismatch {
                expected: SCHEMA_VERSION,
                found: self.version,
            });
        }
        Ok(())
    }

    /// Verify that `columns` matches this schema exactly, names and order.
    pub fn validate_columns<S: AsRef<str>>(&self, columns: &[S]) -> Result<(), SchemaError> {
        if columns.len() != self.fields.len() {
            return Err(SchemaError::WidthMismatch {
                expected: self.fields.len(),
                found: columns.len(),
            });
        }

        for (position, (field, found)) in self.fields.iter().zip(columns).enumerate() {
            if field.name != found.as_ref() {
                return Err(SchemaError::OrderMismatch {
                    position,
                    expected: field.name.clone(),
                    found: found.as_ref().to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Documented per-column defaults used to complete sparse inference rows
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DefaultTable {
    values: BTreeMap<String, f64>,
}

impl DefaultTable {
    /// Defaults for the v1 lap-time schema.
    ///
    /// `track_te` is the global lap-time mean of the training set, so it is
    /// supplied by the caller that fitted the encoding.
    pub fn lap_time_v1(track_global_mean: f64) -> Self {
        let mut values = BTreeMap::new();
        values.insert("tire_age_squared".to_string(), 1.0);
        values.insert("fuel_effect".to_string(), 0.0);
        values.insert("temp_delta".to_string(), 0.0);
        values.insert("race_lap".to_string(), 1.0);
        values.insert("tire_age".to_string(), 1.0);
        values.insert("stint".to_string(), 1.0);
        values.insert("track_temp".to_string(), 30.0);
        values.insert("air_temp".to_string(), 25.0);
        values.insert("is_rain".to_string(), 0.0);
        values.insert(TRACK_ENCODED.to_string(), track_global_mean);
        for compound in Compound::ALL {
            values.insert(compound.indicator_column(), 0.0);
        }
        values.insert("circuit_length_km".to_string(), 0.0);
        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }

    pub fn set(&mut self, column: impl Into<String>, value: f64) {
        self.values.insert(column.into(), value);
    }

    /// Every schema column must have a default for the table to be usable
    pub fn covers(&self, schema: &FeatureSchema) -> Result<(), SchemaError> {
        for field in &schema.fields {
            if !self.values.contains_key(&field.name) {
                return Err(SchemaError::MissingColumn(field.name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_schema_has_sixteen_columns_in_order() {
        let schema = FeatureSchema::lap_time_v1();
        assert_eq!(schema.len(), 16);
        assert_eq!(schema.fields[0].name, "tire_age_squared");
        assert_eq!(schema.position(TRACK_ENCODED), Some(9));
        assert_eq!(schema.fields[10].name, "compound_HARD");
        assert_eq!(schema.fields[15].name, "circuit_length_km");
    }

    #[test]
    fn validate_rejects_reordered_columns() {
        let schema = FeatureSchema::lap_time_v1();
        let mut names = schema.names();
        assert!(schema.validate_columns(&names).is_ok());

        names.swap(0, 1);
        let err = schema.validate_columns(&names).unwrap_err();
        assert_eq!(
            err,
            SchemaError::OrderMismatch {
                position: 0,
                expected: "tire_age_squared".into(),
                found: "fuel_effect".into(),
            }
        );
    }

    #[test]
    fn validate_rejects_missing_columns() {
        let schema = FeatureSchema::lap_time_v1();
        let names = &schema.names()[..15];
        assert!(matches!(
            schema.validate_columns(names),
            Err(SchemaError::WidthMismatch { expected: 16, found: 15 })
        ));
    }

    #[test]
    fn defaults_cover_v1_schema() {
        let defaults = DefaultTable::lap_time_v1(90.3);
        assert!(defaults.covers(&FeatureSchema::lap_time_v1()).is_ok());
        assert_eq!(defaults.get(TRACK_ENCODED), Some(90.3));
        assert_eq!(defaults.get("tire_age"), Some(1.0));
    }

    #[test]
    fn version_check() {
        let mut schema = FeatureSchema::lap_time_v1();
        assert!(schema.check_version().is_ok());
        schema.version = 7;
        assert!(schema.check_version().is_err());
    }
}
