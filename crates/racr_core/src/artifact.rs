//! Persisted model artifact
//!
//! Everything the inference path needs travels together: the feature
//! schema, the fitted track encoding, the default table, the tree ensemble
//! and the evaluation metrics. The artifact is written as canonical JSON
//! with a sibling BLAKE3 digest and is verified on load.

use crate::errors::{Result, SchemaError};
use crate::features::SplitSummary;
use crate::gbdt::Model;
use crate::schema::{DefaultTable, FeatureSchema};
use crate::serde_canon::{
    digest_hex, ensure_finite, from_canonical_json, to_canonical_json, verify_digest,
};
use crate::target_encoding::TargetEncoding;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const ARTIFACT_FILE: &str = "lap_time_model.json";
pub const HASH_FILE: &str = "lap_time_model.hash";

/// Held-out evaluation of the trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub train_rmse: f64,
    pub test_rmse: f64,
    /// Undefined (None) when the test labels have zero variance
    pub test_r2: Option<f64>,
    pub best_iteration: Option<usize>,
    pub rounds: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema: FeatureSchema,
    pub encoding: TargetEncoding,
    pub defaults: DefaultTable,
    pub model: Model,
    pub metrics: EvalMetrics,
    pub split: SplitSummary,
    pub created_at: DateTime<Utc>,
}

impl ModelArtifact {
    /// Check internal consistency before writing or after reading
    pub fn validate(&self) -> Result<()> {
        self.schema.check_version()?;
        self.defaults.covers(&self.schema)?;
        if self.model.n_features != self.schema.len() {
            return Err(SchemaError::WidthMismatch {
                expected: self.schema.len(),
                found: self.model.n_features,
            }
            .into());
        }
        self.model.validate()?;

        ensure_finite("encoding.global_mean", self.encoding.global_mean)?;
        for (track, mean) in &self.encoding.means {
            ensure_finite(&format!("encoding.means.{track}"), *mean)?;
        }
        for field in &self.schema.fields {
            if let Some(value) = self.defaults.get(&field.name) {
                ensure_finite(&format!("defaults.{}", field.name), value)?;
            }
        }
        ensure_finite("metrics.train_rmse", self.metrics.train_rmse)?;
        ensure_finite("metrics.test_rmse", self.metrics.test_rmse)?;
        if let Some(r2) = self.metrics.test_r2 {
            ensure_finite("metrics.test_r2", r2)?;
        }
        Ok(())
    }

    /// Write the artifact and its digest into `dir`; returns the digest
    pub fn save(&self, dir: &Path) -> Result<String> {
        self.validate()?;
        fs::create_dir_all(dir)?;
        let json = to_canonical_json(self)?;
        let digest = digest_hex(&json);
        fs::write(dir.join(ARTIFACT_FILE), &json)?;
        fs::write(dir.join(HASH_FILE), format!("{digest}\n"))?;
        info!(
            trees = self.model.num_trees(),
            digest = %digest,
            "model artifact written to {}",
            dir.display()
        );
        Ok(digest)
    }

    /// Read, verify and validate the artifact in `dir`
    pub fn load(dir: &Path) -> Result<Self> {
        let json = fs::read_to_string(dir.join(ARTIFACT_FILE))?;
        let expected = fs::read_to_string(dir.join(HASH_FILE))?;
        verify_digest(&json, &expected)?;

        let artifact: ModelArtifact = from_canonical_json(&json)?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn path(dir: &Path) -> PathBuf {
        dir.join(ARTIFACT_FILE)
    }
}
