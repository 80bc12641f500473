//! Boosted regression ensemble
//!
//! A prediction is `base_score + Σ tree.weight * leaf(tree, x)`. Models
//! serialize to canonical JSON so the same ensemble always hashes the same.

use super::tree::Tree;
use super::Predictor;
use crate::serde_canon::{ensure_finite, hash_canonical_hex, CanonicalError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model validation failed: {0}")]
    ValidationFailed(String),

    #[error("Canonical serialization error: {0}")]
    CanonicalError(#[from] CanonicalError),
}

/// Model format version written by this build
pub const MODEL_VERSION: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    pub version: i32,

    /// Width of the feature vector the trees index into
    pub n_features: usize,

    /// Starting prediction before any tree (mean training label)
    pub base_score: f64,

    pub trees: Vec<Tree>,

    /// Round with the best evaluation score when early stopping was active
    #[serde(default)]
    pub best_iteration: Option<usize>,
}

impl Model {
    pub fn new(n_features: usize, base_score: f64, trees: Vec<Tree>) -> Self {
        Self {
            version: MODEL_VERSION,
            n_features,
            base_score,
            trees,
            best_iteration: None,
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.version != MODEL_VERSION {
            return Err(ModelError::ValidationFailed(format!(
                "Unsupported model version: {}",
                self.version
            )));
        }
        ensure_finite("base_score", self.base_score)?;
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features).map_err(|e| {
                ModelError::ValidationFailed(format!("Tree {i} validation failed: {e}"))
            })?;
        }
        Ok(())
    }

    /// Score one feature vector
    pub fn score(&self, features: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.evaluate(features)).sum::<f64>()
    }

    /// Drop trees past `rounds`
    pub fn truncate(&mut self, rounds: usize) {
        self.trees.truncate(rounds);
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// BLAKE3 digest of the canonical JSON form
    pub fn hash_hex(&self) -> Result<String, ModelError> {
        Ok(hash_canonical_hex(self)?)
    }
}

impl Predictor for Model {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.score(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbdt::tree::Node;

    fn create_test_model() -> Model {
        let tree1 = Tree::new(
            vec![
                Node::internal(0, 0, 50.0, 1, 2),
                Node::leaf(1, 10.0),
                Node::leaf(2, 20.0),
            ],
            0.5,
        );
        let tree2 = Tree::new(
            vec![
                Node::internal(0, 1, 30.0, 1, 2),
                Node::leaf(1, -4.0),
                Node::leaf(2, 4.0),
            ],
            0.5,
        );
        Model::new(2, 90.0, vec![tree1, tree2])
    }

    #[test]
    fn test_model_creation() {
        let model = create_test_model();
        assert_eq!(model.version, MODEL_VERSION);
        assert_eq!(model.num_trees(), 2);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_model_inference() {
        let model = create_test_model();
        // 90 + 0.5 * 10 + 0.5 * -4
        assert_eq!(model.score(&[30.0, 20.0]), 93.0);
        // 90 + 0.5 * 20 + 0.5 * 4
        assert_eq!(model.score(&[60.0, 40.0]), 102.0);
    }

    #[test]
    fn test_truncate_keeps_leading_trees() {
        let mut model = create_test_model();
        model.truncate(1);
        assert_eq!(model.num_trees(), 1);
        // 90 + 0.5 * 20
        assert_eq!(model.score(&[60.0, 40.0]), 100.0);
    }

    #[test]
    fn test_hash_changes_with_leaf() {
        let a = create_test_model();
        let mut b = a.clone();
        b.trees[0].nodes[1].leaf = Some(11.0);
        assert_ne!(a.hash_hex().unwrap(), b.hash_hex().unwrap());
    }

    #[test]
    fn test_validate_rejects_out_of_range_feature() {
        let mut model = create_test_model();
        model.n_features = 1;
        assert!(matches!(model.validate(), Err(ModelError::ValidationFailed(_))));
    }
}
