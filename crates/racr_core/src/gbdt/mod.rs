//! Gradient-boosted regression trees
//!
//! Inference side of the boosted-tree regressor: node and tree layout,
//! the ensemble model and its canonical hash, and the
//! [`Predictor`] seam the inference adapter is written against.
//!
//! # Model Format
//!
//! ```json
//! {
//!   "base_score": 88.4,
//!   "best_iteration": 212,
//!   "n_features": 16,
//!   "trees": [
//!     {
//!       "nodes": [
//!         {"cover":800.0,"feature_idx":9,"gain":51.2,"id":0,"leaf":null,"left":1,"right":2,"threshold":84.1},
//!         {"cover":410.0,"feature_idx":-1,"gain":0.0,"id":1,"leaf":-3.2,"left":-1,"right":-1,"threshold":0.0},
//!         {"cover":390.0,"feature_idx":-1,"gain":0.0,"id":2,"leaf":4.7,"left":-1,"right":-1,"threshold":0.0}
//!       ],
//!       "weight": 0.03
//!     }
//!   ],
//!   "version": 1
//! }
//! ```

pub mod model;
pub mod tree;

pub use model::{Model, ModelError, MODEL_VERSION};
pub use tree::{Node, Tree};

use crate::features::FeatureMatrix;

/// Anything that maps a schema-ordered feature row to a lap time
pub trait Predictor: Send + Sync {
    /// Width of the rows this predictor expects
    fn n_features(&self) -> usize;

    fn predict_row(&self, row: &[f64]) -> f64;

    fn predict(&self, matrix: &FeatureMatrix) -> Vec<f64> {
        matrix.rows.iter().map(|r| self.predict_row(r)).collect()
    }
}
