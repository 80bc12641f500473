//! racr trainer: deterministic boosted-tree lap-time regressor
//!
//! Fits second-order boosted regression trees on the race-grouped
//! training set assembled by `racr-core` and packages the result as a
//! hashed model artifact.

pub mod cart;
pub mod dataset;
pub mod errors;
pub mod metrics;
pub mod pipeline;
pub mod trainer;

pub use dataset::{Dataset, FeatureStats};
pub use errors::TrainerError;
pub use pipeline::{train_and_save, train_from_tables, TrainedModel, TrainingReport};
pub use trainer::{EvalSet, FitResult, GbdtTrainer, Regressor, RoundEval};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
