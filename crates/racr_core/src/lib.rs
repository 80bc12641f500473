//! racr core: lap-time data model, feature assembly and inference
//!
//! Modules:
//! - `ingest`: session-source contract and per-season ingestion report
//! - `tables`: normalized tables derived from raw laps
//! - `store`: CSV persistence of the tables
//! - `schema`: versioned feature schema and inference defaults
//! - `features`: joins, derived columns, race-grouped split, matrix assembly
//! - `target_encoding`: out-of-fold track encoding
//! - `gbdt`: regression tree ensemble and the `Predictor` seam
//! - `artifact`: hashed model artifact persisted by training
//! - `inference`: scenario filling, prediction and baseline delta
//! - `config`: TOML + environment configuration

pub mod artifact;
pub mod config;
pub mod deterministic;
pub mod errors;
pub mod features;
pub mod gbdt;
pub mod ingest;
pub mod inference;
pub mod schema;
pub mod serde_canon;
pub mod store;
pub mod tables;
pub mod target_encoding;
pub mod types;

pub use artifact::{EvalMetrics, ModelArtifact};
pub use config::RacrConfig;
pub use deterministic::LcgRng;
pub use errors::{
    CoreError, EncodingError, JoinError, Result, ScenarioError, SchemaError, SplitError,
};
pub use features::{
    assemble_feature_matrix, build_training_set, split_by_race, FeatureMatrix, LapFrame,
    RaceSplit, TrainingSet,
};
pub use gbdt::{Model, Predictor};
pub use inference::{
    compute_delta, fill_defaults, predict_one, LapTimePredictor, ModelHandle, Prediction,
    Scenario,
};
pub use schema::{DefaultTable, FeatureSchema, SCHEMA_VERSION};
pub use store::TableStore;
pub use tables::{BaselineTable, TableSet, TrackTable};
pub use target_encoding::{apply_target_encoding, fit_target_encoding, TargetEncoding};
pub use types::Compound;

/// Crate version string recorded in training reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
