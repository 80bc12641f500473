//! Error types for the racr core crate

use thiserror::Error;

/// Violations of the fixed feature-column contract.
///
/// Schema errors are always fatal: a column set that does not match the
/// training-time schema is never coerced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// A required column is absent and has no documented default
    #[error("missing required column `{0}` and no default is defined")]
    MissingColumn(String),

    /// A caller supplied a column the schema does not know about
    #[error("column `{0}` is not part of the feature schema")]
    UnknownColumn(String),

    /// Column names or order differ from the schema descriptor
    #[error("column order mismatch at position {position}: expected `{expected}`, found `{found}`")]
    OrderMismatch {
        position: usize,
        expected: String,
        found: String,
    },

    /// Different number of columns than the schema descriptor
    #[error("expected {expected} columns, found {found}")]
    WidthMismatch { expected: usize, found: usize },

    /// Persisted schema version is not the one compiled into this build
    #[error("unsupported feature schema version {found} (expected {expected})")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Failures of the race-grouped train/test split
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SplitError {
    #[error("holdout fraction must be in (0, 1), got {0}")]
    InvalidFraction(f64),

    #[error("race-grouped split of {races} races produced an empty {side} set")]
    EmptySide { races: usize, side: &'static str },
}

/// Failures while fitting or applying a target encoding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodingError {
    #[error("fold count must be at least 2, got {0}")]
    InvalidFoldCount(usize),

    #[error("cannot build {folds} folds from {rows} rows")]
    TooFewRows { folds: usize, rows: usize },

    #[error("categorical column `{0}` not found")]
    MissingCategory(String),

    #[error("target column `{0}` not found")]
    MissingTarget(String),

    #[error("target column `{0}` contains missing values")]
    MissingTargetValues(String),
}

/// Referential failures when joining the normalized tables
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JoinError {
    #[error("race `{0}` has no race-condition record")]
    MissingRaceCondition(String),

    #[error("race `{0}` has more than one race-condition record")]
    DuplicateRaceCondition(String),

    #[error("race `{0}` has no race record")]
    MissingRace(String),

    #[error("track `{0}` is defined more than once")]
    DuplicateTrack(String),
}

/// Scenario-level failures surfaced to callers of the inference adapter
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("a track must be selected to compute a baseline")]
    MissingTrack,

    #[error("track `{0}` has no baseline reference lap time")]
    NoBaseline(String),

    #[error("feature schema mismatch: {0}")]
    Schema(#[from] SchemaError),

    #[error("model returned a non-finite prediction")]
    NonFinitePrediction,
}

/// Errors that can occur in the racr core crate
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("split error: {0}")]
    Split(#[from] SplitError),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("join error: {0}")]
    Join(#[from] JoinError),

    #[error("scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    #[error("model error: {0}")]
    Model(#[from] crate::gbdt::ModelError),

    #[error("artifact error: {0}")]
    Canonical(#[from] crate::serde_canon::CanonicalError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("data source error: {0}")]
    Source(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for racr core operations
pub type Result<T> = std::result::Result<T, CoreError>;
