//! End-to-end training run
//!
//! tables → race-grouped training set → boosted trees with early stopping
//! on the held-out races → metrics → model artifact and training report.

use chrono::Utc;
use racr_core::artifact::{EvalMetrics, ModelArtifact};
use racr_core::config::RacrConfig;
use racr_core::features::{build_training_set, SplitSummary};
use racr_core::gbdt::Predictor;
use racr_core::{CoreError, DefaultTable, TableSet, TableStore};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, instrument};

use crate::dataset::{Dataset, FeatureStats};
use crate::errors::TrainerError;
use crate::metrics::{r2, rmse};
use crate::trainer::{EvalSet, GbdtTrainer, Regressor, RoundEval};

pub const REPORT_FILE: &str = "training_report.json";

/// Human-readable summary of a training run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub racr_version: String,
    pub schema_version: u32,
    pub split: SplitSummary,
    pub metrics: EvalMetrics,
    pub eval_names: Vec<String>,
    pub history: Vec<RoundEval>,
    pub features: Vec<FeatureStats>,
    pub tracks_encoded: usize,
    /// BLAKE3 digest of the tree ensemble alone
    pub model_hash: String,
    /// BLAKE3 digest of the saved artifact
    pub artifact_digest: Option<String>,
}

pub struct TrainedModel {
    pub artifact: ModelArtifact,
    pub report: TrainingReport,
}

/// Train on already loaded tables
#[instrument(skip_all)]
pub fn train_from_tables(tables: &TableSet, config: &RacrConfig) -> Result<TrainedModel, TrainerError> {
    let set = build_training_set(tables, &config.split, &config.encoding)?;
    let train = Dataset::new(set.train, set.train_labels)?;
    let test = Dataset::new(set.test, set.test_labels)?;
    info!(
        train_rows = train.len(),
        test_rows = test.len(),
        features = train.feature_count,
        "training set assembled"
    );

    let fit = GbdtTrainer::new(config.training.clone()).fit(
        &train,
        &[EvalSet::new("train", &train), EvalSet::new("test", &test)],
    )?;

    let train_pred: Vec<f64> = train.features.iter().map(|r| fit.model.predict_row(r)).collect();
    let test_pred: Vec<f64> = test.features.iter().map(|r| fit.model.predict_row(r)).collect();
    let metrics = EvalMetrics {
        train_rmse: rmse(&train_pred, &train.targets),
        test_rmse: rmse(&test_pred, &test.targets),
        test_r2: r2(&test_pred, &test.targets),
        best_iteration: fit.best_iteration,
        rounds: fit.model.num_trees(),
    };
    info!(
        test_rmse = metrics.test_rmse,
        test_r2 = ?metrics.test_r2,
        trees = metrics.rounds,
        "held-out evaluation"
    );
    let model_hash = fit.model.hash_hex().map_err(CoreError::from)?;

    let report = TrainingReport {
        racr_version: racr_core::VERSION.to_string(),
        schema_version: set.schema.version,
        split: set.split.clone(),
        metrics: metrics.clone(),
        eval_names: fit.eval_names,
        history: fit.history,
        features: train.feature_stats(),
        tracks_encoded: set.encoding.means.len(),
        model_hash,
        artifact_digest: None,
    };

    let artifact = ModelArtifact {
        defaults: DefaultTable::lap_time_v1(set.encoding.global_mean),
        schema: set.schema,
        encoding: set.encoding,
        model: fit.model,
        metrics,
        split: set.split,
        created_at: Utc::now(),
    };

    Ok(TrainedModel { artifact, report })
}

/// Load tables from `config.data.tables_dir`, train, and write the
/// artifact and report into `config.data.model_dir`
pub fn train_and_save(config: &RacrConfig) -> Result<TrainingReport, TrainerError> {
    let tables = TableStore::new(&config.data.tables_dir).read_all()?;
    let TrainedModel { artifact, mut report } = train_from_tables(&tables, config)?;

    let digest = artifact.save(&config.data.model_dir)?;
    report.artifact_digest = Some(digest);
    write_report(&config.data.model_dir, &report)?;
    Ok(report)
}

pub fn write_report(dir: &Path, report: &TrainingReport) -> Result<(), TrainerError> {
    fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(report)?;
    fs::write(dir.join(REPORT_FILE), json)?;
    Ok(())
}
