//! Integration tests for the lap-time training pipeline
//!
//! Covers the race-grouped holdout, reproducibility of the artifact, the
//! scenario path over a freshly trained model and fold-count limits.

use racr_core::artifact::ModelArtifact;
use racr_core::config::RacrConfig;
use racr_core::gbdt::Predictor;
use racr_core::tables::{baseline_references, track_reference};
use racr_core::types::{Compound, LapRecord, RaceConditionRecord, RaceRecord};
use racr_core::{
    BaselineTable, CoreError, EncodingError, LapTimePredictor, Scenario, ScenarioError, TableSet,
    TableStore, TrackTable,
};
use racr_trainer::{train_and_save, train_from_tables, TrainerError};
use std::sync::Arc;

const MONACO: &str = "Monaco Grand Prix";
const SPA: &str = "Belgian Grand Prix";

const IMAGINARY: &str = "Imaginary Grand Prix";

fn race_laps(race_id: &str, track: &str, compound: Compound, base: f64, laps: u32) -> Vec<LapRecord> {
    (1..=laps)
        .map(|lap| LapRecord {
            race_id: race_id.to_string(),
            year: 2024,
            round: 1,
            track: track.to_string(),
            driver: "NOR".to_string(),
            team: "McLaren".to_string(),
            race_lap: lap,
            stint: Some(1),
            compound: Some(compound),
            tire_age: Some(f64::from(lap)),
            lap_time_sec: base + 0.08 * f64::from(lap),
            is_inlap: false,
            is_outlap: false,
            track_temp: Some(40.0),
            air_temp: Some(26.0),
            rain: Some(false),
        })
        .collect()
}

/// One race per `(race id, track, compound, base lap time)`, `laps` laps each
fn race_tables(races: &[(&str, &str, Compound, f64)], laps: u32) -> TableSet {
    let lap_rows: Vec<LapRecord> = races
        .iter()
        .flat_map(|&(id, track, compound, base)| race_laps(id, track, compound, base, laps))
        .collect();
    let race_rows = races
        .iter()
        .enumerate()
        .map(|(i, &(id, track, _, _))| RaceRecord {
            race_id: id.to_string(),
            year: 2024,
            round: i as u32 + 1,
            track: track.to_string(),
            total_laps: laps,
            pit_loss_sec: None,
            lap_length_km: None,
        })
        .collect();
    let race_conditions = races
        .iter()
        .map(|&(id, _, _, _)| RaceConditionRecord {
            race_id: id.to_string(),
            track_temp: 40.0,
            air_temp: 26.0,
            rain: false,
        })
        .collect();

    TableSet {
        baselines: baseline_references(&lap_rows),
        laps: lap_rows,
        races: race_rows,
        race_conditions,
        tracks: track_reference(),
        ..Default::default()
    }
}

/// Two races of ten laps each on different compounds
fn two_race_tables() -> TableSet {
    race_tables(
        &[
            ("2024_08_Monaco_Grand_Prix", MONACO, Compound::Soft, 75.0),
            ("2024_14_Belgian_Grand_Prix", SPA, Compound::Hard, 107.0),
        ],
        10,
    )
}

fn config() -> RacrConfig {
    let mut config = RacrConfig::default();
    config.split.holdout_fraction = 0.5;
    config.training.min_child_weight = 1.0;
    config.training.num_boost_round = 60;
    config.training.verbose_eval = 0;
    config
}

#[test]
fn test_one_race_per_side() {
    let trained = train_from_tables(&two_race_tables(), &config()).unwrap();
    let split = &trained.artifact.split;

    assert_eq!(split.train_races.len(), 1);
    assert_eq!(split.test_races.len(), 1);
    assert_ne!(split.train_races[0], split.test_races[0]);
    assert_eq!(split.train_rows, 10);
    assert_eq!(split.test_rows, 10);
    assert_eq!(trained.report.eval_names, vec!["train", "test"]);
    assert!(trained.artifact.metrics.test_rmse.is_finite());
}

#[test]
fn test_held_out_track_scenario() {
    let tables = two_race_tables();
    let trained = train_from_tables(&tables, &config()).unwrap();
    let held_out = trained.artifact.split.test_races[0].clone();
    let track = if held_out.contains("Monaco") { MONACO } else { SPA };

    let predictor = LapTimePredictor::new(
        Arc::new(trained.artifact),
        TrackTable::new(tables.tracks.clone()).unwrap(),
        BaselineTable::new(&tables.baselines),
    );
    let prediction = predictor
        .predict(&Scenario {
            track: Some(track.to_string()),
            tire_age: Some(1.0),
            rain: Some(false),
            ..Default::default()
        })
        .unwrap();

    assert!(prediction.predicted_seconds.is_finite());
    assert!(prediction.delta_seconds.is_finite());
    assert_eq!(
        prediction.delta_seconds,
        prediction.predicted_seconds - prediction.baseline_seconds
    );

    let missing = predictor.predict(&Scenario {
        track: Some("Dutch Grand Prix".to_string()),
        ..Default::default()
    });
    assert!(matches!(missing, Err(ScenarioError::NoBaseline(_))));
}

#[test]
fn test_deterministic_training() {
    let tables = two_race_tables();
    let a = train_from_tables(&tables, &config()).unwrap();
    let b = train_from_tables(&tables, &config()).unwrap();

    assert_eq!(a.artifact.model, b.artifact.model);
    assert_eq!(a.artifact.encoding, b.artifact.encoding);
    assert_eq!(a.report.model_hash, b.report.model_hash);
    assert_eq!(a.report.model_hash, a.artifact.model.hash_hex().unwrap());
}

#[test]
fn test_train_and_save_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.data.tables_dir = dir.path().join("data");
    config.data.model_dir = dir.path().join("models");
    TableStore::new(&config.data.tables_dir)
        .write_all(&two_race_tables())
        .unwrap();

    let report = train_and_save(&config).unwrap();
    let digest = report.artifact_digest.clone().unwrap();
    assert_eq!(digest.len(), 64);
    assert!(config.data.model_dir.join("training_report.json").exists());

    let artifact = ModelArtifact::load(&config.data.model_dir).unwrap();
    assert_eq!(artifact.metrics.rounds, report.metrics.rounds);
    assert!((artifact.metrics.test_rmse - report.metrics.test_rmse).abs() < 1e-9);
    assert_eq!(artifact.schema.len(), 16);
}

#[test]
fn test_track_missing_from_track_table_scores_like_training() {
    let tables = race_tables(
        &[
            ("2024_08_Monaco_Grand_Prix", MONACO, Compound::Soft, 75.0),
            ("2024_14_Belgian_Grand_Prix", SPA, Compound::Hard, 107.0),
            ("2024_30_Imaginary_Grand_Prix", IMAGINARY, Compound::Medium, 110.0),
        ],
        10,
    );
    let mut config = config();
    config.split.holdout_fraction = 0.3;
    let trained = train_from_tables(&tables, &config).unwrap();
    let model = trained.artifact.model.clone();

    let predictor = LapTimePredictor::new(
        Arc::new(trained.artifact),
        TrackTable::new(tables.tracks.clone()).unwrap(),
        BaselineTable::new(&tables.baselines),
    );
    let scenario = Scenario {
        track: Some(IMAGINARY.to_string()),
        ..Default::default()
    };
    let row = predictor.scenario_row(&scenario, IMAGINARY).unwrap();
    assert_eq!(row.columns[15], "circuit_length_km");
    assert!(row.values[15].is_nan());

    let prediction = predictor.predict(&scenario).unwrap();
    assert_eq!(prediction.predicted_seconds, model.predict_row(&row.values));
    assert!(prediction.delta_seconds.is_finite());
}

#[test]
fn test_fewer_training_laps_than_folds_is_fatal() {
    let tables = race_tables(
        &[
            ("2024_08_Monaco_Grand_Prix", MONACO, Compound::Soft, 75.0),
            ("2024_14_Belgian_Grand_Prix", SPA, Compound::Hard, 107.0),
        ],
        3,
    );
    let err = train_from_tables(&tables, &config()).err().unwrap();
    assert!(matches!(
        err,
        TrainerError::Core(CoreError::Encoding(EncodingError::TooFewRows { folds: 5, rows: 3 }))
    ));

    let mut config = config();
    config.encoding.fold_count = 3;
    assert!(train_from_tables(&tables, &config).is_ok());
}
