//! Feature assembly
//!
//! Joins the lap table with race conditions, races and tracks into a
//! [`LapFrame`], derives the engineered columns, one-hot encodes the tire
//! compound, splits races (never rows) into train/test groups and finally
//! assembles a [`FeatureMatrix`] in the order fixed by the [`FeatureSchema`].

use crate::config::{EncodingConfig, SplitConfig};
use crate::deterministic::LcgRng;
use crate::errors::{CoreError, EncodingError, JoinError, SchemaError, SplitError};
use crate::schema::{DefaultTable, FeatureSchema, LAP_TIME};
use crate::tables::{TableSet, TrackTable};
use crate::target_encoding::{apply_target_encoding, fit_target_encoding, TargetEncoding};
use crate::types::{Compound, LapRecord, RaceConditionRecord, RaceRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{info, instrument, warn};

/// Categorical column holding the track name
pub const TRACK: &str = "track";

/// Categorical column holding the compound name (empty when unknown)
pub const COMPOUND: &str = "compound";

/// Column-oriented lap table with named numeric and categorical columns.
///
/// Every column has exactly `len()` cells; missing numeric values are NaN.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LapFrame {
    race_ids: Vec<String>,
    categorical: BTreeMap<String, Vec<String>>,
    numeric: BTreeMap<String, Vec<f64>>,
}

impl LapFrame {
    pub fn new(race_ids: Vec<String>) -> Self {
        Self {
            race_ids,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.race_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.race_ids.is_empty()
    }

    pub fn race_ids(&self) -> &[String] {
        &self.race_ids
    }

    pub fn numeric(&self, name: &str) -> Option<&[f64]> {
        self.numeric.get(name).map(Vec::as_slice)
    }

    pub fn categorical(&self, name: &str) -> Option<&[String]> {
        self.categorical.get(name).map(Vec::as_slice)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.numeric.contains_key(name) || self.categorical.contains_key(name)
    }

    /// Add or replace a numeric column
    pub fn insert_numeric(&mut self, name: impl Into<String>, values: Vec<f64>) {
        assert_eq!(values.len(), self.len(), "numeric column length mismatch");
        self.numeric.insert(name.into(), values);
    }

    /// Add or replace a categorical column
    pub fn insert_categorical(&mut self, name: impl Into<String>, values: Vec<String>) {
        assert_eq!(values.len(), self.len(), "categorical column length mismatch");
        self.categorical.insert(name.into(), values);
    }

    /// Distinct race identifiers in sorted order
    pub fn distinct_races(&self) -> BTreeSet<String> {
        self.race_ids.iter().cloned().collect()
    }

    /// New frame holding rows whose race is in `races`, original order kept
    pub fn filter_races(&self, races: &BTreeSet<String>) -> LapFrame {
        let keep: Vec<usize> = self
            .race_ids
            .iter()
            .enumerate()
            .filter(|(_, r)| races.contains(*r))
            .map(|(i, _)| i)
            .collect();
        self.take(&keep)
    }

    /// New frame holding the rows at `indices`, in that order
    pub fn take(&self, indices: &[usize]) -> LapFrame {
        LapFrame {
            race_ids: indices.iter().map(|&i| self.race_ids[i].clone()).collect(),
            categorical: self
                .categorical
                .iter()
                .map(|(k, v)| (k.clone(), indices.iter().map(|&i| v[i].clone()).collect()))
                .collect(),
            numeric: self
                .numeric
                .iter()
                .map(|(k, v)| (k.clone(), indices.iter().map(|&i| v[i]).collect()))
                .collect(),
        }
    }
}

fn opt(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NAN)
}

/// Left-join laps with their race condition, race and track records.
///
/// Every race must have exactly one race-condition record and one race
/// record. A track missing from the track table degrades to a NaN
/// `circuit_length_km`.
pub fn join_tables(
    laps: &[LapRecord],
    conditions: &[RaceConditionRecord],
    races: &[RaceRecord],
    tracks: &TrackTable,
) -> Result<LapFrame, JoinError> {
    let mut by_race: HashMap<&str, &RaceConditionRecord> = HashMap::with_capacity(conditions.len());
    for c in conditions {
        if by_race.insert(&c.race_id, c).is_some() {
            return Err(JoinError::DuplicateRaceCondition(c.race_id.clone()));
        }
    }
    let race_laps: HashMap<&str, u32> = races
        .iter()
        .map(|r| (r.race_id.as_str(), r.total_laps))
        .collect();

    let n = laps.len();
    let mut frame = LapFrame::new(laps.iter().map(|l| l.race_id.clone()).collect());
    let mut race_lap = Vec::with_capacity(n);
    let mut tire_age = Vec::with_capacity(n);
    let mut stint = Vec::with_capacity(n);
    let mut track_temp = Vec::with_capacity(n);
    let mut air_temp = Vec::with_capacity(n);
    let mut is_rain = Vec::with_capacity(n);
    let mut total_laps = Vec::with_capacity(n);
    let mut circuit_length = Vec::with_capacity(n);
    let mut lap_time = Vec::with_capacity(n);
    let mut track = Vec::with_capacity(n);
    let mut compound = Vec::with_capacity(n);
    let mut unresolved = BTreeSet::new();

    for lap in laps {
        let condition = by_race
            .get(lap.race_id.as_str())
            .ok_or_else(|| JoinError::MissingRaceCondition(lap.race_id.clone()))?;
        let laps_in_race = race_laps
            .get(lap.race_id.as_str())
            .ok_or_else(|| JoinError::MissingRace(lap.race_id.clone()))?;

        race_lap.push(f64::from(lap.race_lap));
        tire_age.push(opt(lap.tire_age));
        stint.push(opt(lap.stint.map(f64::from)));
        track_temp.push(condition.track_temp);
        air_temp.push(condition.air_temp);
        is_rain.push(if condition.rain { 1.0 } else { 0.0 });
        total_laps.push(f64::from(*laps_in_race));
        circuit_length.push(match tracks.circuit_length_km(&lap.track) {
            Some(km) => km,
            None => {
                unresolved.insert(lap.track.clone());
                f64::NAN
            }
        });
        lap_time.push(lap.lap_time_sec);
        track.push(lap.track.clone());
        compound.push(lap.compound.map(|c| c.as_str().to_string()).unwrap_or_default());
    }

    if !unresolved.is_empty() {
        warn!(?unresolved, "tracks missing from the track table; circuit length left empty");
    }

    frame.insert_numeric("race_lap", race_lap);
    frame.insert_numeric("tire_age", tire_age);
    frame.insert_numeric("stint", stint);
    frame.insert_numeric("track_temp", track_temp);
    frame.insert_numeric("air_temp", air_temp);
    frame.insert_numeric("is_rain", is_rain);
    frame.insert_numeric("total_laps", total_laps);
    frame.insert_numeric("circuit_length_km", circuit_length);
    frame.insert_numeric(LAP_TIME, lap_time);
    frame.insert_categorical(TRACK, track);
    frame.insert_categorical(COMPOUND, compound);
    Ok(frame)
}

/// Add `tire_age_squared`, `fuel_effect` and `temp_delta`.
///
/// `fuel_effect = 0.5 - race_lap / total_laps`: positive early in the race
/// (heavy car), zero at mid-distance, negative late.
pub fn derive_features(frame: &mut LapFrame) -> Result<(), SchemaError> {
    let column = |name: &str| {
        frame
            .numeric(name)
            .map(<[f64]>::to_vec)
            .ok_or_else(|| SchemaError::MissingColumn(name.to_string()))
    };
    let tire_age = column("tire_age")?;
    let race_lap = column("race_lap")?;
    let total_laps = column("total_laps")?;
    let track_temp = column("track_temp")?;
    let air_temp = column("air_temp")?;

    let squared = tire_age.iter().map(|a| a * a).collect();
    let fuel = race_lap
        .iter()
        .zip(&total_laps)
        .map(|(lap, total)| if *total > 0.0 { 0.5 - lap / total } else { f64::NAN })
        .collect();
    let delta = track_temp.iter().zip(&air_temp).map(|(t, a)| t - a).collect();

    frame.insert_numeric("tire_age_squared", squared);
    frame.insert_numeric("fuel_effect", fuel);
    frame.insert_numeric("temp_delta", delta);
    Ok(())
}

/// One-hot indicators for a single compound; `None` gives all zeros
pub fn compound_indicators(compound: Option<Compound>) -> [(String, f64); 5] {
    Compound::ALL.map(|c| {
        let hot = if Some(c) == compound { 1.0 } else { 0.0 };
        (c.indicator_column(), hot)
    })
}

/// Expand the categorical compound column into one indicator per known
/// compound. Unknown or missing compounds produce all-zero indicators.
pub fn encode_compound(frame: &mut LapFrame) -> Result<(), EncodingError> {
    let parsed: Vec<Option<Compound>> = frame
        .categorical(COMPOUND)
        .ok_or_else(|| EncodingError::MissingCategory(COMPOUND.to_string()))?
        .iter()
        .map(|s| s.parse().ok())
        .collect();

    for compound in Compound::ALL {
        let column = parsed
            .iter()
            .map(|p| if *p == Some(compound) { 1.0 } else { 0.0 })
            .collect();
        frame.insert_numeric(compound.indicator_column(), column);
    }
    Ok(())
}

/// Train/test partition at race granularity
#[derive(Debug, Clone, PartialEq)]
pub struct RaceSplit {
    pub train: LapFrame,
    pub test: LapFrame,
    pub train_races: BTreeSet<String>,
    pub test_races: BTreeSet<String>,
}

/// Partition the distinct race identifiers into train and test groups.
///
/// The test group receives `ceil(races * holdout_fraction)` races chosen by
/// a seeded shuffle of the sorted race ids. All laps of a race land on the
/// same side. Either side ending up empty is an error.
pub fn split_by_race(
    frame: &LapFrame,
    holdout_fraction: f64,
    seed: u64,
) -> Result<RaceSplit, SplitError> {
    if !(holdout_fraction > 0.0 && holdout_fraction < 1.0) {
        return Err(SplitError::InvalidFraction(holdout_fraction));
    }

    let mut races: Vec<String> = frame.distinct_races().into_iter().collect();
    let total = races.len();
    LcgRng::new(seed).shuffle(&mut races);

    // tolerance absorbs float noise such as 0.7 * 10 = 7.000000000000001
    let n_test = ((total as f64 * holdout_fraction) - 1e-9).ceil().max(0.0) as usize;
    if n_test == 0 {
        return Err(SplitError::EmptySide { races: total, side: "test" });
    }
    if n_test >= total {
        return Err(SplitError::EmptySide { races: total, side: "train" });
    }

    let test_races: BTreeSet<String> = races[..n_test].iter().cloned().collect();
    let train_races: BTreeSet<String> = races[n_test..].iter().cloned().collect();

    Ok(RaceSplit {
        train: frame.filter_races(&train_races),
        test: frame.filter_races(&test_races),
        train_races,
        test_races,
    })
}

/// Numeric matrix whose columns follow a feature schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.rows[i]
    }
}

/// Select and order columns into the schema's fixed layout.
///
/// A column absent from the frame is filled from `defaults` when one is
/// given; otherwise the assembly fails with [`SchemaError::MissingColumn`].
pub fn assemble_feature_matrix(
    frame: &LapFrame,
    schema: &FeatureSchema,
    defaults: Option<&DefaultTable>,
) -> Result<FeatureMatrix, SchemaError> {
    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(schema.len());
    for field in &schema.fields {
        let values = match frame.numeric(&field.name) {
            Some(v) => v.to_vec(),
            None => match defaults.and_then(|d| d.get(&field.name)) {
                Some(default) => vec![default; frame.len()],
                None => return Err(SchemaError::MissingColumn(field.name.clone())),
            },
        };
        columns.push(values);
    }

    let rows = (0..frame.len())
        .map(|i| columns.iter().map(|c| c[i]).collect())
        .collect();
    let matrix = FeatureMatrix {
        columns: schema.names(),
        rows,
    };
    schema.validate_columns(&matrix.columns)?;
    Ok(matrix)
}

/// Summary of the race split kept alongside the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub train_races: Vec<String>,
    pub test_races: Vec<String>,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Leakage-free train/test matrices plus the fitted track encoding
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub schema: FeatureSchema,
    pub train: FeatureMatrix,
    pub train_labels: Vec<f64>,
    pub test: FeatureMatrix,
    pub test_labels: Vec<f64>,
    pub encoding: TargetEncoding,
    pub split: SplitSummary,
}

/// Run the full feature assembly over persisted tables.
///
/// Order matters for leakage: the race split happens before any target
/// statistic is computed, the out-of-fold encoding is fitted on training
/// races only and test rows are encoded with the full-training table.
#[instrument(skip_all, fields(laps = tables.laps.len()))]
pub fn build_training_set(
    tables: &TableSet,
    split: &SplitConfig,
    encoding: &EncodingConfig,
) -> Result<TrainingSet, CoreError> {
    let schema = FeatureSchema::lap_time_v1();
    let tracks = TrackTable::new(tables.tracks.clone())?;

    let mut frame = join_tables(&tables.laps, &tables.race_conditions, &tables.races, &tracks)?;
    derive_features(&mut frame)?;
    encode_compound(&mut frame)?;

    let RaceSplit {
        mut train,
        mut test,
        train_races,
        test_races,
    } = split_by_race(&frame, split.holdout_fraction, split.seed)?;
    info!(
        train_races = train_races.len(),
        test_races = test_races.len(),
        train_rows = train.len(),
        test_rows = test.len(),
        "race-grouped split"
    );

    let fitted = fit_target_encoding(
        &mut train,
        TRACK,
        LAP_TIME,
        encoding.fold_count,
        encoding.shuffle_seed,
    )?;
    apply_target_encoding(&mut test, &fitted, TRACK)?;

    let train_matrix = assemble_feature_matrix(&train, &schema, None)?;
    let test_matrix = assemble_feature_matrix(&test, &schema, None)?;
    let labels = |f: &LapFrame| {
        f.numeric(LAP_TIME)
            .map(<[f64]>::to_vec)
            .ok_or_else(|| SchemaError::MissingColumn(LAP_TIME.to_string()))
    };

    Ok(TrainingSet {
        train_labels: labels(&train)?,
        test_labels: labels(&test)?,
        split: SplitSummary {
            train_rows: train_matrix.n_rows(),
            test_rows: test_matrix.n_rows(),
            train_races: train_races.into_iter().collect(),
            test_races: test_races.into_iter().collect(),
        },
        schema,
        train: train_matrix,
        test: test_matrix,
        encoding: fitted,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tables::{baseline_references, track_reference};

    pub(crate) fn lap(race: &str, track: &str, lap_no: u32, compound: Option<Compound>, t: f64) -> LapRecord {
        LapRecord {
            race_id: race.to_string(),
            year: 2024,
            round: 1,
            track: track.to_string(),
            driver: "LEC".to_string(),
            team: "Ferrari".to_string(),
            race_lap: lap_no,
            stint: Some(1),
            compound,
            tire_age: Some(f64::from(lap_no)),
            lap_time_sec: t,
            is_inlap: false,
            is_outlap: false,
            track_temp: None,
            air_temp: None,
            rain: None,
        }
    }

    /// Tables with `races` races of `laps_per_race` laps each
    pub(crate) fn synthetic_tables(races: &[(&str, &str, Compound)], laps_per_race: u32) -> TableSet {
        let mut laps = Vec::new();
        let mut race_rows = Vec::new();
        let mut conditions = Vec::new();
        for (i, (race, track, compound)) in races.iter().enumerate() {
            for n in 1..=laps_per_race {
                let base = 80.0 + 5.0 * i as f64;
                laps.push(lap(race, track, n, Some(*compound), base + 0.1 * f64::from(n)));
            }
            race_rows.push(RaceRecord {
                race_id: race.to_string(),
                year: 2024,
                round: i as u32 + 1,
                track: track.to_string(),
                total_laps: laps_per_race,
                pit_loss_sec: None,
                lap_length_km: None,
            });
            conditions.push(RaceConditionRecord {
                race_id: race.to_string(),
                track_temp: 35.0 + i as f64,
                air_temp: 24.0,
                rain: i % 2 == 1,
            });
        }
        TableSet {
            baselines: baseline_references(&laps),
            laps,
            races: race_rows,
            race_conditions: conditions,
            tracks: track_reference(),
            ..Default::default()
        }
    }

    fn frame_of(tables: &TableSet) -> LapFrame {
        let tracks = TrackTable::new(tables.tracks.clone()).unwrap();
        join_tables(&tables.laps, &tables.race_conditions, &tables.races, &tracks).unwrap()
    }

    #[test]
    fn join_requires_race_conditions() {
        let tables = synthetic_tables(&[("r1", "Monaco Grand Prix", Compound::Soft)], 3);
        let tracks = TrackTable::new(tables.tracks.clone()).unwrap();
        let err = join_tables(&tables.laps, &[], &tables.races, &tracks).unwrap_err();
        assert_eq!(err, JoinError::MissingRaceCondition("r1".into()));

        let doubled = [tables.race_conditions[0].clone(), tables.race_conditions[0].clone()];
        let err = join_tables(&tables.laps, &doubled, &tables.races, &tracks).unwrap_err();
        assert_eq!(err, JoinError::DuplicateRaceCondition("r1".into()));
    }

    #[test]
    fn unresolved_track_yields_missing_length() {
        let tables = synthetic_tables(&[("r1", "Imaginary Grand Prix", Compound::Soft)], 2);
        let frame = frame_of(&tables);
        assert!(frame.numeric("circuit_length_km").unwrap()[0].is_nan());
    }

    #[test]
    fn derived_features() {
        let tables = synthetic_tables(&[("r1", "Monaco Grand Prix", Compound::Soft)], 4);
        let mut frame = frame_of(&tables);
        derive_features(&mut frame).unwrap();

        assert_eq!(frame.numeric("tire_age_squared").unwrap()[2], 9.0);
        assert_eq!(frame.numeric("fuel_effect").unwrap()[1], 0.0);
        assert_eq!(frame.numeric("temp_delta").unwrap()[0], 11.0);
    }

    #[test]
    fn compound_encoding_is_one_hot() {
        let mut tables = synthetic_tables(&[("r1", "Monaco Grand Prix", Compound::Wet)], 2);
        tables.laps[1].compound = None;
        let mut frame = frame_of(&tables);
        encode_compound(&mut frame).unwrap();

        assert_eq!(frame.numeric("compound_WET").unwrap(), &[1.0, 0.0]);
        for c in Compound::ALL.iter().filter(|c| **c != Compound::Wet) {
            assert_eq!(frame.numeric(&c.indicator_column()).unwrap(), &[0.0, 0.0]);
        }
    }

    #[test]
    fn split_keeps_races_together() {
        let tables = synthetic_tables(
            &[
                ("r1", "Monaco Grand Prix", Compound::Soft),
                ("r2", "Dutch Grand Prix", Compound::Hard),
                ("r3", "Italian Grand Prix", Compound::Medium),
                ("r4", "Belgian Grand Prix", Compound::Medium),
                ("r5", "British Grand Prix", Compound::Hard),
            ],
            6,
        );
        let frame = frame_of(&tables);
        let split = split_by_race(&frame, 0.2, 42).unwrap();

        assert_eq!(split.test_races.len(), 1);
        assert_eq!(split.train_races.len(), 4);
        assert!(split.train_races.is_disjoint(&split.test_races));
        assert_eq!(split.train.len() + split.test.len(), frame.len());
        assert!(split.test.race_ids().iter().all(|r| split.test_races.contains(r)));
    }

    #[test]
    fn split_rejects_degenerate_inputs() {
        let tables = synthetic_tables(&[("r1", "Monaco Grand Prix", Compound::Soft)], 3);
        let frame = frame_of(&tables);
        assert!(matches!(
            split_by_race(&frame, 0.5, 1),
            Err(SplitError::EmptySide { side: "train", .. })
        ));
        assert!(matches!(
            split_by_race(&frame, 1.0, 1),
            Err(SplitError::InvalidFraction(_))
        ));
    }

    #[test]
    fn assembly_follows_schema_and_fails_on_missing_column() {
        let tables = synthetic_tables(&[("r1", "Monaco Grand Prix", Compound::Soft)], 3);
        let mut frame = frame_of(&tables);
        derive_features(&mut frame).unwrap();
        encode_compound(&mut frame).unwrap();
        let schema = FeatureSchema::lap_time_v1();

        let err = assemble_feature_matrix(&frame, &schema, None).unwrap_err();
        assert_eq!(err, SchemaError::MissingColumn("track_te".into()));

        let defaults = DefaultTable::lap_time_v1(88.0);
        let matrix = assemble_feature_matrix(&frame, &schema, Some(&defaults)).unwrap();
        assert_eq!(matrix.columns, schema.names());
        assert_eq!(matrix.n_rows(), 3);
        assert_eq!(matrix.row(0)[9], 88.0);
        assert_eq!(matrix.row(0)[13], 1.0);
    }

    #[test]
    fn single_lap_race_is_retained() {
        let mut tables = synthetic_tables(
            &[
                ("r1", "Monaco Grand Prix", Compound::Soft),
                ("r2", "Dutch Grand Prix", Compound::Hard),
            ],
            5,
        );
        tables.laps.retain(|l| l.race_id == "r1" || l.race_lap == 1);
        let frame = frame_of(&tables);
        assert_eq!(frame.len(), 6);
        assert_eq!(frame.distinct_races().len(), 2);
    }

    #[test]
    fn training_set_is_reproducible() {
        let tables = synthetic_tables(
            &[
                ("r1", "Monaco Grand Prix", Compound::Soft),
                ("r2", "Dutch Grand Prix", Compound::Hard),
                ("r3", "Italian Grand Prix", Compound::Medium),
                ("r4", "Belgian Grand Prix", Compound::Wet),
            ],
            10,
        );
        let split = SplitConfig { holdout_fraction: 0.25, seed: 9 };
        let encoding = EncodingConfig::default();

        let a = build_training_set(&tables, &split, &encoding).unwrap();
        let b = build_training_set(&tables, &split, &encoding).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.train.columns, FeatureSchema::lap_time_v1().names());
        assert_eq!(a.split.test_races.len(), 1);
        assert_eq!(a.test.n_rows(), 10);
        assert_eq!(a.train.n_rows(), 30);
        assert_eq!(a.train_labels.len(), 30);
    }
}
