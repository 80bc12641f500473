//! Inference adapter
//!
//! Turns a sparse scenario (track, compound, tire age, rain) into a
//! schema-ordered feature row, runs the model and reports the prediction
//! against the track's historical baseline.
//!
//! Sign convention: `delta = predicted - baseline`, so a positive delta
//! means the scenario is slower than the baseline.

use crate::artifact::ModelArtifact;
use crate::errors::{ScenarioError, SchemaError};
use crate::features::compound_indicators;
use crate::gbdt::Predictor;
use crate::schema::{DefaultTable, FeatureSchema, TRACK_ENCODED};
use crate::tables::{BaselineTable, TrackTable};
use crate::types::Compound;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Shared read-only model, loaded once at startup
pub type ModelHandle = Arc<ModelArtifact>;

/// A complete feature row in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub columns: Vec<String>,
    pub values: Vec<f64>,
}

/// Complete a partial row with documented defaults.
///
/// Every schema column absent from `partial` takes its default. A column in
/// `partial` the schema does not know, or a schema column without a default,
/// is a [`SchemaError`]. The result is validated against the schema.
pub fn fill_defaults(
    partial: &BTreeMap<String, f64>,
    schema: &FeatureSchema,
    defaults: &DefaultTable,
) -> Result<FeatureRow, SchemaError> {
    if let Some(unknown) = partial.keys().find(|k| !schema.contains(k)) {
        return Err(SchemaError::UnknownColumn(unknown.clone()));
    }

    let values = schema
        .fields
        .iter()
        .map(|f| {
            partial
                .get(&f.name)
                .copied()
                .or_else(|| defaults.get(&f.name))
                .ok_or_else(|| SchemaError::MissingColumn(f.name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let row = FeatureRow {
        columns: schema.names(),
        values,
    };
    schema.validate_columns(&row.columns)?;
    Ok(row)
}

/// Score one filled row
pub fn predict_one<P: Predictor + ?Sized>(model: &P, row: &FeatureRow) -> Result<f64, ScenarioError> {
    if row.values.len() != model.n_features() {
        return Err(SchemaError::WidthMismatch {
            expected: model.n_features(),
            found: row.values.len(),
        }
        .into());
    }
    let prediction = model.predict_row(&row.values);
    if !prediction.is_finite() {
        return Err(ScenarioError::NonFinitePrediction);
    }
    Ok(prediction)
}

/// Signed difference `predicted - baseline` (positive = slower)
pub fn compute_delta(baseline_seconds: f64, predicted_seconds: f64) -> f64 {
    predicted_seconds - baseline_seconds
}

/// Sparse scenario request; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub compound: Option<Compound>,
    #[serde(default)]
    pub tire_age: Option<f64>,
    #[serde(default)]
    pub rain: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub baseline_seconds: f64,
    pub predicted_seconds: f64,
    pub delta_seconds: f64,
}

/// Inference service over an injected model handle and reference tables
#[derive(Debug, Clone)]
pub struct LapTimePredictor {
    model: ModelHandle,
    tracks: TrackTable,
    baselines: BaselineTable,
}

impl LapTimePredictor {
    pub fn new(model: ModelHandle, tracks: TrackTable, baselines: BaselineTable) -> Self {
        Self {
            model,
            tracks,
            baselines,
        }
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.model
    }

    pub fn tracks(&self) -> &TrackTable {
        &self.tracks
    }

    /// Tracks with a baseline, i.e. the ones a scenario can be run for
    pub fn predictable_tracks(&self) -> Vec<&str> {
        self.tracks
            .names()
            .into_iter()
            .filter(|t| self.baselines.get(t).is_some())
            .collect()
    }

    /// Sparse column map for a scenario, before defaults
    pub fn scenario_columns(&self, scenario: &Scenario, track: &str) -> BTreeMap<String, f64> {
        let mut partial = BTreeMap::new();

        partial.insert(TRACK_ENCODED.to_string(), self.model.encoding.encode(track));
        // same NaN the training join writes for an unresolved track
        let km = self.tracks.circuit_length_km(track).unwrap_or(f64::NAN);
        partial.insert("circuit_length_km".to_string(), km);
        if let Some(age) = scenario.tire_age {
            partial.insert("tire_age".to_string(), age);
            partial.insert("tire_age_squared".to_string(), age * age);
        }
        if let Some(rain) = scenario.rain {
            partial.insert("is_rain".to_string(), if rain { 1.0 } else { 0.0 });
        }
        if scenario.compound.is_some() {
            partial.extend(compound_indicators(scenario.compound));
        }
        partial
    }

    /// Schema-ordered row the model scores for a scenario at `track`
    pub fn scenario_row(&self, scenario: &Scenario, track: &str) -> Result<FeatureRow, ScenarioError> {
        let partial = self.scenario_columns(scenario, track);
        Ok(fill_defaults(&partial, &self.model.schema, &self.model.defaults)?)
    }

    #[instrument(skip(self, scenario), fields(track = scenario.track.as_deref()))]
    pub fn predict(&self, scenario: &Scenario) -> Result<Prediction, ScenarioError> {
        let track = scenario
            .track
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ScenarioError::MissingTrack)?;
        let baseline = self
            .baselines
            .get(track)
            .ok_or_else(|| ScenarioError::NoBaseline(track.to_string()))?;

        let row = self.scenario_row(scenario, track)?;
        let predicted = predict_one(&self.model.model, &row)?;
        let delta = compute_delta(baseline, predicted);
        debug!(baseline, predicted, delta, "scenario scored");

        Ok(Prediction {
            baseline_seconds: baseline,
            predicted_seconds: predicted,
            delta_seconds: delta,
        })
    }
}

/// `83.456` → `1:23.456`; negative values keep their sign
pub fn format_lap_time(seconds: f64) -> String {
    if !seconds.is_finite() {
        return "--:--.---".to_string();
    }
    let sign = if seconds < 0.0 { "-" } else { "" };
    let millis = (seconds.abs() * 1000.0).round() as u64;
    format!(
        "{sign}{}:{:02}.{:03}",
        millis / 60_000,
        (millis / 1000) % 60,
        millis % 1000
    )
}
