//! Raw session ingestion
//!
//! The telemetry provider is an external collaborator reached through the
//! [`SessionSource`] trait. A season run never fails because one race could
//! not be loaded: each race yields a [`RaceOutcome`] and the outcomes are
//! aggregated into an [`IngestionReport`].

use crate::errors::{CoreError, Result};
use crate::types::{CircuitPoint, Compound, PointKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// One scheduled event of a season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    pub round: u32,
    pub event_name: String,
}

/// A lap exactly as the provider reports it. Times are seconds from session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderLap {
    pub driver: String,
    pub team: String,
    pub lap_number: u32,
    pub stint: Option<u32>,
    pub compound: Option<Compound>,
    pub tyre_life: Option<f64>,
    pub lap_time: Option<f64>,
    pub lap_start_time: Option<f64>,
    pub pit_in_time: Option<f64>,
    pub pit_out_time: Option<f64>,
}

/// Weather sample reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    pub time: f64,
    pub track_temp: f64,
    pub air_temp: f64,
    pub rainfall: bool,
}

/// Geometry point of a circuit as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPoint {
    #[serde(rename = "type")]
    pub kind: PointKind,
    pub x: f64,
    pub y: f64,
    pub corner: Option<String>,
    pub angle: Option<f64>,
}

/// Everything the provider returns for one race session
#[derive(Debug, Clone, Default)]
pub struct RaceSession {
    pub laps: Vec<ProviderLap>,
    pub weather: Vec<WeatherSample>,
    pub geometry: Vec<ProviderPoint>,
}

/// Contract of the external telemetry provider
pub trait SessionSource {
    /// Events scheduled for `year`, in round order
    fn schedule(&self, year: i32) -> Result<Vec<EventInfo>>;

    /// Load the race session of one event
    fn load_race(&self, year: i32, event: &EventInfo) -> Result<RaceSession>;
}

/// A provider lap stamped with race metadata and its nearest weather sample
#[derive(Debug, Clone, PartialEq)]
pub struct RawLap {
    pub race_id: String,
    pub year: i32,
    pub round: u32,
    pub track: String,
    pub lap: ProviderLap,
    pub weather: Option<WeatherSample>,
}

/// Flat per-lap record set for a season, plus circuit geometry
#[derive(Debug, Clone, Default)]
pub struct RawSeason {
    pub laps: Vec<RawLap>,
    pub circuits: Vec<CircuitPoint>,
}

/// Result of ingesting one race
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RaceOutcome {
    Loaded { race_id: String, laps: usize },
    Skipped { event_name: String, reason: String },
}

/// Per-run summary of which races were loaded or skipped and why
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestionReport {
    pub year: i32,
    pub outcomes: Vec<RaceOutcome>,
}

impl IngestionReport {
    pub fn loaded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, RaceOutcome::Loaded { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.loaded()
    }

    /// `(event name, reason)` for every skipped race
    pub fn skip_reasons(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                RaceOutcome::Skipped { event_name, reason } => {
                    Some((event_name.as_str(), reason.as_str()))
                }
                RaceOutcome::Loaded { .. } => None,
            })
            .collect()
    }
}

/// `{year}_{round:02}_{event name with spaces replaced by underscores}`
pub fn race_id(year: i32, round: u32, event_name: &str) -> String {
    format!("{year}_{round:02}_{}", event_name.replace(' ', "_"))
}

/// Ingest every race of a season, skipping races that fail to load.
#[instrument(skip(source))]
pub fn ingest_season<S: SessionSource + ?Sized>(
    source: &S,
    year: i32,
) -> Result<(RawSeason, IngestionReport)> {
    let schedule = source.schedule(year)?;
    let mut season = RawSeason::default();
    let mut report = IngestionReport {
        year,
        outcomes: Vec::with_capacity(schedule.len()),
    };

    for event in &schedule {
        let outcome = match source.load_race(year, event) {
            Ok(session) if session.laps.is_empty() => skip(event, "session has no laps".into()),
            Ok(session) => {
                let id = race_id(year, event.round, &event.event_name);
                let laps = stamp_laps(&id, year, event, session.laps, &session.weather);
                let count = laps.len();
                season.laps.extend(laps);
                season
                    .circuits
                    .extend(stamp_geometry(&id, year, event, session.geometry));
                info!("Loaded {}", event.event_name);
                RaceOutcome::Loaded { race_id: id, laps: count }
            }
            Err(err) => skip(event, err.to_string()),
        };
        report.outcomes.push(outcome);
    }

    info!(
        loaded = report.loaded(),
        skipped = report.skipped(),
        "season {} ingestion finished",
        year
    );
    Ok((season, report))
}

fn skip(event: &EventInfo, reason: String) -> RaceOutcome {
    warn!("Failed {}: {}", event.event_name, reason);
    RaceOutcome::Skipped {
        event_name: event.event_name.clone(),
        reason,
    }
}

fn stamp_laps(
    race_id: &str,
    year: i32,
    event: &EventInfo,
    mut laps: Vec<ProviderLap>,
    weather: &[WeatherSample],
) -> Vec<RawLap> {
    let mut samples = weather.to_vec();
    samples.sort_by(|a, b| a.time.total_cmp(&b.time));
    laps.sort_by(|a, b| match (a.lap_start_time, b.lap_start_time) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    laps.into_iter()
        .map(|lap| {
            let weather = lap
                .lap_start_time
                .and_then(|t| nearest_sample(&samples, t))
                .cloned();
            RawLap {
                race_id: race_id.to_string(),
                year,
                round: event.round,
                track: event.event_name.clone(),
                lap,
                weather,
            }
        })
        .collect()
}

/// Nearest sample by time in a time-sorted slice; ties resolve to the earlier sample.
pub fn nearest_sample(sorted: &[WeatherSample], time: f64) -> Option<&WeatherSample> {
    if sorted.is_empty() || !time.is_finite() {
        return None;
    }
    let idx = sorted.partition_point(|s| s.time < time);
    let after = sorted.get(idx);
    let before = idx.checked_sub(1).and_then(|i| sorted.get(i));
    match (before, after) {
        (Some(b), Some(a)) => {
            if (time - b.time) <= (a.time - time) {
                Some(b)
            } else {
                Some(a)
            }
        }
        (Some(b), None) => Some(b),
        (None, a) => a,
    }
}

fn stamp_geometry(
    race_id: &str,
    year: i32,
    event: &EventInfo,
    points: Vec<ProviderPoint>,
) -> Vec<CircuitPoint> {
    let mut seq = 0u32;
    points
        .into_iter()
        .map(|p| {
            let seq = match p.kind {
                PointKind::Track => {
                    seq += 1;
                    Some(seq - 1)
                }
                PointKind::Corner => None,
            };
            CircuitPoint {
                race_id: race_id.to_string(),
                year,
                round: event.round,
                track: event.event_name.clone(),
                kind: p.kind,
                x: p.x,
                y: p.y,
                seq,
                corner: p.corner,
                angle: p.angle,
            }
        })
        .collect()
}

/// File-based provider export.
///
/// Layout under `root/<year>/`: `schedule.csv` (`round,event_name`) and per
/// round a `round_XX/` directory holding `laps.csv`, `weather.csv` and an
/// optional `circuit.csv`.
#[derive(Debug, Clone)]
pub struct FsSessionSource {
    root: PathBuf,
}

impl FsSessionSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn season_dir(&self, year: i32) -> PathBuf {
        self.root.join(year.to_string())
    }

    fn read_rows<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| CoreError::Source(format!("{}: {e}", path.display())))?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }
        Ok(rows)
    }
}

impl SessionSource for FsSessionSource {
    fn schedule(&self, year: i32) -> Result<Vec<EventInfo>> {
        let mut events: Vec<EventInfo> =
            Self::read_rows(&self.season_dir(year).join("schedule.csv"))?;
        events.sort_by_key(|e| e.round);
        Ok(events)
    }

    fn load_race(&self, year: i32, event: &EventInfo) -> Result<RaceSession> {
        let dir = self.season_dir(year).join(format!("round_{:02}", event.round));
        if !dir.is_dir() {
            return Err(CoreError::Source(format!("{} not found", dir.display())));
        }
        let laps = Self::read_rows(&dir.join("laps.csv"))?;
        let weather = Self::read_rows(&dir.join("weather.csv"))?;
        let circuit = dir.join("circuit.csv");
        let geometry = if circuit.exists() {
            Self::read_rows(&circuit)?
        } else {
            Vec::new()
        };
        Ok(RaceSession {
            laps,
            weather,
            geometry,
        })
    }
}
