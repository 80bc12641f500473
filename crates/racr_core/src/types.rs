//! Normalized table records shared by ingestion, training and inference
//!
//! Every record derives serde so the table store can persist it as one CSV
//! row. Column names follow the field names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tire compound as reported by the telemetry provider
///
/// Written in upper case; read in any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Compound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
}

impl Compound {
    /// All known compounds, in the column order of the one-hot indicators
    pub const ALL: [Compound; 5] = [
        Compound::Hard,
        Compound::Intermediate,
        Compound::Medium,
        Compound::Soft,
        Compound::Wet,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Compound::Soft => "SOFT",
            Compound::Medium => "MEDIUM",
            Compound::Hard => "HARD",
            Compound::Intermediate => "INTERMEDIATE",
            Compound::Wet => "WET",
        }
    }

    /// Name of the one-hot indicator column for this compound
    pub fn indicator_column(self) -> String {
        format!("compound_{}", self.as_str())
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compound {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        match name.to_ascii_uppercase().as_str() {
            "SOFT" => Ok(Compound::Soft),
            "MEDIUM" => Ok(Compound::Medium),
            "HARD" => Ok(Compound::Hard),
            "INTERMEDIATE" => Ok(Compound::Intermediate),
            "WET" => Ok(Compound::Wet),
            _ => Err(format!("unknown tire compound `{name}`")),
        }
    }
}

impl TryFrom<String> for Compound {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One green-flag lap of one driver in one race (`lap_times` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapRecord {
    pub race_id: String,
    pub year: i32,
    pub round: u32,
    pub track: String,
    pub driver: String,
    pub team: String,
    pub race_lap: u32,
    pub stint: Option<u32>,
    pub compound: Option<Compound>,
    pub tire_age: Option<f64>,
    pub lap_time_sec: f64,
    pub is_inlap: bool,
    pub is_outlap: bool,
    pub track_temp: Option<f64>,
    pub air_temp: Option<f64>,
    pub rain: Option<bool>,
}

/// One row per race (`races` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceRecord {
    pub race_id: String,
    pub year: i32,
    pub round: u32,
    pub track: String,
    pub total_laps: u32,
    pub pit_loss_sec: Option<f64>,
    pub lap_length_km: Option<f64>,
}

/// Aggregated stint summary (`stints` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StintRecord {
    pub race_id: String,
    pub driver: String,
    pub stint: Option<u32>,
    pub compound: Option<Compound>,
    pub track: String,
    pub start_lap: u32,
    pub end_lap: u32,
    pub stint_length: u32,
    pub avg_lap_time: f64,
}

/// Distinct driver/team pairing (`drivers` table)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DriverRecord {
    pub driver: String,
    pub team: String,
}

/// Static compound characteristics (`tire_compounds` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TireCompoundRecord {
    pub compound: Compound,
    pub base_grip: f64,
    pub deg_rate: f64,
    pub cliff_lap: u32,
}

/// Per-race weather aggregate (`race_conditions` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceConditionRecord {
    pub race_id: String,
    pub track_temp: f64,
    pub air_temp: f64,
    pub rain: bool,
}

/// Static circuit reference (`tracks` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub track: String,
    pub circuit: String,
    pub circuit_length_km: f64,
    pub race_distance_km: f64,
    pub laps: u32,
}

/// Kind of a circuit geometry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    Track,
    Corner,
}

/// Circuit geometry sample (`circuit_info` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitPoint {
    pub race_id: String,
    pub year: i32,
    pub round: u32,
    pub track: String,
    #[serde(rename = "type")]
    pub kind: PointKind,
    pub x: f64,
    pub y: f64,
    pub seq: Option<u32>,
    pub corner: Option<String>,
    pub angle: Option<f64>,
}

/// Historical average lap time for a track (`baseline_references` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub track: String,
    pub avg_lap_time: f64,
}
