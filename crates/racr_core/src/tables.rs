//! Table builder
//!
//! Derives the normalized tables (lap times, races, stints, drivers, tire
//! compounds, race conditions, tracks, circuit geometry, baselines) from the
//! flat per-lap record set produced by ingestion.

use crate::errors::JoinError;
use crate::ingest::{RawLap, RawSeason};
use crate::types::{
    BaselineRecord, CircuitPoint, Compound, DriverRecord, LapRecord, RaceConditionRecord,
    RaceRecord, StintRecord, TireCompoundRecord, TrackRecord,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Every table derived from one ingestion run
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    pub laps: Vec<LapRecord>,
    pub races: Vec<RaceRecord>,
    pub stints: Vec<StintRecord>,
    pub drivers: Vec<DriverRecord>,
    pub tire_compounds: Vec<TireCompoundRecord>,
    pub race_conditions: Vec<RaceConditionRecord>,
    pub tracks: Vec<TrackRecord>,
    pub circuits: Vec<CircuitPoint>,
    pub baselines: Vec<BaselineRecord>,
}

/// Build all tables for a season
pub fn build_tables(season: &RawSeason) -> TableSet {
    let laps = lap_times(&season.laps);
    let tables = TableSet {
        races: races(&season.laps),
        stints: stints(&laps),
        drivers: drivers(&season.laps),
        tire_compounds: tire_compounds(),
        race_conditions: race_conditions(&season.laps),
        tracks: track_reference(),
        circuits: season.circuits.clone(),
        baselines: baseline_references(&laps),
        laps,
    };
    debug!(
        laps = tables.laps.len(),
        races = tables.races.len(),
        stints = tables.stints.len(),
        "tables built"
    );
    tables
}

/// Per-lap table restricted to representative green-flag laps.
///
/// Laps without a positive lap time, in-laps and out-laps are dropped.
pub fn lap_times(raw: &[RawLap]) -> Vec<LapRecord> {
    raw.iter()
        .filter_map(|r| {
            let lap_time_sec = r.lap.lap_time.filter(|t| t.is_finite() && *t > 0.0)?;
            let is_inlap = r.lap.pit_in_time.is_some();
            let is_outlap = r.lap.pit_out_time.is_some();
            if is_inlap || is_outlap {
                return None;
            }
            Some(LapRecord {
                race_id: r.race_id.clone(),
                year: r.year,
                round: r.round,
                track: r.track.clone(),
                driver: r.lap.driver.clone(),
                team: r.lap.team.clone(),
                race_lap: r.lap.lap_number,
                stint: r.lap.stint,
                compound: r.lap.compound,
                tire_age: r.lap.tyre_life,
                lap_time_sec,
                is_inlap,
                is_outlap,
                track_temp: r.weather.as_ref().map(|w| w.track_temp),
                air_temp: r.weather.as_ref().map(|w| w.air_temp),
                rain: r.weather.as_ref().map(|w| w.rainfall),
            })
        })
        .collect()
}

/// One row per race; `total_laps` counts every raw lap, pit laps included.
pub fn races(raw: &[RawLap]) -> Vec<RaceRecord> {
    let mut by_race: BTreeMap<&str, RaceRecord> = BTreeMap::new();
    for r in raw {
        let entry = by_race.entry(&r.race_id).or_insert_with(|| RaceRecord {
            race_id: r.race_id.clone(),
            year: r.year,
            round: r.round,
            track: r.track.clone(),
            total_laps: 0,
            pit_loss_sec: None,
            lap_length_km: None,
        });
        entry.total_laps = entry.total_laps.max(r.lap.lap_number);
    }
    by_race.into_values().collect()
}

/// Stint summaries grouped by race, driver, stint, compound and track
pub fn stints(laps: &[LapRecord]) -> Vec<StintRecord> {
    type Key<'a> = (&'a str, &'a str, Option<u32>, Option<Compound>, &'a str);
    let mut groups: BTreeMap<Key<'_>, (u32, u32, u32, f64)> = BTreeMap::new();

    for lap in laps {
        let key = (
            lap.race_id.as_str(),
            lap.driver.as_str(),
            lap.stint,
            lap.compound,
            lap.track.as_str(),
        );
        let g = groups
            .entry(key)
            .or_insert((lap.race_lap, lap.race_lap, 0, 0.0));
        g.0 = g.0.min(lap.race_lap);
        g.1 = g.1.max(lap.race_lap);
        g.2 += 1;
        g.3 += lap.lap_time_sec;
    }

    groups
        .into_iter()
        .map(
            |((race_id, driver, stint, compound, track), (start, end, count, sum))| StintRecord {
                race_id: race_id.to_string(),
                driver: driver.to_string(),
                stint,
                compound,
                track: track.to_string(),
                start_lap: start,
                end_lap: end,
                stint_length: count,
                avg_lap_time: sum / f64::from(count),
            },
        )
        .collect()
}

/// Distinct driver/team pairs in first-seen order
pub fn drivers(raw: &[RawLap]) -> Vec<DriverRecord> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter(|r| seen.insert((r.lap.driver.as_str(), r.lap.team.as_str())))
        .map(|r| DriverRecord {
            driver: r.lap.driver.clone(),
            team: r.lap.team.clone(),
        })
        .collect()
}

/// Static compound characteristics
pub fn tire_compounds() -> Vec<TireCompoundRecord> {
    [
        (Compound::Soft, 1.05, 0.025, 15),
        (Compound::Medium, 1.00, 0.018, 25),
        (Compound::Hard, 0.97, 0.012, 35),
        (Compound::Intermediate, 0.95, 0.010, 40),
        (Compound::Wet, 0.93, 0.008, 45),
    ]
    .into_iter()
    .map(|(compound, base_grip, deg_rate, cliff_lap)| TireCompoundRecord {
        compound,
        base_grip,
        deg_rate,
        cliff_lap,
    })
    .collect()
}

/// Mean track/air temperature and "any rain" per race.
///
/// Laps without a weather sample do not contribute; a race with no samples
/// at all gets NaN temperatures and no rain.
pub fn race_conditions(raw: &[RawLap]) -> Vec<RaceConditionRecord> {
    let mut acc: BTreeMap<&str, (f64, f64, usize, bool)> = BTreeMap::new();
    for r in raw {
        let e = acc.entry(&r.race_id).or_insert((0.0, 0.0, 0, false));
        if let Some(w) = &r.weather {
            e.0 += w.track_temp;
            e.1 += w.air_temp;
            e.2 += 1;
            e.3 |= w.rainfall;
        }
    }
    acc.into_iter()
        .map(|(race_id, (track, air, n, rain))| {
            let n = n as f64;
            RaceConditionRecord {
                race_id: race_id.to_string(),
                track_temp: track / n,
                air_temp: air / n,
                rain,
            }
        })
        .collect()
}

/// Historical mean lap time per track
pub fn baseline_references(laps: &[LapRecord]) -> Vec<BaselineRecord> {
    let mut acc: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for lap in laps {
        let e = acc.entry(&lap.track).or_insert((0.0, 0));
        e.0 += lap.lap_time_sec;
        e.1 += 1;
    }
    acc.into_iter()
        .map(|(track, (sum, n))| BaselineRecord {
            track: track.to_string(),
            avg_lap_time: sum / n as f64,
        })
        .collect()
}

/// Static circuit reference for every track raced from 2024 onwards
pub fn track_reference() -> Vec<TrackRecord> {
    const TRACKS: [(&str, &str, f64, f64, u32); 26] = [
        ("Australian Grand Prix", "Melbourne Grand Prix Circuit", 5.303, 307.574, 58),
        ("Chinese Grand Prix", "Shanghai International Circuit", 5.451, 305.066, 56),
        ("Japanese Grand Prix", "Suzuka", 5.807, 307.471, 53),
        ("Bahrain Grand Prix", "Bahrain International Circuit", 5.412, 308.238, 57),
        ("Saudi Arabian Grand Prix", "Jeddah Street Circuit", 6.175, 308.750, 50),
        ("Miami Grand Prix", "Hard Rock Stadium Circuit", 5.41, 308.37, 57),
        ("Canadian Grand Prix", "Circuit Gilles Villeneuve", 4.361, 305.270, 70),
        ("Monaco Grand Prix", "Circuit de Monaco", 3.337, 260.286, 78),
        ("Barcelona Grand Prix", "Circuit de Barcelona-Catalunya", 4.655, 307.104, 66),
        ("Austrian Grand Prix", "Red Bull Ring", 4.318, 306.452, 71),
        ("British Grand Prix", "Silverstone Circuit", 5.891, 306.198, 52),
        ("Belgian Grand Prix", "Circuit de Spa-Francorchamps", 7.004, 308.052, 44),
        ("Hungarian Grand Prix", "Hungaroring", 4.381, 306.630, 70),
        ("Dutch Grand Prix", "Zandvoort", 4.259, 306.648, 72),
        ("Italian Grand Prix", "Autodromo Nazionale di Monza", 5.793, 306.720, 53),
        ("Spanish Grand Prix", "Madring Circuit", 5.474, 312.018, 57),
        ("Azerbaijan Grand Prix", "Baku City Circuit", 6.003, 306.049, 51),
        ("Singapore Grand Prix", "Marina Bay Street Circuit", 5.063, 308.706, 61),
        ("United States Grand Prix", "Circuit of the Americas", 5.513, 308.405, 56),
        ("Mexico City Grand Prix", "Autodromo Hermanos Rodriguez", 4.304, 305.354, 71),
        ("São Paulo Grand Prix", "Autodromo Jose Carlos Pace", 4.309, 305.879, 71),
        ("Las Vegas Grand Prix", "Las Vegas Street Circuit", 6.201, 310.05, 50),
        ("Qatar Grand Prix", "Lusail Circuit", 5.419, 308.826, 57),
        ("Abu Dhabi Grand Prix", "Yas Marina Circuit", 5.554, 305.355, 55),
        ("Emilia Romagna Grand Prix", "Autodromo Enzo e Dino Ferrari", 4.909, 309.049, 63),
        ("Spain Grand Prix", "Circuit de Barcelona-Catalunya", 4.657, 307.236, 66),
    ];

    TRACKS
        .iter()
        .map(|&(track, circuit, length, distance, laps)| TrackRecord {
            track: track.to_string(),
            circuit: circuit.to_string(),
            circuit_length_km: length,
            race_distance_km: distance,
            laps,
        })
        .collect()
}

/// Track name → track record, enforcing one record per name
#[derive(Debug, Clone, Default)]
pub struct TrackTable {
    by_name: HashMap<String, TrackRecord>,
}

impl TrackTable {
    pub fn new(records: Vec<TrackRecord>) -> Result<Self, JoinError> {
        let mut by_name = HashMap::with_capacity(records.len());
        for record in records {
            if by_name.contains_key(&record.track) {
                return Err(JoinError::DuplicateTrack(record.track));
            }
            by_name.insert(record.track.clone(), record);
        }
        Ok(Self { by_name })
    }

    pub fn get(&self, track: &str) -> Option<&TrackRecord> {
        self.by_name.get(track)
    }

    pub fn circuit_length_km(&self, track: &str) -> Option<f64> {
        self.get(track).map(|t| t.circuit_length_km)
    }

    /// Track names in alphabetical order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Track name → historical average lap time
#[derive(Debug, Clone, Default)]
pub struct BaselineTable {
    by_track: HashMap<String, f64>,
}

impl BaselineTable {
    pub fn new(records: &[BaselineRecord]) -> Self {
        Self {
            by_track: records
                .iter()
                .map(|b| (b.track.clone(), b.avg_lap_time))
                .collect(),
        }
    }

    pub fn get(&self, track: &str) -> Option<f64> {
        self.by_track.get(track).copied()
    }

    pub fn len(&self) -> usize {
        self.by_track.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_track.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{ProviderLap, WeatherSample};

    fn raw(race: &str, track: &str, driver: &str, lap_number: u32, lap_time: Option<f64>) -> RawLap {
        RawLap {
            race_id: race.to_string(),
            year: 2024,
            round: 1,
            track: track.to_string(),
            lap: ProviderLap {
                driver: driver.to_string(),
                team: "McLaren".to_string(),
                lap_number,
                stint: Some(1),
                compound: Some(Compound::Hard),
                tyre_life: Some(f64::from(lap_number)),
                lap_time,
                lap_start_time: Some(f64::from(lap_number) * 90.0),
                pit_in_time: None,
                pit_out_time: None,
            },
            weather: Some(WeatherSample {
                time: 0.0,
                track_temp: 40.0 + f64::from(lap_number),
                air_temp: 25.0,
                rainfall: lap_number == 3,
            }),
        }
    }

    #[test]
    fn lap_times_drop_pit_and_invalid_laps() {
        let mut inlap = raw("r1", "Bahrain Grand Prix", "NOR", 2, Some(110.0));
        inlap.lap.pit_in_time = Some(200.0);
        let mut outlap = raw("r1", "Bahrain Grand Prix", "NOR", 3, Some(115.0));
        outlap.lap.pit_out_time = Some(210.0);
        let laps = vec![
            raw("r1", "Bahrain Grand Prix", "NOR", 1, Some(95.0)),
            inlap,
            outlap,
            raw("r1", "Bahrain Grand Prix", "NOR", 4, None),
            raw("r1", "Bahrain Grand Prix", "NOR", 5, Some(0.0)),
        ];

        let table = lap_times(&laps);
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].race_lap, 1);
        assert!(!table[0].is_inlap && !table[0].is_outlap);
    }

    #[test]
    fn races_count_all_raw_laps() {
        let mut pit = raw("r1", "Monaco Grand Prix", "LEC", 78, Some(80.0));
        pit.lap.pit_in_time = Some(1.0);
        let laps = vec![raw("r1", "Monaco Grand Prix", "LEC", 1, Some(75.0)), pit];
        let races = races(&laps);
        assert_eq!(races.len(), 1);
        assert_eq!(races[0].total_laps, 78);
    }

    #[test]
    fn race_conditions_aggregate_per_race() {
        let laps = vec![
            raw("r1", "Dutch Grand Prix", "PIA", 1, Some(75.0)),
            raw("r1", "Dutch Grand Prix", "PIA", 3, Some(76.0)),
            raw("r2", "Italian Grand Prix", "PIA", 1, Some(82.0)),
        ];
        let conditions = race_conditions(&laps);
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].race_id, "r1");
        assert_eq!(conditions[0].track_temp, 42.0);
        assert!(conditions[0].rain);
        assert!(!conditions[1].rain);
    }

    #[test]
    fn stints_and_baselines() {
        let laps = lap_times(&[
            raw("r1", "Dutch Grand Prix", "PIA", 4, Some(74.0)),
            raw("r1", "Dutch Grand Prix", "PIA", 5, Some(76.0)),
            raw("r1", "Dutch Grand Prix", "HAM", 5, Some(78.0)),
        ]);
        let stints = stints(&laps);
        assert_eq!(stints.len(), 2);
        let pia = stints.iter().find(|s| s.driver == "PIA").unwrap();
        assert_eq!((pia.start_lap, pia.end_lap, pia.stint_length), (4, 5, 2));
        assert_eq!(pia.avg_lap_time, 75.0);

        let baselines = baseline_references(&laps);
        assert_eq!(baselines.len(), 1);
        assert_eq!(baselines[0].avg_lap_time, 76.0);
    }

    #[test]
    fn drivers_are_distinct() {
        let laps = vec![
            raw("r1", "Dutch Grand Prix", "PIA", 1, Some(75.0)),
            raw("r1", "Dutch Grand Prix", "PIA", 2, Some(75.0)),
            raw("r1", "Dutch Grand Prix", "NOR", 1, Some(75.0)),
        ];
        assert_eq!(drivers(&laps).len(), 2);
    }

    #[test]
    fn track_table_rejects_duplicates() {
        let mut records = track_reference();
        assert!(TrackTable::new(records.clone()).is_ok());
        records.push(records[0].clone());
        assert!(matches!(
            TrackTable::new(records),
            Err(JoinError::DuplicateTrack(_))
        ));
    }
}
