//! File-based table persistence
//!
//! One CSV file per concern under a single directory.

use crate::errors::Result;
use crate::tables::TableSet;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const LAP_TIMES: &str = "lap_times.csv";
pub const RACES: &str = "races.csv";
pub const STINTS: &str = "stints.csv";
pub const DRIVERS: &str = "drivers.csv";
pub const TIRE_COMPOUNDS: &str = "tire_compounds.csv";
pub const RACE_CONDITIONS: &str = "race_conditions.csv";
pub const TRACKS: &str = "tracks.csv";
pub const CIRCUIT_INFO: &str = "circuit_info.csv";
pub const BASELINE_REFERENCES: &str = "baseline_references.csv";

/// Reads and writes the normalized tables of one data directory
#[derive(Debug, Clone)]
pub struct TableStore {
    root: PathBuf,
}

impl TableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, table: &str) -> PathBuf {
        self.root.join(table)
    }

    pub fn exists(&self, table: &str) -> bool {
        self.path(table).exists()
    }

    /// Write rows to `table`, replacing any previous content
    pub fn write<T: Serialize>(&self, table: &str, rows: &[T]) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.path(table);
        let mut writer = csv::Writer::from_path(&path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        debug!("wrote {} rows to {}", rows.len(), path.display());
        Ok(())
    }

    pub fn read<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>> {
        let mut reader = csv::Reader::from_path(self.path(table))?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Read `table`, or an empty set when the file is absent
    pub fn read_optional<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>> {
        if self.exists(table) {
            self.read(table)
        } else {
            Ok(Vec::new())
        }
    }

    /// Persist every table of an ingestion run
    pub fn write_all(&self, tables: &TableSet) -> Result<()> {
        self.write(LAP_TIMES, &tables.laps)?;
        self.write(RACES, &tables.races)?;
        self.write(STINTS, &tables.stints)?;
        self.write(DRIVERS, &tables.drivers)?;
        self.write(TIRE_COMPOUNDS, &tables.tire_compounds)?;
        self.write(RACE_CONDITIONS, &tables.race_conditions)?;
        self.write(TRACKS, &tables.tracks)?;
        self.write(CIRCUIT_INFO, &tables.circuits)?;
        self.write(BASELINE_REFERENCES, &tables.baselines)?;
        info!("tables written to {}", self.root.display());
        Ok(())
    }

    /// Load every table. The training path requires all tables except
    /// circuit geometry.
    pub fn read_all(&self) -> Result<TableSet> {
        Ok(TableSet {
            laps: self.read(LAP_TIMES)?,
            races: self.read(RACES)?,
            stints: self.read(STINTS)?,
            drivers: self.read(DRIVERS)?,
            tire_compounds: self.read(TIRE_COMPOUNDS)?,
            race_conditions: self.read(RACE_CONDITIONS)?,
            tracks: self.read(TRACKS)?,
            circuits: self.read_optional(CIRCUIT_INFO)?,
            baselines: self.read(BASELINE_REFERENCES)?,
        })
    }
}
