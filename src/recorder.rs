use chrono::{DateTime, Utc};
use core::error::Error;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::model::{TimeframeRole, VolumeReading};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const CSV_HEADER: [&str; 10] = [
    "Timestamp",
    "Lower Buyer Volume",
    "Lower Seller Volume",
    "Lower Delta %",
    "Base Buyer Volume",
    "Base Seller Volume",
    "Base Delta %",
    "Higher Buyer Volume",
    "Higher Seller Volume",
    "Higher Delta %",
];

/// Readings of one sweep, one slot per role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleReadings([Option<VolumeReading>; 3]);

impl RoleReadings {
    pub fn set(&mut self, role: TimeframeRole, reading: VolumeReading) {
        self.0[role.index()] = Some(reading);
    }

    pub fn get(&self, role: TimeframeRole) -> Option<&VolumeReading> {
        self.0[role.index()].as_ref()
    }

    pub fn captured(&self) -> usize {
        self.0.iter().flatten().count()
    }
}

/// Timestamp followed by buyer/seller/delta for lower, base, higher. Missing
/// readings become empty fields.
pub fn build_row(at: DateTime<Utc>, readings: &RoleReadings) -> Vec<String> {
    let mut row = Vec::with_capacity(CSV_HEADER.len());
    row.push(at.format(TIMESTAMP_FORMAT).to_string());
    for role in TimeframeRole::ALL {
        match readings.get(role) {
            Some(reading) => row.extend(reading.fields().map(str::to_string)),
            None => row.extend(std::iter::repeat_n(String::new(), 3)),
        }
    }
    row
}

/// Append-only CSV log in the session folder.
#[derive(Debug, Clone)]
pub struct VolumeRecorder {
    path: PathBuf,
}

impl VolumeRecorder {
    /// Writes the header when the file does not exist yet.
    pub fn open(path: &Path) -> Result<Self, Box<dyn Error + Send + Sync>> {
        if !path.exists() {
            let mut writer = csv::Writer::from_path(path)?;
            writer.write_record(CSV_HEADER)?;
            writer.flush()?;
            info!("Created {}", path.display());
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn append(&self, row: &[String]) -> Result<(), Box<dyn Error + Send + Sync>> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(row)?;
        writer.flush()?;
        debug!(fields = row.len(), "appended row to {}", self.path.display());
        Ok(())
    }
}
