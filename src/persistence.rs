//! Append-only persistence of the TX/RX log and derived metric rows.

use crate::constants::TIMESTAMP_FORMAT;
use crate::error::PersistError;
use crate::types::MetricSample;
use chrono::{DateTime, Local};
use log::debug;
use serde::Serialize;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Direction of a logged line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Tx => f.write_str("TX"),
            Direction::Rx => f.write_str("RX"),
        }
    }
}

/// `<timestamp> TX: <command>` / `<timestamp> RX: <response>`
pub fn format_log_line(direction: Direction, text: &str, at: DateTime<Local>) -> String {
    format!("{} {}: {}", at.format(TIMESTAMP_FORMAT), direction, text)
}

/// Destination for communication logs and metric rows
pub trait PersistenceSink: Send {
    fn log_line(
        &mut self,
        direction: Direction,
        text: &str,
        at: DateTime<Local>,
    ) -> Result<(), PersistError>;

    fn append_metric(&mut self, sample: &MetricSample) -> Result<(), PersistError>;
}

/// One CSV row; field order is the column order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Command")]
    pub command: String,
    #[serde(rename = "Response Type")]
    pub response_type: String,
    #[serde(rename = "Remote Addr")]
    pub remote_address: u16,
    #[serde(rename = "Cmd ID")]
    pub command_id: u8,
    #[serde(rename = "Prop Time")]
    pub propagation_time: f64,
    #[serde(rename = "Signal Quality")]
    pub signal_quality: f64,
    #[serde(rename = "Value")]
    pub value: f64,
    #[serde(rename = "Slant Range (m)")]
    pub slant_range: String,
    #[serde(rename = "Horizontal Dist (m)")]
    pub horizontal_distance: String,
    #[serde(rename = "Velocity (m/s)")]
    pub velocity: String,
}

impl From<&MetricSample> for MetricRow {
    fn from(sample: &MetricSample) -> Self {
        MetricRow {
            timestamp: sample.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            command: sample.command.clone(),
            response_type: sample.response_type.clone(),
            remote_address: sample.remote_address,
            command_id: sample.command_id.code(),
            propagation_time: sample.propagation_time,
            signal_quality: sample.signal_quality,
            value: sample.value,
            slant_range: format!("{:.4}", sample.slant_range),
            horizontal_distance: format!("{:.4}", sample.horizontal_distance),
            velocity: format!("{:.4}", sample.velocity),
        }
    }
}

const LOG_BANNER: &str = "========== uWave Communication Log ==========";

/// Plain-text log plus CSV metrics on disk
pub struct FileSink {
    log: File,
    csv: csv::Writer<File>,
}

impl FileSink {
    /// Open both files for appending, creating them when missing.
    ///
    /// A new log starts with a banner; a new or empty CSV gets the header
    /// row with the first record.
    pub fn open(
        log_path: impl AsRef<Path>,
        csv_path: impl AsRef<Path>,
    ) -> Result<Self, PersistError> {
        let log_path = log_path.as_ref();
        let csv_path = csv_path.as_ref();

        let log_is_new = !log_path.exists();
        let mut log = OpenOptions::new().create(true).append(true).open(log_path)?;
        if log_is_new {
            writeln!(log, "{}", LOG_BANNER)?;
            writeln!(log, "Started: {}", Local::now().format(TIMESTAMP_FORMAT))?;
            writeln!(log)?;
        }

        let csv_file = OpenOptions::new().create(true).append(true).open(csv_path)?;
        let needs_header = csv_file.metadata()?.len() == 0;
        let csv = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(csv_file);

        debug!(
            "Persisting log to {} and metrics to {}",
            log_path.display(),
            csv_path.display()
        );

        Ok(FileSink { log, csv })
    }
}

impl PersistenceSink for FileSink {
    fn log_line(
        &mut self,
        direction: Direction,
        text: &str,
        at: DateTime<Local>,
    ) -> Result<(), PersistError> {
        writeln!(self.log, "{}", format_log_line(direction, text, at))?;
        self.log.flush()?;
        Ok(())
    }

    fn append_metric(&mut self, sample: &MetricSample) -> Result<(), PersistError> {
        self.csv.serialize(MetricRow::from(sample))?;
        self.csv.flush()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryRecords {
    lines: Vec<String>,
    samples: Vec<MetricSample>,
}

/// Sink keeping everything in memory; clones share the same records
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<MemoryRecords>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, MemoryRecords> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Formatted log lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.records().lines.clone()
    }

    /// Metric samples, oldest first
    pub fn samples(&self) -> Vec<MetricSample> {
        self.records().samples.clone()
    }
}

impl PersistenceSink for MemorySink {
    fn log_line(
        &mut self,
        direction: Direction,
        text: &str,
        at: DateTime<Local>,
    ) -> Result<(), PersistError> {
        self.records().lines.push(format_log_line(direction, text, at));
        Ok(())
    }

    fn append_metric(&mut self, sample: &MetricSample) -> Result<(), PersistError> {
        self.records().samples.push(sample.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RemoteCommandId;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn sample() -> MetricSample {
        MetricSample {
            timestamp: Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 15).unwrap(),
            command: "$PUWV2,0,0,3*29".to_string(),
            response_type: "PUWV3".to_string(),
            remote_address: 0,
            command_id: RemoteCommandId::Temperature,
            propagation_time: 0.01,
            signal_quality: 21.5,
            value: 20.0,
            sound_velocity: 1481.7382,
            slant_range: 7.408691,
            horizontal_distance: 7.408691,
            velocity: 0.0,
        }
    }

    #[test]
    fn log_line_format() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 15).unwrap();
        assert_eq!(
            format_log_line(Direction::Tx, "$PUWV?,0*27", at),
            "2024-05-01 12:30:15.000000 TX: $PUWV?,0*27"
        );
    }

    #[test]
    fn row_rounds_derived_columns() {
        let row = MetricRow::from(&sample());
        assert_eq!(row.timestamp, "2024-05-01 12:30:15.000000");
        assert_eq!(row.command_id, 3);
        assert_eq!(row.slant_range, "7.4087");
        assert_eq!(row.velocity, "0.0000");
    }

    #[test]
    fn file_sink_writes_header_once() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("uwave_log.txt");
        let csv_path = dir.path().join("uwave_data.csv");

        {
            let mut sink = FileSink::open(&log_path, &csv_path).unwrap();
            sink.append_metric(&sample()).unwrap();
            sink.log_line(Direction::Rx, "$PUWV0", Local::now()).unwrap();
        }
        {
            let mut sink = FileSink::open(&log_path, &csv_path).unwrap();
            sink.append_metric(&sample()).unwrap();
        }

        let csv_text = std::fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = csv_text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "Timestamp,Command,Response Type,Remote Addr,Cmd ID,Prop Time,Signal Quality,Value,Slant Range (m),Horizontal Dist (m),Velocity (m/s)"
        );
        assert!(lines[1].ends_with(",7.4087,7.4087,0.0000"));

        let log_text = std::fs::read_to_string(&log_path).unwrap();
        assert!(log_text.starts_with(LOG_BANNER));
        assert_eq!(log_text.matches(LOG_BANNER).count(), 1);
        assert!(log_text.trim_end().ends_with("RX: $PUWV0"));
    }

    #[test]
    fn memory_sink_clones_share_records() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.append_metric(&sample()).unwrap();
        writer.log_line(Direction::Tx, "$PUWVD,0*5C", Local::now()).unwrap();
        assert_eq!(sink.samples().len(), 1);
        assert!(sink.lines()[0].ends_with("TX: $PUWVD,0*5C"));
    }
}
