//! Feed publisher: the server side of the wire protocol.
//!
//! ```text
//!   reports ──▶ latest per vehicle ──▶ records ──▶ chunks of batch_size
//!                                                     │
//!                            {"batch":[..],"batchNumber":k,"totalBatches":N}
//! ```
//!
//! Legacy mode sends the whole update as one bare array instead.

use crate::oracle::VehicleReport;
use chrono::DateTime;
use fleetview_core::wire::{BatchPart, DecodeError, WireMessage};
use fleetview_core::RawRecord;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// How an update is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// Numbered parts of at most `batch_size` records
    Batched,
    /// One bare array per update
    Legacy,
}

/// How individual record fields are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStyle {
    /// Numbers as numbers, timestamps as `yyyy-MM-ddTHH:mm:ss`
    Normalized,
    /// Upstream GPS API style: comma-decimal strings, epoch-millis strings
    Upstream,
}

/// Publisher configuration.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Records per part (default: 100)
    pub batch_size: usize,
    pub mode: PublishMode,
    pub style: RecordStyle,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            mode: PublishMode::Batched,
            style: RecordStyle::Normalized,
        }
    }
}

/// One published update.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedUpdate {
    /// Publisher-side counter, starting at 1
    pub sequence: u64,

    /// Records in send order
    pub records: Vec<RawRecord>,

    /// Encoded wire frames in send order
    pub frames: Vec<String>,
}

impl PublishedUpdate {
    /// Identifiers carried by the update.
    pub fn ids(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|r| r.ordem.as_ref().and_then(Value::as_str).map(str::to_string))
            .collect()
    }
}

/// Frames vehicle reports into wire messages.
#[derive(Debug, Clone)]
pub struct FeedPublisher {
    config: PublisherConfig,
    published: u64,
}

impl FeedPublisher {
    pub fn new(config: PublisherConfig) -> Self {
        Self {
            config,
            published: 0,
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Changes the records-per-part for later updates.
    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.config.batch_size = batch_size.max(1);
    }

    /// Updates published so far.
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Builds the frames of one update.
    ///
    /// An update with no records produces no frames.
    pub fn publish(&mut self, reports: &[VehicleReport]) -> Result<PublishedUpdate, DecodeError> {
        self.published += 1;
        let records: Vec<RawRecord> = latest_per_vehicle(reports)
            .into_iter()
            .map(|report| to_record(report, self.config.style))
            .collect();

        let frames = match self.config.mode {
            PublishMode::Legacy => vec![WireMessage::Legacy(records.clone()).encode()?],
            PublishMode::Batched => {
                let size = self.config.batch_size.max(1);
                let total = records.len().div_ceil(size) as u64;
                records
                    .chunks(size)
                    .enumerate()
                    .map(|(i, chunk)| {
                        WireMessage::Batched(BatchPart::new(chunk.to_vec(), i as u64 + 1, total)).encode()
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        debug!(
            sequence = self.published,
            records = records.len(),
            frames = frames.len(),
            "Update published"
        );

        Ok(PublishedUpdate {
            sequence: self.published,
            records,
            frames,
        })
    }
}

/// Keeps the most recent report of each vehicle, in first-seen order.
///
/// Reports without an identifier pass through untouched.
pub fn latest_per_vehicle(reports: &[VehicleReport]) -> Vec<&VehicleReport> {
    let mut out: Vec<&VehicleReport> = Vec::with_capacity(reports.len());
    let mut slots: HashMap<&str, usize> = HashMap::new();

    for report in reports {
        let Some(id) = report.id.as_deref() else {
            out.push(report);
            continue;
        };
        match slots.get(id) {
            Some(&slot) => {
                if report.timestamp_ms > out[slot].timestamp_ms {
                    out[slot] = report;
                }
            }
            None => {
                slots.insert(id, out.len());
                out.push(report);
            }
        }
    }
    out
}

fn to_record(report: &VehicleReport, style: RecordStyle) -> RawRecord {
    let (latitude, longitude) = match report.position {
        Some(p) => match style {
            RecordStyle::Normalized => (Some(Value::from(p.lat)), Some(Value::from(p.lon))),
            RecordStyle::Upstream => (Some(comma_decimal(p.lat)), Some(comma_decimal(p.lon))),
        },
        None => (None, None),
    };

    let speed = report.speed_kmh.round() as i64;
    let (velocidade, datahoraservidor) = match style {
        RecordStyle::Normalized => (
            Value::from(speed),
            DateTime::from_timestamp_millis(report.timestamp_ms as i64)
                .map(|t| Value::from(t.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string()))
                .unwrap_or(Value::Null),
        ),
        RecordStyle::Upstream => (
            Value::from(speed.to_string()),
            Value::from(report.timestamp_ms.to_string()),
        ),
    };

    RawRecord {
        ordem: report.id.clone().map(Value::from),
        linha: Some(Value::from(report.line.clone())),
        latitude,
        longitude,
        velocidade: Some(velocidade),
        datahoraservidor: Some(datahoraservidor),
    }
}

fn comma_decimal(v: f64) -> Value {
    Value::from(format!("{:.6}", v).replace('.', ","))
}
