// MockIoT - Telemetry sink
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Telemetry sink adapter.
//!
//! Every synthetic point ends up as one call to [`TelemetrySink::record`].
//! Engines go through a [`TelemetryWriter`], which makes writes best-effort:
//! a rejected record is logged and counted, and the run carries on.

use crate::device::DeviceHandle;
use crate::error::SinkError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl MetadataValue {
    /// Numeric content, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text content, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean content, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Number(v)
    }
}

impl From<u32> for MetadataValue {
    fn from(v: u32) -> Self {
        MetadataValue::Number(v as f64)
    }
}

impl From<DateTime<Utc>> for MetadataValue {
    fn from(v: DateTime<Utc>) -> Self {
        MetadataValue::Timestamp(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Text(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Text(v)
    }
}

/// Free-form diagnostic metadata attached to a record.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Build a [`Metadata`] map from key/value pairs.
pub fn metadata<const N: usize>(entries: [(&str, MetadataValue); N]) -> Metadata {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// One telemetry write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub device_id: String,
    pub data_type: String,
    pub value: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Identifier the ingestion path assigned to a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordHandle(pub u64);

/// External telemetry ingestion path.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Persist one record.
    async fn record(&self, record: TelemetryRecord) -> Result<RecordHandle, SinkError>;
}

/// Best-effort writer used by one generation run.
pub struct TelemetryWriter {
    sink: Arc<dyn TelemetrySink>,
    written: AtomicUsize,
    failed: AtomicUsize,
}

impl std::fmt::Debug for TelemetryWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryWriter")
            .field("written", &self.written())
            .field("failed", &self.failed())
            .finish()
    }
}

impl TelemetryWriter {
    /// Create a writer over `sink` with zeroed counters.
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            sink,
            written: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Write one record. Returns whether the sink accepted it.
    pub async fn write(
        &self,
        device: &DeviceHandle,
        data_type: &str,
        value: f64,
        metadata: Metadata,
    ) -> bool {
        let record = TelemetryRecord {
            device_id: device.id.clone(),
            data_type: data_type.to_string(),
            value,
            metadata,
        };

        match self.sink.record(record).await {
            Ok(_) => {
                self.written.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "telemetry write failed for {} ({}): {}",
                    device.code,
                    data_type,
                    e
                );
                false
            }
        }
    }

    /// Records accepted so far.
    pub fn written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }

    /// Records rejected so far.
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Sink that keeps records in memory.
///
/// With a capacity it behaves as a ring buffer holding the most recent
/// records; [`MemorySink::total`] still counts every accepted write.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<VecDeque<TelemetryRecord>>,
    capacity: Option<usize>,
    total: AtomicU64,
}

impl MemorySink {
    /// Create an unbounded sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink keeping at most `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
            total: AtomicU64::new(0),
        }
    }

    /// Retained records, oldest first.
    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.lock().iter().cloned().collect()
    }

    /// Retained records for one device.
    pub fn records_for(&self, device_id: &str) -> Vec<TelemetryRecord> {
        self.lock()
            .iter()
            .filter(|r| r.device_id == device_id)
            .cloned()
            .collect()
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no record is retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records accepted over the sink lifetime.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Drop retained records (the lifetime total is kept).
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<TelemetryRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    async fn record(&self, record: TelemetryRecord) -> Result<RecordHandle, SinkError> {
        let id = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        let mut records = self.lock();
        if let Some(cap) = self.capacity {
            if cap == 0 {
                return Ok(RecordHandle(id));
            }
            while records.len() >= cap {
                records.pop_front();
            }
        }
        records.push_back(record);
        Ok(RecordHandle(id))
    }
}
