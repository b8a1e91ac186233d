// MockIoT Server - CSV replay engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! CSV replay engine.
//!
//! Replays recorded telemetry rows (`device_id,data_type,value`) through the
//! same sink the generators write to. Device codes in the file are mapped to
//! catalog ids when the dataset is (re)loaded; rows whose code has no
//! catalog entry are skipped.
//!
//! Two modes:
//! - continuous: a batch of `devices_per_interval` rows every `interval_ms`
//!   until stopped, picked at random or in file order
//! - one-shot: [`ReplayEngine::publish`] schedules `count` random rows,
//!   `interval` milliseconds apart

use crate::metrics::{update_replay_metrics, REPLAY_PUBLISHED_TOTAL, REPLAY_UNMAPPED_TOTAL};
use mockiot::config::{parse_flag, parse_int_param};
use mockiot::telemetry::metadata;
use mockiot::{CatalogError, ConfigError, DeviceCatalog, DeviceHandle, TelemetrySink, TelemetryWriter};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, info, warn};

/// Allowed batch period, in milliseconds.
pub const INTERVAL_MS_RANGE: RangeInclusive<i64> = 100..=3_600_000;
/// Allowed rows per batch.
pub const BATCH_RANGE: RangeInclusive<i64> = 1..=1_000;
/// Allowed one-shot publish count.
pub const PUBLISH_COUNT_RANGE: RangeInclusive<i64> = 1..=10_000;
/// Allowed one-shot spacing, in milliseconds.
pub const PUBLISH_INTERVAL_RANGE: RangeInclusive<i64> = 0..=60_000;

const DEFAULT_DATA_TYPE: &str = "power_consumption";

/// Continuous replay settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplayConfig {
    /// Period between batches, in milliseconds.
    pub interval_ms: u64,
    /// Rows published per batch.
    pub devices_per_interval: usize,
    /// Pick rows at random instead of in file order.
    pub randomize: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            devices_per_interval: 3,
            randomize: true,
        }
    }
}

/// Raw `POST /replay/start` parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayQuery {
    pub interval: Option<String>,
    pub devices_per_interval: Option<String>,
    pub randomize: Option<String>,
}

impl ReplayQuery {
    /// Apply the given parameters over `current`.
    pub fn into_config(&self, current: &ReplayConfig) -> Result<ReplayConfig, ConfigError> {
        let interval_ms = parse_int_param(
            "interval",
            self.interval.as_deref(),
            current.interval_ms as i64,
            &INTERVAL_MS_RANGE,
        )?;
        let batch = parse_int_param(
            "devices_per_interval",
            self.devices_per_interval.as_deref(),
            current.devices_per_interval as i64,
            &BATCH_RANGE,
        )?;
        Ok(ReplayConfig {
            interval_ms: interval_ms as u64,
            devices_per_interval: batch as usize,
            randomize: parse_flag(self.randomize.as_deref(), current.randomize),
        })
    }
}

/// Raw `POST /replay/publish` parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishQuery {
    pub count: Option<String>,
    pub interval: Option<String>,
}

impl PublishQuery {
    /// Row count and spacing in milliseconds.
    pub fn parse(&self) -> Result<(usize, u64), ConfigError> {
        let count = parse_int_param("count", self.count.as_deref(), 10, &PUBLISH_COUNT_RANGE)?;
        let interval = parse_int_param(
            "interval",
            self.interval.as_deref(),
            1_000,
            &PUBLISH_INTERVAL_RANGE,
        )?;
        Ok((count as usize, interval as u64))
    }
}

/// One dataset row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRow {
    /// Device code as written in the file.
    pub device_code: String,
    pub data_type: String,
    /// `None` when the file has no usable value; a random one is drawn.
    pub value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "deviceId")]
    device_id: Option<String>,
    #[serde(alias = "type")]
    data_type: Option<String>,
    value: Option<String>,
}

/// Replay state for `/replay/status`.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayStatus {
    pub active: bool,
    pub config: ReplayConfig,
    pub total_rows: usize,
    pub mapped_devices: usize,
    pub csv_path: String,
    pub published: u64,
    pub unmapped: u64,
}

/// Replay errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty dataset")]
    EmptyDataset,

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Publishes CSV rows through a telemetry sink.
pub struct ReplayEngine {
    csv_path: PathBuf,
    catalog: Arc<dyn DeviceCatalog>,
    writer: TelemetryWriter,
    rows: RwLock<Vec<ReplayRow>>,
    devices: RwLock<HashMap<String, DeviceHandle>>,
    config: RwLock<ReplayConfig>,
    worker: Mutex<Option<JoinHandle<()>>>,
    cursor: AtomicUsize,
    published: AtomicU64,
    unmapped: AtomicU64,
}

impl ReplayEngine {
    /// Create an engine with no rows loaded.
    pub fn new(
        csv_path: impl Into<PathBuf>,
        catalog: Arc<dyn DeviceCatalog>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            csv_path: csv_path.into(),
            catalog,
            writer: TelemetryWriter::new(sink),
            rows: RwLock::new(Vec::new()),
            devices: RwLock::new(HashMap::new()),
            config: RwLock::new(ReplayConfig::default()),
            worker: Mutex::new(None),
            cursor: AtomicUsize::new(0),
            published: AtomicU64::new(0),
            unmapped: AtomicU64::new(0),
        }
    }

    /// Dataset path.
    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    /// Current continuous replay settings.
    pub async fn config(&self) -> ReplayConfig {
        *self.config.read().await
    }

    /// Re-read the device mapping and the CSV file. Returns the row count.
    pub async fn reload(&self) -> Result<usize, ReplayError> {
        let mapping: HashMap<String, DeviceHandle> = self
            .catalog
            .find_all()
            .await?
            .into_iter()
            .map(|d| (d.code.clone(), d))
            .collect();
        let rows = Self::parse_csv(&self.csv_path)?;

        info!(
            "Loaded {} replay row(s) from {}, {} device mapping(s)",
            rows.len(),
            self.csv_path.display(),
            mapping.len()
        );

        let count = rows.len();
        *self.devices.write().await = mapping;
        *self.rows.write().await = rows;
        self.cursor.store(0, Ordering::SeqCst);
        update_replay_metrics(self.is_active().await, count);
        Ok(count)
    }

    /// Parse a replay CSV file.
    fn parse_csv(path: &Path) -> Result<Vec<ReplayRow>, ReplayError> {
        if !path.exists() {
            return Err(ReplayError::FileNotFound(path.display().to_string()));
        }

        let mut reader = csv::Reader::from_path(path)?;
        let mut rows = Vec::new();
        for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
            let raw = result?;
            let Some(device_code) = raw.device_id.filter(|s| !s.trim().is_empty()) else {
                warn!("Replay row {} has no device id, skipped", line + 1);
                continue;
            };
            rows.push(ReplayRow {
                device_code: device_code.trim().to_string(),
                data_type: raw
                    .data_type
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_DATA_TYPE.to_string()),
                value: raw.value.and_then(|s| s.trim().parse().ok()),
            });
        }
        Ok(rows)
    }

    /// Start continuous replay, replacing any running one.
    pub async fn start(self: &Arc<Self>, config: ReplayConfig) -> ReplayStatus {
        // Held until the new handle is stored so overlapping starts serialize.
        let mut worker = self.worker.lock().await;
        if let Some(previous) = worker.take() {
            previous.abort();
        }
        *self.config.write().await = config;

        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let period = Duration::from_millis(config.interval_ms);
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                engine.send_batch(&config).await;
            }
        });
        *worker = Some(handle);
        drop(worker);

        info!(
            "Replay started: {} row(s) every {}ms, randomize={}",
            config.devices_per_interval, config.interval_ms, config.randomize
        );
        update_replay_metrics(true, self.rows.read().await.len());
        self.status().await
    }

    /// Stop continuous replay. Returns whether one was running.
    pub async fn stop(&self) -> bool {
        let handle = self.worker.lock().await.take();
        let was_active = match handle {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false,
        };

        if was_active {
            info!("Replay stopped");
        }
        update_replay_metrics(false, self.rows.read().await.len());
        was_active
    }

    /// Whether continuous replay is running.
    pub async fn is_active(&self) -> bool {
        self.worker
            .lock()
            .await
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Snapshot for `/replay/status`.
    pub async fn status(&self) -> ReplayStatus {
        ReplayStatus {
            active: self.is_active().await,
            config: self.config().await,
            total_rows: self.rows.read().await.len(),
            mapped_devices: self.devices.read().await.len(),
            csv_path: self.csv_path.display().to_string(),
            published: self.published.load(Ordering::Relaxed),
            unmapped: self.unmapped.load(Ordering::Relaxed),
        }
    }

    /// Schedule `count` random rows, `interval_ms` apart.
    ///
    /// Loads the dataset first if nothing is loaded. The count is capped at
    /// the number of rows. Returns the number of rows scheduled.
    pub async fn publish(self: &Arc<Self>, count: usize, interval_ms: u64) -> Result<usize, ReplayError> {
        if self.rows.read().await.is_empty() {
            self.reload().await?;
        }
        let available = self.rows.read().await.len();
        if available == 0 {
            return Err(ReplayError::EmptyDataset);
        }

        let scheduled = count.min(available);
        for i in 0..scheduled {
            let engine = Arc::clone(self);
            let delay = Duration::from_millis(interval_ms.saturating_mul(i as u64));
            tokio::spawn(async move {
                sleep(delay).await;
                if let Some(row) = engine.random_row().await {
                    engine.publish_row(&row).await;
                }
            });
        }

        info!(
            "Scheduled {} replay row(s), {}ms apart",
            scheduled, interval_ms
        );
        Ok(scheduled)
    }

    /// Publish one batch. Returns the number of rows the sink accepted.
    async fn send_batch(&self, config: &ReplayConfig) -> usize {
        let picks: Vec<ReplayRow> = {
            let rows = self.rows.read().await;
            if rows.is_empty() {
                warn!("No replay data loaded, batch skipped");
                return 0;
            }
            let mut rng = rand::thread_rng();
            (0..config.devices_per_interval)
                .map(|_| {
                    let index = if config.randomize {
                        rng.gen_range(0..rows.len())
                    } else {
                        self.cursor.fetch_add(1, Ordering::Relaxed) % rows.len()
                    };
                    rows[index].clone()
                })
                .collect()
        };

        let mut accepted = 0;
        for row in &picks {
            if self.publish_row(row).await {
                accepted += 1;
            }
        }
        debug!("Replay batch: {}/{} row(s) accepted", accepted, picks.len());
        accepted
    }

    async fn random_row(&self) -> Option<ReplayRow> {
        let rows = self.rows.read().await;
        if rows.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..rows.len());
        Some(rows[index].clone())
    }

    /// Publish one row. Returns whether the sink accepted it.
    async fn publish_row(&self, row: &ReplayRow) -> bool {
        let device = self.devices.read().await.get(&row.device_code).cloned();
        let Some(device) = device else {
            self.unmapped.fetch_add(1, Ordering::Relaxed);
            REPLAY_UNMAPPED_TOTAL.inc();
            warn!("Replay device {} is not in the catalog", row.device_code);
            return false;
        };

        let value = row
            .value
            .unwrap_or_else(|| rand::thread_rng().gen_range(0.0..100.0));
        let meta = metadata([("source", "replay".into())]);
        let accepted = self.writer.write(&device, &row.data_type, value, meta).await;
        if accepted {
            self.published.fetch_add(1, Ordering::Relaxed);
            REPLAY_PUBLISHED_TOTAL.inc();
        }
        accepted
    }
}
