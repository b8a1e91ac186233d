// MockIoT - Time-series engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Long-horizon time-series generation.
//!
//! Two generators live here:
//!
//! - **Carbon emission series**: `total_points` samples per device of the
//!   [`SampleModel`], persisted one by one.
//! - **Prediction dataset**: one carbon sensor driven by environmental
//!   factors, plus correlated energy meter readings.
//!
//! Samples of one device are written in timestamp order.

use crate::config::{GenerationConfig, PredictionConfig};
use crate::device::{DeviceHandle, DeviceResolver, DeviceType};
use crate::error::{GenerationError, Result};
use crate::patterns::{
    correlated_meter_value, data_type_for, emission_from_factors, rng_from_seed,
    EnvironmentFactors, SampleModel, SyntheticSample,
};
use crate::task::{percent, ProgressHandle};
use crate::telemetry::{metadata, Metadata, TelemetrySink, TelemetryWriter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Samples returned in a series preview.
pub const SERIES_PREVIEW: usize = 10;
/// Rows returned in a dataset preview.
pub const DATASET_PREVIEW: usize = 100;
/// Records between two progress reports.
pub const PROGRESS_EVERY: usize = 100;
/// Highest progress reported by a series run before completion.
pub const SERIES_PROGRESS_CAP: u8 = 95;
/// Energy meters correlated with the prediction target.
pub const CORRELATED_METERS: usize = 3;

/// Short device description used in summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRef {
    pub id: String,
    pub code: String,
    pub name: String,
}

impl From<&DeviceHandle> for DeviceRef {
    fn from(device: &DeviceHandle) -> Self {
        Self {
            id: device.id.clone(),
            code: device.code.clone(),
            name: device.name.clone(),
        }
    }
}

/// Result of a carbon emission series run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesSummary {
    /// Points generated, over all devices.
    pub count: usize,
    /// First samples, in generation order.
    pub time_series: Vec<SyntheticSample>,
    pub devices: Vec<DeviceRef>,
    pub records_failed: usize,
}

/// One row of the prediction dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub timestamp: DateTime<Utc>,
    pub carbon_emission: f64,
    #[serde(flatten)]
    pub factors: Option<EnvironmentFactors>,
}

/// Time span of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval_minutes: u32,
}

/// Result of a prediction dataset run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub total_points: usize,
    pub dataset: Vec<PredictionRow>,
    pub time_range: TimeRange,
    pub target_device: DeviceRef,
    pub records_written: usize,
    pub records_failed: usize,
}

/// Generates time series against a catalog and a sink.
#[derive(Clone)]
pub struct TimeSeriesEngine {
    resolver: DeviceResolver,
    sink: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for TimeSeriesEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeSeriesEngine").finish_non_exhaustive()
    }
}

impl TimeSeriesEngine {
    /// Create an engine.
    pub fn new(resolver: DeviceResolver, sink: Arc<dyn TelemetrySink>) -> Self {
        Self { resolver, sink }
    }

    /// Carbon emission series over `[start, end]`.
    ///
    /// Uses the configured device ids, or every carbon sensor, energy
    /// meter, air quality monitor and emissions analyzer.
    pub async fn carbon_emission_series(
        &self,
        config: &GenerationConfig,
        progress: &ProgressHandle,
    ) -> Result<TimeSeriesSummary> {
        let devices = if config.devices.is_empty() {
            self.resolver
                .resolve_types(&DeviceType::carbon_monitoring())
                .await?
        } else {
            self.resolver.resolve_ids(&config.devices).await?
        };

        if devices.is_empty() {
            log::warn!("no carbon monitoring devices found, nothing to generate");
            return Err(GenerationError::MissingDevices(
                "no carbon monitoring devices found".to_string(),
            ));
        }

        let points = config.total_points();
        let total = points * devices.len();
        log::info!(
            "generating carbon emission series: {} point(s) x {} device(s) from {} to {}",
            points,
            devices.len(),
            config.start,
            config.end
        );
        progress
            .message(format!(
                "Generating {} records for {} device(s)",
                total,
                devices.len()
            ))
            .await;

        let writer = TelemetryWriter::new(self.sink.clone());
        let mut rng = rng_from_seed(config.seed);
        let mut preview = Vec::with_capacity(SERIES_PREVIEW.min(total));
        let mut created = 0usize;

        for (n, device) in devices.iter().enumerate() {
            let model = SampleModel::for_device(device.device_type, config.params);
            let data_type = data_type_for(device.device_type);

            for i in 0..points {
                let timestamp = config.timestamp_at(i);
                let components = model.sample(i, points, &timestamp, &mut rng);
                let value = components.value();

                let meta = metadata([
                    ("generated", true.into()),
                    ("date_time", timestamp.into()),
                    ("base", components.base.into()),
                    ("trend", components.trend.into()),
                    ("seasonality", components.seasonal.into()),
                    ("noise", components.noise.into()),
                    ("is_outlier", components.is_outlier().into()),
                ]);
                writer.write(device, data_type, value, meta).await;
                created += 1;

                if preview.len() < SERIES_PREVIEW {
                    preview.push(SyntheticSample {
                        device_id: device.id.clone(),
                        device_code: device.code.clone(),
                        data_type: data_type.to_string(),
                        value,
                        timestamp,
                        components,
                    });
                }

                if created % PROGRESS_EVERY == 0 {
                    let pct = percent(created, total).min(SERIES_PROGRESS_CAP);
                    progress
                        .report(pct, format!("Processed {}/{} records ({}%)", created, total, pct))
                        .await;
                }
            }

            log::debug!("device {}/{} ({}) done", n + 1, devices.len(), device.code);
        }

        log::info!("carbon emission series finished: {} record(s)", created);
        Ok(TimeSeriesSummary {
            count: created,
            time_series: preview,
            devices: devices.iter().map(DeviceRef::from).collect(),
            records_failed: writer.failed(),
        })
    }

    /// Prediction dataset for the first carbon sensor.
    pub async fn prediction_dataset(
        &self,
        config: &PredictionConfig,
        progress: &ProgressHandle,
    ) -> Result<PredictionSummary> {
        let sensors = self.resolver.resolve_type(DeviceType::CarbonSensor).await?;
        let Some(target) = sensors.first() else {
            log::warn!("no carbon sensor found, cannot build prediction dataset");
            return Err(GenerationError::MissingDevices(
                "prediction dataset needs a carbon sensor".to_string(),
            ));
        };
        let mut meters = self.resolver.resolve_type(DeviceType::EnergyMeter).await?;
        meters.truncate(CORRELATED_METERS);

        let total = config.total_points();
        log::info!(
            "generating prediction dataset: {} point(s) for {} with {} correlated meter(s)",
            total,
            target.code,
            meters.len()
        );

        let writer = TelemetryWriter::new(self.sink.clone());
        let mut rng = rng_from_seed(config.seed);
        let mut dataset = Vec::with_capacity(DATASET_PREVIEW.min(total));

        for i in 0..total {
            let timestamp = config.timestamp_at(i);
            let factors = EnvironmentFactors::at(&timestamp, i, &mut rng);
            let emission = emission_from_factors(&factors, &mut rng);

            let base = metadata([
                ("generated", true.into()),
                ("prediction_dataset", true.into()),
                ("date_time", timestamp.into()),
            ]);
            let mut meta: Metadata = base.clone();
            if config.include_factors {
                meta.insert("temperature".into(), factors.temperature.into());
                meta.insert("humidity".into(), factors.humidity.into());
                meta.insert("occupancy".into(), factors.occupancy.into());
                meta.insert("traffic".into(), factors.traffic.into());
                meta.insert("production".into(), factors.production.into());
            }
            writer.write(target, "carbon_emission", emission, meta).await;

            for meter in &meters {
                let reading = correlated_meter_value(emission, &meter.id, &mut rng);
                writer
                    .write(meter, "power_consumption", reading, base.clone())
                    .await;
            }

            if dataset.len() < DATASET_PREVIEW {
                dataset.push(PredictionRow {
                    timestamp,
                    carbon_emission: emission,
                    factors: config.include_factors.then_some(factors),
                });
            }

            let done = i + 1;
            if done % PROGRESS_EVERY == 0 {
                let pct = percent(done, total);
                progress
                    .report(pct, format!("Generated {}/{} dataset points", done, total))
                    .await;
            }
            if i % 1000 == 0 {
                log::debug!("prediction dataset: {}/{} points", done, total);
            }
        }

        log::info!("prediction dataset finished: {} point(s)", total);
        Ok(PredictionSummary {
            total_points: total,
            dataset,
            time_range: TimeRange {
                start: config.start,
                end: config.end,
                interval_minutes: config.interval_minutes,
            },
            target_device: DeviceRef::from(target),
            records_written: writer.written(),
            records_failed: writer.failed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{generate_fleet, InMemoryCatalog};
    use crate::telemetry::MemorySink;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn engine(fleet: &[(DeviceType, u32)]) -> (TimeSeriesEngine, Arc<MemorySink>) {
        let catalog = Arc::new(InMemoryCatalog::with_devices(generate_fleet(fleet)));
        let sink = Arc::new(MemorySink::new());
        (
            TimeSeriesEngine::new(DeviceResolver::new(catalog), sink.clone()),
            sink,
        )
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_series_metadata() {
        let (engine, sink) = engine(&[(DeviceType::AirQualityMonitor, 1)]);
        let config = GenerationConfig::new(day(1), day(2)).with_seed(7);
        let summary = engine
            .carbon_emission_series(&config, &ProgressHandle::detached())
            .await
            .unwrap();

        assert_eq!(summary.count, 24);
        assert_eq!(summary.time_series.len(), SERIES_PREVIEW);
        let record = &sink.records()[0];
        assert_eq!(record.data_type, "air_quality_index");
        assert_eq!(record.metadata["generated"].as_bool(), Some(true));
        assert!(record.metadata.contains_key("date_time"));
        assert!(record.metadata.contains_key("is_outlier"));
    }

    #[tokio::test]
    async fn test_series_value_from_metadata() {
        let (engine, sink) = engine(&[(DeviceType::EnergyMeter, 1)]);
        let config = GenerationConfig::new(day(1), day(2))
            .with_outlier_rate(0.0)
            .with_seed(11);
        engine
            .carbon_emission_series(&config, &ProgressHandle::detached())
            .await
            .unwrap();

        for record in sink.records() {
            let part = |key: &str| record.metadata[key].as_f64().unwrap();
            let rebuilt =
                (part("base") + part("trend") + part("seasonality") + part("noise")).max(0.0);
            assert_relative_eq!(record.value, rebuilt, epsilon = 1e-9);
        }
    }

    #[tokio::test]
    async fn test_series_explicit_devices() {
        let (engine, sink) = engine(&[(DeviceType::CarbonSensor, 2), (DeviceType::Crane, 1)]);
        let config = GenerationConfig::new(day(1), day(1) + chrono::Duration::hours(3))
            .with_devices(["dev-crn-a001"]);
        let summary = engine
            .carbon_emission_series(&config, &ProgressHandle::detached())
            .await
            .unwrap();

        assert_eq!(summary.count, 3);
        assert_eq!(summary.devices.len(), 1);
        assert!(sink.records().iter().all(|r| r.data_type == "measurement"));
    }

    #[tokio::test]
    async fn test_prediction_without_factors() {
        let (engine, sink) = engine(&[(DeviceType::CarbonSensor, 1), (DeviceType::EnergyMeter, 5)]);
        let config = PredictionConfig::last_days(day(3), 1)
            .with_factors(false)
            .with_seed(3);
        let summary = engine
            .prediction_dataset(&config, &ProgressHandle::detached())
            .await
            .unwrap();

        assert_eq!(summary.total_points, 24);
        assert_eq!(summary.dataset.len(), 24);
        assert!(summary.dataset.iter().all(|r| r.factors.is_none()));
        // one emission + three meters per point
        assert_eq!(sink.total(), 24 * 4);
        let emission = sink
            .records()
            .into_iter()
            .find(|r| r.data_type == "carbon_emission")
            .unwrap();
        assert!(!emission.metadata.contains_key("temperature"));
    }

    #[tokio::test]
    async fn test_prediction_needs_carbon_sensor() {
        let (engine, sink) = engine(&[(DeviceType::EnergyMeter, 2)]);
        let config = PredictionConfig::last_days(day(3), 1);
        let err = engine
            .prediction_dataset(&config, &ProgressHandle::detached())
            .await
            .unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(sink.total(), 0);
    }

    #[test]
    fn test_prediction_row_json() {
        let row = PredictionRow {
            timestamp: day(1),
            carbon_emission: 42.5,
            factors: Some(EnvironmentFactors {
                temperature: 20.0,
                humidity: 50.0,
                occupancy: 10.0,
                traffic: 5.0,
                production: 30.0,
            }),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["carbon_emission"], 42.5);
        assert_eq!(json["temperature"], 20.0);
    }
}
