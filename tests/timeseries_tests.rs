// MockIoT - Synthetic IoT telemetry generator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Integration tests for time-series generation
//!
//! These tests drive the public [`Generator`] API end to end: catalog
//! lookup, sample computation, persistence and task tracking.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mockiot::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

fn reference_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 12, 9, 30, 0).unwrap()
}

fn generator_with(fleet: &[(DeviceType, u32)], sink: Arc<dyn TelemetrySink>) -> Generator {
    let catalog = Arc::new(InMemoryCatalog::with_devices(generate_fleet(fleet)));
    Generator::builder(catalog, sink)
        .pacer(Arc::new(InstantPacer::new()))
        .build()
}

async fn wait_for(generator: &Generator, id: TaskId) -> GenerationTask {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let task = generator.status(id).await.unwrap();
            if task.status.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("task did not finish in time")
}

fn timestamps_of(sink: &MemorySink, device_id: &str) -> Vec<DateTime<Utc>> {
    sink.records_for(device_id)
        .iter()
        .map(|r| match r.metadata.get("date_time") {
            Some(MetadataValue::Timestamp(ts)) => *ts,
            other => panic!("missing date_time metadata: {:?}", other),
        })
        .collect()
}

/// Rejects every third record.
#[derive(Default)]
struct FlakySink {
    inner: MemorySink,
    calls: AtomicUsize,
}

#[async_trait]
impl TelemetrySink for FlakySink {
    async fn record(&self, record: TelemetryRecord) -> std::result::Result<RecordHandle, SinkError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n % 3 == 0 {
            return Err(SinkError::Unavailable("ingestion timeout".into()));
        }
        self.inner.record(record).await
    }
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[tokio::test]
async fn test_two_sensors_one_day_async() {
    let sink = Arc::new(MemorySink::new());
    let generator = generator_with(&[(DeviceType::CarbonSensor, 2)], sink.clone());

    let query = TimeSeriesQuery {
        days: Some("1".into()),
        interval: Some("60".into()),
        ..Default::default()
    };
    let config = query.into_config(reference_now()).unwrap();
    let id = generator
        .submit(GenerationRequest::TimeSeries(config))
        .await
        .unwrap();

    let task = wait_for(&generator, id).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 100);
    assert!(task.end_time.is_some());
    assert!(task.error.is_none());

    match task.result {
        Some(GenerationSummary::TimeSeries(summary)) => {
            assert_eq!(summary.count, 48);
            assert_eq!(summary.devices.len(), 2);
            assert_eq!(summary.time_series.len(), 10);
        }
        other => panic!("unexpected result: {:?}", other),
    }

    assert_eq!(sink.total(), 48);
    for id in ["dev-co2-a001", "dev-co2-a002"] {
        assert_eq!(sink.records_for(id).len(), 24);
    }
    assert!(sink.records().iter().all(|r| r.value >= 0.0));
}

#[tokio::test]
async fn test_empty_catalog_fails_without_writes() {
    let sink = Arc::new(MemorySink::new());
    let generator = generator_with(&[(DeviceType::Gate, 1)], sink.clone());

    let config = GenerationConfig::last_days(reference_now(), 1);
    let id = generator
        .submit(GenerationRequest::TimeSeries(config))
        .await
        .unwrap();

    let task = wait_for(&generator, id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(!task.error.unwrap_or_default().is_empty());
    assert!(task.result.is_none());
    assert_ne!(task.progress, 100);
    assert_eq!(sink.total(), 0);
}

#[tokio::test]
async fn test_empty_catalog_sync_is_precondition_error() {
    let sink = Arc::new(MemorySink::new());
    let generator = generator_with(&[], sink.clone());

    let config = GenerationConfig::last_days(reference_now(), 1);
    let err = generator
        .run(&GenerationRequest::TimeSeries(config))
        .await
        .unwrap_err();
    assert!(err.is_precondition());
    assert_eq!(sink.total(), 0);
}

// ============================================================================
// Point count and ordering
// ============================================================================

#[tokio::test]
async fn test_point_count_matches_range() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let end = start + chrono::Duration::minutes(1000);

    for interval in [1u32, 7, 60, 333, 1440] {
        let sink = Arc::new(MemorySink::new());
        let generator = generator_with(
            &[(DeviceType::EnergyMeter, 1), (DeviceType::EmissionsAnalyzer, 1)],
            sink.clone(),
        );
        let config = GenerationConfig::new(start, end).with_interval_minutes(interval);
        generator
            .run(&GenerationRequest::TimeSeries(config))
            .await
            .unwrap();

        let expected = (1000.0 / interval as f64).ceil() as u64;
        assert_eq!(sink.total(), expected * 2, "interval {}", interval);
    }
}

#[tokio::test]
async fn test_timestamps_ordered_per_device() {
    let sink = Arc::new(MemorySink::new());
    let generator = generator_with(
        &[(DeviceType::CarbonSensor, 1), (DeviceType::AirQualityMonitor, 1)],
        sink.clone(),
    );
    let config = GenerationConfig::last_days(reference_now(), 2).with_interval_minutes(30);
    generator
        .run(&GenerationRequest::TimeSeries(config.clone()))
        .await
        .unwrap();

    for device in ["dev-co2-a001", "dev-aq-a001"] {
        let timestamps = timestamps_of(&sink, device);
        assert_eq!(timestamps.len(), 96);
        assert_eq!(timestamps[0], config.start);
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[tokio::test]
async fn test_same_seed_same_cardinality_and_timestamps() {
    let config = GenerationConfig::last_days(reference_now(), 3)
        .with_interval_minutes(45)
        .with_seed(1234);

    let mut runs = Vec::new();
    for _ in 0..2 {
        let sink = Arc::new(MemorySink::new());
        let generator = generator_with(&[(DeviceType::CarbonSensor, 2)], sink.clone());
        generator
            .run(&GenerationRequest::TimeSeries(config.clone()))
            .await
            .unwrap();
        runs.push((
            sink.total(),
            timestamps_of(&sink, "dev-co2-a001"),
            timestamps_of(&sink, "dev-co2-a002"),
        ));
    }

    assert_eq!(runs[0], runs[1]);
}

// ============================================================================
// Values and parameters
// ============================================================================

#[tokio::test]
async fn test_values_non_negative_at_extremes() {
    let sink = Arc::new(MemorySink::new());
    let generator = generator_with(&DeviceType::carbon_monitoring().map(|t| (t, 1)), sink.clone());

    let config = GenerationConfig::last_days(reference_now(), 7)
        .with_trend(-0.5)
        .with_noise(1.0)
        .with_seasonality(0.0)
        .with_outlier_rate(0.1)
        .with_interval_minutes(15);
    generator
        .run(&GenerationRequest::TimeSeries(config))
        .await
        .unwrap();

    assert_eq!(sink.total(), 4 * 7 * 96);
    assert!(sink.records().iter().all(|r| r.value >= 0.0));
}

#[tokio::test]
async fn test_zero_outlier_rate_has_no_outliers() {
    let sink = Arc::new(MemorySink::new());
    let generator = generator_with(&[(DeviceType::CarbonSensor, 1)], sink.clone());
    let config = GenerationConfig::last_days(reference_now(), 5).with_outlier_rate(0.0);
    generator
        .run(&GenerationRequest::TimeSeries(config))
        .await
        .unwrap();

    assert!(sink
        .records()
        .iter()
        .all(|r| r.metadata["is_outlier"].as_bool() == Some(false)));
}

#[tokio::test]
async fn test_invalid_query_rejected_before_task() {
    let generator = generator_with(&[(DeviceType::CarbonSensor, 1)], Arc::new(MemorySink::new()));

    for (days, interval) in [("0", "60"), ("366", "60"), ("1", "0"), ("1", "1441"), ("x", "60")] {
        let query = TimeSeriesQuery {
            days: Some(days.into()),
            interval: Some(interval.into()),
            ..Default::default()
        };
        assert!(query.into_config(reference_now()).is_err(), "{} {}", days, interval);
    }

    let inverted = GenerationConfig::new(reference_now(), reference_now() - chrono::Duration::days(1));
    assert!(generator
        .submit(GenerationRequest::TimeSeries(inverted))
        .await
        .is_err());
    assert!(generator.tasks().await.is_empty());
}

// ============================================================================
// Best effort persistence
// ============================================================================

#[tokio::test]
async fn test_sink_failures_do_not_abort_run() {
    let sink = Arc::new(FlakySink::default());
    let generator = generator_with(&[(DeviceType::EnergyMeter, 1)], sink.clone());

    let config = GenerationConfig::last_days(reference_now(), 1);
    let id = generator
        .submit(GenerationRequest::TimeSeries(config))
        .await
        .unwrap();
    let task = wait_for(&generator, id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    match task.result {
        Some(GenerationSummary::TimeSeries(summary)) => {
            assert_eq!(summary.count, 24);
            assert_eq!(summary.records_failed, 8);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(sink.calls.load(Ordering::SeqCst), 24);
    assert_eq!(sink.inner.total(), 16);
}

// ============================================================================
// Progress
// ============================================================================

#[tokio::test]
async fn test_progress_is_monotone() {
    let generator = generator_with(&[(DeviceType::CarbonSensor, 1)], Arc::new(MemorySink::new()));
    let mut events = generator.subscribe();

    // 3 days at one-minute resolution: 4320 records
    let config = GenerationConfig::last_days(reference_now(), 3).with_interval_minutes(1);
    let id = generator
        .submit(GenerationRequest::TimeSeries(config))
        .await
        .unwrap();

    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let event = events.recv().await.unwrap();
            if event.task_id != id {
                continue;
            }
            let terminal = event.status.is_terminal();
            seen.push(event);
            if terminal {
                break;
            }
        }
    })
    .await
    .expect("no terminal event");

    assert_eq!(seen.first().map(|e| e.status), Some(TaskStatus::Pending));
    assert_eq!(seen.get(1).map(|e| e.status), Some(TaskStatus::Running));
    assert_eq!(seen.last().map(|e| e.status), Some(TaskStatus::Completed));
    assert!(seen.windows(2).all(|w| w[0].progress <= w[1].progress));

    let (last, running) = seen.split_last().unwrap();
    assert_eq!(last.progress, 100);
    assert!(running.iter().all(|e| e.progress <= 95));
    assert!(running.iter().any(|e| e.progress > 0));
}

// ============================================================================
// Prediction dataset
// ============================================================================

#[tokio::test]
async fn test_prediction_dataset_async() {
    let sink = Arc::new(MemorySink::new());
    let generator = generator_with(
        &[(DeviceType::CarbonSensor, 2), (DeviceType::EnergyMeter, 2)],
        sink.clone(),
    );

    let query = PredictionQuery {
        days: Some("2".into()),
        ..Default::default()
    };
    let config = query.into_config(reference_now()).unwrap();
    let id = generator
        .submit(GenerationRequest::PredictionDataset(config))
        .await
        .unwrap();
    let task = wait_for(&generator, id).await;
    assert_eq!(task.status, TaskStatus::Completed);

    let Some(GenerationSummary::PredictionDataset(summary)) = task.result else {
        panic!("unexpected result");
    };
    assert_eq!(summary.total_points, 48);
    assert_eq!(summary.dataset.len(), 48);
    assert_eq!(summary.target_device.code, "DEV-CO2-A001");
    assert_eq!(summary.time_range.interval_minutes, 60);
    assert!(summary.dataset.iter().all(|r| r.carbon_emission >= 10.0));
    assert!(summary.dataset.iter().all(|r| r.factors.is_some()));

    // target sensor + both meters, second sensor untouched
    assert_eq!(sink.records_for("dev-co2-a001").len(), 48);
    assert_eq!(sink.records_for("dev-co2-a002").len(), 0);
    assert_eq!(sink.records_for("dev-em-a001").len(), 48);
    assert_eq!(sink.records_for("dev-em-a002").len(), 48);
}
