// MockIoT - Async runner
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Generation runner.
//!
//! [`Generator`] is the entry point of the crate. A request either runs on
//! the caller's task ([`Generator::run`]) or is submitted to the background
//! ([`Generator::submit`]), which answers with a [`TaskId`] straight away
//! and records the outcome in the [`TaskRegistry`].
//!
//! Configuration errors are raised by both paths before anything runs.
//! After that, the asynchronous path reports failures only through the
//! task status, including panics of the generation body.

use crate::config::{
    GenerationConfig, LoadingConfig, PredictionConfig, RetentionPolicy, VehicleEntryConfig,
};
use crate::device::{DeviceCatalog, DeviceResolver};
use crate::error::{ConfigError, GenerationError, Result, TaskError};
use crate::pacing::{Pacer, RealTimePacer};
use crate::scenario::{
    LoadingSummary, ScenarioEngine, SnapshotSummary, TimePattern, VehicleEntrySummary,
};
use crate::task::{GenerationTask, ProgressHandle, TaskEvent, TaskId, TaskKind, TaskRegistry};
use crate::telemetry::TelemetrySink;
use crate::timeseries::{PredictionSummary, TimeSeriesEngine, TimeSeriesSummary};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A generation run, with its configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    TimeSeries(GenerationConfig),
    PredictionDataset(PredictionConfig),
    LoadingScenario(LoadingConfig),
    VehicleEntry(VehicleEntryConfig),
    CarbonPeak { seed: Option<u64> },
    CarbonReduction { seed: Option<u64> },
    TimePattern { pattern: TimePattern, seed: Option<u64> },
}

impl GenerationRequest {
    /// Task kind recorded for this request.
    pub fn kind(&self) -> TaskKind {
        match self {
            GenerationRequest::TimeSeries(_) => TaskKind::TimeSeries,
            GenerationRequest::PredictionDataset(_) => TaskKind::PredictionDataset,
            GenerationRequest::LoadingScenario(_) => TaskKind::LoadingScenario,
            GenerationRequest::VehicleEntry(_) => TaskKind::VehicleEntry,
            GenerationRequest::CarbonPeak { .. } => TaskKind::CarbonPeak,
            GenerationRequest::CarbonReduction { .. } => TaskKind::CarbonReduction,
            GenerationRequest::TimePattern { .. } => TaskKind::TimePattern,
        }
    }

    /// Check the configuration.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        match self {
            GenerationRequest::TimeSeries(c) => c.validate(),
            GenerationRequest::PredictionDataset(c) => c.validate(),
            GenerationRequest::LoadingScenario(c) => c.validate(),
            GenerationRequest::VehicleEntry(c) => c.validate(),
            GenerationRequest::CarbonPeak { .. }
            | GenerationRequest::CarbonReduction { .. }
            | GenerationRequest::TimePattern { .. } => Ok(()),
        }
    }
}

/// Output of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationSummary {
    TimeSeries(TimeSeriesSummary),
    PredictionDataset(PredictionSummary),
    LoadingScenario(LoadingSummary),
    VehicleEntry(VehicleEntrySummary),
    Snapshot(SnapshotSummary),
}

impl GenerationSummary {
    /// Human-readable outcome.
    pub fn message(&self) -> String {
        match self {
            GenerationSummary::TimeSeries(s) => {
                format!("Generated {} carbon emission records", s.count)
            }
            GenerationSummary::PredictionDataset(s) => {
                format!("Generated prediction dataset of {} points", s.total_points)
            }
            GenerationSummary::LoadingScenario(s) => format!(
                "Simulated {} minutes of loading activity at {} minute intervals",
                s.duration_minutes, s.interval_minutes
            ),
            GenerationSummary::VehicleEntry(s) => {
                format!("Simulated entry of {} vehicle(s)", s.vehicles.len())
            }
            GenerationSummary::Snapshot(s) => {
                format!("Generated {} {} samples", s.samples_count, s.scenario)
            }
        }
    }

    /// Telemetry writes rejected by the sink during the run.
    pub fn records_failed(&self) -> usize {
        match self {
            GenerationSummary::TimeSeries(s) => s.records_failed,
            GenerationSummary::PredictionDataset(s) => s.records_failed,
            GenerationSummary::LoadingScenario(s) => s.records_failed,
            GenerationSummary::VehicleEntry(s) => s.records_failed,
            GenerationSummary::Snapshot(s) => s.records_failed,
        }
    }
}

/// Builder for [`Generator`].
pub struct GeneratorBuilder {
    catalog: Arc<dyn DeviceCatalog>,
    sink: Arc<dyn TelemetrySink>,
    pacer: Arc<dyn Pacer>,
    retention: RetentionPolicy,
}

impl GeneratorBuilder {
    /// Replace the pacer (real time by default).
    pub fn pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    /// Replace the task retention policy.
    pub fn retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Build the generator.
    pub fn build(self) -> Generator {
        let resolver = DeviceResolver::new(self.catalog);
        Generator {
            scenarios: ScenarioEngine::new(resolver.clone(), self.sink.clone(), self.pacer),
            series: TimeSeriesEngine::new(resolver, self.sink),
            registry: Arc::new(TaskRegistry::new(self.retention)),
        }
    }
}

/// Runs generation requests, in the foreground or in the background.
#[derive(Clone)]
pub struct Generator {
    scenarios: ScenarioEngine,
    series: TimeSeriesEngine,
    registry: Arc<TaskRegistry>,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("retention", &self.registry.retention())
            .finish_non_exhaustive()
    }
}

impl Generator {
    /// Generator with real-time pacing and the default retention policy.
    pub fn new(catalog: Arc<dyn DeviceCatalog>, sink: Arc<dyn TelemetrySink>) -> Self {
        Self::builder(catalog, sink).build()
    }

    /// Start building a generator.
    pub fn builder(catalog: Arc<dyn DeviceCatalog>, sink: Arc<dyn TelemetrySink>) -> GeneratorBuilder {
        GeneratorBuilder {
            catalog,
            sink,
            pacer: Arc::new(RealTimePacer::default()),
            retention: RetentionPolicy::default(),
        }
    }

    /// Task registry.
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Run a request on the caller's task and wait for the result.
    pub async fn run(&self, request: &GenerationRequest) -> Result<GenerationSummary> {
        request.validate()?;
        self.execute(request, &ProgressHandle::detached()).await
    }

    /// Submit a request to the background.
    ///
    /// Returns once the task is registered. Needs a tokio runtime.
    pub async fn submit(&self, request: GenerationRequest) -> std::result::Result<TaskId, ConfigError> {
        request.validate()?;
        let kind = request.kind();
        let id = self.registry.create(kind).await;
        log::info!("task {} submitted ({})", id, kind);

        let this = self.clone();
        tokio::spawn(async move { this.drive(id, request).await });
        Ok(id)
    }

    /// Status of one task.
    pub async fn status(&self, id: TaskId) -> std::result::Result<GenerationTask, TaskError> {
        self.registry.get(id).await
    }

    /// Every retained task, oldest first.
    pub async fn tasks(&self) -> Vec<GenerationTask> {
        self.registry.list().await
    }

    /// Task state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.registry.subscribe()
    }

    async fn drive(&self, id: TaskId, request: GenerationRequest) {
        let kind = request.kind();
        self.registry
            .mark_running(id, format!("Running {}", kind))
            .await;

        // the body runs in its own task so a panic surfaces as a JoinError
        let worker = self.clone();
        let progress = ProgressHandle::attached(self.registry.clone(), id);
        let body = tokio::spawn(async move { worker.execute(&request, &progress).await });

        match body.await {
            Ok(Ok(summary)) => {
                if summary.records_failed() > 0 {
                    log::warn!(
                        "task {} finished with {} rejected record(s)",
                        id,
                        summary.records_failed()
                    );
                }
                log::info!("task {} completed: {}", id, summary.message());
                self.registry.complete(id, summary).await;
            }
            Ok(Err(e)) => {
                log::error!("task {} failed: {}", id, e);
                self.registry.fail(id, e.to_string()).await;
            }
            Err(join_error) => {
                let reason = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    "generation task was cancelled".to_string()
                };
                let e = GenerationError::Panicked(reason);
                log::error!("task {} failed: {}", id, e);
                self.registry.fail(id, e.to_string()).await;
            }
        }
    }

    async fn execute(
        &self,
        request: &GenerationRequest,
        progress: &ProgressHandle,
    ) -> Result<GenerationSummary> {
        let summary = match request {
            GenerationRequest::TimeSeries(config) => GenerationSummary::TimeSeries(
                self.series.carbon_emission_series(config, progress).await?,
            ),
            GenerationRequest::PredictionDataset(config) => GenerationSummary::PredictionDataset(
                self.series.prediction_dataset(config, progress).await?,
            ),
            GenerationRequest::LoadingScenario(config) => {
                GenerationSummary::LoadingScenario(self.scenarios.loading(config, progress).await?)
            }
            GenerationRequest::VehicleEntry(config) => GenerationSummary::VehicleEntry(
                self.scenarios.vehicle_entry(config, progress).await?,
            ),
            GenerationRequest::CarbonPeak { seed } => {
                GenerationSummary::Snapshot(self.scenarios.carbon_peak(*seed).await?)
            }
            GenerationRequest::CarbonReduction { seed } => {
                GenerationSummary::Snapshot(self.scenarios.carbon_reduction(*seed).await?)
            }
            GenerationRequest::TimePattern { pattern, seed } => {
                GenerationSummary::Snapshot(self.scenarios.time_pattern(*pattern, *seed).await?)
            }
        };
        Ok(summary)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{generate_fleet, DeviceType, InMemoryCatalog};
    use crate::error::SinkError;
    use crate::pacing::InstantPacer;
    use crate::task::TaskStatus;
    use crate::telemetry::{MemorySink, RecordHandle, TelemetryRecord};
    use async_trait::async_trait;
    use std::time::Duration;

    struct PanickingSink;

    #[async_trait]
    impl TelemetrySink for PanickingSink {
        async fn record(&self, _record: TelemetryRecord) -> std::result::Result<RecordHandle, SinkError> {
            panic!("sink exploded");
        }
    }

    fn generator(fleet: &[(DeviceType, u32)], sink: Arc<dyn TelemetrySink>) -> Generator {
        let catalog = Arc::new(InMemoryCatalog::with_devices(generate_fleet(fleet)));
        Generator::builder(catalog, sink)
            .pacer(Arc::new(InstantPacer::new()))
            .build()
    }

    async fn wait_terminal(generator: &Generator, id: TaskId) -> GenerationTask {
        for _ in 0..500 {
            let task = generator.status(id).await.unwrap();
            if task.status.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {} did not finish", id);
    }

    #[test]
    fn test_request_kind() {
        let request = GenerationRequest::TimePattern {
            pattern: TimePattern::Night,
            seed: None,
        };
        assert_eq!(request.kind(), TaskKind::TimePattern);
        assert!(request.validate().is_ok());
        assert_eq!(
            GenerationRequest::LoadingScenario(LoadingConfig::default()).kind(),
            TaskKind::LoadingScenario
        );
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_config() {
        let generator = generator(&[(DeviceType::Loader, 1)], Arc::new(MemorySink::new()));
        let request = GenerationRequest::LoadingScenario(LoadingConfig::new(10, 0));
        assert!(generator.submit(request).await.is_err());
        assert!(generator.tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_task() {
        let generator = generator(&[(DeviceType::CarbonSensor, 1)], Arc::new(PanickingSink));
        let id = generator
            .submit(GenerationRequest::CarbonPeak { seed: Some(1) })
            .await
            .unwrap();

        let task = wait_terminal(&generator, id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.unwrap().contains("sink exploded"));
        assert!(task.end_time.is_some());
    }

    #[tokio::test]
    async fn test_sync_run_snapshot() {
        let sink = Arc::new(MemorySink::new());
        let generator = generator(
            &[(DeviceType::SolarPanel, 2), (DeviceType::Lighting, 1)],
            sink.clone(),
        );
        let summary = generator
            .run(&GenerationRequest::CarbonReduction { seed: Some(9) })
            .await
            .unwrap();

        let GenerationSummary::Snapshot(snapshot) = summary else {
            panic!("unexpected summary kind");
        };
        assert_eq!(snapshot.samples_count, 3);
        assert_eq!(sink.total(), 3);
        assert!(generator.tasks().await.is_empty());
    }

    #[test]
    fn test_summary_json_is_tagged() {
        let summary = GenerationSummary::LoadingScenario(LoadingSummary {
            duration_minutes: 10,
            interval_minutes: 5,
            iterations: 2,
            devices: 3,
            records_written: 12,
            records_failed: 0,
        });
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["kind"], "loading_scenario");
        assert_eq!(json["iterations"], 2);
    }
}
