// MockIoT - Synthetic IoT telemetry generator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # MockIoT
//!
//! Synthetic IoT telemetry for carbon-monitoring and logistics sites.
//!
//! The crate produces telemetry on demand and persists every point through
//! a pluggable sink:
//!
//! - **Time series**: long-horizon, interval-sampled carbon emission data
//!   with trend, seasonality, noise and outliers
//! - **Prediction datasets**: emissions correlated with environmental
//!   factors and energy meter readings
//! - **Scenarios**: vehicle entry, loading dock work cycles, carbon peak
//!   and reduction snapshots, workday and night activity patterns
//! - **Background runs**: long generations run off the calling path and
//!   report progress through a task registry
//!
//! ## Quick Start
//!
//! ```rust
//! use mockiot::{
//!     generate_fleet, DeviceType, GenerationConfig, GenerationRequest, Generator,
//!     InMemoryCatalog, InstantPacer, MemorySink,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let catalog = Arc::new(InMemoryCatalog::with_devices(generate_fleet(&[
//!     (DeviceType::CarbonSensor, 2),
//! ])));
//! let sink = Arc::new(MemorySink::new());
//! let generator = Generator::builder(catalog, sink.clone())
//!     .pacer(Arc::new(InstantPacer::new()))
//!     .build();
//!
//! // One day of hourly points per sensor
//! let config = GenerationConfig::last_days(chrono::Utc::now(), 1).with_seed(42);
//! generator.run(&GenerationRequest::TimeSeries(config)).await.unwrap();
//!
//! assert_eq!(sink.total(), 48);
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Run configurations and parameter bounds
//! - [`device`]: Device catalog adapter
//! - [`telemetry`]: Telemetry sink adapter
//! - [`patterns`]: Value and pattern generators
//! - [`pacing`]: Simulated real-time pauses
//! - [`scenario`]: Multi-device scenarios
//! - [`timeseries`]: Time series and prediction datasets
//! - [`task`]: Task registry
//! - [`runner`]: Foreground and background runs

// Modules
pub mod config;
pub mod device;
pub mod error;
pub mod pacing;
pub mod patterns;
pub mod runner;
pub mod scenario;
pub mod task;
pub mod telemetry;
pub mod timeseries;

// Re-exports for convenient access
pub use config::{
    GenerationConfig, LoadingConfig, LoadingQuery, ModelParams, PredictionConfig,
    PredictionQuery, RetentionPolicy, TimeSeriesQuery, VehicleEntryConfig, VehicleEntryQuery,
};
pub use device::{
    default_fleet, device_code, generate_fleet, infer_device_type, DeviceCatalog, DeviceHandle,
    DeviceResolver, DeviceType, InMemoryCatalog,
};
pub use error::{CatalogError, ConfigError, GenerationError, Result, SinkError, TaskError};
pub use pacing::{InstantPacer, Pacer, RealTimePacer};
pub use patterns::{Components, EnvironmentFactors, SampleModel, SyntheticSample};
pub use runner::{GenerationRequest, GenerationSummary, Generator, GeneratorBuilder};
pub use scenario::{
    EquipmentStatus, LoadingSummary, ScenarioEngine, SnapshotSummary, TimePattern,
    VehicleEntrySummary,
};
pub use task::{
    GenerationTask, ProgressHandle, TaskEvent, TaskId, TaskKind, TaskRegistry, TaskStatus,
};
pub use telemetry::{
    Metadata, MetadataValue, MemorySink, RecordHandle, TelemetryRecord, TelemetrySink,
    TelemetryWriter,
};
pub use timeseries::{PredictionSummary, TimeSeriesEngine, TimeSeriesSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
