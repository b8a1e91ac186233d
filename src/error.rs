// MockIoT - Error types
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for MockIoT
//!
//! This module defines all error types used throughout the library.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for generation runs
pub type Result<T> = std::result::Result<T, GenerationError>;

/// Main error type for generation runs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    /// Request rejected before anything ran
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The catalog has none of the devices the run needs
    #[error("Missing devices: {0}")]
    MissingDevices(String),

    /// Device catalog failure
    #[error("Device catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The generation body panicked
    #[error("Generation panicked: {0}")]
    Panicked(String),
}

impl GenerationError {
    /// Whether this is a precondition failure (reported as `success: false`)
    pub fn is_precondition(&self) -> bool {
        matches!(self, GenerationError::MissingDevices(_))
    }
}

/// Errors in request parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Numeric parameter outside its allowed bounds
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },

    /// Parameter is not a number
    #[error("{name} is not a valid number: {raw:?}")]
    NotANumber { name: &'static str, raw: String },

    /// End of the time range precedes its start
    #[error("Time range is inverted: {start} is after {end}")]
    InvertedRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Errors raised by a device catalog implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// Backing store unreachable
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by a telemetry sink implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    /// The record was refused (validation, unknown device, ...)
    #[error("Record rejected: {0}")]
    Rejected(String),

    /// Ingestion path unreachable
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Errors from task lookups
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// No task with this identifier (never existed or evicted)
    #[error("Task not found: {0}")]
    NotFound(String),
}
