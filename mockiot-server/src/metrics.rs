// MockIoT Server - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for the MockIoT server.
//!
//! Telemetry counters are fed by [`crate::sink::MeteredSink`], task
//! counters by the registry event stream (see [`record_task_event`]).

use lazy_static::lazy_static;
use mockiot::{TaskEvent, TaskStatus};
use prometheus::{
    register_counter_vec, register_gauge, register_int_counter, CounterVec, Encoder, Gauge,
    IntCounter, TextEncoder,
};

lazy_static! {
    // ============================================================
    // Telemetry
    // ============================================================

    /// Telemetry writes, by data type and outcome (written / rejected).
    pub static ref TELEMETRY_RECORDS_TOTAL: CounterVec = register_counter_vec!(
        "mockiot_telemetry_records_total",
        "Telemetry records sent to the sink",
        &["data_type", "outcome"]
    ).unwrap();

    // ============================================================
    // Tasks
    // ============================================================

    /// Background tasks submitted, by kind.
    pub static ref TASKS_SUBMITTED_TOTAL: CounterVec = register_counter_vec!(
        "mockiot_tasks_submitted_total",
        "Background generation tasks submitted",
        &["kind"]
    ).unwrap();

    /// Background tasks finished, by kind and terminal status.
    pub static ref TASKS_FINISHED_TOTAL: CounterVec = register_counter_vec!(
        "mockiot_tasks_finished_total",
        "Background generation tasks finished",
        &["kind", "status"]
    ).unwrap();

    /// Tasks pending or running.
    pub static ref TASKS_ACTIVE: Gauge = register_gauge!(
        "mockiot_tasks_active",
        "Background generation tasks not yet finished"
    ).unwrap();

    /// Event stream lag: events dropped before the metrics task saw them.
    pub static ref TASK_EVENTS_LAGGED_TOTAL: IntCounter = register_int_counter!(
        "mockiot_task_events_lagged_total",
        "Task events missed by the metrics subscriber"
    ).unwrap();

    // ============================================================
    // Replay
    // ============================================================

    /// 1 while a continuous replay is running.
    pub static ref REPLAY_ACTIVE: Gauge = register_gauge!(
        "mockiot_replay_active",
        "Continuous CSV replay running (1) or stopped (0)"
    ).unwrap();

    /// Rows loaded from the replay CSV.
    pub static ref REPLAY_ROWS: Gauge = register_gauge!(
        "mockiot_replay_rows",
        "Rows loaded from the replay dataset"
    ).unwrap();

    /// Replay rows published to the sink.
    pub static ref REPLAY_PUBLISHED_TOTAL: IntCounter = register_int_counter!(
        "mockiot_replay_published_total",
        "Replay rows published"
    ).unwrap();

    /// Replay rows skipped because their device is not in the catalog.
    pub static ref REPLAY_UNMAPPED_TOTAL: IntCounter = register_int_counter!(
        "mockiot_replay_unmapped_total",
        "Replay rows whose device code has no catalog entry"
    ).unwrap();
}

/// Outcome label of a telemetry write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Written,
    Rejected,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Written => "written",
            Outcome::Rejected => "rejected",
        }
    }
}

/// Count one telemetry write.
pub fn record_telemetry(data_type: &str, outcome: Outcome) {
    TELEMETRY_RECORDS_TOTAL
        .with_label_values(&[data_type, outcome.as_str()])
        .inc();
}

/// Fold one registry event into the task counters.
pub fn record_task_event(event: &TaskEvent) {
    match event.status {
        TaskStatus::Pending => {
            TASKS_SUBMITTED_TOTAL
                .with_label_values(&[event.kind.as_str()])
                .inc();
        }
        TaskStatus::Running => {}
        TaskStatus::Completed | TaskStatus::Failed => {
            TASKS_FINISHED_TOTAL
                .with_label_values(&[event.kind.as_str(), event.status.as_str()])
                .inc();
        }
    }
}

/// Set the active task gauge.
pub fn set_active_tasks(active: usize) {
    TASKS_ACTIVE.set(active as f64);
}

/// Update replay gauges.
pub fn update_replay_metrics(active: bool, rows: usize) {
    REPLAY_ACTIVE.set(if active { 1.0 } else { 0.0 });
    REPLAY_ROWS.set(rows as f64);
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
