// MockIoT Server - Metered telemetry sink
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sink wrapper counting every write in Prometheus.

use crate::metrics::{record_telemetry, Outcome};
use async_trait::async_trait;
use mockiot::{RecordHandle, SinkError, TelemetryRecord, TelemetrySink};
use std::sync::Arc;

/// Forwards to an inner sink and counts outcomes per data type.
pub struct MeteredSink {
    inner: Arc<dyn TelemetrySink>,
}

impl MeteredSink {
    pub fn new(inner: Arc<dyn TelemetrySink>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl TelemetrySink for MeteredSink {
    async fn record(&self, record: TelemetryRecord) -> Result<RecordHandle, SinkError> {
        let data_type = record.data_type.clone();
        let result = self.inner.record(record).await;
        let outcome = if result.is_ok() {
            Outcome::Written
        } else {
            Outcome::Rejected
        };
        record_telemetry(&data_type, outcome);
        result
    }
}
