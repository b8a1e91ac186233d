// MockIoT - Pacing
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Simulated real-time pacing.
//!
//! Scenarios pause between steps to mimic the cadence of real equipment.
//! The pause is a cooperative `await` inside the run's own task, so it never
//! holds the registry or another run.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Source of pauses between simulated steps.
#[async_trait]
pub trait Pacer: Send + Sync {
    /// Wait for `duration` of simulated time.
    async fn pause(&self, duration: Duration);
}

/// Sleeps on the tokio timer, optionally faster than real time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealTimePacer {
    speed: f64,
}

impl Default for RealTimePacer {
    fn default() -> Self {
        Self { speed: 1.0 }
    }
}

impl RealTimePacer {
    /// Pacer running `speed` times faster than real time.
    ///
    /// Non-positive or non-finite speeds fall back to real time.
    pub fn new(speed: f64) -> Self {
        let speed = if speed.is_finite() && speed > 0.0 {
            speed
        } else {
            1.0
        };
        Self { speed }
    }

    /// Speed multiplier.
    pub fn speed(&self) -> f64 {
        self.speed
    }
}

#[async_trait]
impl Pacer for RealTimePacer {
    async fn pause(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        tokio::time::sleep(duration.div_f64(self.speed)).await;
    }
}

/// Returns immediately and remembers every requested pause.
#[derive(Debug, Default)]
pub struct InstantPacer {
    requested: Mutex<Vec<Duration>>,
}

impl InstantPacer {
    /// Create a pacer with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pauses requested so far, in order.
    pub fn requested(&self) -> Vec<Duration> {
        self.requested
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Sum of all requested pauses.
    pub fn total(&self) -> Duration {
        self.requested().iter().sum()
    }
}

#[async_trait]
impl Pacer for InstantPacer {
    async fn pause(&self, duration: Duration) {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(duration);
        }
        tokio::task::yield_now().await;
    }
}
