// MockIoT - Value patterns
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Value and pattern generators.
//!
//! Pure functions computing one synthetic value from a device role, a
//! timestamp and the model parameters. Randomness always comes from the
//! caller's RNG so seeded runs are reproducible.
//!
//! The sample model is
//!
//! `value = max(0, base + trend + seasonal + noise + outlier)`
//!
//! with `range = 0.6 * base` scaling every stochastic term.
//!
//! All calendar factors read the timestamp in UTC.

use crate::config::ModelParams;
use crate::device::DeviceType;
use chrono::{DateTime, Datelike, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Amplitude of the stochastic terms, relative to the base value.
pub const RANGE_RATIO: f64 = 0.6;

/// Base value of a device role.
pub fn base_value(device_type: DeviceType) -> f64 {
    match device_type {
        DeviceType::CarbonSensor => 75.0,
        DeviceType::EnergyMeter => 120.0,
        DeviceType::AirQualityMonitor => 50.0,
        DeviceType::EmissionsAnalyzer => 65.0,
        _ => 100.0,
    }
}

/// Telemetry data type emitted by a device role in a time series.
pub fn data_type_for(device_type: DeviceType) -> &'static str {
    match device_type {
        DeviceType::CarbonSensor => "carbon_emission",
        DeviceType::EnergyMeter => "power_consumption",
        DeviceType::AirQualityMonitor => "air_quality_index",
        DeviceType::EmissionsAnalyzer => "emission_analysis",
        _ => "measurement",
    }
}

/// RNG for one run: seeded when a seed is given, from entropy otherwise.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Uniform draw in `[min, max)`; returns `min` for an empty interval.
pub fn uniform(rng: &mut (impl Rng + ?Sized), min: f64, max: f64) -> f64 {
    if max <= min {
        return min;
    }
    rng.gen_range(min..max)
}

/// Uniform draw in `[-1, 1)`.
fn signed_unit(rng: &mut (impl Rng + ?Sized)) -> f64 {
    rng.gen::<f64>() * 2.0 - 1.0
}

fn is_weekday(ts: &DateTime<Utc>) -> bool {
    ts.weekday().number_from_monday() <= 5
}

/// Business-hours bump: rising sine over 8h-18h, 0.3 otherwise.
pub fn hourly_factor(ts: &DateTime<Utc>) -> f64 {
    let hour = ts.hour();
    if (8..=18).contains(&hour) {
        0.3 + 0.7 * (PI * (hour as f64 - 8.0) / 10.0).sin()
    } else {
        0.3
    }
}

/// 1.0 Monday to Friday, 0.6 on weekends.
pub fn daily_factor(ts: &DateTime<Utc>) -> f64 {
    if is_weekday(ts) {
        1.0
    } else {
        0.6
    }
}

/// Yearly cycle: `0.8 + 0.4 * sin(PI * month / 6)`, months counted from 0.
pub fn monthly_factor(ts: &DateTime<Utc>) -> f64 {
    0.8 + 0.4 * (PI * ts.month0() as f64 / 6.0).sin()
}

/// Product of the hourly, daily and monthly factors.
pub fn seasonal_factor(ts: &DateTime<Utc>) -> f64 {
    hourly_factor(ts) * daily_factor(ts) * monthly_factor(ts)
}

/// Breakdown of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Components {
    pub base: f64,
    pub trend: f64,
    pub seasonal: f64,
    pub noise: f64,
    pub outlier: f64,
}

impl Components {
    /// Final value, floored at zero.
    pub fn value(&self) -> f64 {
        (self.base + self.trend + self.seasonal + self.noise + self.outlier).max(0.0)
    }

    /// Whether an outlier perturbation was applied.
    pub fn is_outlier(&self) -> bool {
        self.outlier != 0.0
    }
}

/// Sample model bound to one device role.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleModel {
    base: f64,
    params: ModelParams,
}

impl SampleModel {
    /// Model for a device role.
    pub fn for_device(device_type: DeviceType, params: ModelParams) -> Self {
        Self::with_base(base_value(device_type), params)
    }

    /// Model with an explicit base value.
    pub fn with_base(base: f64, params: ModelParams) -> Self {
        Self { base, params }
    }

    /// Base value.
    pub fn base(&self) -> f64 {
        self.base
    }

    /// Amplitude of the stochastic terms.
    pub fn range(&self) -> f64 {
        self.base * RANGE_RATIO
    }

    /// Compute point `index` of a run of `total` points at `ts`.
    pub fn sample(
        &self,
        index: usize,
        total: usize,
        ts: &DateTime<Utc>,
        rng: &mut (impl Rng + ?Sized),
    ) -> Components {
        let range = self.range();
        let fraction = if total == 0 {
            0.0
        } else {
            index as f64 / total as f64
        };

        let trend = self.params.trend * fraction * self.base;
        let seasonal = self.params.seasonality * range * seasonal_factor(ts);
        let noise = signed_unit(rng) * self.params.noise * range;

        // rate 0 never draws an outlier
        let outlier = if self.params.outlier_rate > 0.0 && rng.gen::<f64>() < self.params.outlier_rate
        {
            signed_unit(rng) * range * 2.0
        } else {
            0.0
        };

        Components {
            base: self.base,
            trend,
            seasonal,
            noise,
            outlier,
        }
    }
}

/// One emitted time-series point, kept for previews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSample {
    pub device_id: String,
    pub device_code: String,
    pub data_type: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub components: Components,
}

/// Environmental and operational factors driving the prediction dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentFactors {
    /// Degrees Celsius.
    pub temperature: f64,
    /// Relative humidity, percent, clamped to [30, 90].
    pub humidity: f64,
    /// Occupancy index (0..~110).
    pub occupancy: f64,
    /// Vehicles per interval.
    pub traffic: f64,
    /// Production index.
    pub production: f64,
}

impl EnvironmentFactors {
    /// Factors for point `index` at `ts`.
    pub fn at(ts: &DateTime<Utc>, index: usize, rng: &mut (impl Rng + ?Sized)) -> Self {
        let hour = ts.hour() as f64;
        let business = (8..=18).contains(&ts.hour());
        let weekday = is_weekday(ts);
        let month = ts.month0() as f64;

        let day_temp = if business {
            15.0 + 10.0 * (PI * (hour - 8.0) / 10.0).sin()
        } else {
            15.0
        };
        let season_temp = 5.0 * (PI * (month - 2.0) / 6.0).sin();
        let temperature = day_temp + season_temp + uniform(rng, -2.5, 2.5);

        let base_humidity = 60.0 - (temperature - 15.0) * 1.5;
        let humidity = (base_humidity + uniform(rng, -5.0, 5.0)).clamp(30.0, 90.0);

        let time_occupancy = if business {
            0.4 + 0.6 * (PI * (hour - 8.0) / 10.0).sin()
        } else {
            0.1
        };
        let day_occupancy = if weekday { 1.0 } else { 0.3 };
        let occupancy = 100.0 * time_occupancy * day_occupancy * uniform(rng, 0.9, 1.1);

        let rush = (7..=9).contains(&ts.hour()) || (17..=19).contains(&ts.hour());
        let mut traffic_factor = if rush {
            uniform(rng, 0.8, 1.2)
        } else if (10..=16).contains(&ts.hour()) {
            uniform(rng, 0.5, 0.8)
        } else {
            0.2
        };
        if !weekday {
            traffic_factor *= 0.4;
        }
        let traffic = (50.0 * traffic_factor).round();

        let time_production = if (8..=20).contains(&ts.hour()) {
            0.5 + 0.5 * (PI * (hour - 8.0) / 12.0).sin()
        } else {
            0.3
        };
        let season_production = 0.8 + 0.4 * (PI * month / 6.0).sin();
        let growth = 1.0 + 0.002 * index as f64;
        let production =
            80.0 * time_production * season_production * growth * uniform(rng, 0.95, 1.05);

        Self {
            temperature,
            humidity,
            occupancy,
            traffic,
            production,
        }
    }
}

/// Linear emission model over the factors.
///
/// Floored at 10 and rounded to one decimal.
pub fn emission_from_factors(factors: &EnvironmentFactors, rng: &mut (impl Rng + ?Sized)) -> f64 {
    let raw = 50.0
        + 0.5 * (factors.temperature - 15.0)
        + 0.2 * factors.occupancy
        + 0.8 * factors.traffic
        + 0.3 * factors.production
        + uniform(rng, -10.0, 10.0);
    ((raw * 10.0).round() / 10.0).max(10.0)
}

/// Energy meter reading correlated with an emission value.
///
/// Meters whose id contains `main` draw more than secondary meters.
pub fn correlated_meter_value(emission: f64, meter_id: &str, rng: &mut (impl Rng + ?Sized)) -> f64 {
    let weight = if meter_id.contains("main") { 1.2 } else { 0.9 };
    emission * uniform(rng, 0.7, 1.3) * weight
}
