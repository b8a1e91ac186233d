// MockIoT - Configuration
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Run configurations and request parameter validation.
//!
//! Every generation run is described by an immutable config struct that is
//! validated once, before any task exists. The `*Query` types parse the raw
//! string parameters of the protocol surface against fixed bounds.

use crate::error::ConfigError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;

/// Allowed span of a generated history, in days.
pub const DAYS_RANGE: RangeInclusive<i64> = 1..=365;
/// Allowed sampling interval, in minutes.
pub const INTERVAL_RANGE: RangeInclusive<i64> = 1..=1440;
/// Allowed loading-scenario duration, in minutes (one week).
pub const DURATION_RANGE: RangeInclusive<i64> = 1..=10_080;
/// Allowed number of vehicles per entry scenario.
pub const VEHICLE_COUNT_RANGE: RangeInclusive<i64> = 1..=100;
/// Linear trend coefficient bounds.
pub const TREND_RANGE: RangeInclusive<f64> = -0.5..=0.5;
/// Seasonality strength bounds.
pub const SEASONALITY_RANGE: RangeInclusive<f64> = 0.0..=1.0;
/// Noise strength bounds.
pub const NOISE_RANGE: RangeInclusive<f64> = 0.0..=1.0;
/// Outlier probability bounds.
pub const OUTLIER_RATE_RANGE: RangeInclusive<f64> = 0.0..=0.1;

/// Shape parameters of the sample model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Linear ramp across the run, as a fraction of the base value.
    pub trend: f64,
    /// Strength of the hourly/daily/monthly cycle.
    pub seasonality: f64,
    /// Uniform noise amplitude, as a fraction of the range.
    pub noise: f64,
    /// Probability that a point is an outlier.
    pub outlier_rate: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            trend: 0.1,
            seasonality: 0.5,
            noise: 0.2,
            outlier_rate: 0.02,
        }
    }
}

impl ModelParams {
    /// Check every parameter against its bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_float("trend", self.trend, &TREND_RANGE)?;
        check_float("seasonality", self.seasonality, &SEASONALITY_RANGE)?;
        check_float("noise", self.noise, &NOISE_RANGE)?;
        check_float("outliers", self.outlier_rate, &OUTLIER_RATE_RANGE)?;
        Ok(())
    }
}

/// Time-series run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// First timestamp (inclusive).
    pub start: DateTime<Utc>,
    /// End of the range.
    pub end: DateTime<Utc>,
    /// Minutes between two points.
    pub interval_minutes: u32,
    /// Sample model parameters.
    pub params: ModelParams,
    /// Explicit device ids; empty means "every carbon-related device".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<String>,
    /// Random seed for reproducibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl GenerationConfig {
    /// Create a config over `[start, end]` with hourly points and default parameters.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            interval_minutes: 60,
            params: ModelParams::default(),
            devices: Vec::new(),
            seed: None,
        }
    }

    /// Create a config covering the `days` days before `end`.
    pub fn last_days(end: DateTime<Utc>, days: u32) -> Self {
        Self::new(end - ChronoDuration::days(days as i64), end)
    }

    /// Set the sampling interval.
    pub fn with_interval_minutes(mut self, minutes: u32) -> Self {
        self.interval_minutes = minutes;
        self
    }

    /// Replace all model parameters.
    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }

    /// Set the trend coefficient.
    pub fn with_trend(mut self, trend: f64) -> Self {
        self.params.trend = trend;
        self
    }

    /// Set the seasonality strength.
    pub fn with_seasonality(mut self, seasonality: f64) -> Self {
        self.params.seasonality = seasonality;
        self
    }

    /// Set the noise strength.
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.params.noise = noise;
        self
    }

    /// Set the outlier probability.
    pub fn with_outlier_rate(mut self, rate: f64) -> Self {
        self.params.outlier_rate = rate;
        self
    }

    /// Restrict the run to explicit device ids.
    pub fn with_devices(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.devices = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check the range, interval and model parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(self.start, self.end)?;
        check_int("interval", self.interval_minutes as i64, &INTERVAL_RANGE)?;
        self.params.validate()
    }

    /// Span of the range in minutes.
    pub fn total_minutes(&self) -> f64 {
        span_minutes(self.start, self.end)
    }

    /// Number of points per device: `ceil(total_minutes / interval)`.
    pub fn total_points(&self) -> usize {
        point_count(self.start, self.end, self.interval_minutes)
    }

    /// Timestamp of point `index`.
    pub fn timestamp_at(&self, index: usize) -> DateTime<Utc> {
        offset(self.start, index, self.interval_minutes)
    }
}

/// Prediction dataset configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// First timestamp (inclusive).
    pub start: DateTime<Utc>,
    /// End of the range.
    pub end: DateTime<Utc>,
    /// Minutes between two points.
    pub interval_minutes: u32,
    /// Attach the environmental factors to every emission record.
    pub include_factors: bool,
    /// Random seed for reproducibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl PredictionConfig {
    /// Create a config covering the `days` days before `end`, hourly, with factors.
    pub fn last_days(end: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: end - ChronoDuration::days(days as i64),
            end,
            interval_minutes: 60,
            include_factors: true,
            seed: None,
        }
    }

    /// Set the sampling interval.
    pub fn with_interval_minutes(mut self, minutes: u32) -> Self {
        self.interval_minutes = minutes;
        self
    }

    /// Enable or disable factor metadata.
    pub fn with_factors(mut self, include: bool) -> Self {
        self.include_factors = include;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check the range and interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(self.start, self.end)?;
        check_int("interval", self.interval_minutes as i64, &INTERVAL_RANGE)?;
        Ok(())
    }

    /// Number of dataset points.
    pub fn total_points(&self) -> usize {
        point_count(self.start, self.end, self.interval_minutes)
    }

    /// Timestamp of point `index`.
    pub fn timestamp_at(&self, index: usize) -> DateTime<Utc> {
        offset(self.start, index, self.interval_minutes)
    }
}

/// Loading-dock scenario configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadingConfig {
    /// Simulated duration in minutes.
    pub duration_minutes: u32,
    /// Minutes between two steps (also the real-time pause between steps).
    pub interval_minutes: u32,
    /// Random seed for reproducibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            duration_minutes: 60,
            interval_minutes: 5,
            seed: None,
        }
    }
}

impl LoadingConfig {
    /// Create a loading config.
    pub fn new(duration_minutes: u32, interval_minutes: u32) -> Self {
        Self {
            duration_minutes,
            interval_minutes,
            seed: None,
        }
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check duration and interval bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_int("duration", self.duration_minutes as i64, &DURATION_RANGE)?;
        check_int("interval", self.interval_minutes as i64, &INTERVAL_RANGE)?;
        Ok(())
    }

    /// Number of simulated steps: `ceil(duration / interval)`.
    pub fn iterations(&self) -> usize {
        if self.interval_minutes == 0 {
            return 0;
        }
        (self.duration_minutes as usize).div_ceil(self.interval_minutes as usize)
    }

    /// Wall-clock pause between two steps.
    pub fn step_pause(&self) -> Duration {
        Duration::from_secs(self.interval_minutes as u64 * 60)
    }
}

/// Vehicle entry scenario configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleEntryConfig {
    /// Number of vehicles to simulate.
    pub count: u32,
    /// Random seed for reproducibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for VehicleEntryConfig {
    fn default() -> Self {
        Self {
            count: 1,
            seed: None,
        }
    }
}

impl VehicleEntryConfig {
    /// Create a config for `count` vehicles.
    pub fn new(count: u32) -> Self {
        Self { count, seed: None }
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check the vehicle count.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_int("count", self.count as i64, &VEHICLE_COUNT_RANGE)
    }
}

/// Task retention policy of the registry.
///
/// Only tasks in a terminal state are ever evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum number of tasks kept.
    pub max_tasks: Option<usize>,
    /// Finished tasks older than this are dropped.
    pub ttl: Option<Duration>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_tasks: Some(1024),
            ttl: None,
        }
    }
}

impl RetentionPolicy {
    /// Keep every task for the process lifetime.
    pub fn unbounded() -> Self {
        Self {
            max_tasks: None,
            ttl: None,
        }
    }

    /// Set the task cap.
    pub fn with_max_tasks(mut self, max: usize) -> Self {
        self.max_tasks = Some(max);
        self
    }

    /// Set the time-to-live of finished tasks.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Raw time-series request parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeSeriesQuery {
    pub days: Option<String>,
    pub interval: Option<String>,
    pub trend: Option<String>,
    pub seasonality: Option<String>,
    pub noise: Option<String>,
    pub outliers: Option<String>,
}

impl TimeSeriesQuery {
    /// Validate and build a config ending at `now`.
    pub fn into_config(&self, now: DateTime<Utc>) -> Result<GenerationConfig, ConfigError> {
        let days = parse_int_param("days", self.days.as_deref(), 30, &DAYS_RANGE)?;
        let interval = parse_int_param("interval", self.interval.as_deref(), 60, &INTERVAL_RANGE)?;
        let params = ModelParams {
            trend: parse_float_param("trend", self.trend.as_deref(), 0.1, &TREND_RANGE)?,
            seasonality: parse_float_param(
                "seasonality",
                self.seasonality.as_deref(),
                0.5,
                &SEASONALITY_RANGE,
            )?,
            noise: parse_float_param("noise", self.noise.as_deref(), 0.2, &NOISE_RANGE)?,
            outlier_rate: parse_float_param(
                "outliers",
                self.outliers.as_deref(),
                0.02,
                &OUTLIER_RATE_RANGE,
            )?,
        };

        Ok(GenerationConfig::last_days(now, days as u32)
            .with_interval_minutes(interval as u32)
            .with_params(params))
    }
}

/// Raw prediction dataset request parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionQuery {
    pub days: Option<String>,
    pub interval: Option<String>,
    pub include_factors: Option<String>,
}

impl PredictionQuery {
    /// Validate and build a config ending at `now`.
    pub fn into_config(&self, now: DateTime<Utc>) -> Result<PredictionConfig, ConfigError> {
        let days = parse_int_param("days", self.days.as_deref(), 90, &DAYS_RANGE)?;
        let interval = parse_int_param("interval", self.interval.as_deref(), 60, &INTERVAL_RANGE)?;
        let include = parse_flag(self.include_factors.as_deref(), true);

        Ok(PredictionConfig::last_days(now, days as u32)
            .with_interval_minutes(interval as u32)
            .with_factors(include))
    }
}

/// Raw loading scenario request parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadingQuery {
    pub duration: Option<String>,
    pub interval: Option<String>,
}

impl LoadingQuery {
    /// Validate and build a loading config.
    pub fn into_config(&self) -> Result<LoadingConfig, ConfigError> {
        let duration = parse_int_param("duration", self.duration.as_deref(), 60, &DURATION_RANGE)?;
        let interval = parse_int_param("interval", self.interval.as_deref(), 5, &INTERVAL_RANGE)?;
        Ok(LoadingConfig::new(duration as u32, interval as u32))
    }
}

/// Raw vehicle entry request parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehicleEntryQuery {
    pub count: Option<String>,
}

impl VehicleEntryQuery {
    /// Validate and build a vehicle entry config.
    pub fn into_config(&self) -> Result<VehicleEntryConfig, ConfigError> {
        let count = parse_int_param("count", self.count.as_deref(), 1, &VEHICLE_COUNT_RANGE)?;
        Ok(VehicleEntryConfig::new(count as u32))
    }
}

/// Parse an optional integer parameter and check its bounds.
///
/// A missing or blank value falls back to `default`.
pub fn parse_int_param(
    name: &'static str,
    raw: Option<&str>,
    default: i64,
    range: &RangeInclusive<i64>,
) -> Result<i64, ConfigError> {
    let value = match raw.map(str::trim) {
        None | Some("") => default,
        Some(s) => s.parse::<i64>().map_err(|_| ConfigError::NotANumber {
            name,
            raw: s.to_string(),
        })?,
    };
    check_int(name, value, range)?;
    Ok(value)
}

/// Parse an optional float parameter and check its bounds.
pub fn parse_float_param(
    name: &'static str,
    raw: Option<&str>,
    default: f64,
    range: &RangeInclusive<f64>,
) -> Result<f64, ConfigError> {
    let value = match raw.map(str::trim) {
        None | Some("") => default,
        Some(s) => s.parse::<f64>().map_err(|_| ConfigError::NotANumber {
            name,
            raw: s.to_string(),
        })?,
    };
    check_float(name, value, range)?;
    Ok(value)
}

/// Parse an optional boolean flag; only `true` and `1` enable it.
pub fn parse_flag(raw: Option<&str>, default: bool) -> bool {
    match raw.map(str::trim) {
        None | Some("") => default,
        Some(s) => s.eq_ignore_ascii_case("true") || s == "1",
    }
}

fn check_int(name: &'static str, value: i64, range: &RangeInclusive<i64>) -> Result<(), ConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            min: *range.start() as f64,
            max: *range.end() as f64,
            value: value as f64,
        })
    }
}

fn check_float(name: &'static str, value: f64, range: &RangeInclusive<f64>) -> Result<(), ConfigError> {
    // NaN is never contained
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            min: *range.start(),
            max: *range.end(),
            value,
        })
    }
}

fn check_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ConfigError> {
    if end < start {
        return Err(ConfigError::InvertedRange { start, end });
    }
    Ok(())
}

fn span_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 60_000.0
}

fn point_count(start: DateTime<Utc>, end: DateTime<Utc>, interval_minutes: u32) -> usize {
    let minutes = span_minutes(start, end);
    if interval_minutes == 0 || minutes <= 0.0 {
        return 0;
    }
    (minutes / interval_minutes as f64).ceil() as usize
}

fn offset(start: DateTime<Utc>, index: usize, interval_minutes: u32) -> DateTime<Utc> {
    start + ChronoDuration::minutes(index as i64 * interval_minutes as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_model_params_default() {
        let params = ModelParams::default();
        assert_eq!(params.trend, 0.1);
        assert_eq!(params.seasonality, 0.5);
        assert_eq!(params.noise, 0.2);
        assert_eq!(params.outlier_rate, 0.02);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_total_points_one_day_hourly() {
        let config = GenerationConfig::new(day(1), day(2));
        assert_eq!(config.total_points(), 24);
        assert_eq!(config.timestamp_at(23), day(1) + ChronoDuration::hours(23));
    }

    #[test]
    fn test_total_points_rounds_up() {
        // 100 minutes at 30 minute steps -> 4 points
        let config = GenerationConfig::new(day(1), day(1) + ChronoDuration::minutes(100))
            .with_interval_minutes(30);
        assert_eq!(config.total_points(), 4);
    }

    #[test]
    fn test_empty_range_has_no_points() {
        let config = GenerationConfig::new(day(1), day(1));
        assert_eq!(config.total_points(), 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let config = GenerationConfig::new(day(2), day(1));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_params_out_of_bounds() {
        let config = GenerationConfig::new(day(1), day(2)).with_trend(0.8);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { name: "trend", .. })
        ));

        let config = GenerationConfig::new(day(1), day(2)).with_outlier_rate(0.5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { name: "outliers", .. })
        ));

        let config = GenerationConfig::new(day(1), day(2)).with_noise(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_loading_iterations() {
        assert_eq!(LoadingConfig::new(10, 5).iterations(), 2);
        assert_eq!(LoadingConfig::new(11, 5).iterations(), 3);
        assert_eq!(LoadingConfig::default().iterations(), 12);
        assert_eq!(LoadingConfig::new(10, 5).step_pause(), Duration::from_secs(300));
    }

    #[test]
    fn test_loading_validate() {
        assert!(LoadingConfig::new(10, 0).validate().is_err());
        assert!(LoadingConfig::new(0, 5).validate().is_err());
        assert!(LoadingConfig::new(10, 5).validate().is_ok());
    }

    #[test]
    fn test_parse_int_param() {
        assert_eq!(parse_int_param("days", None, 30, &DAYS_RANGE), Ok(30));
        assert_eq!(parse_int_param("days", Some(" 7 "), 30, &DAYS_RANGE), Ok(7));
        assert!(matches!(
            parse_int_param("days", Some("0"), 30, &DAYS_RANGE),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(matches!(
            parse_int_param("days", Some("500"), 30, &DAYS_RANGE),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(matches!(
            parse_int_param("days", Some("not-a-number"), 30, &DAYS_RANGE),
            Err(ConfigError::NotANumber { .. })
        ));
    }

    #[test]
    fn test_time_series_query_bounds() {
        let now = day(10);
        let query = TimeSeriesQuery {
            days: Some("1".into()),
            interval: Some("60".into()),
            ..Default::default()
        };
        let config = query.into_config(now).unwrap();
        assert_eq!(config.total_points(), 24);
        assert_eq!(config.end, now);

        let bad_interval = TimeSeriesQuery {
            interval: Some("2000".into()),
            ..Default::default()
        };
        assert!(bad_interval.into_config(now).is_err());

        let bad_trend = TimeSeriesQuery {
            trend: Some("-0.9".into()),
            ..Default::default()
        };
        assert!(bad_trend.into_config(now).is_err());
    }

    #[test]
    fn test_prediction_query_flag() {
        let query = PredictionQuery {
            include_factors: Some("false".into()),
            ..Default::default()
        };
        let config = query.into_config(day(10)).unwrap();
        assert!(!config.include_factors);
        assert_eq!(config.interval_minutes, 60);
        assert_eq!(config.total_points(), 90 * 24);
    }

    #[test]
    fn test_retention_defaults() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.max_tasks, Some(1024));
        assert!(policy.ttl.is_none());
        assert_eq!(RetentionPolicy::unbounded().max_tasks, None);
    }
}
