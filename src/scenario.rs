// MockIoT - Scenario engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Multi-device scenario engine.
//!
//! A scenario is a short narrative told through telemetry: a truck passing
//! the gate, a loading dock working through its cycle, a site under carbon
//! peak. Multi-step scenarios pause between steps through a [`Pacer`].

use crate::config::{LoadingConfig, VehicleEntryConfig};
use crate::device::{DeviceHandle, DeviceResolver, DeviceType};
use crate::error::{GenerationError, Result};
use crate::pacing::Pacer;
use crate::patterns::{rng_from_seed, uniform};
use crate::task::{percent, ProgressHandle};
use crate::telemetry::{metadata, Metadata, MetadataValue, TelemetrySink, TelemetryWriter};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Samples returned in a snapshot summary.
pub const SNAPSHOT_PREVIEW: usize = 10;

/// Status of a piece of loading equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
    Idle,
    Startup,
    Running,
    HighLoad,
    Slowing,
}

/// Ordered work cycle; the last step wraps to the first.
pub const WORK_CYCLE: [EquipmentStatus; 7] = [
    EquipmentStatus::Idle,
    EquipmentStatus::Startup,
    EquipmentStatus::Running,
    EquipmentStatus::HighLoad,
    EquipmentStatus::Running,
    EquipmentStatus::Slowing,
    EquipmentStatus::Idle,
];

impl EquipmentStatus {
    /// Power draw band.
    pub fn power_range(&self) -> (f64, f64) {
        match self {
            EquipmentStatus::Idle => (5.0, 15.0),
            EquipmentStatus::Startup => (30.0, 50.0),
            EquipmentStatus::Running => (60.0, 80.0),
            EquipmentStatus::HighLoad => (85.0, 95.0),
            EquipmentStatus::Slowing => (40.0, 60.0),
        }
    }

    /// Load band.
    pub fn load_range(&self) -> (f64, f64) {
        match self {
            EquipmentStatus::Idle => (0.0, 5.0),
            EquipmentStatus::Startup => (10.0, 20.0),
            EquipmentStatus::Running => (40.0, 60.0),
            EquipmentStatus::HighLoad => (70.0, 90.0),
            EquipmentStatus::Slowing => (30.0, 50.0),
        }
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentStatus::Idle => "idle",
            EquipmentStatus::Startup => "startup",
            EquipmentStatus::Running => "running",
            EquipmentStatus::HighLoad => "high_load",
            EquipmentStatus::Slowing => "slowing",
        }
    }
}

/// Time-of-day activity pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePattern {
    /// Working-hours peak: everything busy.
    WorkdayPeak,
    /// Night: standby, safety lighting, overnight charging.
    Night,
}

impl TimePattern {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimePattern::WorkdayPeak => "workday_peak",
            TimePattern::Night => "night",
        }
    }

    fn participants(&self) -> &'static [DeviceType] {
        match self {
            TimePattern::WorkdayPeak => &[
                DeviceType::Hvac,
                DeviceType::ChargingStation,
                DeviceType::Forklift,
            ],
            TimePattern::Night => &[
                DeviceType::Hvac,
                DeviceType::Lighting,
                DeviceType::Security,
                DeviceType::ChargingStation,
            ],
        }
    }
}

/// One simulated vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleEntry {
    pub vehicle_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plate_number: Option<String>,
    pub entry_time: DateTime<Utc>,
    pub gate_id: String,
    /// Kilograms.
    pub weight: f64,
}

/// Result of a vehicle entry run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleEntrySummary {
    pub vehicles: Vec<VehicleEntry>,
    pub records_written: usize,
    pub records_failed: usize,
}

/// Result of a loading dock run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadingSummary {
    pub duration_minutes: u32,
    pub interval_minutes: u32,
    pub iterations: usize,
    pub devices: usize,
    pub records_written: usize,
    pub records_failed: usize,
}

/// One value emitted by a snapshot scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSample {
    pub device_code: String,
    pub data_type: String,
    pub value: f64,
}

/// Result of a one-shot scenario or time pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub scenario: String,
    pub device_count: usize,
    pub samples_count: usize,
    pub samples: Vec<SnapshotSample>,
    pub records_written: usize,
    pub records_failed: usize,
}

/// Collects snapshot samples while writing them.
struct Snapshot {
    writer: TelemetryWriter,
    samples: Vec<SnapshotSample>,
    count: usize,
}

impl Snapshot {
    fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            writer: TelemetryWriter::new(sink),
            samples: Vec::with_capacity(SNAPSHOT_PREVIEW),
            count: 0,
        }
    }

    async fn emit(&mut self, device: &DeviceHandle, data_type: &str, value: f64, meta: Metadata) {
        self.writer.write(device, data_type, value, meta).await;
        self.count += 1;
        if self.samples.len() < SNAPSHOT_PREVIEW {
            self.samples.push(SnapshotSample {
                device_code: device.code.clone(),
                data_type: data_type.to_string(),
                value,
            });
        }
    }

    fn finish(self, scenario: &str, device_count: usize) -> SnapshotSummary {
        SnapshotSummary {
            scenario: scenario.to_string(),
            device_count,
            samples_count: self.count,
            samples: self.samples,
            records_written: self.writer.written(),
            records_failed: self.writer.failed(),
        }
    }
}

/// Runs scenarios against a catalog, a sink and a pacer.
#[derive(Clone)]
pub struct ScenarioEngine {
    resolver: DeviceResolver,
    sink: Arc<dyn TelemetrySink>,
    pacer: Arc<dyn Pacer>,
}

impl std::fmt::Debug for ScenarioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioEngine").finish_non_exhaustive()
    }
}

impl ScenarioEngine {
    /// Create an engine.
    pub fn new(resolver: DeviceResolver, sink: Arc<dyn TelemetrySink>, pacer: Arc<dyn Pacer>) -> Self {
        Self {
            resolver,
            sink,
            pacer,
        }
    }

    /// Vehicles arriving at the site gate.
    ///
    /// Each vehicle is detected at a gate, optionally read by a camera,
    /// weighed, and let through. Needs at least one gate and one scale.
    pub async fn vehicle_entry(
        &self,
        config: &VehicleEntryConfig,
        progress: &ProgressHandle,
    ) -> Result<VehicleEntrySummary> {
        let gates = self.resolver.resolve_type(DeviceType::Gate).await?;
        let scales = self.resolver.resolve_type(DeviceType::WeightScale).await?;
        let cameras = self.resolver.resolve_type(DeviceType::Camera).await?;

        if gates.is_empty() || scales.is_empty() {
            log::warn!("vehicle entry needs gates and weight scales, found none");
            return Err(GenerationError::MissingDevices(
                "vehicle entry needs at least one gate and one weight scale".to_string(),
            ));
        }

        log::info!("simulating entry of {} vehicle(s)", config.count);
        let writer = TelemetryWriter::new(self.sink.clone());
        let mut rng = rng_from_seed(config.seed);
        let mut vehicles = Vec::with_capacity(config.count as usize);

        for n in 0..config.count {
            let entry_time = Utc::now();
            let vehicle_id = format!("TRUCK-{}", rng.gen_range(0..10_000));
            let weight = uniform(&mut rng, 5_000.0, 25_000.0);
            let vehicle: MetadataValue = vehicle_id.clone().into();

            let gate = &gates[rng.gen_range(0..gates.len())];
            writer
                .write(
                    gate,
                    "vehicle_detection",
                    1.0,
                    metadata([("vehicle_id", vehicle.clone()), ("action", "entry".into())]),
                )
                .await;
            self.pacer.pause(Duration::from_secs(1)).await;

            let mut plate_number = None;
            if !cameras.is_empty() {
                let camera = &cameras[rng.gen_range(0..cameras.len())];
                let plate = format!("YB-{:05}", rng.gen_range(0..100_000));
                writer
                    .write(
                        camera,
                        "license_plate_recognition",
                        1.0,
                        metadata([
                            ("vehicle_id", vehicle.clone()),
                            ("plate_number", plate.clone().into()),
                        ]),
                    )
                    .await;
                plate_number = Some(plate);
                self.pacer.pause(Duration::from_millis(500)).await;
            }

            let scale = &scales[rng.gen_range(0..scales.len())];
            writer
                .write(
                    scale,
                    "weight_measurement",
                    weight,
                    metadata([("vehicle_id", vehicle.clone())]),
                )
                .await;

            let open_power = uniform(&mut rng, 2.5, 4.0);
            writer
                .write(
                    gate,
                    "power_consumption",
                    open_power,
                    metadata([("vehicle_id", vehicle.clone()), ("action", "gate_open".into())]),
                )
                .await;
            self.pacer.pause(Duration::from_secs(3)).await;

            let idle_power = uniform(&mut rng, 0.8, 1.2);
            writer
                .write(
                    gate,
                    "power_consumption",
                    idle_power,
                    metadata([("vehicle_id", vehicle), ("action", "gate_close".into())]),
                )
                .await;

            vehicles.push(VehicleEntry {
                vehicle_id,
                plate_number,
                entry_time,
                gate_id: gate.id.clone(),
                weight,
            });

            let done = n as usize + 1;
            progress
                .report(
                    percent(done, config.count as usize),
                    format!("{}/{} vehicles entered", done, config.count),
                )
                .await;
        }

        Ok(VehicleEntrySummary {
            vehicles,
            records_written: writer.written(),
            records_failed: writer.failed(),
        })
    }

    /// Loading dock work cycle.
    ///
    /// Loaders, conveyors and forklifts step through [`WORK_CYCLE`] from a
    /// random starting point, one step per interval.
    pub async fn loading(&self, config: &LoadingConfig, progress: &ProgressHandle) -> Result<LoadingSummary> {
        let equipment = self
            .resolver
            .resolve_types(&[DeviceType::Loader, DeviceType::Conveyor, DeviceType::Forklift])
            .await?;

        if equipment.is_empty() {
            log::warn!("no loading equipment in catalog");
            return Err(GenerationError::MissingDevices(
                "loading scenario needs at least one loader, conveyor or forklift".to_string(),
            ));
        }

        let iterations = config.iterations();
        log::info!(
            "loading scenario: {} device(s), {} step(s) of {} min",
            equipment.len(),
            iterations,
            config.interval_minutes
        );

        let writer = TelemetryWriter::new(self.sink.clone());
        let mut rng = rng_from_seed(config.seed);
        let mut cursors: Vec<usize> = equipment
            .iter()
            .map(|_| rng.gen_range(0..WORK_CYCLE.len()))
            .collect();

        for i in 0..iterations {
            progress
                .report(
                    percent(i, iterations),
                    format!("Step {}/{}", i + 1, iterations),
                )
                .await;

            for (device, cursor) in equipment.iter().zip(cursors.iter_mut()) {
                *cursor = (*cursor + 1) % WORK_CYCLE.len();
                let status = WORK_CYCLE[*cursor];
                let meta = metadata([("status", status.as_str().into())]);

                let (lo, hi) = status.power_range();
                let power = uniform(&mut rng, lo, hi);
                let (lo, hi) = status.load_range();
                let load = uniform(&mut rng, lo, hi);

                writer.write(device, "power_consumption", power, meta.clone()).await;
                writer.write(device, "load", load, meta.clone()).await;

                if device.device_type == DeviceType::Forklift {
                    let speed = if status == EquipmentStatus::Idle {
                        0.0
                    } else {
                        uniform(&mut rng, 2.0, 10.0)
                    };
                    let battery = 50.0 - (i as f64 * 50.0 / iterations as f64);
                    writer.write(device, "speed", speed, meta.clone()).await;
                    writer.write(device, "battery_level", battery, meta).await;
                }
            }

            self.pacer.pause(config.step_pause()).await;
        }

        Ok(LoadingSummary {
            duration_minutes: config.duration_minutes,
            interval_minutes: config.interval_minutes,
            iterations,
            devices: equipment.len(),
            records_written: writer.written(),
            records_failed: writer.failed(),
        })
    }

    /// One-shot carbon peak: high emissions, heavy load, poor air.
    pub async fn carbon_peak(&self, seed: Option<u64>) -> Result<SnapshotSummary> {
        let sensors = self.resolver.resolve_type(DeviceType::CarbonSensor).await?;
        let meters = self.resolver.resolve_type(DeviceType::EnergyMeter).await?;
        let monitors = self.resolver.resolve_type(DeviceType::AirQualityMonitor).await?;
        let hvac = self.resolver.resolve_type(DeviceType::Hvac).await?;
        let vehicles = self
            .resolver
            .resolve_types(&[DeviceType::Truck, DeviceType::Forklift])
            .await?;

        let device_count = sensors.len() + meters.len() + monitors.len() + hvac.len() + vehicles.len();
        if device_count == 0 {
            return Err(GenerationError::MissingDevices(
                "carbon peak needs carbon, energy, air quality, HVAC or vehicle devices".to_string(),
            ));
        }

        log::info!("generating carbon peak snapshot over {} device(s)", device_count);
        let mut rng = rng_from_seed(seed);
        let mut snapshot = Snapshot::new(self.sink.clone());
        let tag = |extra: Option<(&'static str, &'static str)>| {
            let mut meta = metadata([("scenario", "carbon_peak".into())]);
            if let Some((k, v)) = extra {
                meta.insert(k.to_string(), v.into());
            }
            meta
        };

        for d in &sensors {
            let v = uniform(&mut rng, 80.0, 130.0);
            snapshot.emit(d, "carbon_emission", v, tag(Some(("status", "alert")))).await;
        }
        for d in &meters {
            let v = uniform(&mut rng, 75.0, 130.0);
            snapshot.emit(d, "power_consumption", v, tag(Some(("load", "high")))).await;
        }
        for d in &monitors {
            let v = uniform(&mut rng, 180.0, 300.0);
            snapshot.emit(d, "air_quality_index", v, tag(Some(("quality", "poor")))).await;
        }
        for d in &hvac {
            let v = uniform(&mut rng, 85.0, 100.0);
            snapshot.emit(d, "load_percentage", v, tag(None)).await;
        }
        for d in &vehicles {
            let v = uniform(&mut rng, 70.0, 100.0);
            snapshot.emit(d, "usage_rate", v, tag(Some(("status", "heavy_use")))).await;
        }

        Ok(snapshot.finish("carbon_peak", device_count))
    }

    /// One-shot carbon reduction: low emissions, renewables, eco modes.
    pub async fn carbon_reduction(&self, seed: Option<u64>) -> Result<SnapshotSummary> {
        let sensors = self.resolver.resolve_type(DeviceType::CarbonSensor).await?;
        let meters = self.resolver.resolve_type(DeviceType::EnergyMeter).await?;
        let panels = self.resolver.resolve_type(DeviceType::SolarPanel).await?;
        let grids = self.resolver.resolve_type(DeviceType::SmartGrid).await?;
        let hvac = self.resolver.resolve_type(DeviceType::Hvac).await?;
        let lights = self.resolver.resolve_type(DeviceType::Lighting).await?;

        let device_count =
            sensors.len() + meters.len() + panels.len() + grids.len() + hvac.len() + lights.len();
        if device_count == 0 {
            return Err(GenerationError::MissingDevices(
                "carbon reduction needs carbon, energy, solar, grid, HVAC or lighting devices"
                    .to_string(),
            ));
        }

        log::info!("generating carbon reduction snapshot over {} device(s)", device_count);
        let mut rng = rng_from_seed(seed);
        let mut snapshot = Snapshot::new(self.sink.clone());
        let tag = |key: &'static str, value: &'static str| {
            metadata([
                ("scenario", "carbon_reduction".into()),
                (key, value.into()),
            ])
        };

        for d in &sensors {
            let v = uniform(&mut rng, 20.0, 50.0);
            snapshot.emit(d, "carbon_emission", v, tag("status", "optimal")).await;
        }
        for d in &meters {
            let v = uniform(&mut rng, 15.0, 40.0);
            snapshot.emit(d, "power_consumption", v, tag("load", "optimized")).await;
        }
        for d in &panels {
            let v = uniform(&mut rng, 70.0, 100.0);
            snapshot.emit(d, "power_generation", v, tag("efficiency", "high")).await;
        }
        for d in &grids {
            let v = uniform(&mut rng, 85.0, 100.0);
            snapshot.emit(d, "optimization_rate", v, tag("mode", "eco")).await;
        }
        for d in &hvac {
            let v = uniform(&mut rng, 30.0, 50.0);
            snapshot.emit(d, "eco_mode_level", v, tag("mode", "energy_saving")).await;
        }
        for d in &lights {
            let v = uniform(&mut rng, 40.0, 70.0);
            snapshot.emit(d, "brightness_level", v, tag("mode", "smart_lighting")).await;
        }

        Ok(snapshot.finish("carbon_reduction", device_count))
    }

    /// One-shot time-of-day activity pattern.
    pub async fn time_pattern(&self, pattern: TimePattern, seed: Option<u64>) -> Result<SnapshotSummary> {
        let groups = self.resolver.group_by_type().await?;
        let empty = Vec::new();
        let of = |t: DeviceType| groups.get(&t).unwrap_or(&empty);

        let device_count: usize = pattern.participants().iter().map(|t| of(*t).len()).sum();
        if device_count == 0 {
            return Err(GenerationError::MissingDevices(format!(
                "{} pattern has no participating devices",
                pattern.as_str()
            )));
        }

        log::info!("generating {} pattern over {} device(s)", pattern.as_str(), device_count);
        let mut rng = rng_from_seed(seed);
        let mut snapshot = Snapshot::new(self.sink.clone());
        let name = pattern.as_str();
        let tag = |status: Option<&'static str>| {
            let mut meta = metadata([("time_pattern", name.into())]);
            if let Some(status) = status {
                meta.insert("status".to_string(), status.into());
            }
            meta
        };

        match pattern {
            TimePattern::WorkdayPeak => {
                for d in of(DeviceType::Hvac) {
                    let power = uniform(&mut rng, 8.0, 12.0);
                    snapshot.emit(d, "power_consumption", power, tag(None)).await;
                    let temp = uniform(&mut rng, 24.0, 26.0);
                    snapshot.emit(d, "temperature", temp, tag(None)).await;
                }
                for d in of(DeviceType::ChargingStation) {
                    if rng.gen_bool(0.85) {
                        let power = uniform(&mut rng, 20.0, 35.0);
                        snapshot.emit(d, "power_consumption", power, tag(Some("charging"))).await;
                        let current = uniform(&mut rng, 30.0, 50.0);
                        snapshot.emit(d, "charging_current", current, tag(None)).await;
                    } else {
                        let power = uniform(&mut rng, 0.5, 1.0);
                        snapshot.emit(d, "power_consumption", power, tag(Some("standby"))).await;
                    }
                }
                for d in of(DeviceType::Forklift) {
                    if rng.gen_bool(0.9) {
                        let power = uniform(&mut rng, 12.0, 20.0);
                        snapshot.emit(d, "power_consumption", power, tag(Some("operating"))).await;
                        let speed = uniform(&mut rng, 3.0, 10.0);
                        snapshot.emit(d, "speed", speed, tag(None)).await;
                        let load = uniform(&mut rng, 60.0, 100.0);
                        snapshot.emit(d, "load", load, tag(None)).await;
                    } else {
                        let power = uniform(&mut rng, 0.2, 0.5);
                        snapshot.emit(d, "power_consumption", power, tag(Some("standby"))).await;
                    }
                }
            }
            TimePattern::Night => {
                for d in of(DeviceType::Hvac) {
                    let (power, status) = if rng.gen_bool(0.2) {
                        (uniform(&mut rng, 2.0, 4.0), "low_power")
                    } else {
                        (uniform(&mut rng, 0.1, 0.3), "standby")
                    };
                    snapshot.emit(d, "power_consumption", power, tag(Some(status))).await;
                }
                for d in of(DeviceType::Lighting) {
                    let (power, status) = if rng.gen_bool(0.4) {
                        (uniform(&mut rng, 1.0, 2.5), "low_power")
                    } else {
                        (0.0, "off")
                    };
                    snapshot.emit(d, "power_consumption", power, tag(Some(status))).await;
                }
                for d in of(DeviceType::Security) {
                    let power = uniform(&mut rng, 2.0, 3.0);
                    snapshot.emit(d, "power_consumption", power, tag(Some("active"))).await;
                }
                for d in of(DeviceType::ChargingStation) {
                    if rng.gen_bool(0.3) {
                        let power = uniform(&mut rng, 15.0, 25.0);
                        snapshot.emit(d, "power_consumption", power, tag(Some("charging"))).await;
                        let current = uniform(&mut rng, 10.0, 25.0);
                        snapshot.emit(d, "charging_current", current, tag(None)).await;
                    } else {
                        let power = uniform(&mut rng, 0.2, 0.5);
                        snapshot.emit(d, "power_consumption", power, tag(Some("standby"))).await;
                    }
                }
            }
        }

        Ok(snapshot.finish(name, device_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_cycle_bands() {
        assert_eq!(WORK_CYCLE.first(), Some(&EquipmentStatus::Idle));
        assert_eq!(WORK_CYCLE.last(), Some(&EquipmentStatus::Idle));
        for status in WORK_CYCLE {
            let (p_lo, p_hi) = status.power_range();
            let (l_lo, l_hi) = status.load_range();
            assert!(p_lo < p_hi);
            assert!(l_lo < l_hi);
        }
        assert_eq!(EquipmentStatus::HighLoad.power_range(), (85.0, 95.0));
        assert_eq!(EquipmentStatus::HighLoad.as_str(), "high_load");
    }

    #[test]
    fn test_time_pattern_names() {
        assert_eq!(TimePattern::WorkdayPeak.as_str(), "workday_peak");
        assert_eq!(
            serde_json::to_string(&TimePattern::Night).unwrap(),
            "\"night\""
        );
    }
}
