// MockIoT - Device catalog
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Device catalog adapter.
//!
//! The generators never own devices. They ask a [`DeviceCatalog`] for the
//! handles of the roles they need, through a [`DeviceResolver`] that turns
//! lookups into plain lists. An empty list means "nothing to run on", never
//! an error.

use crate::error::CatalogError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

/// Device roles known to the generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    CarbonSensor,
    EnergyMeter,
    AirQualityMonitor,
    EmissionsAnalyzer,
    Gate,
    WeightScale,
    Camera,
    Loader,
    Conveyor,
    Forklift,
    Truck,
    Hvac,
    Lighting,
    SolarPanel,
    SmartGrid,
    ChargingStation,
    Security,
    Packaging,
    Storage,
    Crane,
    Warehouse,
    Terminal,
    Refrigeration,
    Other,
}

impl DeviceType {
    /// Every device type, in declaration order.
    pub const ALL: [DeviceType; 24] = [
        DeviceType::CarbonSensor,
        DeviceType::EnergyMeter,
        DeviceType::AirQualityMonitor,
        DeviceType::EmissionsAnalyzer,
        DeviceType::Gate,
        DeviceType::WeightScale,
        DeviceType::Camera,
        DeviceType::Loader,
        DeviceType::Conveyor,
        DeviceType::Forklift,
        DeviceType::Truck,
        DeviceType::Hvac,
        DeviceType::Lighting,
        DeviceType::SolarPanel,
        DeviceType::SmartGrid,
        DeviceType::ChargingStation,
        DeviceType::Security,
        DeviceType::Packaging,
        DeviceType::Storage,
        DeviceType::Crane,
        DeviceType::Warehouse,
        DeviceType::Terminal,
        DeviceType::Refrigeration,
        DeviceType::Other,
    ];

    /// Types sampled by a carbon emission series when no explicit ids are given.
    pub fn carbon_monitoring() -> [DeviceType; 4] {
        [
            DeviceType::CarbonSensor,
            DeviceType::EnergyMeter,
            DeviceType::AirQualityMonitor,
            DeviceType::EmissionsAnalyzer,
        ]
    }

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::CarbonSensor => "carbon_sensor",
            DeviceType::EnergyMeter => "energy_meter",
            DeviceType::AirQualityMonitor => "air_quality_monitor",
            DeviceType::EmissionsAnalyzer => "emissions_analyzer",
            DeviceType::Gate => "gate",
            DeviceType::WeightScale => "weight_scale",
            DeviceType::Camera => "camera",
            DeviceType::Loader => "loader",
            DeviceType::Conveyor => "conveyor",
            DeviceType::Forklift => "forklift",
            DeviceType::Truck => "truck",
            DeviceType::Hvac => "hvac",
            DeviceType::Lighting => "lighting",
            DeviceType::SolarPanel => "solar_panel",
            DeviceType::SmartGrid => "smart_grid",
            DeviceType::ChargingStation => "charging_station",
            DeviceType::Security => "security",
            DeviceType::Packaging => "packaging",
            DeviceType::Storage => "storage",
            DeviceType::Crane => "crane",
            DeviceType::Warehouse => "warehouse",
            DeviceType::Terminal => "terminal",
            DeviceType::Refrigeration => "refrigeration",
            DeviceType::Other => "other",
        }
    }

    /// Segment used in generated device codes (`DEV-<PREFIX>-...`).
    pub fn code_prefix(&self) -> &'static str {
        match self {
            DeviceType::CarbonSensor => "CO2",
            DeviceType::EnergyMeter => "EM",
            DeviceType::AirQualityMonitor => "AQ",
            DeviceType::EmissionsAnalyzer => "EA",
            DeviceType::Gate => "GT",
            DeviceType::WeightScale => "WS",
            DeviceType::Camera => "CAM",
            DeviceType::Loader => "LDR",
            DeviceType::Conveyor => "CNV",
            DeviceType::Forklift => "FLT",
            DeviceType::Truck => "TRK",
            DeviceType::Hvac => "HVAC",
            DeviceType::Lighting => "LT",
            DeviceType::SolarPanel => "SOL",
            DeviceType::SmartGrid => "GRID",
            DeviceType::ChargingStation => "CHG",
            DeviceType::Security => "SEC",
            DeviceType::Packaging => "PKG",
            DeviceType::Storage => "STO",
            DeviceType::Crane => "CRN",
            DeviceType::Warehouse => "WH",
            DeviceType::Terminal => "TRM",
            DeviceType::Refrigeration => "RF",
            DeviceType::Other => "OTH",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown device type: {}", s))
    }
}

/// Read-only view of a registered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Registry identifier; the key telemetry is written against.
    pub id: String,
    /// Human-facing device code (`DEV-TRK-A001`).
    pub code: String,
    /// Display name.
    pub name: String,
    /// Role of the device.
    #[serde(rename = "type")]
    pub device_type: DeviceType,
}

impl DeviceHandle {
    /// Create a handle.
    pub fn new(
        id: impl Into<String>,
        code: impl Into<String>,
        name: impl Into<String>,
        device_type: DeviceType,
    ) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            name: name.into(),
            device_type,
        }
    }
}

/// External device registry.
#[async_trait]
pub trait DeviceCatalog: Send + Sync {
    /// Devices of one type; empty when there are none.
    async fn find_by_type(&self, device_type: DeviceType) -> Result<Vec<DeviceHandle>, CatalogError>;

    /// One device by registry id.
    async fn find_by_id(&self, id: &str) -> Result<Option<DeviceHandle>, CatalogError>;

    /// Every device of every type.
    async fn find_all(&self) -> Result<Vec<DeviceHandle>, CatalogError> {
        let mut all = Vec::new();
        for device_type in DeviceType::ALL {
            all.extend(self.find_by_type(device_type).await?);
        }
        Ok(all)
    }
}

/// In-process catalog backed by a vector.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    devices: RwLock<Vec<DeviceHandle>>,
}

impl InMemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog holding `devices`.
    pub fn with_devices(devices: Vec<DeviceHandle>) -> Self {
        Self {
            devices: RwLock::new(devices),
        }
    }

    /// Register one device (replaces any device with the same id).
    pub fn insert(&self, device: DeviceHandle) {
        let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
        devices.retain(|d| d.id != device.id);
        devices.push(device);
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.read().map(|d| d.len()).unwrap_or(0)
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a device by its code.
    pub fn find_by_code(&self, code: &str) -> Option<DeviceHandle> {
        self.snapshot().into_iter().find(|d| d.code == code)
    }

    fn snapshot(&self) -> Vec<DeviceHandle> {
        self.devices
            .read()
            .map(|d| d.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

#[async_trait]
impl DeviceCatalog for InMemoryCatalog {
    async fn find_by_type(&self, device_type: DeviceType) -> Result<Vec<DeviceHandle>, CatalogError> {
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|d| d.device_type == device_type)
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<DeviceHandle>, CatalogError> {
        Ok(self.snapshot().into_iter().find(|d| d.id == id))
    }

    async fn find_all(&self) -> Result<Vec<DeviceHandle>, CatalogError> {
        Ok(self.snapshot())
    }
}

/// Adapter between the engines and a [`DeviceCatalog`].
#[derive(Clone)]
pub struct DeviceResolver {
    catalog: Arc<dyn DeviceCatalog>,
}

impl fmt::Debug for DeviceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceResolver").finish_non_exhaustive()
    }
}

impl DeviceResolver {
    /// Wrap a catalog.
    pub fn new(catalog: Arc<dyn DeviceCatalog>) -> Self {
        Self { catalog }
    }

    /// Devices of one type.
    pub async fn resolve_type(&self, device_type: DeviceType) -> Result<Vec<DeviceHandle>, CatalogError> {
        let devices = self.catalog.find_by_type(device_type).await?;
        log::debug!("resolved {} device(s) of type {}", devices.len(), device_type);
        Ok(devices)
    }

    /// Devices of several types, concatenated in the order given.
    pub async fn resolve_types(&self, types: &[DeviceType]) -> Result<Vec<DeviceHandle>, CatalogError> {
        let mut devices = Vec::new();
        for &device_type in types {
            devices.extend(self.resolve_type(device_type).await?);
        }
        Ok(devices)
    }

    /// Devices by explicit id; unknown ids are skipped.
    pub async fn resolve_ids(&self, ids: &[String]) -> Result<Vec<DeviceHandle>, CatalogError> {
        let mut devices = Vec::with_capacity(ids.len());
        for id in ids {
            match self.catalog.find_by_id(id).await? {
                Some(device) => devices.push(device),
                None => log::warn!("device {} not found in catalog, skipping", id),
            }
        }
        Ok(devices)
    }

    /// Every device, grouped by type.
    pub async fn group_by_type(&self) -> Result<BTreeMap<DeviceType, Vec<DeviceHandle>>, CatalogError> {
        let mut groups: BTreeMap<DeviceType, Vec<DeviceHandle>> = BTreeMap::new();
        for device in self.catalog.find_all().await? {
            groups.entry(device.device_type).or_default().push(device);
        }
        Ok(groups)
    }
}

/// Build a device code: `DEV-<PREFIX>-<SERIES><NNN>`.
pub fn device_code(device_type: DeviceType, series: &str, number: u32) -> String {
    format!("DEV-{}-{}{:03}", device_type.code_prefix(), series, number)
}

/// Infer the type from a device code; unknown codes map to [`DeviceType::Other`].
pub fn infer_device_type(code: &str) -> DeviceType {
    let prefix = code
        .strip_prefix("DEV-")
        .and_then(|rest| rest.split('-').next())
        .unwrap_or("");

    DeviceType::ALL
        .iter()
        .copied()
        .find(|t| t.code_prefix() == prefix)
        .unwrap_or(DeviceType::Other)
}

/// Generate a fleet of device handles.
///
/// Devices of each type get codes in series `A`, numbered from 1; ids are
/// the lowercase codes.
pub fn generate_fleet(counts: &[(DeviceType, u32)]) -> Vec<DeviceHandle> {
    let mut fleet = Vec::new();
    for &(device_type, count) in counts {
        for n in 1..=count {
            let code = device_code(device_type, "A", n);
            let name = format!("{} {}", title_case(device_type.as_str()), n);
            fleet.push(DeviceHandle::new(code.to_lowercase(), code, name, device_type));
        }
    }
    fleet
}

/// Default fleet used when no fleet file is supplied.
pub fn default_fleet() -> Vec<DeviceHandle> {
    generate_fleet(&[
        (DeviceType::CarbonSensor, 2),
        (DeviceType::EnergyMeter, 3),
        (DeviceType::AirQualityMonitor, 1),
        (DeviceType::EmissionsAnalyzer, 1),
        (DeviceType::Gate, 1),
        (DeviceType::WeightScale, 1),
        (DeviceType::Camera, 1),
        (DeviceType::Loader, 1),
        (DeviceType::Conveyor, 1),
        (DeviceType::Forklift, 2),
        (DeviceType::Truck, 2),
        (DeviceType::Hvac, 1),
        (DeviceType::Lighting, 2),
        (DeviceType::SolarPanel, 1),
        (DeviceType::SmartGrid, 1),
        (DeviceType::ChargingStation, 2),
        (DeviceType::Security, 1),
    ])
}

fn title_case(snake: &str) -> String {
    snake
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_type_round_trip_names() {
        for t in DeviceType::ALL {
            assert_eq!(t.as_str().parse::<DeviceType>(), Ok(t));
        }
        assert!("spaceship".parse::<DeviceType>().is_err());
    }

    #[test]
    fn test_device_type_serde() {
        let json = serde_json::to_string(&DeviceType::AirQualityMonitor).unwrap();
        assert_eq!(json, "\"air_quality_monitor\"");
    }

    #[test]
    fn test_device_code() {
        assert_eq!(device_code(DeviceType::Truck, "A", 1), "DEV-TRK-A001");
        assert_eq!(device_code(DeviceType::Lighting, "B", 42), "DEV-LT-B042");
    }

    #[test]
    fn test_infer_device_type() {
        assert_eq!(infer_device_type("DEV-FLT-A003"), DeviceType::Forklift);
        assert_eq!(infer_device_type("DEV-RF-C010"), DeviceType::Refrigeration);
        // prefix match is exact, not a substring search
        assert_eq!(infer_device_type("DEV-LTX-A001"), DeviceType::Other);
        assert_eq!(infer_device_type("sensor-7"), DeviceType::Other);
    }

    #[test]
    fn test_generate_fleet() {
        let fleet = generate_fleet(&[(DeviceType::CarbonSensor, 2), (DeviceType::Gate, 1)]);
        assert_eq!(fleet.len(), 3);
        assert_eq!(fleet[0].code, "DEV-CO2-A001");
        assert_eq!(fleet[0].id, "dev-co2-a001");
        assert_eq!(fleet[0].name, "Carbon Sensor 1");
        assert_eq!(fleet[2].device_type, DeviceType::Gate);
    }

    #[tokio::test]
    async fn test_resolver_types_in_order() {
        let catalog = InMemoryCatalog::with_devices(generate_fleet(&[
            (DeviceType::Gate, 1),
            (DeviceType::CarbonSensor, 2),
        ]));
        let resolver = DeviceResolver::new(Arc::new(catalog));

        let devices = resolver
            .resolve_types(&[DeviceType::CarbonSensor, DeviceType::Gate])
            .await
            .unwrap();
        let types: Vec<_> = devices.iter().map(|d| d.device_type).collect();
        assert_eq!(
            types,
            vec![DeviceType::CarbonSensor, DeviceType::CarbonSensor, DeviceType::Gate]
        );
    }

    #[tokio::test]
    async fn test_resolver_empty_is_not_error() {
        let resolver = DeviceResolver::new(Arc::new(InMemoryCatalog::new()));
        let devices = resolver.resolve_type(DeviceType::Loader).await.unwrap();
        assert!(devices.is_empty());
    }

    #[tokio::test]
    async fn test_resolver_skips_unknown_ids() {
        let catalog = InMemoryCatalog::with_devices(generate_fleet(&[(DeviceType::EnergyMeter, 1)]));
        let resolver = DeviceResolver::new(Arc::new(catalog));
        let ids = vec!["dev-em-a001".to_string(), "missing".to_string()];
        let devices = resolver.resolve_ids(&ids).await.unwrap();
        assert_eq!(devices.len(), 1);
    }

    #[tokio::test]
    async fn test_group_by_type() {
        let catalog = InMemoryCatalog::with_devices(default_fleet());
        let resolver = DeviceResolver::new(Arc::new(catalog));
        let groups = resolver.group_by_type().await.unwrap();
        assert_eq!(groups[&DeviceType::EnergyMeter].len(), 3);
        assert!(!groups.contains_key(&DeviceType::Crane));
    }

    #[test]
    fn test_catalog_insert_replaces() {
        let catalog = InMemoryCatalog::new();
        catalog.insert(DeviceHandle::new("a", "DEV-GT-A001", "Gate", DeviceType::Gate));
        catalog.insert(DeviceHandle::new("a", "DEV-GT-A001", "Gate 2", DeviceType::Gate));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.find_by_code("DEV-GT-A001").unwrap().name, "Gate 2");
    }
}
