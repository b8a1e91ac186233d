// MockIoT Server - Fleet loading
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Device fleet for the in-process catalog.
//!
//! A fleet file is a JSON array of device handles:
//!
//! ```json
//! [{"id": "gate-1", "code": "DEV-GT-A001", "name": "North gate", "type": "gate"}]
//! ```

use mockiot::{default_fleet, DeviceHandle};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Fleet file errors.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid fleet file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate device id: {0}")]
    DuplicateId(String),

    #[error("Fleet file has no devices")]
    Empty,
}

/// Read a fleet file.
pub fn load_fleet(path: &Path) -> Result<Vec<DeviceHandle>, FleetError> {
    let raw = std::fs::read_to_string(path)?;
    let devices: Vec<DeviceHandle> = serde_json::from_str(&raw)?;
    if devices.is_empty() {
        return Err(FleetError::Empty);
    }

    let mut seen = HashSet::new();
    for device in &devices {
        if !seen.insert(device.id.as_str()) {
            return Err(FleetError::DuplicateId(device.id.clone()));
        }
    }

    info!("Loaded {} device(s) from {}", devices.len(), path.display());
    Ok(devices)
}

/// Fleet file if given, generated default fleet otherwise.
pub fn fleet_or_default(path: Option<&Path>) -> Result<Vec<DeviceHandle>, FleetError> {
    match path {
        Some(path) => load_fleet(path),
        None => {
            let fleet = default_fleet();
            info!("No fleet file, using {} generated device(s)", fleet.len());
            Ok(fleet)
        }
    }
}
