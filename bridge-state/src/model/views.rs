//! Derived human-facing views, computed on read

use serde::Serialize;
use serde_json::Value;

use super::{DeviceId, DeviceSnapshot, STATE_COLOR_TEMPERATURE_MIREDS, STATE_LEVEL, STATE_ON_OFF};

/// Derived lighting view of a device with an on/off cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightView {
    pub id: DeviceId,
    /// Power state
    pub state: bool,
    /// Normalized brightness in `[0, 1]`, two decimals. Absent when the
    /// device has no level cluster; forced to exactly `0.0` while off so
    /// the on/off and brightness facets never disagree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
    /// Color temperature in Kelvin. Absent when mireds is missing or
    /// non-positive - never zero or infinite.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_kelvin: Option<u32>,
}

impl LightView {
    /// Derive the lighting view from a raw snapshot. `None` when the
    /// device does not expose the on/off cluster.
    pub fn from_snapshot(snapshot: &DeviceSnapshot) -> Option<Self> {
        let state = snapshot.state(STATE_ON_OFF).map(truthy)?;

        let brightness = snapshot
            .state(STATE_LEVEL)
            .and_then(Value::as_u64)
            .map(|level| {
                if state {
                    normalize_level(level)
                } else {
                    0.0
                }
            });

        let temperature_kelvin = snapshot
            .state(STATE_COLOR_TEMPERATURE_MIREDS)
            .and_then(Value::as_i64)
            .and_then(mireds_to_kelvin);

        Some(Self {
            id: snapshot.id,
            state,
            brightness,
            temperature_kelvin,
        })
    }
}

/// One sensor reading on a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorView {
    pub id: DeviceId,
    /// Sensor kind, e.g. `"temperature"`, `"occupancy"`
    pub name: String,
    /// Raw integer reading exactly as the mesh reported it
    pub value: i64,
    /// Epoch seconds of the last occupancy rising edge, occupancy only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active: Option<u64>,
}

/// Interpret a raw on/off value: the mesh reports booleans, but a raw
/// 0/1 integer is honored too.
fn truthy(value: &Value) -> bool {
    value
        .as_bool()
        .or_else(|| value.as_i64().map(|v| v != 0))
        .unwrap_or(false)
}

/// Raw 0-254 level to brightness in [0, 1], rounded to two decimals.
fn normalize_level(level: u64) -> f64 {
    let clamped = level.min(254) as f64;
    (clamped / 254.0 * 100.0).round() / 100.0
}

/// Kelvin from mireds; non-positive mireds has no defined temperature.
fn mireds_to_kelvin(mireds: i64) -> Option<u32> {
    if mireds <= 0 {
        return None;
    }
    Some((1_000_000.0 / mireds as f64).round() as u32)
}
