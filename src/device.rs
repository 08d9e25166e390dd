use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::serde_helpers;

/// One AmbientLed device as the backend reports it.
#[non_exhaustive]
#[derive(Debug, Clone, Deserialize, Serialize, Builder)]
pub struct Device {
    /// Backend-assigned device identifier
    #[serde(rename = "_id")]
    pub id: String,
    /// Human-readable device name
    pub name: String,
    /// Whether the device currently has a link to the backend
    #[serde(default)]
    pub online: bool,
    /// Current lighting state
    #[serde(default)]
    pub data: DeviceState,
}

/// Lighting state carried inside a device record.
#[non_exhaustive]
#[derive(Debug, Clone, Default, Deserialize, Serialize, Builder)]
pub struct DeviceState {
    /// Whether the light is on
    #[serde(default)]
    pub lighting: bool,
    /// Brightness on the backend's 0–100 scale
    #[serde(default)]
    pub brightness: u8,
    /// Current color as a `#rrggbb` hex string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Currently running effect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    /// Effects this device supports. Older backends send a comma-separated
    /// string instead of an array; both are accepted.
    #[serde(
        default,
        deserialize_with = "serde_helpers::effects_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub effects: Vec<String>,
}

/// Partial parameter set for a device-update command.
///
/// Absent fields are left untouched by the backend.
#[non_exhaustive]
#[derive(Debug, Clone, Default, Serialize, Builder)]
pub struct UpdateParams {
    /// Switch the light on or off
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lighting: Option<bool>,
    /// Brightness on the backend's 0–100 scale
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
    /// Color as a `#rrggbb` hex string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Effect to run, by name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
}
