use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::device::Device;

/// Methods understood by the AmbientLed backend.
pub mod methods {
    /// Device-listing query scoped to integration-visible (light) devices
    pub const GET_DEVICES_INTEGRATION: &str = "getDevicesIntegration";
    /// Unsolicited full device list push
    pub const GET_DEVICES: &str = "getDevices";
    /// Unsolicited single-device state push
    pub const GET_DEVICE: &str = "getDevice";
    /// Per-device parameter-update command
    pub const UPDATE_PARAMS: &str = "updateParams";
}

/// The JSON wire message exchanged over the WebSocket.
///
/// Requests carry an `id`; the matching response echoes it. Unsolicited
/// events carry no guaranteed `id`. An absent `status` implies success;
/// `status: false` means `data` holds an `error` field.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<bool>,
}

impl Envelope {
    /// Build an outbound request envelope.
    pub(crate) fn request(method: &str, id: &str, data: Value) -> Self {
        Self {
            method: method.to_owned(),
            id: Some(id.to_owned()),
            data: Some(data),
            status: None,
        }
    }

    /// Build an outbound per-device command envelope.
    ///
    /// The backend expects the target device id nested inside `data`, with
    /// the actual parameters one level deeper.
    pub(crate) fn command(method: &str, id: &str, device_id: &str, params: Value) -> Self {
        Self {
            method: method.to_owned(),
            id: Some(id.to_owned()),
            data: Some(json!({ "id": device_id, "data": params })),
            status: None,
        }
    }

    /// Error message for a `status: false` response.
    pub(crate) fn error_message(&self) -> String {
        self.data
            .as_ref()
            .and_then(|data| data.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("unspecified backend error")
            .to_owned()
    }
}

/// First-stage classification of an inbound text frame.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// Empty frame or a bare "ping"/"pong" keep-alive
    KeepAlive,
    /// Frame that does not parse as an [`Envelope`]
    Malformed(serde_json::Error),
    Envelope(Envelope),
}

pub(crate) fn classify(text: &str) -> Inbound {
    let trimmed = text.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("ping")
        || trimmed.eq_ignore_ascii_case("pong")
    {
        return Inbound::KeepAlive;
    }

    match serde_json::from_str::<Envelope>(trimmed) {
        Ok(envelope) => Inbound::Envelope(envelope),
        Err(e) => Inbound::Malformed(e),
    }
}

/// Second-stage classification of an envelope that matched no pending request.
#[derive(Debug)]
pub(crate) enum Event {
    /// Device updates to fan out, one listener invocation per element
    Devices(Vec<Device>),
    /// Acknowledgement of a fire-and-forget command, discarded
    Ack,
    /// Anything else; logged and dropped
    Unhandled,
}

pub(crate) fn classify_event(envelope: &Envelope) -> Event {
    let data = envelope.data.as_ref();

    match envelope.method.as_str() {
        methods::UPDATE_PARAMS => Event::Ack,
        methods::GET_DEVICE => single_device(data),
        methods::GET_DEVICES | methods::GET_DEVICES_INTEGRATION => match data {
            Some(Value::Array(items)) => {
                let devices: Vec<Device> = items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect();
                if devices.is_empty() && !items.is_empty() {
                    Event::Unhandled
                } else {
                    Event::Devices(devices)
                }
            }
            _ => Event::Unhandled,
        },
        // Backends also push bare device objects without a recognized method
        _ => match data {
            Some(Value::Object(_)) => single_device(data),
            _ => Event::Unhandled,
        },
    }
}

fn single_device(data: Option<&Value>) -> Event {
    match data {
        Some(value) => match serde_json::from_value::<Device>(value.clone()) {
            Ok(device) => Event::Devices(vec![device]),
            Err(_) => Event::Unhandled,
        },
        None => Event::Unhandled,
    }
}
