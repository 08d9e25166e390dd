use serde_json::json;

use crate::Result;
use crate::device::{Device, UpdateParams};
use crate::session::{Config, ListenerId, Session, methods};

/// Typed device operations over a [`Session`].
///
/// The client adds no protocol state of its own; several clients may wrap
/// the same session (for example one handed out by a
/// [`Registry`](crate::session::Registry)).
///
/// # Examples
///
/// ```rust,no_run
/// use ambientled_client_sdk::client::Client;
/// use ambientled_client_sdk::session::Config;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = Client::connect("token", "wss://lights.local:3000", Config::default()).await?;
///
///     for device in client.devices().await? {
///         println!("{} ({})", device.name, device.id);
///     }
///
///     client.disconnect().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    session: Session,
}

impl Client {
    /// Wrap an existing session.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Build a session, connect it, and wrap it.
    pub async fn connect(token: &str, endpoint: &str, config: Config) -> Result<Self> {
        let session = Session::new(token, endpoint, config)?;
        session.connect().await?;
        Ok(Self::new(session))
    }

    /// The underlying session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// List the integration-visible devices.
    pub async fn devices(&self) -> Result<Vec<Device>> {
        let data = self
            .session
            .request(methods::GET_DEVICES_INTEGRATION, json!({}))
            .await?;
        if data.is_null() {
            // Backends omit `data` on an empty listing
            return Ok(Vec::new());
        }
        serde_json::from_value(data).map_err(Into::into)
    }

    /// Send a partial parameter update to one device.
    ///
    /// Fire-and-forget: the call returns once the write is accepted by the
    /// transport. State confirmation arrives as a device update pushed by
    /// the backend.
    pub async fn update_device(&self, device_id: &str, params: &UpdateParams) -> Result<()> {
        self.session
            .send_fire_and_forget(methods::UPDATE_PARAMS, device_id, serde_json::to_value(params)?)
            .await
    }

    /// Turn a device on, applying any other parameters in the same command.
    pub async fn turn_on(&self, device_id: &str, mut params: UpdateParams) -> Result<()> {
        params.lighting = Some(true);
        self.update_device(device_id, &params).await
    }

    /// Turn a device off.
    pub async fn turn_off(&self, device_id: &str) -> Result<()> {
        let params = UpdateParams::builder().lighting(false).build();
        self.update_device(device_id, &params).await
    }

    /// Invoke `callback` for every update pushed for one device.
    ///
    /// Updates for other devices are filtered out before the callback runs.
    pub fn watch_device<F>(&self, device_id: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&Device) + Send + Sync + 'static,
    {
        let device_id = device_id.into();
        self.session.subscribe(std::sync::Arc::new(move |device: &Device| {
            if device.id == device_id {
                callback(device);
            }
        }))
    }

    /// Stop watching; accepts the id returned by [`watch_device`](Client::watch_device).
    pub fn unwatch(&self, id: ListenerId) -> bool {
        self.session.unsubscribe(id)
    }

    /// Check whether the underlying session holds a live socket.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.session.connected()
    }

    /// Disconnect the underlying session.
    pub async fn disconnect(&self) {
        self.session.disconnect().await;
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", self.session.endpoint())
            .finish_non_exhaustive()
    }
}

/// Validate credentials with one connect + device listing + disconnect.
///
/// Intended for configuration flows that need to check a token before
/// persisting it. Failures carry the typed taxonomy
/// ([`SessionError`](crate::session::SessionError)), so callers branch on
/// variants, never on message text; a failed probe must be reported to the
/// user, not propagated as a crash.
pub async fn probe(token: &str, endpoint: &str, config: Config) -> Result<Vec<Device>> {
    let client = Client::connect(token, endpoint, config).await?;
    let devices = client.devices().await;
    client.disconnect().await;
    devices
}
