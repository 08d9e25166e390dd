//! WebSocket session management for the AmbientLed backend.
//!
//! This module owns everything between the raw socket and the typed device
//! layer:
//!
//! - [`Session`]: one authenticated WebSocket connection with a reader task,
//!   request/response correlation and automatic reconnection
//! - [`Registry`]: deduplicates sessions by (token, endpoint) so multiple
//!   consumers share one socket
//! - [`Envelope`]: the JSON wire message exchanged with the backend
//!
//! # Example
//!
//! ```ignore
//! let session = Session::new(token, "wss://lights.local:3000", Config::default())?;
//! session.connect().await?;
//!
//! let devices = session.request(methods::GET_DEVICES_INTEGRATION, json!({})).await?;
//! ```

pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub(crate) mod pending;
pub mod registry;
pub(crate) mod tls;

pub use config::{Config, ReconnectConfig};
pub use connection::{ListenerId, Session, SessionState, UpdateListener};
pub use envelope::{Envelope, methods};
#[expect(
    clippy::module_name_repetitions,
    reason = "SessionError includes module name for clarity when used outside this module"
)]
pub use error::SessionError;
pub use registry::Registry;
