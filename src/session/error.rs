#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// Session error variants.
///
/// Connection validation flows should branch on these variants (via
/// [`crate::error::Error::downcast_ref`]), never on rendered messages.
#[non_exhaustive]
#[derive(Debug)]
pub enum SessionError {
    /// The endpoint could not be parsed or is not a WebSocket URL
    InvalidEndpoint(String),
    /// The server rejected the bearer token during the upgrade
    Auth,
    /// The handshake did not complete within the connect timeout
    ConnectTimeout,
    /// The server answered the upgrade with an unexpected status
    Server {
        /// HTTP status code of the upgrade response
        code: u16,
    },
    /// No correlated response arrived within the request timeout
    RequestTimeout,
    /// An outbound write was not accepted within the send timeout
    SendTimeout,
    /// The backend answered with `status: false`
    Backend {
        /// Error message extracted from the response payload
        message: String,
    },
    /// The session is closed or shutting down
    Closed,
    /// Received a frame that does not parse as an envelope.
    /// Logged and discarded by the reader; never surfaced to a caller.
    Protocol(String),
    /// Transport-level failure before or during the upgrade
    Transport(tokio_tungstenite::tungstenite::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEndpoint(reason) => write!(f, "invalid endpoint: {reason}"),
            Self::Auth => write!(f, "authentication rejected by the backend"),
            Self::ConnectTimeout => write!(f, "handshake did not complete in time"),
            Self::Server { code } => write!(f, "server rejected the upgrade with status {code}"),
            Self::RequestTimeout => write!(f, "no response received in time"),
            Self::SendTimeout => write!(f, "outbound write did not complete in time"),
            Self::Backend { message } => write!(f, "backend error: {message}"),
            Self::Closed => write!(f, "session is closed"),
            Self::Protocol(detail) => write!(f, "malformed frame: {detail}"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl StdError for SessionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SessionError> for crate::error::Error {
    fn from(e: SessionError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::Session, e)
    }
}
