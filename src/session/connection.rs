#![expect(
    clippy::module_name_repetitions,
    reason = "Session types expose their domain in the name for clarity"
)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as SyncMutex, PoisonError, Weak};
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;
use dashmap::DashMap;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use secrecy::{ExposeSecret as _, SecretString};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use tracing::{debug, info, trace, warn};
use url::Url;

use super::config::Config;
use super::envelope::{self, Envelope, Event, Inbound};
use super::error::SessionError;
use super::pending::PendingTable;
use super::tls;
use crate::device::Device;
use crate::Result;
use crate::error::Error;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Session state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Live socket with an active reader
    Connected,
    /// Explicitly disconnected; terminal, no reconnection is ever scheduled
    ShuttingDown,
}

impl SessionState {
    /// Check if the session currently holds a live socket.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Callback invoked with every device update the backend pushes.
pub type UpdateListener = Arc<dyn Fn(&Device) + Send + Sync>;

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Device-update listener registry.
///
/// Fan-out iterates over a snapshot, so a listener may register or remove
/// listeners (including itself) from within its own callback.
#[derive(Default)]
struct Listeners {
    next: AtomicU64,
    entries: DashMap<u64, UpdateListener>,
}

impl Listeners {
    fn add(&self, listener: UpdateListener) -> ListenerId {
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries.insert(id, listener);
        ListenerId(id)
    }

    fn remove(&self, id: ListenerId) -> bool {
        self.entries.remove(&id.0).is_some()
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn notify(&self, device: &Device) {
        let snapshot: Vec<UpdateListener> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for listener in snapshot {
            listener(device);
        }
    }
}

#[derive(Default)]
struct TaskHandles {
    reader: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

/// One authenticated WebSocket session to an AmbientLed backend.
///
/// The session owns its socket exclusively: a single reader task consumes
/// inbound frames, resolving correlated responses and fanning device events
/// out to listeners, while outbound writes are serialized through an
/// internal sink lock. When the reader dies for any reason other than an
/// explicit [`disconnect`](Session::disconnect), a reconnector rebuilds the
/// connection with exponential backoff, keeping the listener set intact.
///
/// `Session` is a cheap cloneable handle; all clones drive the same
/// connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

struct SessionInner {
    endpoint: Url,
    token: SecretString,
    config: Config,
    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
    /// Write half of the socket; present only while connected
    sink: Mutex<Option<WsSink>>,
    pending: PendingTable,
    listeners: Listeners,
    tasks: SyncMutex<TaskHandles>,
}

impl Session {
    /// Create a session without connecting.
    ///
    /// Fails with [`SessionError::InvalidEndpoint`] when the endpoint does
    /// not parse as a `ws://` or `wss://` URL.
    pub fn new(token: &str, endpoint: &str, config: Config) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::from(SessionError::InvalidEndpoint(e.to_string())))?;
        match endpoint.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(SessionError::InvalidEndpoint(format!(
                    "unsupported scheme {other:?}, expected ws or wss"
                ))
                .into());
            }
        }

        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);

        Ok(Self {
            inner: Arc::new(SessionInner {
                endpoint,
                token: SecretString::from(token.to_owned()),
                config,
                state_tx,
                state_rx,
                sink: Mutex::new(None),
                pending: PendingTable::default(),
                listeners: Listeners::default(),
                tasks: SyncMutex::new(TaskHandles::default()),
            }),
        })
    }

    /// Connect and start the reader task.
    ///
    /// A no-op when already connected. Fails with
    /// [`SessionError::ConnectTimeout`] when the handshake exceeds the
    /// configured deadline, [`SessionError::Auth`] on a 401/403 upgrade
    /// response, [`SessionError::Server`] for other non-success upgrade
    /// responses, and [`SessionError::Closed`] after an explicit disconnect.
    pub async fn connect(&self) -> Result<()> {
        match self.state() {
            SessionState::Connected | SessionState::Connecting => return Ok(()),
            SessionState::ShuttingDown => return Err(SessionError::Closed.into()),
            SessionState::Disconnected => {}
        }
        self.inner.establish().await
    }

    /// Tear the session down.
    ///
    /// Idempotent and infallible: cancels the reconnector and the reader,
    /// fails every outstanding request with [`SessionError::Closed`], clears
    /// the listener set, and closes the socket, swallowing close errors.
    pub async fn disconnect(&self) {
        let previous = self.inner.state_tx.send_replace(SessionState::ShuttingDown);
        if previous == SessionState::ShuttingDown {
            return;
        }
        debug!(endpoint = %self.inner.endpoint, "disconnecting session");

        {
            let mut tasks = self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(task) = tasks.reconnect.take() {
                task.abort();
            }
            if let Some(task) = tasks.reader.take() {
                task.abort();
            }
        }

        self.inner.pending.fail_all();
        self.inner.listeners.clear();

        if let Some(mut sink) = self.inner.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "error closing socket during shutdown");
            }
        }
    }

    /// Send a request and wait for its correlated response.
    ///
    /// Uses the configured default request timeout; see
    /// [`request_with_timeout`](Session::request_with_timeout).
    pub async fn request(&self, method: &str, data: Value) -> Result<Value> {
        self.request_with_timeout(method, data, self.inner.config.request_timeout)
            .await
    }

    /// Send a request and wait up to `deadline` for its correlated response.
    ///
    /// Concurrent requests are independent; each waits only for the response
    /// carrying its own message id. On timeout the pending slot is removed,
    /// so a late response is reclassified like any other unsolicited frame.
    /// A response carrying `status: false` fails with
    /// [`SessionError::Backend`].
    pub async fn request_with_timeout(
        &self,
        method: &str,
        data: Value,
        deadline: Duration,
    ) -> Result<Value> {
        if !self.connected() {
            return Err(SessionError::Closed.into());
        }

        let (id, slot) = self.inner.pending.register();
        let envelope = Envelope::request(method, &id, data);
        trace!(method, %id, "sending request");

        if let Err(e) = self
            .inner
            .send_envelope(&envelope, self.inner.config.send_timeout)
            .await
        {
            self.inner.pending.cancel(&id);
            return Err(e);
        }

        match timeout(deadline, slot).await {
            Err(_elapsed) => {
                self.inner.pending.cancel(&id);
                Err(SessionError::RequestTimeout.into())
            }
            // Slot dropped: the session went down with the request in flight
            Ok(Err(_recv)) => Err(SessionError::Closed.into()),
            Ok(Ok(response)) => {
                if response.status == Some(false) {
                    return Err(SessionError::Backend {
                        message: response.error_message(),
                    }
                    .into());
                }
                Ok(response.data.unwrap_or(Value::Null))
            }
        }
    }

    /// Send a per-device command without waiting for an acknowledgement.
    ///
    /// The write must be accepted by the transport within the send timeout
    /// ([`SessionError::SendTimeout`] otherwise); nothing beyond that is
    /// confirmed.
    pub async fn send_fire_and_forget(
        &self,
        method: &str,
        device_id: &str,
        params: Value,
    ) -> Result<()> {
        if !self.connected() {
            return Err(SessionError::Closed.into());
        }

        let id = self.inner.pending.next_id();
        let envelope = Envelope::command(method, &id, device_id, params);
        trace!(method, %id, device_id, "sending command");

        self.inner
            .send_envelope(&envelope, self.inner.config.send_timeout)
            .await
    }

    /// Register a listener for unsolicited device updates.
    ///
    /// Listeners survive reconnection; only an explicit
    /// [`disconnect`](Session::disconnect) clears them.
    pub fn subscribe(&self, listener: UpdateListener) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    /// Remove a listener by the id returned from [`subscribe`](Session::subscribe).
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Get the current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.inner.state_rx.borrow()
    }

    /// Check whether the session holds a live socket.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe to session state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Number of registered device-update listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// The endpoint this session talks to.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }
}

impl SessionInner {
    fn is_shutting_down(&self) -> bool {
        *self.state_rx.borrow() == SessionState::ShuttingDown
    }

    /// Move to `next` unless the session is shutting down.
    ///
    /// Returns `false` when the transition was refused, which callers treat
    /// as a lost race with [`Session::disconnect`].
    fn set_state_unless_closing(&self, next: SessionState) -> bool {
        let mut updated = false;
        self.state_tx.send_modify(|state| {
            if *state != SessionState::ShuttingDown {
                *state = next;
                updated = true;
            }
        });
        updated
    }

    /// Perform the handshake and start a fresh reader task.
    async fn establish(self: &Arc<Self>) -> Result<()> {
        if !self.set_state_unless_closing(SessionState::Connecting) {
            return Err(SessionError::Closed.into());
        }

        let stream = match self.handshake().await {
            Ok(stream) => stream,
            Err(e) => {
                self.set_state_unless_closing(SessionState::Disconnected);
                return Err(e);
            }
        };

        let (write, read) = stream.split();
        *self.sink.lock().await = Some(write);

        if !self.set_state_unless_closing(SessionState::Connected) {
            // disconnect() raced with us; tear the fresh socket down again
            if let Some(mut sink) = self.sink.lock().await.take() {
                let _ = sink.close().await;
            }
            return Err(SessionError::Closed.into());
        }

        info!(endpoint = %self.endpoint, "session connected");

        let handle = tokio::spawn(reader_loop(
            Arc::downgrade(self),
            read,
            self.config.idle_read_timeout,
        ));
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reader = Some(handle);

        Ok(())
    }

    async fn handshake(&self) -> Result<WsStream> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(connect_error)?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token.expose_secret()))?;
        request.headers_mut().insert(header::AUTHORIZATION, bearer);

        let connector = tls::relaxed_connector()?;
        let connecting = connect_async_tls_with_config(request, None, false, Some(connector));

        match timeout(self.config.connect_timeout, connecting).await {
            Err(_elapsed) => Err(SessionError::ConnectTimeout.into()),
            Ok(Err(e)) => Err(connect_error(e)),
            Ok(Ok((stream, _response))) => Ok(stream),
        }
    }

    async fn send_envelope(&self, envelope: &Envelope, deadline: Duration) -> Result<()> {
        let text = serde_json::to_string(envelope)?;

        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(SessionError::Closed)?;

        match timeout(deadline, sink.send(Message::Text(text.into()))).await {
            Err(_elapsed) => Err(SessionError::SendTimeout.into()),
            Ok(Err(e)) => Err(SessionError::Transport(e).into()),
            Ok(Ok(())) => Ok(()),
        }
    }

    async fn send_ping(&self) -> Result<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(SessionError::Closed)?;
        sink.send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| SessionError::Transport(e).into())
    }

    /// Classify one inbound text frame.
    ///
    /// A frame whose id matches a pending request always resolves that
    /// request, even when its payload also looks like a device event.
    fn handle_frame(&self, text: &str) {
        let envelope = match envelope::classify(text) {
            Inbound::KeepAlive => {
                trace!("discarding keep-alive frame");
                return;
            }
            Inbound::Malformed(e) => {
                warn!(error = %e, "discarding malformed frame");
                return;
            }
            Inbound::Envelope(envelope) => envelope,
        };

        let Some(envelope) = self.pending.resolve(envelope) else {
            return;
        };

        match envelope::classify_event(&envelope) {
            Event::Devices(devices) => {
                for device in &devices {
                    trace!(device = %device.id, "fanning out device update");
                    self.listeners.notify(device);
                }
            }
            Event::Ack => {
                trace!(method = %envelope.method, "command acknowledged");
            }
            Event::Unhandled => {
                debug!(method = %envelope.method, "dropping unhandled frame");
            }
        }
    }

    /// Runs after the reader dies for any reason other than shutdown.
    async fn on_reader_exit(self: &Arc<Self>) {
        if self.is_shutting_down() {
            return;
        }

        let _ = self.state_tx.send(SessionState::Disconnected);
        // In-flight requests are failed, not replayed across the reconnect
        self.pending.fail_all();
        *self.sink.lock().await = None;

        let handle = spawn::reconnect(Arc::downgrade(self));
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reconnect = Some(handle);
    }
}

/// Reads frames until the socket dies or the session goes away.
///
/// Reads stalling past the idle deadline trigger a protocol-level ping; a
/// failed ping is treated as a dead connection. Holding only a weak session
/// reference lets the task wind down on its own once every handle is gone.
async fn reader_loop(session: Weak<SessionInner>, mut read: WsSource, idle: Duration) {
    loop {
        let frame = match timeout(idle, read.next()).await {
            Err(_elapsed) => {
                let Some(inner) = session.upgrade() else { return };
                if let Err(e) = inner.send_ping().await {
                    warn!(error = %e, "liveness ping failed, dropping connection");
                    break;
                }
                trace!("idle read, sent liveness ping");
                continue;
            }
            Ok(None) => {
                debug!("socket stream ended");
                break;
            }
            Ok(Some(Err(e))) => {
                warn!(error = %e, "socket read failed");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let Some(inner) = session.upgrade() else { return };
        match frame {
            Message::Text(text) => inner.handle_frame(text.as_str()),
            Message::Close(_) => {
                debug!("server closed the connection");
                break;
            }
            // Binary frames and transport-level ping/pong need no handling
            _ => {}
        }
    }

    if let Some(inner) = session.upgrade() {
        inner.on_reader_exit().await;
    }
}

/// Rebuilds the connection after an unexpected reader exit.
///
/// Attempts are bounded by `reconnect.max_attempts` with exponential
/// backoff between them. Exhaustion leaves the session Disconnected with no
/// further retries; callers observe it through `connected()` and failing
/// requests.
/// Spawning the reconnect loop from a child module works around a rustc
/// limitation: at a `tokio::spawn` site inside the module that *defines* an
/// async fn, the compiler refuses to fetch that fn's hidden type to prove it
/// `Send`. The loop (and the `establish` future it awaits) are in fact `Send`;
/// spawning from here moves the check out of the defining scope.
mod spawn {
    use super::*;
    pub fn reconnect(session: Weak<SessionInner>) -> JoinHandle<()> {
        tokio::spawn(reconnect_loop(session))
    }
}

async fn reconnect_loop(session: Weak<SessionInner>) {
    let Some(inner) = session.upgrade() else { return };
    let reconnect = inner.config.reconnect.clone();
    drop(inner);

    let max_attempts = reconnect.max_attempts.unwrap_or(u32::MAX);
    let mut backoff: ExponentialBackoff = reconnect.clone().into();

    for attempt in 1..=max_attempts {
        let delay = backoff.next_backoff().unwrap_or(reconnect.max_backoff);
        sleep(delay).await;

        let Some(inner) = session.upgrade() else { return };
        if inner.is_shutting_down() {
            return;
        }

        match inner.establish().await {
            Ok(()) => {
                info!(attempt, "reconnected");
                return;
            }
            Err(e) => {
                warn!(attempt, max_attempts, error = %e, "reconnect attempt failed");
            }
        }
    }

    warn!(max_attempts, "reconnect attempts exhausted, giving up");
}

fn connect_error(e: tungstenite::Error) -> Error {
    match e {
        tungstenite::Error::Url(e) => SessionError::InvalidEndpoint(e.to_string()).into(),
        tungstenite::Error::Http(response) => match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SessionError::Auth.into(),
            status => SessionError::Server {
                code: status.as_u16(),
            }
            .into(),
        },
        other => SessionError::Transport(other).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::methods;

    #[test]
    fn rejects_non_websocket_endpoints() {
        let error = Session::new("token", "https://lights.local", Config::default()).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SessionError>(),
            Some(SessionError::InvalidEndpoint(_))
        ));

        let error = Session::new("token", "not a url", Config::default()).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SessionError>(),
            Some(SessionError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn fresh_session_is_disconnected() {
        let session = Session::new("token", "wss://lights.local:3000", Config::default()).unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.connected());
        assert_eq!(session.pending_requests(), 0);
    }

    #[tokio::test]
    async fn request_on_disconnected_session_fails_closed() {
        let session = Session::new("token", "wss://lights.local:3000", Config::default()).unwrap();

        let error = session
            .request(methods::GET_DEVICES_INTEGRATION, Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SessionError>(),
            Some(SessionError::Closed)
        ));
    }

    #[tokio::test]
    async fn listeners_register_and_remove_by_identity() {
        let session = Session::new("token", "wss://lights.local:3000", Config::default()).unwrap();

        let first = session.subscribe(Arc::new(|_| {}));
        let second = session.subscribe(Arc::new(|_| {}));
        assert_ne!(first, second);
        assert_eq!(session.listener_count(), 2);

        assert!(session.unsubscribe(first));
        assert!(!session.unsubscribe(first));
        assert_eq!(session.listener_count(), 1);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let session = Session::new("token", "wss://lights.local:3000", Config::default()).unwrap();
        session.subscribe(Arc::new(|_| {}));

        session.disconnect().await;
        assert_eq!(session.state(), SessionState::ShuttingDown);
        assert_eq!(session.listener_count(), 0);

        // Second call is a no-op and never panics
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::ShuttingDown);
    }

    #[tokio::test]
    async fn connect_after_disconnect_is_refused() {
        let session = Session::new("token", "wss://lights.local:3000", Config::default()).unwrap();
        session.disconnect().await;

        let error = session.connect().await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SessionError>(),
            Some(SessionError::Closed)
        ));
    }
}
