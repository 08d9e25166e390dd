use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use super::config::Config;
use super::connection::Session;
use crate::Result;

type RegistryKey = (String, String);

/// Deduplicates sessions by (token, endpoint).
///
/// Multiple consumers asking for the same backend share one socket. The
/// registry is owned by the host application's lifecycle: build one, pass it
/// around, and call [`release_all`](Registry::release_all) at shutdown.
///
/// Every mutation runs under a single async mutex, so two concurrent
/// [`acquire`](Registry::acquire) calls for the same key can never race into
/// building duplicate sockets.
pub struct Registry {
    config: Config,
    sessions: Mutex<HashMap<RegistryKey, Session>>,
}

impl Registry {
    /// Create a registry; `config` applies to every session it builds.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Get a connected session for the key, reusing an existing one.
    ///
    /// A cached session that is no longer connected is disconnected and
    /// discarded before a fresh one is built and connected in its place.
    pub async fn acquire(&self, token: &str, endpoint: &str) -> Result<Session> {
        let key = (token.to_owned(), endpoint.to_owned());
        let mut sessions = self.sessions.lock().await;

        if let Some(existing) = sessions.get(&key) {
            if existing.connected() {
                debug!(endpoint, "reusing existing session");
                return Ok(existing.clone());
            }
            debug!(endpoint, "discarding stale session");
            let stale = sessions.remove(&key);
            if let Some(stale) = stale {
                stale.disconnect().await;
            }
        }

        debug!(endpoint, "building new session");
        let session = Session::new(token, endpoint, self.config.clone())?;
        session.connect().await?;
        sessions.insert(key, session.clone());
        Ok(session)
    }

    /// Disconnect and remove the session for the key, if any.
    pub async fn release(&self, token: &str, endpoint: &str) {
        let key = (token.to_owned(), endpoint.to_owned());
        let removed = self.sessions.lock().await.remove(&key);
        if let Some(session) = removed {
            debug!(endpoint, "released session");
            session.disconnect().await;
        }
    }

    /// Disconnect and remove every session; used at process shutdown.
    pub async fn release_all(&self) {
        let mut sessions = self.sessions.lock().await;
        for ((_, endpoint), session) in sessions.drain() {
            debug!(endpoint, "released session");
            session.disconnect().await;
        }
    }

    /// Number of cached sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}
