//! Session identity: one opaque token per running client.

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use parking_lot::Mutex;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

const PREFIX: &str = "session-";
const TOKEN_LEN: usize = 12;
const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque session token, used as the last path segment of the chat endpoint.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    fn generate() -> Self {
        let mut rng = rand::rng();
        let token: String = (0..TOKEN_LEN)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        Self(format!("{PREFIX}{token}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hands out the process's session id.
///
/// The token is generated lazily on the first [`get`](Self::get) and never
/// changes afterwards. Create one provider at startup and pass it (or the id
/// it returns) to whoever needs it.
#[derive(Debug, Default)]
pub struct SessionIdProvider {
    id: OnceLock<SessionId>,
}

impl SessionIdProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> &SessionId {
        self.id.get_or_init(|| {
            let id = SessionId::generate();
            debug!(session = %id, "generated session id");
            id
        })
    }
}

/// Session ids currently owned by a live connection manager in this process.
static LIVE_SESSIONS: OnceLock<Mutex<HashSet<SessionId>>> = OnceLock::new();

fn live_sessions() -> &'static Mutex<HashSet<SessionId>> {
    LIVE_SESSIONS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Exclusive ownership of a session id, released on drop.
#[derive(Debug)]
pub(crate) struct SessionClaim {
    id: SessionId,
}

impl SessionClaim {
    /// Returns `None` if another owner already holds `id`.
    pub(crate) fn acquire(id: &SessionId) -> Option<Self> {
        if !live_sessions().lock().insert(id.clone()) {
            return None;
        }
        Some(Self { id: id.clone() })
    }
}

impl Drop for SessionClaim {
    fn drop(&mut self) {
        live_sessions().lock().remove(&self.id);
    }
}
