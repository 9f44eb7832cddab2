//! In-memory connector for exercising the manager without sockets.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::transport::{Connector, Link, RemoteEnd, channel_link};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MockBehavior {
    /// Handshake succeeds; the remote end is handed to the test.
    Accept,
    /// Handshake fails immediately.
    Refuse,
    /// Handshake never completes.
    Hang,
}

struct MockState {
    behavior: MockBehavior,
    urls: Vec<String>,
}

pub(crate) struct MockConnector {
    state: Arc<Mutex<MockState>>,
    remotes: mpsc::UnboundedSender<RemoteEnd>,
}

/// Test-side handle to a [`MockConnector`].
pub(crate) struct MockControl {
    state: Arc<Mutex<MockState>>,
    remotes: mpsc::UnboundedReceiver<RemoteEnd>,
}

impl MockConnector {
    pub(crate) fn new(behavior: MockBehavior) -> (Self, MockControl) {
        let state = Arc::new(Mutex::new(MockState {
            behavior,
            urls: Vec::new(),
        }));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                state: state.clone(),
                remotes: tx,
            },
            MockControl { state, remotes: rx },
        )
    }
}

impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        let behavior = {
            let mut state = self.state.lock();
            state.urls.push(url.to_string());
            state.behavior
        };
        match behavior {
            MockBehavior::Accept => {
                let (link, remote) = channel_link();
                let _ = self.remotes.send(remote);
                Ok(link)
            }
            MockBehavior::Refuse => Err(TransportError::Unavailable),
            MockBehavior::Hang => std::future::pending().await,
        }
    }
}

impl MockControl {
    /// Number of handshakes attempted so far.
    pub(crate) fn attempts(&self) -> usize {
        self.state.lock().urls.len()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.state.lock().urls.clone()
    }

    pub(crate) fn set_behavior(&self, behavior: MockBehavior) {
        self.state.lock().behavior = behavior;
    }

    /// Wait for the next accepted connection.
    pub(crate) async fn next_remote(&mut self) -> RemoteEnd {
        self.remotes
            .recv()
            .await
            .expect("mock connector dropped")
    }
}
