//! ConnectionManager: the one live connection between this client and the
//! assistant service for a session.
//!
//! State machine over [`ConnectionState`]. Every connection attempt gets a
//! generation number; anything reported by an older generation (a late
//! handshake, a close from a socket we already replaced) is discarded, which
//! keeps at most one link alive per manager.
//!
//! Only one manager may own a given [`SessionId`] at a time; the claim is
//! released when that manager is dropped.
//!
//! Loss of the link, or a failed handshake, arms a single reconnect timer with
//! a fixed delay. Retries continue until [`ConnectionManager::close`] is called
//! or the manager is dropped.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{InboundEvent, OutboundRequest, decode_event, encode_request};
use crate::error::{SendError, SessionInUse, TransportError};
use crate::session::{SessionClaim, SessionId};
use crate::store::{ConversationEntry, ConversationStore};
use crate::transport::{Connector, Link, TransportEvent};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Where to connect and how to retry.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    pub host: String,
    pub port: u16,
    /// Fixed wait between a disconnect and the next attempt.
    pub reconnect_delay: Duration,
    /// Give up on a handshake after this long (None = wait forever).
    pub handshake_timeout: Option<Duration>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            handshake_timeout: None,
        }
    }
}

impl ManagerConfig {
    pub fn endpoint(&self, session_id: &SessionId) -> String {
        format!("ws://{}:{}/ws/chat/{}", self.host, self.port, session_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Notifications emitted by the manager, in the order they happened.
#[derive(Clone, Debug)]
pub enum ConnectionEvent {
    Connecting { attempt: u32 },
    Opened,
    MessageReceived(InboundEvent),
    MalformedFrame { error: String },
    Errored { error: String },
    /// `unexpected` is false only for closes requested through `close()`.
    Closed { unexpected: bool },
    ReconnectScheduled { delay: Duration },
}

/// Everything a UI needs to render the chat panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionView {
    pub entries: Vec<ConversationEntry>,
    pub is_connected: bool,
    pub is_loading: bool,
}

type FileUpdateFn = dyn Fn(&str) + Send + Sync;

struct Inner {
    state: ConnectionState,
    generation: u64,
    /// Consecutive attempts since the last successful handshake.
    attempt: u32,
    outbound: Option<mpsc::UnboundedSender<String>>,
    link_task: Option<JoinHandle<()>>,
    reconnect: Option<CancellationToken>,
}

struct Shared<C> {
    connector: C,
    session_id: SessionId,
    endpoint: String,
    config: ManagerConfig,
    store: ConversationStore,
    on_file_update: RwLock<Option<Arc<FileUpdateFn>>>,
    /// Held while an inbound frame is applied, and by `close()`, so a close
    /// never returns while a file update is still running. Reentrant so the
    /// callback itself may close the manager.
    dispatch: ReentrantMutex<()>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: broadcast::Sender<ConnectionEvent>,
}

/// Owns the real-time connection for one session.
///
/// `open`, `close` and `send` never wait on the network: they update state,
/// spawn or cancel background work, and return. They must be called from
/// within a tokio runtime.
pub struct ConnectionManager<C: Connector> {
    shared: Arc<Shared<C>>,
    _claim: SessionClaim,
}

impl<C: Connector> ConnectionManager<C> {
    /// Fails if another live manager in this process already owns
    /// `session_id`.
    pub fn new(
        connector: C,
        session_id: SessionId,
        config: ManagerConfig,
    ) -> Result<Self, SessionInUse> {
        let claim = SessionClaim::acquire(&session_id).ok_or_else(|| {
            warn!(session = %session_id, "session already has a connection manager");
            SessionInUse(session_id.clone())
        })?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, _) = broadcast::channel(256);
        let endpoint = config.endpoint(&session_id);
        Ok(Self {
            shared: Arc::new(Shared {
                connector,
                session_id,
                endpoint,
                config,
                store: ConversationStore::new(),
                on_file_update: RwLock::new(None),
                dispatch: ReentrantMutex::new(()),
                inner: Mutex::new(Inner {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    attempt: 0,
                    outbound: None,
                    link_task: None,
                    reconnect: None,
                }),
                state_tx,
                event_tx,
            }),
            _claim: claim,
        })
    }

    /// Register the callback invoked with the new buffer whenever a reply
    /// carries `file_content`. It runs on the connection task and must not
    /// block; `close()` waits for a running invocation to finish.
    pub fn with_file_update<F>(self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.shared.on_file_update.write() = Some(Arc::new(callback));
        self
    }

    /// Start connecting. Does nothing while connecting or connected.
    pub fn open(&self) {
        self.shared.open();
    }

    /// Cancel any pending reconnect, drop the transport and go to
    /// `Disconnected`. Safe to call repeatedly.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Transmit a request. Succeeds only while connected and idle; the reply
    /// arrives later through the store and the event stream.
    pub fn send(&self, request: OutboundRequest) -> Result<(), SendError> {
        self.shared.send(request)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.store.is_loading()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.event_tx.subscribe()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.shared.store
    }

    pub fn view(&self) -> SessionView {
        let snapshot = self.shared.store.snapshot();
        SessionView {
            entries: snapshot.entries,
            is_connected: self.is_connected(),
            is_loading: snapshot.is_loading,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.shared.session_id
    }

    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl<C: Connector> Shared<C> {
    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.event_tx.send(event);
    }

    fn open(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Disconnected {
            debug!(session = %self.session_id, state = ?inner.state, "open ignored");
            return;
        }
        self.begin_connect(&mut inner);
    }

    fn begin_connect(self: &Arc<Self>, inner: &mut Inner) {
        if let Some(timer) = inner.reconnect.take() {
            timer.cancel();
        }
        inner.generation += 1;
        inner.attempt += 1;
        let generation = inner.generation;
        let attempt = inner.attempt;

        self.set_state(inner, ConnectionState::Connecting);
        info!(
            session = %self.session_id,
            attempt,
            endpoint = %self.endpoint,
            "connecting to assistant service"
        );
        self.emit(ConnectionEvent::Connecting { attempt });

        let shared = Arc::clone(self);
        inner.link_task = Some(tokio::spawn(async move {
            shared.drive_link(generation).await;
        }));
    }

    /// Handshake, then consume transport events until the link goes away.
    async fn drive_link(self: Arc<Self>, generation: u64) {
        let connect = self.connector.connect(&self.endpoint);
        let result = match self.config.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .unwrap_or(Err(TransportError::TimedOut(limit))),
            None => connect.await,
        };

        let Link {
            outbound,
            mut inbound,
        } = match result {
            Ok(link) => link,
            Err(e) => {
                self.link_down(generation, Some(e.to_string()), false);
                return;
            }
        };

        if !self.link_up(generation, outbound) {
            return;
        }

        let mut failure = None;
        while let Some(event) = inbound.recv().await {
            match event {
                TransportEvent::Frame(frame) => self.handle_frame(generation, &frame),
                TransportEvent::Closed => break,
                TransportEvent::Errored(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        self.link_down(generation, failure, true);
    }

    fn link_up(&self, generation: u64, outbound: mpsc::UnboundedSender<String>) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            debug!(session = %self.session_id, generation, "discarding superseded link");
            return false;
        }
        if let Some(timer) = inner.reconnect.take() {
            timer.cancel();
        }
        inner.outbound = Some(outbound);
        inner.attempt = 0;
        self.set_state(&mut inner, ConnectionState::Connected);
        info!(session = %self.session_id, "connected to assistant service");
        self.emit(ConnectionEvent::Opened);
        true
    }

    fn link_down(self: &Arc<Self>, generation: u64, error: Option<String>, was_open: bool) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }
        inner.outbound = None;
        inner.link_task = None;
        self.set_state(&mut inner, ConnectionState::Disconnected);
        // Nobody will answer an in-flight request on a dead link.
        self.store.set_loading(false);

        match (&error, was_open) {
            (Some(e), true) => warn!(session = %self.session_id, error = %e, "connection lost"),
            (None, true) => info!(session = %self.session_id, "connection closed by peer"),
            (Some(e), false) => warn!(
                session = %self.session_id,
                attempt = inner.attempt,
                error = %e,
                "connect failed"
            ),
            (None, false) => {}
        }
        if let Some(error) = error {
            self.emit(ConnectionEvent::Errored { error });
        }
        if was_open {
            self.emit(ConnectionEvent::Closed { unexpected: true });
        }

        self.schedule_reconnect(&mut inner);
    }

    fn schedule_reconnect(self: &Arc<Self>, inner: &mut Inner) {
        if let Some(previous) = inner.reconnect.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        inner.reconnect = Some(token.clone());

        let generation = inner.generation;
        let delay = self.config.reconnect_delay;
        debug!(
            session = %self.session_id,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        self.emit(ConnectionEvent::ReconnectScheduled { delay });

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => shared.reconnect_due(generation),
            }
        });
    }

    fn reconnect_due(self: &Arc<Self>, generation: u64) {
        let mut inner = self.inner.lock();
        // A close() or a manual open() since arming makes this timer stale.
        if inner.generation != generation || inner.state != ConnectionState::Disconnected {
            return;
        }
        inner.reconnect = None;
        info!(session = %self.session_id, "attempting to reconnect");
        self.begin_connect(&mut inner);
    }

    fn close(&self) {
        let _dispatch = self.dispatch.lock();
        let mut inner = self.inner.lock();
        if let Some(timer) = inner.reconnect.take() {
            timer.cancel();
        }
        inner.generation += 1;
        inner.attempt = 0;
        inner.outbound = None;
        if let Some(task) = inner.link_task.take() {
            task.abort();
        }
        if inner.state != ConnectionState::Disconnected {
            self.set_state(&mut inner, ConnectionState::Disconnected);
            info!(session = %self.session_id, "connection closed");
            self.emit(ConnectionEvent::Closed { unexpected: false });
        }
        self.store.set_loading(false);
    }

    fn send(&self, request: OutboundRequest) -> Result<(), SendError> {
        let inner = self.inner.lock();
        let outbound = match (&inner.state, &inner.outbound) {
            (ConnectionState::Connected, Some(outbound)) => outbound,
            _ => return Err(SendError::NotConnected),
        };
        if self.store.is_loading() {
            return Err(SendError::AlreadyInFlight);
        }

        let frame = encode_request(&request)?;
        if outbound.send(frame).is_err() {
            // Transport task is gone; its close is about to be processed.
            return Err(SendError::NotConnected);
        }

        self.store
            .append(ConversationEntry::user(request.message().to_string()));
        self.store.set_loading(true);
        debug!(
            session = %self.session_id,
            file_path = request.file_path(),
            file_bytes = request.file_content().len(),
            "request sent"
        );
        Ok(())
    }

    fn handle_frame(&self, generation: u64, frame: &str) {
        let decoded = decode_event(frame);
        let _dispatch = self.dispatch.lock();

        {
            let inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            if let Ok(event) = &decoded {
                self.store
                    .append(ConversationEntry::assistant(event.message.clone()));
            }
        }

        let event = match decoded {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    session = %self.session_id,
                    error = %e,
                    "ignoring malformed frame from assistant service"
                );
                self.store.set_loading(false);
                self.emit(ConnectionEvent::MalformedFrame {
                    error: e.to_string(),
                });
                return;
            }
        };

        if let Some(content) = event.file_content.as_deref() {
            let callback = self.on_file_update.read().clone();
            if let Some(callback) = callback {
                debug!(session = %self.session_id, bytes = content.len(), "applying file update");
                callback(content);
            }
        }

        self.store.set_loading(false);
        self.emit(ConnectionEvent::MessageReceived(event));
    }
}
