//! Transport seam between the connection manager and the network.
//!
//! A [`Connector`] performs the handshake and returns a [`Link`]: a pair of
//! channels, one for outbound text frames and one for inbound
//! [`TransportEvent`]s. Dropping the link's sender tears the connection down.

use std::future::Future;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::TransportError;

/// Something the remote side did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(String),
    Closed,
    Errored(String),
}

/// An established connection, as seen by the manager.
#[derive(Debug)]
pub struct Link {
    pub(crate) outbound: mpsc::UnboundedSender<String>,
    pub(crate) inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Link {
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }
}

/// The far side of a [`channel_link`]: frames the manager sent arrive on
/// `frames`, and anything pushed into `events` is delivered to the manager.
#[derive(Debug)]
pub struct RemoteEnd {
    pub frames: mpsc::UnboundedReceiver<String>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
}

impl RemoteEnd {
    /// Deliver a text frame to the manager. Returns false once the link is gone.
    pub fn push_frame(&self, frame: impl Into<String>) -> bool {
        self.events.send(TransportEvent::Frame(frame.into())).is_ok()
    }

    /// Simulate the peer closing the connection.
    pub fn close(self) {
        let _ = self.events.send(TransportEvent::Closed);
    }
}

/// In-memory link, for transports that bridge to something other than a socket.
pub fn channel_link() -> (Link, RemoteEnd) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (
        Link::new(outbound_tx, event_rx),
        RemoteEnd {
            frames: outbound_rx,
            events: event_tx,
        },
    )
}

/// Opens links to a URL.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> impl Future<Output = Result<Link, TransportError>> + Send;
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Clone, Debug, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(TransportError::from_tungstenite)?;

        let (link, remote) = channel_link();
        tokio::spawn(pump(ws_stream, remote));
        Ok(link)
    }
}

/// Shuttle frames between the socket and the link until either side goes away.
async fn pump<S>(ws_stream: tokio_tungstenite::WebSocketStream<S>, remote: RemoteEnd)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut ws_write, mut ws_read) = ws_stream.split();
    let RemoteEnd {
        mut frames,
        events,
    } = remote;

    loop {
        tokio::select! {
            frame = frames.recv() => {
                match frame {
                    Some(text) => {
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            let _ = events.send(TransportEvent::Errored(e.to_string()));
                            break;
                        }
                    }
                    None => {
                        // Manager dropped the link.
                        debug!("link released, closing websocket");
                        let _ = ws_write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            msg = ws_read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if events.send(TransportEvent::Frame(text.as_str().to_owned())).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => {
                            if events.send(TransportEvent::Frame(text)).is_err() {
                                break;
                            }
                        }
                        Err(_) => warn!(len = data.len(), "dropping non-utf8 binary frame"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = events.send(TransportEvent::Closed);
                        break;
                    }
                    Some(Err(e)) => {
                        let _ = events.send(TransportEvent::Errored(e.to_string()));
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
