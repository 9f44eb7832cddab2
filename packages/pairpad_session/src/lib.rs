//! pairpad session layer
//!
//! Client-side plumbing for talking to a pairpad assistant service over a
//! persistent WebSocket. The crate knows nothing about terminals or editors:
//! it owns the connection lifecycle, the wire format and the conversation log,
//! and hands the UI a small request/notify contract.
//!
//! # Example
//!
//! ```no_run
//! use pairpad_session::{
//!     ConnectionManager, ManagerConfig, OutboundRequest, SessionIdProvider, WsConnector,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let provider = SessionIdProvider::new();
//!     let manager = ConnectionManager::new(
//!         WsConnector::default(),
//!         provider.get().clone(),
//!         ManagerConfig::default(),
//!     )
//!     .unwrap()
//!     .with_file_update(|content| println!("buffer is now {} bytes", content.len()));
//!
//!     manager.open();
//!
//!     let mut state = manager.watch_state();
//!     let _ = state.wait_for(|s| s.is_connected()).await;
//!
//!     let request = OutboundRequest::new("add a docstring", "print(1)", "main.py").unwrap();
//!     manager.send(request).unwrap();
//!
//!     let mut events = manager.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         if let pairpad_session::ConnectionEvent::MessageReceived(reply) = event {
//!             println!("assistant: {}", reply.message);
//!             break;
//!         }
//!     }
//! }
//! ```

pub mod codec;
mod error;
mod manager;
pub mod session;
pub mod store;
pub mod transport;

#[cfg(test)]
mod test_helpers;

pub use codec::{InboundEvent, OutboundRequest, decode_event, encode_request};
pub use error::{CodecError, SendError, SessionInUse, TransportError};
pub use manager::{
    ConnectionEvent, ConnectionManager, ConnectionState, DEFAULT_RECONNECT_DELAY, ManagerConfig,
    SessionView,
};
pub use session::{SessionId, SessionIdProvider};
pub use store::{ConversationEntry, ConversationSnapshot, ConversationStore, Role};
pub use transport::{Connector, Link, RemoteEnd, TransportEvent, WsConnector, channel_link};
