//! Client connection abstraction
//!
//! The wire transport lives outside this crate. It hands us one
//! [`Connection`] per connected client and we only ever push named events
//! with a serialized payload through it.

use crate::error::{LobbyError, LobbyResult};
use crate::types::ConnectionId;
use crate::utils::generate_connection_id;
use tokio::sync::mpsc;

/// A single outbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    pub event: String,
    pub payload: String,
}

/// A connected client that can receive events
pub trait Connection: Send + Sync {
    /// Opaque identifier assigned when the connection was accepted
    fn id(&self) -> ConnectionId;

    /// Push one event to the client
    fn emit(&self, event: &str, payload: &str) -> LobbyResult<()>;
}

/// Connection backed by an unbounded channel drained by the transport's writer
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<OutboundEvent>,
}

impl ChannelConnection {
    /// Create a connection and the receiver the transport should drain
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                id: generate_connection_id(),
                sender,
            },
            receiver,
        )
    }
}

impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn emit(&self, event: &str, payload: &str) -> LobbyResult<()> {
        self.sender
            .send(OutboundEvent {
                event: event.to_string(),
                payload: payload.to_string(),
            })
            .map_err(|_| {
                LobbyError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    format!("connection {} is closed", self.id),
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_connection_delivers_in_order() {
        let (conn, mut rx) = ChannelConnection::new();
        conn.emit("a", "1").unwrap();
        conn.emit("b", "2").unwrap();

        assert_eq!(rx.try_recv().unwrap().event, "a");
        assert_eq!(rx.try_recv().unwrap().payload, "2");
    }

    #[test]
    fn test_emit_after_receiver_dropped_fails() {
        let (conn, rx) = ChannelConnection::new();
        drop(rx);
        assert!(conn.emit("a", "1").is_err());
    }
}
