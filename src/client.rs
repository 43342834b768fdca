//! Client record and connection handle
//!
//! A `ClientRecord` is the registry's view of one connected user. Its
//! `Outbound` handle feeds the connection's writer task, which owns the
//! WebSocket sink.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::Envelope;
use crate::types::ClientId;

/// Write capability for one connection
///
/// Cloned into registry snapshots so routed writes never hold the
/// registry lock.
#[derive(Debug, Clone)]
pub struct Outbound {
    sender: mpsc::Sender<Envelope>,
}

impl Outbound {
    /// Wrap the sending half of a connection's outbound channel
    pub fn new(sender: mpsc::Sender<Envelope>) -> Self {
        Self { sender }
    }

    /// Create a handle plus the receiver its writer task drains
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    /// Write one envelope to this connection
    ///
    /// Waits while the connection's buffer is full. Returns an error if the
    /// writer task has ended (client disconnected).
    pub async fn send(&self, msg: Envelope) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
}

/// Connected client information
#[derive(Debug, Clone)]
pub struct ClientRecord {
    /// Unique identifier for this connection
    pub id: ClientId,
    /// Display name captured at handshake
    pub username: String,
    /// Current group (None = ungrouped)
    pub group: Option<String>,
    /// Server → client write handle
    pub outbound: Outbound,
}

impl ClientRecord {
    /// Create an ungrouped record
    pub fn new(id: ClientId, username: String, outbound: Outbound) -> Self {
        Self {
            id,
            username,
            group: None,
            outbound,
        }
    }

    /// Check if this client currently belongs to `group`
    pub fn in_group(&self, group: &str) -> bool {
        self.group.as_deref() == Some(group)
    }

    /// Write one envelope to this client
    pub async fn send(&self, msg: Envelope) -> Result<(), SendError> {
        self.outbound.send(msg).await
    }
}
