//! Broadcast fan-out worker
//!
//! Envelopes posted with the `all` action travel through an unbounded queue
//! to a single worker task, which writes each one to every client registered
//! at the moment it is drained. The sender is included.
//!
//! The queue has no capacity limit and no drop policy: under sustained load
//! it grows until memory runs out.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::message::Envelope;
use crate::registry::Registry;

/// Producer side of the broadcast queue
#[derive(Debug, Clone)]
pub struct BroadcastQueue {
    sender: mpsc::UnboundedSender<Envelope>,
}

impl BroadcastQueue {
    /// Enqueue an envelope for delivery to everyone
    pub fn post(&self, msg: Envelope) -> Result<(), RelayError> {
        self.sender
            .send(msg)
            .map_err(|_| RelayError::BroadcasterClosed)
    }
}

/// The single broadcast worker
pub struct Broadcaster {
    registry: Registry,
    receiver: mpsc::UnboundedReceiver<Envelope>,
}

impl Broadcaster {
    /// Create a worker bound to `registry` and the queue that feeds it
    pub fn new(registry: Registry) -> (BroadcastQueue, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (BroadcastQueue { sender }, Self { registry, receiver })
    }

    /// Run the fan-out loop
    ///
    /// Drains the queue until every `BroadcastQueue` handle is dropped.
    pub async fn run(mut self) {
        info!("Broadcaster started");

        while let Some(msg) = self.receiver.recv().await {
            self.fan_out(msg).await;
        }

        info!("Broadcaster shutting down");
    }

    /// Write one envelope to every current member, in sequence
    async fn fan_out(&self, msg: Envelope) -> usize {
        let members = self.registry.snapshot();
        let mut delivered = 0;

        for member in &members {
            match member.send(msg.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    "Error broadcasting message to {} ({}): {}",
                    member.username, member.id, e
                ),
            }
        }

        debug!(
            "Broadcast from {} delivered to {}/{} clients",
            msg.username,
            delivered,
            members.len()
        );
        delivered
    }
}
