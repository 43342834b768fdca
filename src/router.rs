//! Envelope routing
//!
//! Applies exactly one rule per inbound envelope: broadcast to everyone,
//! send to a named group, or join a group. Group membership is computed
//! from a registry snapshot at the instant of the send, so a join racing a
//! send may or may not be included.

use tracing::{debug, info, warn};

use crate::broadcaster::BroadcastQueue;
use crate::client::ClientRecord;
use crate::error::RelayError;
use crate::message::{Action, Envelope};
use crate::registry::Registry;

/// What a routed envelope did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Queued for the broadcaster
    Broadcast,
    /// Written directly to `recipients` group members
    Delivered { recipients: usize },
    /// Sender is now a member of `group`
    Joined { group: String },
    /// Accepted but had no effect
    Ignored,
}

/// Routes envelopes from one sender against the shared registry
#[derive(Debug, Clone)]
pub struct Router {
    registry: Registry,
    broadcast: BroadcastQueue,
}

impl Router {
    /// Create a router over `registry`, posting `all` messages to `broadcast`
    pub fn new(registry: Registry, broadcast: BroadcastQueue) -> Self {
        Self {
            registry,
            broadcast,
        }
    }

    /// Registry this router reads and mutates
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Apply the envelope's action on behalf of `sender`
    ///
    /// Protocol errors (`UnknownAction`, `MissingTarget`) are returned for
    /// the caller to log; they never affect the sender's connection.
    pub async fn route(&self, sender: &ClientRecord, msg: Envelope) -> Result<Routed, RelayError> {
        match msg.action()? {
            Action::All => {
                let msg = Envelope {
                    username: sender.username.clone(),
                    ..msg
                };
                self.broadcast.post(msg)?;
                Ok(Routed::Broadcast)
            }
            Action::SendMessage => {
                if msg.target.is_empty() {
                    return Err(RelayError::MissingTarget);
                }
                let recipients = self.send_to_group(sender, &msg.target, &msg.message).await;
                Ok(Routed::Delivered { recipients })
            }
            Action::JoinGroup => self.join_group(sender, msg.group),
        }
    }

    /// Write to every other member of `target`, best-effort
    async fn send_to_group(&self, sender: &ClientRecord, target: &str, content: &str) -> usize {
        let members = self.registry.snapshot();
        let msg = Envelope::group_message(&sender.username, content, target);
        let mut delivered = 0;

        for member in members
            .iter()
            .filter(|m| m.id != sender.id && m.in_group(target))
        {
            match member.send(msg.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    "Error sending message to {} ({}): {}",
                    member.username, member.id, e
                ),
            }
        }

        debug!(
            "{} sent to group {} ({} recipients)",
            sender.username, target, delivered
        );
        delivered
    }

    fn join_group(&self, sender: &ClientRecord, group: String) -> Result<Routed, RelayError> {
        if group.is_empty() {
            debug!("{} sent joinGroup without a group, ignoring", sender.username);
            return Ok(Routed::Ignored);
        }

        match self.registry.update_group(sender.id, Some(group.clone())) {
            Ok(()) => {
                info!("User {} joined group {}", sender.username, group);
                Ok(Routed::Joined { group })
            }
            Err(RelayError::UnknownIdentity(id)) => {
                debug!("Client {} left before joining {}", id, group);
                Ok(Routed::Ignored)
            }
            Err(e) => Err(e),
        }
    }
}
