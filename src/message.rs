//! Envelope protocol definitions
//!
//! Every frame after the handshake is a flat JSON object carrying an
//! `action` tag and payload fields. Missing fields decode as empty strings,
//! and every field is always written on output.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Username used for messages the relay itself originates
pub const SERVER_USERNAME: &str = "Server";

/// One inbound/outbound message unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    /// Sender display name (echoed, never authenticated)
    pub username: String,
    /// Free-text payload
    pub message: String,
    /// Group name for a directed group send
    pub target: String,
    /// Group name for a join request
    pub group: String,
    /// Routing action tag
    pub action: String,
}

impl Envelope {
    /// Decode one envelope from a text frame
    pub fn decode(text: &str) -> Result<Self, RelayError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode this envelope for a text frame
    pub fn encode(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the action tag
    pub fn action(&self) -> Result<Action, RelayError> {
        self.action.parse()
    }

    /// Message delivered to members of `target` on a group send
    pub fn group_message(username: &str, message: &str, target: &str) -> Self {
        Self {
            username: username.to_string(),
            message: message.to_string(),
            target: target.to_string(),
            ..Default::default()
        }
    }

    /// Confirmation written back to a client after it joins `group`
    pub fn join_confirmation(group: &str) -> Self {
        Self {
            username: SERVER_USERNAME.to_string(),
            message: format!("You joined group {}", group),
            ..Default::default()
        }
    }
}

/// Routing actions understood by the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Broadcast to every connected client
    All,
    /// Send to members of the `target` group
    SendMessage,
    /// Join the `group` group
    JoinGroup,
}

impl Action {
    /// Wire name of this action
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::All => "all",
            Action::SendMessage => "sendMessage",
            Action::JoinGroup => "joinGroup",
        }
    }
}

impl FromStr for Action {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Action::All),
            "sendMessage" => Ok(Action::SendMessage),
            "joinGroup" => Ok(Action::JoinGroup),
            other => Err(RelayError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
