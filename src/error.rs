//! Error types for the relay
//!
//! Defines relay-level errors and connection-handle send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::ClientId;

/// Relay-level errors
///
/// Transport errors end one connection. Protocol and registry errors are
/// logged and absorbed; the connection stays open.
#[derive(Debug, Error)]
pub enum RelayError {
    /// WebSocket protocol error (fatal for the connection)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Malformed envelope
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal for the connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Envelope carried an action outside the known vocabulary
    #[error("Unknown action: {0:?}")]
    UnknownAction(String),

    /// `sendMessage` without a target group
    #[error("sendMessage requires a target group")]
    MissingTarget,

    /// A record with this identity is already registered
    #[error("Duplicate identity: {0}")]
    DuplicateIdentity(ClientId),

    /// No record with this identity (removed concurrently)
    #[error("Unknown identity: {0}")]
    UnknownIdentity(ClientId),

    /// The broadcast worker is gone
    #[error("Broadcaster closed")]
    BroadcasterClosed,
}

/// Message send errors
///
/// Occurs when writing to a connection whose writer task has ended.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
