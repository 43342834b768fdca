//! WebSocket Group Relay Library
//!
//! A real-time message relay built with tokio-tungstenite. Clients connect,
//! answer the `hello:` prompt with a display name, and then exchange JSON
//! envelopes with everyone or with a named group.
//!
//! # Actions
//! - `all`: broadcast to every connected client, sender included
//! - `sendMessage`: deliver to every other member of `target`
//! - `joinGroup`: move into `group`, confirmed with a server message
//!
//! # Architecture
//! - `Registry` is the shared set of connected clients behind one lock;
//!   routing takes a snapshot and writes after releasing it
//! - `Router` applies one action per envelope
//! - `Broadcaster` is the single worker draining the `all` queue
//! - Each connection runs its own lifecycle task plus a writer task
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use group_relay::{RelayConfig, RelayServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RelayConfig::default();
//!     let listener = TcpListener::bind(&config.addr).await.unwrap();
//!     RelayServer::new(config).run(listener).await;
//! }
//! ```

pub mod broadcaster;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod router;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use broadcaster::{BroadcastQueue, Broadcaster};
pub use client::{ClientRecord, Outbound};
pub use config::RelayConfig;
pub use error::{RelayError, SendError};
pub use handler::{drive, handle_connection};
pub use message::{Action, Envelope};
pub use registry::Registry;
pub use router::{Routed, Router};
pub use server::{RelayServer, RelayState};
pub use types::ClientId;
