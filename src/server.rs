//! Relay server
//!
//! Owns the shared registry, the router and the broadcast worker, and runs
//! the TCP accept loop that spawns one lifecycle task per connection.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::broadcaster::Broadcaster;
use crate::config::RelayConfig;
use crate::handler::handle_connection;
use crate::registry::Registry;
use crate::router::Router;

/// State shared by every connection task
#[derive(Debug, Clone)]
pub struct RelayState {
    /// Envelope router over the shared registry
    pub router: Router,
    /// Runtime settings
    pub config: Arc<RelayConfig>,
}

/// The relay: registry, router and broadcaster wired together
pub struct RelayServer {
    state: RelayState,
    broadcaster: Broadcaster,
}

impl RelayServer {
    /// Create a relay with an empty registry
    pub fn new(config: RelayConfig) -> Self {
        let registry = Registry::new();
        let (queue, broadcaster) = Broadcaster::new(registry.clone());
        let state = RelayState {
            router: Router::new(registry, queue),
            config: Arc::new(config),
        };
        Self { state, broadcaster }
    }

    /// Handle to the live registry
    pub fn registry(&self) -> Registry {
        self.state.router.registry().clone()
    }

    /// Start the broadcaster and accept connections forever
    pub async fn run(self, listener: TcpListener) {
        tokio::spawn(self.broadcaster.run());
        info!("Broadcaster task spawned");

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let state = self.state.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
