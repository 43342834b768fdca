//! Group relay - Entry Point
//!
//! Binds the listener and hands it to the relay server.

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use group_relay::{RelayConfig, RelayServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=group_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("group_relay=info")),
        )
        .init();

    let config = RelayConfig::from_env();

    let listener = TcpListener::bind(&config.addr).await?;
    info!(
        "Relay listening on ws://{}{}",
        listener.local_addr()?,
        config.path
    );

    RelayServer::new(config).run(listener).await;

    Ok(())
}
