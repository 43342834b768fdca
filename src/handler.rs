//! WebSocket connection lifecycle
//!
//! Drives one client from upgrade to disconnect:
//! handshake (prompt + username) → registration → read/dispatch loop →
//! deregistration. Deregistration is tied to a guard value, so it runs on
//! every exit path.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, warn};

use crate::client::{ClientRecord, Outbound};
use crate::error::RelayError;
use crate::message::Envelope;
use crate::registry::Registry;
use crate::router::{Routed, Router};
use crate::server::RelayState;
use crate::types::ClientId;

/// How long a writer may keep flushing after its client is deregistered
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle a new TCP connection
///
/// Performs the WebSocket upgrade (only on the configured path) and runs
/// the connection to completion.
pub async fn handle_connection(stream: TcpStream, state: RelayState) -> Result<(), RelayError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    let path = state.config.path.clone();
    let check_path = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() == path {
            Ok(resp)
        } else {
            let mut refusal =
                ErrorResponse::new(Some(format!("No endpoint at {}", req.uri().path())));
            *refusal.status_mut() = StatusCode::NOT_FOUND;
            Err(refusal)
        }
    };

    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, check_path).await?;
    debug!("WebSocket upgrade complete for {}", peer_addr);

    drive(ws_stream, state).await
}

/// Run the handshake, registration and read loop over an upgraded socket
pub async fn drive<S>(mut ws: S, state: RelayState) -> Result<(), RelayError>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin + Send + 'static,
{
    ws.send(Message::Text(state.config.handshake_prompt.clone().into()))
        .await?;
    let username = read_username(&mut ws, &state.config.default_username).await;
    info!("User connected: {}", username);

    let (ws_sender, mut ws_receiver) = ws.split();
    let (outbound, msg_rx) = Outbound::channel(state.config.outbound_buffer);
    let mut writer = tokio::spawn(write_loop(ws_sender, msg_rx));

    let record = ClientRecord::new(ClientId::new(), username, outbound);
    let registration = match Registration::register(state.router.registry(), record.clone()) {
        Ok(registration) => registration,
        Err(e) => {
            writer.abort();
            return Err(e);
        }
    };

    let (result, writer_finished) = tokio::select! {
        res = read_loop(&mut ws_receiver, &state.router, &record) => (res, false),
        _ = &mut writer => {
            debug!("Write task completed for {}", record.id);
            (Ok(()), true)
        }
    };

    drop(registration);
    drop(record);

    // The writer exits once the last outbound handle is dropped.
    if !writer_finished && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        debug!("Writer did not drain in time, aborting");
        writer.abort();
    }

    result
}

/// Read the username frame that answers the handshake prompt
///
/// Falls back to `default` if the peer closes or errors first.
async fn read_username<S>(ws: &mut S, default: &str) -> String
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                let username = text.to_string();
                debug!("User set username: {}", username);
                return username;
            }
            Some(Ok(Message::Binary(data))) => {
                let username = String::from_utf8_lossy(&data).into_owned();
                debug!("User set username: {}", username);
                return username;
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
            Some(Ok(Message::Close(_))) | None => {
                debug!("Connection closed during handshake");
                return default.to_string();
            }
            Some(Err(e)) => {
                warn!("Error reading username: {}", e);
                return default.to_string();
            }
        }
    }
}

/// Read frames and dispatch envelopes until close or transport error
async fn read_loop<R>(ws_receiver: &mut R, router: &Router, me: &ClientRecord) -> Result<(), RelayError>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => dispatch(router, me, &text).await,
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => dispatch(router, me, text).await,
                Err(e) => warn!("Non UTF-8 binary frame from {}: {}", me.username, e),
            },
            Ok(Message::Close(_)) => {
                debug!("Client {} sent close frame", me.id);
                return Ok(());
            }
            Ok(Message::Ping(_)) => {
                // Pong is handled automatically by tungstenite
                debug!("Ping from {}", me.id);
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Error reading message from {}: {}", me.username, e);
                return Err(e.into());
            }
        }
    }
    Ok(())
}

/// Decode and route one envelope; failures are logged and absorbed
async fn dispatch(router: &Router, me: &ClientRecord, text: &str) {
    let msg = match Envelope::decode(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Invalid envelope from {}: {}", me.username, e);
            return;
        }
    };

    debug!("Received message from {}: {}", me.username, msg.message);

    match router.route(me, msg).await {
        Ok(Routed::Joined { group }) => {
            if let Err(e) = me.send(Envelope::join_confirmation(&group)).await {
                warn!("Error sending joinGroup confirmation to {}: {}", me.username, e);
            }
        }
        Ok(_) => {}
        Err(e) => warn!("Dropped envelope from {}: {}", me.username, e),
    }
}

/// Serialize queued envelopes onto the socket
async fn write_loop<W>(mut ws_sender: W, mut msg_rx: mpsc::Receiver<Envelope>)
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(msg) = msg_rx.recv().await {
        match msg.encode() {
            Ok(json) => {
                if let Err(e) = ws_sender.send(Message::Text(json.into())).await {
                    debug!("WebSocket send failed, ending write task: {}", e);
                    break;
                }
            }
            Err(e) => {
                error!("Failed to serialize message: {}", e);
            }
        }
    }
    debug!("Write task ended for client");

    let _ = ws_sender.close().await;
}

/// Keeps a client registered for as long as it is alive
struct Registration {
    registry: Registry,
    id: ClientId,
    username: String,
}

impl Registration {
    fn register(registry: &Registry, record: ClientRecord) -> Result<Self, RelayError> {
        let id = record.id;
        let username = record.username.clone();
        registry.add(record)?;
        Ok(Self {
            registry: registry.clone(),
            id,
            username,
        })
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.registry.remove(self.id).is_some() {
            info!("User disconnected: {}", self.username);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use super::*;
    use crate::broadcaster::Broadcaster;
    use crate::client::Outbound;
    use crate::config::RelayConfig;

    /// Upgraded socket double: frames pushed by the test, frames written by the relay
    struct MemorySocket {
        incoming: mpsc::UnboundedReceiver<Result<Message, WsError>>,
        outgoing: mpsc::UnboundedSender<Message>,
    }

    impl Stream for MemorySocket {
        type Item = Result<Message, WsError>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.incoming.poll_recv(cx)
        }
    }

    impl Sink<Message> for MemorySocket {
        type Error = WsError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), WsError> {
            self.outgoing
                .send(item)
                .map_err(|_| WsError::ConnectionClosed)
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }
    }

    struct Peer {
        to_relay: mpsc::UnboundedSender<Result<Message, WsError>>,
        from_relay: mpsc::UnboundedReceiver<Message>,
    }

    fn memory_socket() -> (MemorySocket, Peer) {
        let (to_relay, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_relay) = mpsc::unbounded_channel();
        (
            MemorySocket { incoming, outgoing },
            Peer {
                to_relay,
                from_relay,
            },
        )
    }

    fn relay_state() -> (RelayState, Broadcaster) {
        let registry = Registry::new();
        let (queue, broadcaster) = Broadcaster::new(registry.clone());
        let state = RelayState {
            router: Router::new(registry, queue),
            config: Arc::new(RelayConfig::default()),
        };
        (state, broadcaster)
    }

    async fn first_member(registry: &Registry) -> ClientRecord {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(record) = registry.snapshot().into_iter().next() {
                    return record;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("client registered")
    }

    /// Drive a connection whose handshake answer is `answer`, return the registered name
    async fn username_after_handshake(answer: Result<Message, WsError>) -> String {
        let (state, _broadcaster) = relay_state();
        let registry = state.router.registry().clone();
        let (socket, mut peer) = memory_socket();
        let task = tokio::spawn(drive(socket, state));

        assert_eq!(
            peer.from_relay.recv().await,
            Some(Message::Text("hello:".to_string().into()))
        );
        peer.to_relay.send(answer).unwrap();

        let username = first_member(&registry).await.username;
        assert_eq!(registry.len(), 1);

        drop(peer.to_relay);
        task.await.unwrap().unwrap();
        assert!(registry.is_empty());

        username
    }

    #[tokio::test]
    async fn test_drive_registers_anonymous_on_handshake_error() {
        let failure = WsError::Io(std::io::Error::other("connection reset"));
        assert_eq!(username_after_handshake(Err(failure)).await, "Anonymous");
    }

    #[tokio::test]
    async fn test_drive_registers_lossy_binary_username() {
        let frame = Message::Binary(vec![0xff, 0x41].into());
        assert_eq!(username_after_handshake(Ok(frame)).await, "\u{FFFD}A");
    }

    #[tokio::test]
    async fn test_drive_confirms_join_and_keeps_open_after_bad_frame() {
        let (state, _broadcaster) = relay_state();
        let registry = state.router.registry().clone();
        let (socket, mut peer) = memory_socket();
        let task = tokio::spawn(drive(socket, state));

        peer.from_relay.recv().await.unwrap();
        peer.to_relay
            .send(Ok(Message::Text("Alice".to_string().into())))
            .unwrap();
        peer.to_relay
            .send(Ok(Message::Text("not json".to_string().into())))
            .unwrap();
        peer.to_relay
            .send(Ok(Message::Text(
                r#"{"action":"joinGroup","group":"g1"}"#.to_string().into(),
            )))
            .unwrap();

        let reply = match peer.from_relay.recv().await {
            Some(Message::Text(text)) => Envelope::decode(&text).unwrap(),
            other => panic!("expected confirmation, got {:?}", other),
        };
        assert_eq!(reply.message, "You joined group g1");

        {
            let record = first_member(&registry).await;
            assert_eq!(record.username, "Alice");
            assert_eq!(record.group.as_deref(), Some("g1"));
        }

        peer.to_relay.send(Ok(Message::Close(None))).unwrap();
        task.await.unwrap().unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registration_removes_once() {
        let registry = Registry::new();
        let (outbound, _rx) = Outbound::channel(1);
        let record = ClientRecord::new(ClientId::new(), "Alice".to_string(), outbound);
        let id = record.id;

        let registration = Registration::register(&registry, record).unwrap();
        assert!(registry.contains(id));

        drop(registration);
        assert!(!registry.contains(id));
        assert!(registry.remove(id).is_none());
    }

    #[test]
    fn test_registration_rejects_duplicate() {
        let registry = Registry::new();
        let (outbound, _rx) = Outbound::channel(1);
        let record = ClientRecord::new(ClientId::new(), "Alice".to_string(), outbound);

        let _first = Registration::register(&registry, record.clone()).unwrap();
        assert!(Registration::register(&registry, record).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_read_username_defaults_on_close() {
        let mut frames = futures_util::stream::iter(vec![
            Ok::<_, WsError>(Message::Ping(Default::default())),
            Ok(Message::Close(None)),
        ]);
        assert_eq!(read_username(&mut frames, "Anonymous").await, "Anonymous");
    }

    #[tokio::test]
    async fn test_read_username_skips_control_frames() {
        let mut frames = futures_util::stream::iter(vec![
            Ok::<_, WsError>(Message::Pong(Default::default())),
            Ok(Message::Text("Alice".to_string().into())),
        ]);
        assert_eq!(read_username(&mut frames, "Anonymous").await, "Alice");
    }

    #[tokio::test]
    async fn test_read_username_defaults_on_error() {
        let mut frames =
            futures_util::stream::iter(vec![Err::<Message, _>(WsError::ConnectionClosed)]);
        assert_eq!(read_username(&mut frames, "Anonymous").await, "Anonymous");
    }
}
