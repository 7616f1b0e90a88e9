#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt::Debug;
use std::marker::PhantomData;
use std::time::Instant;

use backoff::backoff::Backoff as _;
use futures::{SinkExt as _, StreamExt as _};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use url::Url;

use super::config::Config;
use super::error::WsError;
use super::tls;
use super::traits::MessageParser;
use crate::auth::BearerToken;
use crate::{Result, error::Error};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Broadcast channel capacity for incoming messages.
const BROADCAST_CAPACITY: usize = 1024;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; no connection was requested yet, or an explicit
    /// shutdown completed
    Disconnected,
    /// Attempting to connect (including retries within the attempt budget)
    Connecting,
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Gave up after exhausting the attempt budget; no further retries
    Failed {
        /// Number of handshake attempts that were made
        attempts: u32,
    },
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Check if the connection loop has stopped for good.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed { .. })
    }
}

/// Manages WebSocket connection lifecycle and reconnection.
///
/// This generic connection manager handles all WebSocket connection concerns:
/// - Establishing authenticated connections (bearer token as query parameter
///   and `Authorization` header)
/// - Automatic retry with a bounded attempt budget
/// - Broadcasting messages to multiple subscribers
/// - Explicit shutdown
///
/// # Type Parameters
///
/// - `M`: Message type that implements [`DeserializeOwned`] among other "helper" types
/// - `P`: Parser type that implements [`MessageParser<M>`]
#[derive(Clone)]
pub struct ConnectionManager<M, P>
where
    M: DeserializeOwned + Debug + Clone + Send + 'static,
    P: MessageParser<M>,
{
    /// Watch channel sender for state changes (enables reconnection detection)
    state_tx: watch::Sender<ConnectionState>,
    /// Watch channel receiver for state changes (for use in checking the current state)
    state_rx: watch::Receiver<ConnectionState>,
    /// Sender channel for outgoing messages
    sender_tx: mpsc::UnboundedSender<String>,
    /// Broadcast sender for incoming messages
    broadcast_tx: broadcast::Sender<M>,
    /// Shutdown signal; flips to `true` exactly once
    shutdown_tx: watch::Sender<bool>,
    /// Phantom data for unused type parameters
    _phantom: PhantomData<P>,
}

impl<M, P> ConnectionManager<M, P>
where
    M: DeserializeOwned + Debug + Clone + Send + 'static,
    P: MessageParser<M>,
{
    /// Create a new connection manager and start the connection loop.
    ///
    /// The `parser` is used to deserialize incoming WebSocket messages.
    /// The connection loop runs in a background task and retries failed
    /// handshakes according to the config's `ReconnectConfig`, parking in
    /// [`ConnectionState::Failed`] once the budget is exhausted.
    pub fn new(endpoint: Url, token: BearerToken, config: Config, parser: P) -> Result<Self> {
        let (sender_tx, sender_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        // A fresh manager is already committed to connecting; starting at
        // Disconnected would read as terminal before the loop first runs.
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Spawn connection task
        let broadcast_tx_clone = broadcast_tx.clone();
        let state_tx_clone = state_tx.clone();

        tokio::spawn(async move {
            Self::connection_loop(
                endpoint,
                token,
                config,
                sender_rx,
                broadcast_tx_clone,
                parser,
                state_tx_clone,
                shutdown_rx,
            )
            .await;
        });

        Ok(Self {
            state_tx,
            state_rx,
            sender_tx,
            broadcast_tx,
            shutdown_tx,
            _phantom: PhantomData,
        })
    }

    /// Build the handshake request with the bearer token attached both as a
    /// query parameter and as an `Authorization` header.
    fn build_request(endpoint: &Url, token: &BearerToken) -> Result<Request> {
        let mut url = endpoint.clone();
        url.query_pairs_mut().append_pair("token", token.expose());

        let mut request = url.as_str().into_client_request()?;
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
            .map_err(|_e| Error::validation("bearer token is not a valid header value"))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);

        Ok(request)
    }

    /// Main connection loop with bounded automatic retry.
    #[expect(
        clippy::too_many_arguments,
        reason = "Loop arguments are moved into the spawned task individually"
    )]
    async fn connection_loop(
        endpoint: Url,
        token: BearerToken,
        config: Config,
        mut sender_rx: mpsc::UnboundedReceiver<String>,
        broadcast_tx: broadcast::Sender<M>,
        parser: P,
        state_tx: watch::Sender<ConnectionState>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut attempt = 0_u32;
        let mut backoff: backoff::ExponentialBackoff = config.reconnect.clone().into();
        let connector: Option<Connector> = tls::connector_for(config.tls);

        loop {
            if *shutdown_rx.borrow() {
                _ = state_tx.send(ConnectionState::Disconnected);
                break;
            }

            _ = state_tx.send(ConnectionState::Connecting);

            let request = match Self::build_request(&endpoint, &token) {
                Ok(request) => request,
                Err(e) => {
                    tracing::error!(error = %e, "Unable to build WebSocket handshake request");
                    _ = state_tx.send(ConnectionState::Failed { attempts: attempt });
                    break;
                }
            };

            // Attempt connection, bounded by the handshake timeout
            let connect = connect_async_tls_with_config(request, None, false, connector.clone());
            let outcome = tokio::select! {
                _ = shutdown_rx.changed() => {
                    _ = state_tx.send(ConnectionState::Disconnected);
                    break;
                }
                outcome = timeout(config.handshake_timeout, connect) => outcome,
            };

            match outcome {
                Ok(Ok((ws_stream, _))) => {
                    attempt = 0;
                    backoff.reset();
                    _ = state_tx.send(ConnectionState::Connected {
                        since: Instant::now(),
                    });

                    // Handle connection until it drops or shutdown is requested
                    if let Err(e) = Self::handle_connection(
                        ws_stream,
                        &mut sender_rx,
                        &broadcast_tx,
                        &mut shutdown_rx,
                        &parser,
                    )
                    .await
                    {
                        tracing::error!("Error handling connection: {e:?}");
                    }

                    if *shutdown_rx.borrow() {
                        _ = state_tx.send(ConnectionState::Disconnected);
                        break;
                    }

                    // Transport dropped mid-session; leave Connected before
                    // waiting out the retry delay.
                    _ = state_tx.send(ConnectionState::Connecting);
                }
                Ok(Err(e)) => {
                    let error = Error::with_source(
                        crate::error::Kind::WebSocket,
                        WsError::Connection(e),
                    );
                    tracing::warn!("Unable to connect: {error:?}");
                    attempt = attempt.saturating_add(1);
                }
                Err(_elapsed) => {
                    let error = Error::from(WsError::HandshakeTimeout);
                    tracing::warn!(
                        timeout = ?config.handshake_timeout,
                        "Unable to connect: {error:?}"
                    );
                    attempt = attempt.saturating_add(1);
                }
            }

            // Check if we should stop reconnecting
            if let Some(max) = config.reconnect.max_attempts
                && attempt >= max
            {
                _ = state_tx.send(ConnectionState::Failed { attempts: attempt });
                break;
            }

            // Wait out the retry delay, still responsive to shutdown
            if let Some(duration) = backoff.next_backoff() {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        _ = state_tx.send(ConnectionState::Disconnected);
                        break;
                    }
                    () = sleep(duration) => {}
                }
            }
        }
    }

    /// Handle an active WebSocket connection.
    async fn handle_connection(
        ws_stream: WsStream,
        sender_rx: &mut mpsc::UnboundedReceiver<String>,
        broadcast_tx: &broadcast::Sender<M>,
        shutdown_rx: &mut watch::Receiver<bool>,
        parser: &P,
    ) -> Result<()> {
        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                // Handle incoming messages
                Some(msg) = read.next() => {
                    match msg {
                        Ok(Message::Text(text)) => {
                            tracing::trace!(%text, "Received WebSocket text message");

                            // Parse messages using the provided parser
                            match parser.parse(text.as_bytes()) {
                                Ok(messages) => {
                                    for message in messages {
                                        tracing::trace!(?message, "Parsed WebSocket message");
                                        _ = broadcast_tx.send(message);
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(%text, error = %e, "Failed to parse WebSocket message");
                                }
                            }
                        }
                        Ok(Message::Close(_)) => {
                            return Err(Error::with_source(
                                crate::error::Kind::WebSocket,
                                WsError::ConnectionClosed,
                            ))
                        }
                        Err(e) => {
                            return Err(Error::with_source(
                                crate::error::Kind::WebSocket,
                                WsError::Connection(e),
                            ));
                        }
                        _ => {
                            // Ignore binary frames and control frames.
                        }
                    }
                }

                // Handle outgoing messages from subscriptions
                Some(text) = sender_rx.recv() => {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }

                // Explicit shutdown: try to close cleanly, then stop
                _ = shutdown_rx.changed() => {
                    _ = write.send(Message::Close(None)).await;
                    break;
                }

                // Check if connection is still active
                else => {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Send a message to the WebSocket server.
    ///
    /// The message is queued and written by the connection task; queuing
    /// succeeds even while the connection is still being established.
    pub fn send<R: Serialize>(&self, request: &R) -> Result<()> {
        let json = serde_json::to_string(request)?;
        self.sender_tx
            .send(json)
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    /// Request connection shutdown.
    ///
    /// The connection loop closes the socket, publishes
    /// [`ConnectionState::Disconnected`], and exits. Idempotent.
    pub fn shutdown(&self) {
        _ = self.shutdown_tx.send(true);
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to incoming messages.
    ///
    /// Each call returns a new independent receiver. Multiple subscribers can
    /// receive messages concurrently without blocking each other.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<M> {
        self.broadcast_tx.subscribe()
    }

    /// Subscribe to connection state changes.
    ///
    /// Returns a receiver that notifies when the connection state changes.
    /// This is useful for detecting reconnections and re-establishing subscriptions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, reason = "Test setup does not need error plumbing")]

    use super::*;
    use crate::rtc::subscription::FrameParser;
    use crate::rtc::types::response::ServerFrame;

    #[test]
    fn state_predicates() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::Disconnected.is_terminal());
        assert!(!ConnectionState::Connecting.is_terminal());
        assert!(
            ConnectionState::Connected {
                since: Instant::now()
            }
            .is_connected()
        );
        assert!(ConnectionState::Failed { attempts: 5 }.is_terminal());
    }

    #[tokio::test]
    async fn fresh_manager_reports_connecting() {
        type Manager = ConnectionManager<ServerFrame, FrameParser>;

        // Nothing listens on the endpoint; the loop is mid-retry the
        // whole time and must never look terminal.
        let endpoint = Url::parse("ws://127.0.0.1:9/socket").unwrap();
        let manager = Manager::new(
            endpoint,
            BearerToken::new("abc123"),
            Config::default(),
            FrameParser,
        )
        .unwrap();

        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(!manager.state().is_terminal());
        manager.shutdown();
    }

    #[test]
    fn handshake_request_carries_token_twice() {
        type Manager = ConnectionManager<ServerFrame, FrameParser>;

        let endpoint = Url::parse("wss://realtime.example.com/socket").unwrap();
        let token = BearerToken::new("abc123");

        let request = Manager::build_request(&endpoint, &token).unwrap();

        assert!(
            request.uri().query().unwrap().contains("token=abc123"),
            "token must be present as a query parameter"
        );
        let auth = request.headers().get(AUTHORIZATION).unwrap();
        assert_eq!(auth.to_str().unwrap(), "Bearer abc123");
        assert!(auth.is_sensitive(), "Authorization header must be sensitive");
    }
}
