use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use url::Url;

use super::subscription::{Connection, FrameParser, Subscription, SubscriptionManager};
use super::types::request::{ClientFrame, OutboundMessage, SubscribeRequest};
use crate::Result;
use crate::auth::BearerToken;
use crate::error::Error;
use crate::ws::ConnectionManager;
use crate::ws::config::Config;
use crate::ws::connection::ConnectionState;

/// Realtime channel client for the Cargoline console.
///
/// A thin publish/subscribe facade over a single persistent, authenticated
/// WebSocket connection. The connection is created lazily by the first
/// `subscribe`/`publish` call and owned by the client; UI call sites never
/// manage its lifecycle.
///
/// All operations degrade instead of failing: a missing credential or a
/// broken transport produces a log line and an inert result, never a panic
/// or an error return. Realtime updates are a convenience layer on top of a
/// fully functional request/response UI, so their absence must stay
/// invisible to the rest of the application.
///
/// # Examples
///
/// ```rust, no_run
/// use cargoline_realtime_sdk::rtc::{Client, OutboundMessage, SubscribeRequest};
/// use cargoline_realtime_sdk::ws::config::Config;
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = Client::new(
///         "wss://realtime.cargoline.io/socket",
///         Some("token-from-login".into()),
///         Config::default(),
///     )?;
///
///     let subscription = client.subscribe(
///         &SubscribeRequest::builder().channel("chat".to_owned()).build(),
///         |data| println!("chat event: {data}"),
///     );
///
///     client.publish(&OutboundMessage::builder()
///         .channel("chat".to_owned())
///         .msg_type("text".to_owned())
///         .payload(json!("hi"))
///         .build());
///
///     subscription.unsubscribe();
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    /// Gateway endpoint, without credentials
    endpoint: Url,
    /// Bearer credential; `None` disables realtime features
    token: Option<BearerToken>,
    /// Transport configuration
    config: Config,
    /// The at-most-one live connection, created lazily
    link: Mutex<Option<Link>>,
}

/// One established (or establishing) connection and its listener registry.
#[derive(Clone)]
struct Link {
    connection: Connection,
    subscriptions: Arc<SubscriptionManager>,
}

impl Client {
    /// Create a client for `endpoint`.
    ///
    /// No connection is attempted here; the first `subscribe`/`publish`
    /// triggers it. A `None` (or empty) token is a valid, degraded
    /// configuration: every operation becomes an inert no-op.
    pub fn new(endpoint: &str, token: Option<BearerToken>, config: Config) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "realtime endpoint must use ws:// or wss://, got {}",
                endpoint.scheme()
            )));
        }

        Ok(Self {
            inner: Arc::new(ClientInner {
                endpoint,
                token,
                config,
                link: Mutex::new(None),
            }),
        })
    }

    /// Register interest in a channel.
    ///
    /// Lazily establishes the connection. Exactly one listener exists per
    /// channel name: subscribing again to the same channel replaces the
    /// previous callback. Returns an inert handle when no credential is
    /// configured.
    ///
    /// The callback runs on the dispatch task; panics inside it are caught,
    /// logged, and isolated from other channels.
    pub fn subscribe<F>(&self, request: &SubscribeRequest, callback: F) -> Subscription
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        if request.channel.is_empty() {
            let error = Error::validation("channel name must not be empty");
            tracing::warn!(%error, "Ignoring subscribe call");
            return Subscription::noop();
        }

        let Some(link) = self.ensure_link() else {
            return Subscription::noop();
        };

        link.subscriptions.subscribe(request, callback)
    }

    /// Convenience wrapper over the handle's own
    /// [`unsubscribe`](Subscription::unsubscribe).
    pub fn unsubscribe(&self, subscription: &Subscription) {
        subscription.unsubscribe();
    }

    /// Send one message, fire-and-forget.
    ///
    /// No delivery confirmation is returned; the server's
    /// `publish_success` / `publish_error` acknowledgments are logged by
    /// the dispatcher but not correlated to individual calls. Soft-fails
    /// with a log line when no connection can be established.
    pub fn publish(&self, message: &OutboundMessage) {
        let Some(link) = self.ensure_link() else {
            tracing::warn!(
                channel = %message.channel,
                "Dropping realtime publish: no connection available"
            );
            return;
        };

        if let Err(e) = link.connection.send(&ClientFrame::publish(message)) {
            tracing::warn!(
                channel = %message.channel,
                error = %e,
                "Failed to queue realtime publish"
            );
        }
    }

    /// Close the connection and clear all client state.
    ///
    /// Outstanding subscriptions stop firing silently. A subsequent
    /// `subscribe`/`publish` establishes a fresh connection with a fresh
    /// attempt counter.
    pub fn disconnect(&self) {
        let link = self
            .inner
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(link) = link {
            tracing::debug!("Shutting down realtime connection");
            link.connection.shutdown();
        }
    }

    /// Synchronous snapshot: `true` only while the connection is
    /// established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(ConnectionState::Disconnected, |link| {
                link.connection.state()
            })
    }

    /// Escape hatch: the underlying connection handle, if one exists.
    ///
    /// Frames sent through it bypass the listener registry and every
    /// contract this client makes.
    #[must_use]
    pub fn raw_connection(&self) -> Option<Connection> {
        self.inner
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|link| link.connection.clone())
    }

    /// Number of channels with a registered listener.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, |link| link.subscriptions.subscription_count())
    }

    /// Return the live link, creating it if needed.
    ///
    /// Creation is idempotent under the lock: concurrent first calls share
    /// one connection attempt. A link whose connection loop has ended (after
    /// `Failed` or an external shutdown) is replaced by a fresh one.
    fn ensure_link(&self) -> Option<Link> {
        let mut guard = self.inner.link.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(link) = guard.as_ref() {
            if !link.connection.state().is_terminal() {
                return Some(link.clone());
            }
            tracing::debug!("Previous realtime connection ended, establishing a new one");
        }

        let Some(token) = self.inner.token.clone().filter(BearerToken::is_usable) else {
            let error = Error::configuration("no bearer token configured");
            tracing::warn!(%error, "Realtime features unavailable");
            return None;
        };

        match ConnectionManager::new(
            self.inner.endpoint.clone(),
            token,
            self.inner.config.clone(),
            FrameParser,
        ) {
            Ok(connection) => {
                let subscriptions = SubscriptionManager::new(&connection);
                let link = Link {
                    connection,
                    subscriptions,
                };
                *guard = Some(link.clone());
                Some(link)
            }
            Err(e) => {
                tracing::error!(error = %e, "Unable to start realtime connection");
                None
            }
        }
    }
}
