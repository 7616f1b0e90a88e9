#![expect(
    clippy::module_name_repetitions,
    reason = "Subscription types deliberately include the module name for clarity"
)]

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use super::types::request::{ClientFrame, SubscribeRequest};
use super::types::response::{PUBLISH_ERROR, PUBLISH_SUCCESS, ServerFrame, parse_frames};
use crate::Result;
use crate::ws::ConnectionManager;
use crate::ws::traits::MessageParser;

/// Parser for the gateway's envelope frames.
#[non_exhaustive]
#[derive(Clone)]
pub struct FrameParser;

impl MessageParser<ServerFrame> for FrameParser {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<ServerFrame>> {
        parse_frames(bytes)
    }
}

/// The connection type the realtime channel client runs over.
pub type Connection = ConnectionManager<ServerFrame, FrameParser>;

type Callback = Arc<dyn Fn(Value) + Send + Sync + 'static>;
type Registry = DashMap<String, ChannelListener>;

/// A registered local listener for one channel.
struct ChannelListener {
    /// Caller callback invoked with every routed event's data
    callback: Callback,
    /// Event-type filters announced to the server
    types: Vec<String>,
    /// Metadata announced to the server
    meta: Option<Value>,
    /// When the listener was registered
    registered_at: Instant,
}

/// Routes inbound channel events to registered listeners and keeps the
/// server's view of channel interest in sync.
///
/// The registry is keyed by channel name: registering a second listener for
/// the same channel replaces the first rather than fanning out. Call sites
/// in the console rely on that replacement behavior for screens that
/// re-subscribe on every navigation.
pub struct SubscriptionManager {
    connection: Connection,
    listeners: Arc<Registry>,
}

impl SubscriptionManager {
    /// Create a manager over `connection` and start its dispatch and
    /// re-registration tasks.
    #[must_use]
    pub fn new(connection: &Connection) -> Arc<Self> {
        let manager = Arc::new(Self {
            connection: connection.clone(),
            listeners: Arc::new(DashMap::new()),
        });

        manager.start_dispatcher();
        manager.start_reconnection_handler();
        manager
    }

    /// Register a listener and announce channel interest to the server.
    ///
    /// Never fails: transport problems are logged and the registration is
    /// re-announced by the reconnection handler once the connection
    /// recovers.
    pub fn subscribe<F>(self: &Arc<Self>, request: &SubscribeRequest, callback: F) -> Subscription
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let channel = request.channel.clone();
        let frame = ClientFrame::register(request);

        let replaced = self
            .listeners
            .insert(
                channel.clone(),
                ChannelListener {
                    callback: Arc::new(callback),
                    types: request.types.clone(),
                    meta: request.meta.clone(),
                    registered_at: Instant::now(),
                },
            )
            .is_some();
        if replaced {
            tracing::debug!(%channel, "Replacing existing listener for channel");
        }

        if let Err(e) = self.connection.send(&frame) {
            tracing::warn!(%channel, error = %e, "Failed to queue channel registration");
        }

        Subscription {
            channel,
            manager: Arc::downgrade(self),
            active: AtomicBool::new(true),
        }
    }

    /// Remove the listener for `channel` and send a deregistration frame.
    ///
    /// Best effort: a failed send is logged only, the server will drop the
    /// registration on its own once it detects the client is gone.
    pub fn unsubscribe(&self, channel: &str) {
        if self.listeners.remove(channel).is_none() {
            tracing::debug!(%channel, "Unsubscribe for channel with no registered listener");
            return;
        }

        if let Err(e) = self.connection.send(&ClientFrame::deregister(channel)) {
            tracing::warn!(%channel, error = %e, "Failed to queue channel deregistration");
        }
    }

    /// Number of channels with a registered listener.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.listeners.len()
    }

    /// Spawn the task that fans inbound frames out to listeners.
    ///
    /// The task holds only the registry and a broadcast receiver, so it
    /// exits once the connection (and every clone of it) is dropped.
    fn start_dispatcher(&self) {
        let mut rx = self.connection.subscribe();
        let listeners = Arc::clone(&self.listeners);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(frame) => Self::dispatch(&listeners, frame),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("Realtime dispatcher lagged, missed {n} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    /// Deliver one frame to its channel's listener.
    fn dispatch(listeners: &Registry, frame: ServerFrame) {
        // Acknowledgments are observability only; they carry no correlation
        // to a specific publish call.
        if frame.event == PUBLISH_SUCCESS {
            tracing::debug!("Realtime publish acknowledged");
            return;
        }
        if frame.event == PUBLISH_ERROR {
            tracing::warn!(data = %frame.data, "Realtime publish rejected by server");
            return;
        }

        // Clone the callback out of the map entry so the shard lock is not
        // held while user code runs (the callback may subscribe or
        // unsubscribe, which touches the same map).
        let Some(callback) = listeners
            .get(&frame.event)
            .map(|listener| Arc::clone(&listener.callback))
        else {
            tracing::trace!(channel = %frame.event, "Inbound event for channel with no listener");
            return;
        };

        let channel = frame.event;
        if std::panic::catch_unwind(AssertUnwindSafe(|| callback(frame.data))).is_err() {
            tracing::error!(%channel, "Channel callback panicked; event dropped");
        }
    }

    /// Spawn the task that re-announces channel interest after the
    /// connection recovers from a mid-session drop.
    fn start_reconnection_handler(&self) {
        let mut state_rx = self.connection.state_receiver();
        let connection = self.connection.clone();
        let listeners = Arc::clone(&self.listeners);

        tokio::spawn(async move {
            let mut was_connected = state_rx.borrow().is_connected();

            loop {
                // Wait for next state change
                if state_rx.changed().await.is_err() {
                    // Channel closed, connection manager is gone
                    break;
                }

                let state = *state_rx.borrow_and_update();

                if state.is_connected() {
                    if was_connected {
                        tracing::debug!("Realtime connection recovered, re-announcing channels");
                        Self::reregister_all(&connection, &listeners);
                    }
                    was_connected = true;
                } else if state.is_terminal() {
                    break;
                }
            }
        });
    }

    /// Re-send registration frames for every tracked channel.
    fn reregister_all(connection: &Connection, listeners: &Registry) {
        for entry in listeners.iter() {
            let request = SubscribeRequest {
                channel: entry.key().clone(),
                types: entry.value().types.clone(),
                meta: entry.value().meta.clone(),
            };
            tracing::debug!(
                channel = %request.channel,
                registered_at = ?entry.value().registered_at,
                "Re-announcing channel interest"
            );
            if let Err(e) = connection.send(&ClientFrame::register(&request)) {
                tracing::warn!(channel = %request.channel, error = %e, "Failed to re-announce channel");
            }
        }
    }
}

/// Handle for one subscribe call.
///
/// Dropping the handle does nothing; call [`Subscription::unsubscribe`] to
/// stop delivery. The handle is inert (a no-op) when it was produced while
/// no connection could be established, or after the client disconnected.
pub struct Subscription {
    channel: String,
    manager: Weak<SubscriptionManager>,
    active: AtomicBool,
}

impl Subscription {
    /// A handle that does nothing, returned when realtime features are
    /// unavailable.
    #[must_use]
    pub(crate) fn noop() -> Self {
        Self {
            channel: String::new(),
            manager: Weak::new(),
            active: AtomicBool::new(false),
        }
    }

    /// The channel this handle was created for. Empty for no-op handles.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Stop delivery for this handle's channel and deregister it with the
    /// server. Idempotent; transport errors are logged and swallowed.
    ///
    /// Because the registry is keyed by channel name, this removes
    /// whichever listener currently holds the channel, even if a later
    /// subscribe call replaced this handle's callback.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(manager) = self.manager.upgrade() {
            manager.unsubscribe(&self.channel);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("active", &self.active.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use super::*;

    fn registry_with(channel: &str, callback: Callback) -> Registry {
        let listeners = Registry::new();
        listeners.insert(
            channel.to_owned(),
            ChannelListener {
                callback,
                types: Vec::new(),
                meta: None,
                registered_at: Instant::now(),
            },
        );
        listeners
    }

    #[test]
    fn dispatch_routes_by_channel_name() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listeners = registry_with(
            "orders",
            Arc::new(move |data| {
                sink.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(data);
            }),
        );

        SubscriptionManager::dispatch(
            &listeners,
            ServerFrame {
                event: "orders".to_owned(),
                data: json!({"foo": 1}),
            },
        );
        SubscriptionManager::dispatch(
            &listeners,
            ServerFrame {
                event: "chat".to_owned(),
                data: json!({"ignored": true}),
            },
        );

        let seen = seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(seen.as_slice(), &[json!({"foo": 1})]);
    }

    #[test]
    fn dispatch_isolates_panicking_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let listeners = registry_with("tasks", Arc::new(|_data| panic!("callback bug")));
        listeners.insert(
            "chat".to_owned(),
            ChannelListener {
                callback: Arc::new(move |_data| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
                types: Vec::new(),
                meta: None,
                registered_at: Instant::now(),
            },
        );

        SubscriptionManager::dispatch(
            &listeners,
            ServerFrame {
                event: "tasks".to_owned(),
                data: json!(1),
            },
        );
        SubscriptionManager::dispatch(
            &listeners,
            ServerFrame {
                event: "chat".to_owned(),
                data: json!(2),
            },
        );

        assert_eq!(
            calls.load(Ordering::SeqCst),
            1,
            "second channel must still receive its event"
        );
    }

    #[test]
    fn dispatch_swallows_publish_acks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let listeners = registry_with(
            PUBLISH_SUCCESS,
            Arc::new(move |_data| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        SubscriptionManager::dispatch(
            &listeners,
            ServerFrame {
                event: PUBLISH_SUCCESS.to_owned(),
                data: Value::Null,
            },
        );

        assert_eq!(
            calls.load(Ordering::SeqCst),
            0,
            "ack events are never routed to channel listeners"
        );
    }

    #[test]
    fn noop_subscription_unsubscribe_is_inert() {
        let handle = Subscription::noop();
        assert_eq!(handle.channel(), "");
        handle.unsubscribe();
        handle.unsubscribe();
    }
}
