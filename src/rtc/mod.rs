#![expect(
    clippy::module_name_repetitions,
    reason = "Re-exported names intentionally match their modules for API clarity"
)]

//! Realtime channel (RTC) client for the Cargoline console.
//!
//! A publish/subscribe facade over one persistent, bearer-authenticated
//! WebSocket connection to the realtime gateway. UI screens subscribe to
//! named channels (`chat`, `tasks`, `orders`, ...) and publish transient
//! messages without touching the connection lifecycle.
//!
//! The layer is strictly optional: every failure, from a missing credential
//! to an exhausted reconnect budget, degrades to a log line and stale
//! screens rather than an error the caller has to handle.
//!
//! # Example
//!
//! ```rust, no_run
//! use cargoline_realtime_sdk::rtc::{Client, SubscribeRequest};
//! use cargoline_realtime_sdk::ws::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::new(
//!         "wss://realtime.cargoline.io/socket",
//!         Some("token-from-login".into()),
//!         Config::default(),
//!     )?;
//!
//!     let _orders = client.subscribe(
//!         &SubscribeRequest::builder()
//!             .channel("orders".to_owned())
//!             .types(vec!["created".to_owned()])
//!             .build(),
//!         |data| println!("new order: {data}"),
//!     );
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod subscription;
pub mod types;

// Re-export commonly used types
pub use client::Client;
pub use subscription::{Connection, FrameParser, Subscription, SubscriptionManager};
pub use types::request::{ClientFrame, FrameEvent, OutboundMessage, SubscribeRequest};
pub use types::response::{PUBLISH_ERROR, PUBLISH_SUCCESS, ServerFrame};
