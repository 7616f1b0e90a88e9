//! Core WebSocket infrastructure.
//!
//! This module provides generic connection management that can be
//! specialized for different WebSocket services using traits and the strategy pattern.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: Generic WebSocket connection handler with bounded
//!   retry, bearer authentication, and explicit shutdown
//! - [`MessageParser`]: Trait for parsing incoming WebSocket messages
//!
//! # Example
//!
//! ```ignore
//! // Define your message type
//! #[derive(Clone, Debug, Deserialize)]
//! struct MyEvent { /* ... */ }
//!
//! let connection = ConnectionManager::new(endpoint, token, config, FrameParser)?;
//! let subscriptions = SubscriptionManager::new(&connection);
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub(crate) mod tls;
pub mod traits;

pub use connection::ConnectionManager;
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use traits::*;
