//! Core traits for generic WebSocket infrastructure.

use serde::de::DeserializeOwned;

/// Message parser trait for converting raw bytes to messages.
///
/// Abstracts the framing the server uses: a frame may carry a single event
/// object or an array of them, and a parser may filter frames out entirely.
///
/// # Example
///
/// ```ignore
/// pub struct FrameParser;
///
/// impl MessageParser<MyEvent> for FrameParser {
///     fn parse(&self, bytes: &[u8]) -> crate::Result<Vec<MyEvent>> {
///         let event: MyEvent = serde_json::from_slice(bytes)?;
///         Ok(vec![event])
///     }
/// }
/// ```
pub trait MessageParser<M: DeserializeOwned>: Send + Sync + 'static {
    /// Parse incoming bytes into messages.
    ///
    /// May return an empty vec if messages are filtered out.
    /// Handles both single objects and arrays of messages.
    fn parse(&self, bytes: &[u8]) -> crate::Result<Vec<M>>;
}
