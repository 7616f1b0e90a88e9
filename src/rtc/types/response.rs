use serde::Deserialize;
use serde_json::Value;

use crate::Result;

/// Inbound event name acknowledging a successful publish.
pub const PUBLISH_SUCCESS: &str = "publish_success";

/// Inbound event name reporting a failed publish.
pub const PUBLISH_ERROR: &str = "publish_error";

/// A frame received from the realtime gateway.
///
/// Channel events arrive with `event` set to the channel name and `data`
/// carrying arbitrary JSON. Publish acknowledgments arrive on the
/// [`PUBLISH_SUCCESS`] / [`PUBLISH_ERROR`] events; they are not correlated
/// to individual publish calls.
#[non_exhaustive]
#[derive(Debug, Clone, Deserialize)]
pub struct ServerFrame {
    /// Event name; the channel name for routed messages
    pub event: String,
    /// Event-specific data
    #[serde(default)]
    pub data: Value,
}

impl ServerFrame {
    /// Whether this frame is a publish acknowledgment (success or error).
    #[must_use]
    pub fn is_publish_ack(&self) -> bool {
        self.event == PUBLISH_SUCCESS || self.event == PUBLISH_ERROR
    }
}

/// Parse one WebSocket text frame into server frames.
///
/// The gateway may batch events into a JSON array; a bare object is a
/// single event.
pub(crate) fn parse_frames(bytes: &[u8]) -> Result<Vec<ServerFrame>> {
    let value: Value = serde_json::from_slice(bytes)?;

    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(Into::into))
            .collect(),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}
