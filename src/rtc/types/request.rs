use bon::Builder;
use serde::Serialize;
use serde_json::Value;

/// A frame sent from the client to the realtime gateway.
///
/// The gateway speaks a small envelope protocol: every client frame is
/// `{ "event": ..., "data": ... }`, where channel registration and message
/// publication both ride on the `message` event and deregistration on the
/// `unsubscribe` event.
#[non_exhaustive]
#[derive(Clone, Debug, Serialize)]
pub struct ClientFrame {
    /// Envelope event name
    pub event: FrameEvent,
    /// Event payload
    pub data: FrameData,
}

impl ClientFrame {
    /// Build a channel registration frame announcing interest to the server.
    #[must_use]
    pub fn register(request: &SubscribeRequest) -> Self {
        Self {
            event: FrameEvent::Message,
            data: FrameData {
                channel: request.channel.clone(),
                types: request.types.clone(),
                msg_type: None,
                payload: None,
                date: None,
                meta: request.meta.clone(),
            },
        }
    }

    /// Build a publish frame carrying one outbound message.
    #[must_use]
    pub fn publish(message: &OutboundMessage) -> Self {
        Self {
            event: FrameEvent::Message,
            data: FrameData {
                channel: message.channel.clone(),
                types: Vec::new(),
                msg_type: Some(message.msg_type.clone()),
                payload: Some(message.payload.clone()),
                date: message.date.clone(),
                meta: message.meta.clone(),
            },
        }
    }

    /// Build a deregistration frame for a channel.
    #[must_use]
    pub fn deregister(channel: &str) -> Self {
        Self {
            event: FrameEvent::Unsubscribe,
            data: FrameData {
                channel: channel.to_owned(),
                types: Vec::new(),
                msg_type: None,
                payload: None,
                date: None,
                meta: None,
            },
        }
    }
}

/// Envelope event name for client frames.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameEvent {
    /// Channel registration and message publication
    Message,
    /// Channel deregistration
    Unsubscribe,
}

/// Payload of a client frame. Optional fields are omitted on the wire.
#[non_exhaustive]
#[derive(Clone, Debug, Serialize)]
pub struct FrameData {
    /// Target channel name
    pub channel: String,
    /// Event-type filters, passed to the server verbatim
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    /// Message type tag for published messages
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub msg_type: Option<String>,
    /// Published message body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Caller-supplied timestamp, passed through opaquely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<Value>,
    /// Arbitrary JSON metadata, e.g. entity id filters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Subscription parameters for one named channel.
#[non_exhaustive]
#[derive(Clone, Debug, Builder)]
pub struct SubscribeRequest {
    /// Channel name (e.g. `chat`, `tasks`, `orders`)
    pub channel: String,
    /// Optional event-type filters, not interpreted locally
    #[builder(default)]
    pub types: Vec<String>,
    /// Arbitrary JSON passed to the server at subscribe time
    pub meta: Option<Value>,
}

/// A single outbound message: sent once, not retained.
#[non_exhaustive]
#[derive(Clone, Debug, Builder)]
pub struct OutboundMessage {
    /// Target channel name
    pub channel: String,
    /// Message type tag (e.g. `text`)
    pub msg_type: String,
    /// Message body
    pub payload: Value,
    /// Optional timestamp, passed through opaquely
    pub date: Option<Value>,
    /// Optional metadata
    pub meta: Option<Value>,
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, reason = "Test setup does not need error plumbing")]

    use serde_json::json;

    use super::*;

    #[test]
    fn serialize_registration_frame() {
        let request = SubscribeRequest::builder()
            .channel("orders".to_owned())
            .types(vec!["created".to_owned(), "updated".to_owned()])
            .meta(json!({"branchId": 7}))
            .build();
        let frame = ClientFrame::register(&request);

        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"event\":\"message\""));
        assert!(json.contains("\"channel\":\"orders\""));
        assert!(json.contains("\"types\":[\"created\",\"updated\"]"));
        assert!(json.contains("\"meta\":{\"branchId\":7}"));
        assert!(
            !json.contains("\"payload\""),
            "registration carries no payload, got: {json}"
        );
    }

    #[test]
    fn serialize_registration_without_filters() {
        let request = SubscribeRequest::builder().channel("chat".to_owned()).build();
        let frame = ClientFrame::register(&request);

        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"channel\":\"chat\""));
        assert!(!json.contains("\"types\""), "empty filters must be omitted");
        assert!(!json.contains("\"meta\""), "absent meta must be omitted");
    }

    #[test]
    fn serialize_publish_frame() {
        let message = OutboundMessage::builder()
            .channel("chat".to_owned())
            .msg_type("text".to_owned())
            .payload(json!("hi"))
            .meta(json!({"taskId": 42}))
            .build();
        let frame = ClientFrame::publish(&message);

        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"event\":\"message\""));
        assert!(json.contains("\"channel\":\"chat\""));
        assert!(json.contains("\"type\":\"text\""));
        assert!(json.contains("\"payload\":\"hi\""));
        assert!(json.contains("\"meta\":{\"taskId\":42}"));
        assert!(!json.contains("\"date\""), "absent date must be omitted");
    }

    #[test]
    fn serialize_publish_frame_with_date() {
        let message = OutboundMessage::builder()
            .channel("chat".to_owned())
            .msg_type("text".to_owned())
            .payload(json!({"body": "shipment arrived"}))
            .date(json!(1_735_689_600_000_i64))
            .build();
        let frame = ClientFrame::publish(&message);

        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"date\":1735689600000"));
    }

    #[test]
    fn serialize_deregistration_frame() {
        let frame = ClientFrame::deregister("orders");

        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, "{\"event\":\"unsubscribe\",\"data\":{\"channel\":\"orders\"}}");
    }
}
