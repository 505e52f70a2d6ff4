//! Wire protocol for the chat WebSocket.
//!
//! All frames are JSON objects tagged by a `"type"` field. The type names are
//! a compatibility contract with the web and mobile clients — do not rename.
//!
//! | Direction | Type | Payload |
//! |---|---|---|
//! | client → server | `authenticate` | `userId` |
//! | client → server | `message` | `text` + arbitrary metadata |
//! | client → server | `cancel:response` | — |
//! | server → client | `message:sent` | original payload + `userId`, `timestamp` |
//! | server → client | `ai:typing` | `typing` (bool) |
//! | server → client | `message:received` | `userId`, `text`, `timestamp` |
//! | server → client | `error` | `message` |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Inbound message payload: a `text` field plus whatever metadata the client
/// attaches (client-side ids, locale hints). The metadata is echoed back in
/// `message:sent` and otherwise ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Kept as a raw value so validation can distinguish "missing" from
    /// "present but not a string".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessagePayload {
    /// The validated message text: present, a string, and non-empty.
    pub fn text(&self) -> Option<&str> {
        self.text.as_ref()?.as_str().filter(|s| !s.is_empty())
    }
}

/// Everything a client can send. Unknown types fail to parse and are
/// answered with an `error` event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Bind this connection to a recipient identity and join its room.
    #[serde(rename = "authenticate")]
    Authenticate {
        #[serde(rename = "userId", default)]
        user_id: Option<String>,
    },
    /// A user message for the reply pipeline.
    #[serde(rename = "message")]
    Message {
        #[serde(flatten)]
        payload: MessagePayload,
    },
    /// Cancel the in-flight reply, if any.
    #[serde(rename = "cancel:response")]
    CancelResponse,
}

/// Everything the server can emit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Acknowledgement that a message entered the pipeline. Carries the
    /// original payload verbatim.
    #[serde(rename = "message:sent")]
    MessageSent {
        #[serde(flatten)]
        payload: MessagePayload,
        #[serde(rename = "userId")]
        user_id: String,
        timestamp: u64,
    },
    /// Typing indicator state for the reply being composed.
    #[serde(rename = "ai:typing")]
    AiTyping { typing: bool },
    /// The generated reply.
    #[serde(rename = "message:received")]
    MessageReceived {
        #[serde(rename = "userId")]
        user_id: String,
        text: String,
        timestamp: u64,
    },
    /// A recoverable error, delivered to the originating connection only.
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn typing(typing: bool) -> Self {
        Self::AiTyping { typing }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }

    pub fn message_sent(payload: MessagePayload, user_id: &str, timestamp: u64) -> Self {
        Self::MessageSent {
            payload,
            user_id: user_id.to_string(),
            timestamp,
        }
    }

    pub fn message_received(user_id: &str, text: String, timestamp: u64) -> Self {
        Self::MessageReceived {
            user_id: user_id.to_string(),
            text,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_authenticate() {
        let ev: ClientEvent =
            serde_json::from_value(json!({"type": "authenticate", "userId": "u1"})).unwrap();
        assert_eq!(
            ev,
            ClientEvent::Authenticate {
                user_id: Some("u1".to_string())
            }
        );
    }

    #[test]
    fn parses_authenticate_without_user_id() {
        let ev: ClientEvent = serde_json::from_value(json!({"type": "authenticate"})).unwrap();
        assert_eq!(ev, ClientEvent::Authenticate { user_id: None });
    }

    #[test]
    fn parses_message_with_metadata() {
        let ev: ClientEvent = serde_json::from_value(
            json!({"type": "message", "text": "hola", "clientMsgId": "abc-1"}),
        )
        .unwrap();
        let ClientEvent::Message { payload } = ev else {
            panic!("expected message");
        };
        assert_eq!(payload.text(), Some("hola"));
        assert_eq!(payload.extra["clientMsgId"], json!("abc-1"));
    }

    #[test]
    fn parses_cancel_response() {
        let ev: ClientEvent = serde_json::from_value(json!({"type": "cancel:response"})).unwrap();
        assert_eq!(ev, ClientEvent::CancelResponse);
    }

    #[test]
    fn unknown_type_fails() {
        assert!(serde_json::from_value::<ClientEvent>(json!({"type": "selfdestruct"})).is_err());
    }

    #[test]
    fn message_text_validation() {
        let payload =
            |v: Value| serde_json::from_value::<MessagePayload>(v).unwrap().text().is_some();
        assert!(payload(json!({"text": "hola"})));
        assert!(!payload(json!({})));
        assert!(!payload(json!({"text": ""})));
        assert!(!payload(json!({"text": 42})));
        assert!(!payload(json!({"text": null})));
    }

    #[test]
    fn serializes_typing_indicator() {
        let out = serde_json::to_value(ServerEvent::typing(true)).unwrap();
        assert_eq!(out, json!({"type": "ai:typing", "typing": true}));
    }

    #[test]
    fn message_sent_echoes_original_payload() {
        let payload: MessagePayload =
            serde_json::from_value(json!({"text": "hola", "clientMsgId": "abc-1"})).unwrap();
        let out =
            serde_json::to_value(ServerEvent::message_sent(payload, "u1", 1700000000000)).unwrap();
        assert_eq!(
            out,
            json!({
                "type": "message:sent",
                "text": "hola",
                "clientMsgId": "abc-1",
                "userId": "u1",
                "timestamp": 1700000000000u64,
            })
        );
    }

    #[test]
    fn serializes_reply_event() {
        let out = serde_json::to_value(ServerEvent::message_received(
            "u1",
            "claro".to_string(),
            1700000000000,
        ))
        .unwrap();
        assert_eq!(
            out,
            json!({
                "type": "message:received",
                "userId": "u1",
                "text": "claro",
                "timestamp": 1700000000000u64,
            })
        );
    }
}
