//! The structured body of a broadcast message.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of a message as sent by a client.
///
/// `sender` and `text` are the fields the hub's clients agree on. Any other
/// top-level field is kept in `extra` and re-emitted with its value and
/// relative order unchanged, so the hub never loses data it does not
/// understand. `sender` and `text` are always written first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    /// Sender identifier chosen by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    /// Text content.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,

    /// Unrecognized fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessageBody {
    /// Create a body with text content only.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Set the sender identifier.
    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Attach an extra field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_builder() {
        let body = MessageBody::new("21.5")
            .with_sender("sensor-7")
            .with_field("unit", json!("celsius"));

        assert_eq!(body.text, "21.5");
        assert_eq!(body.sender.as_deref(), Some("sensor-7"));
        assert_eq!(body.extra.get("unit"), Some(&json!("celsius")));
    }

    #[test]
    fn test_body_omits_absent_fields() {
        let body = MessageBody::new("hi");
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"text":"hi"}"#);
    }

    #[test]
    fn test_body_keeps_unknown_fields() {
        let body: MessageBody =
            serde_json::from_str(r#"{"text":"hi","room":4,"tags":["a"]}"#).unwrap();
        assert_eq!(body.extra.len(), 2);
        assert_eq!(body.extra["room"], json!(4));
    }
}
