//! Frame types for the Thermosync wire protocol.
//!
//! A frame is one discrete websocket data message. Control messages
//! (ping, pong, close) never reach this layer; transports consume them.

use bytes::Bytes;
use std::fmt;

/// Frame kind identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// UTF-8 text, JSON encoded.
    Text,
    /// Binary, MessagePack encoded.
    Binary,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Text => f.write_str("text"),
            FrameKind::Binary => f.write_str("binary"),
        }
    }
}

/// A single data frame exchanged with a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text frame.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
}

impl Frame {
    /// Create a text frame.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Frame::Text(text.into())
    }

    /// Create a binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Frame::Binary(data.into())
    }

    /// Get the frame kind.
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Text(_) => FrameKind::Text,
            Frame::Binary(_) => FrameKind::Binary,
        }
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) => data.len(),
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The text payload, if this is a text frame.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Frame::Text(text) => Some(text),
            Frame::Binary(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_kind() {
        assert_eq!(Frame::text("{}").kind(), FrameKind::Text);
        assert_eq!(Frame::binary(vec![0x80]).kind(), FrameKind::Binary);
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(Frame::text("hello").len(), 5);
        assert!(Frame::binary(Vec::new()).is_empty());
        assert_eq!(Frame::text("x").as_text(), Some("x"));
        assert_eq!(Frame::binary(vec![1]).as_text(), None);
    }
}
