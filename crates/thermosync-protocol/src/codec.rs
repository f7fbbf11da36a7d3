//! Codec for encoding and decoding message bodies.
//!
//! Inbound text frames are parsed as JSON, inbound binary frames as
//! MessagePack. Outbound frames are always JSON text so every client can
//! read every broadcast regardless of how it was submitted.

use bytes::Bytes;
use thiserror::Error;

use crate::body::MessageBody;
use crate::frames::{Frame, FrameKind};

/// Maximum frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Invalid frame data.
    #[error("Invalid {kind} frame: {reason}")]
    Invalid {
        /// Kind of the offending frame.
        kind: FrameKind,
        /// What was wrong with it.
        reason: &'static str,
    },
}

/// Decode a frame into a message body.
///
/// # Errors
///
/// Returns an error if the frame is too large, empty, or does not hold an
/// object/map in its encoding.
pub fn decode(frame: &Frame) -> Result<MessageBody, ProtocolError> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(frame.len()));
    }
    if frame.is_empty() {
        return Err(ProtocolError::Invalid {
            kind: frame.kind(),
            reason: "empty payload",
        });
    }

    let body = match frame {
        Frame::Text(text) => serde_json::from_str(text)?,
        Frame::Binary(data) => rmp_serde::from_slice(data)?,
    };

    Ok(body)
}

/// Encode a message body as an outbound JSON text frame.
///
/// # Errors
///
/// Returns an error if the body is too large or serialization fails.
pub fn encode(body: &MessageBody) -> Result<Frame, ProtocolError> {
    let text = serde_json::to_string(body)?;

    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(Frame::Text(text))
}

/// Encode a message body as a MessagePack binary frame.
///
/// The hub never emits these; clients that prefer a compact upstream
/// encoding use it to submit messages.
///
/// # Errors
///
/// Returns an error if the body is too large or serialization fails.
pub fn encode_binary(body: &MessageBody) -> Result<Frame, ProtocolError> {
    let data = rmp_serde::to_vec_named(body)?;

    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }

    Ok(Frame::Binary(Bytes::from(data)))
}
