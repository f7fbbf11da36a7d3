//! # thermosync-protocol
//!
//! Wire representation of the messages carried by the Thermosync hub.
//!
//! The hub itself treats messages as opaque values. This crate owns the
//! only place where bytes become a [`MessageBody`] and back:
//!
//! - Text frames carry a JSON object
//! - Binary frames carry a MessagePack map
//! - Outbound frames are always JSON text
//!
//! ## Example
//!
//! ```rust
//! use thermosync_protocol::{codec, Frame, MessageBody};
//!
//! let frame = Frame::text(r#"{"text":"hi"}"#);
//! let body = codec::decode(&frame).unwrap();
//! assert_eq!(body.text, "hi");
//!
//! let encoded = codec::encode(&body).unwrap();
//! assert_eq!(encoded, Frame::text(r#"{"text":"hi"}"#));
//! ```

pub mod body;
pub mod codec;
pub mod frames;

pub use body::MessageBody;
pub use codec::{decode, encode, ProtocolError};
pub use frames::{Frame, FrameKind};
