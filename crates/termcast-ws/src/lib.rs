//! WebSocket wire layer for termcast
//!
//! Just enough RFC 6455 to serve broadcast-only consumers: the opening
//! handshake and the text/control frame codec. TLS and protocol extensions
//! live outside this crate.

pub mod frame;
pub mod handshake;

pub use frame::{decode, encode_pong, encode_text, Frame, Opcode};
pub use handshake::{accept_key, extract_key, response};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WsError {
    #[error("handshake is missing the Sec-WebSocket-Key header")]
    MissingKey,

    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(u64),
}
