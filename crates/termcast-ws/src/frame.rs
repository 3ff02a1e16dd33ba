//! RFC 6455 frame codec
//!
//! Server frames go out unmasked; client frames arrive masked and are
//! unmasked during decode. Decoding is streaming: it yields `None` until a
//! complete frame is buffered, leaving the buffer intact.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::WsError;

/// Upper bound on accepted payload sizes. Clients only send control frames
/// and short messages; anything larger is a protocol violation.
const MAX_PAYLOAD: u64 = 1 << 24;

/// Frame opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    Reserved(u8),
}

impl From<u8> for Opcode {
    fn from(v: u8) -> Self {
        match v {
            0x0 => Self::Continuation,
            0x1 => Self::Text,
            0x2 => Self::Binary,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            other => Self::Reserved(other),
        }
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Bytes,
}

/// Encode an unmasked text frame.
pub fn encode_text(payload: &str) -> Bytes {
    encode(0x1, payload.as_bytes())
}

/// Encode an unmasked pong frame echoing `payload`.
pub fn encode_pong(payload: &[u8]) -> Bytes {
    encode(0xA, payload)
}

fn encode(opcode: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 10);
    buf.put_u8(0x80 | opcode);
    match payload.len() {
        len if len < 126 => buf.put_u8(len as u8),
        len if len < 65536 => {
            buf.put_u8(126);
            buf.put_u16(len as u16);
        }
        len => {
            buf.put_u8(127);
            buf.put_u64(len as u64);
        }
    }
    buf.put_slice(payload);
    buf.freeze()
}

/// Decode one frame from `buf`, consuming its bytes.
///
/// Returns `Ok(None)` until a complete frame is available.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, WsError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let fin = buf[0] & 0x80 != 0;
    let opcode = Opcode::from(buf[0] & 0x0F);
    let masked = buf[1] & 0x80 != 0;

    let (header, payload_len) = match buf[1] & 0x7F {
        126 => {
            if buf.len() < 4 {
                return Ok(None);
            }
            (4, u16::from_be_bytes([buf[2], buf[3]]) as u64)
        }
        127 => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let mut len = [0u8; 8];
            len.copy_from_slice(&buf[2..10]);
            (10, u64::from_be_bytes(len))
        }
        n => (2, n as u64),
    };
    if payload_len > MAX_PAYLOAD {
        return Err(WsError::FrameTooLarge(payload_len));
    }

    let payload_len = payload_len as usize;
    let mask_len = if masked { 4 } else { 0 };
    if buf.len() < header + mask_len + payload_len {
        return Ok(None);
    }

    buf.advance(header);
    let mask = if masked {
        let mut key = [0u8; 4];
        key.copy_from_slice(&buf[..4]);
        buf.advance(4);
        Some(key)
    } else {
        None
    };

    let mut payload = buf.split_to(payload_len);
    if let Some(key) = mask {
        for (i, b) in payload.iter_mut().enumerate() {
            *b ^= key[i % 4];
        }
    }

    Ok(Some(Frame {
        fin,
        opcode,
        payload: payload.freeze(),
    }))
}
