//! WebSocket opening handshake
//!
//! Parses the client's HTTP upgrade request and produces the 101 response
//! carrying the accept key. Only the `Sec-WebSocket-Key` header matters;
//! anything else in the request is ignored.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha1::{Digest, Sha1};

use crate::WsError;

/// GUID the accept key is salted with, fixed by RFC 6455
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Pull the `Sec-WebSocket-Key` value out of an upgrade request.
///
/// The header name is matched case-insensitively and the value is trimmed.
pub fn extract_key(request: &[u8]) -> Result<String, WsError> {
    let text = String::from_utf8_lossy(request);
    for line in text.split("\r\n").skip(1) {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("sec-websocket-key") {
                return Ok(value.trim().to_string());
            }
        }
    }
    Err(WsError::MissingKey)
}

/// Compute the accept key for a client key: Base64 of SHA-1 over the key
/// concatenated with the protocol GUID.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// The complete `101 Switching Protocols` response for a client key.
pub fn response(key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept_key(key)
    )
}
