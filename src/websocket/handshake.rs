//! The HTTP → WebSocket upgrade handshake (RFC 6455 §4.2.2).
//!
//! The accept-key computation is grounded on `tiipotto-tii`'s use of
//! `sha1`+`base64` for the same purpose (there it runs synchronously over
//! a blocking stream; here it is pure and called from the async upgrade
//! path in [`super::upgrade`]).

use base64::Engine;
use sha1::{Digest, Sha1};

const MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes `Sec-WebSocket-Accept` from the client's `Sec-WebSocket-Key`.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(MAGIC.as_bytes());
    let digest = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// True when the request headers constitute a valid upgrade request:
/// `Upgrade: websocket`, `Connection` containing `upgrade`
/// (case-insensitively, possibly among other tokens), a `Sec-WebSocket-Key`,
/// and `Sec-WebSocket-Version: 13`.
pub fn is_upgrade_request(
    upgrade: Option<&str>,
    connection: Option<&str>,
    ws_key: Option<&str>,
    ws_version: Option<&str>,
) -> bool {
    let upgrade_ok = upgrade.map(|v| v.eq_ignore_ascii_case("websocket")).unwrap_or(false);
    let connection_ok = connection
        .map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("upgrade")))
        .unwrap_or(false);
    let version_ok = ws_version.map(|v| v.trim() == "13").unwrap_or(false);
    upgrade_ok && connection_ok && ws_key.is_some() && version_ok
}

/// Renders the `101 Switching Protocols` response headers for a validated
/// upgrade request.
pub fn accept_response_headers(client_key: &str, subprotocol: Option<&str>) -> Vec<(String, String)> {
    let mut headers = vec![
        ("Upgrade".to_string(), "websocket".to_string()),
        ("Connection".to_string(), "Upgrade".to_string()),
        ("Sec-WebSocket-Accept".to_string(), accept_key(client_key)),
    ];
    if let Some(protocol) = subprotocol {
        headers.push(("Sec-WebSocket-Protocol".to_string(), protocol.to_string()));
    }
    headers
}
