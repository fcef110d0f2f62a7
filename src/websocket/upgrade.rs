//! Validates an HTTP request as a WebSocket upgrade and renders the
//! `101 Switching Protocols` response. The actual protocol switch (taking
//! ownership of the raw socket and handing it to [`super::Connection`])
//! happens in `app` once it has decided, via the router, that this route
//! is a WebSocket route — this module only decides "is this request a
//! valid upgrade" and "what does the 101 response look like."

use crate::context::HeaderMap;
use crate::error::AppError;

use super::handshake;

#[derive(Debug)]
pub struct UpgradeRequest {
    pub accept_key: String,
    pub subprotocol: Option<String>,
}

#[derive(Debug)]
pub enum UpgradeError {
    NotAnUpgradeRequest,
}

impl From<UpgradeError> for AppError {
    fn from(_: UpgradeError) -> Self {
        AppError::BadRequest("expected a WebSocket upgrade request".to_string())
    }
}

/// Checks the `Origin` header against a configured allow-list (origin
/// restriction supports both exact strings and regex). An empty list
/// means no restriction is configured, so every origin (including a
/// missing header) passes. A non-empty list requires an `Origin` header
/// that either matches an entry exactly or matches it as a regex anchored
/// to the whole value.
pub fn origin_allowed(origin: Option<&str>, allow_list: &[String]) -> bool {
    if allow_list.is_empty() {
        return true;
    }
    let Some(origin) = origin else { return false };
    allow_list.iter().any(|allowed| {
        if allowed == origin {
            return true;
        }
        regex::Regex::new(&format!("^(?:{allowed})$"))
            .map(|re| re.is_match(origin))
            .unwrap_or(false)
    })
}

/// Validates the request headers and, if they form a well-formed RFC
/// 6455 upgrade, computes the accept key and selects a subprotocol (the
/// first client-offered one present in `supported`, or none).
pub fn upgrade_request(headers: &HeaderMap, supported_subprotocols: &[&str]) -> Result<UpgradeRequest, UpgradeError> {
    let upgrade = headers.get("Upgrade");
    let connection = headers.get("Connection");
    let ws_key = headers.get("Sec-WebSocket-Key");
    let ws_version = headers.get("Sec-WebSocket-Version");

    if !handshake::is_upgrade_request(upgrade, connection, ws_key, ws_version) {
        return Err(UpgradeError::NotAnUpgradeRequest);
    }

    let client_key = ws_key.expect("checked by is_upgrade_request");
    let accept_key = handshake::accept_key(client_key);

    let subprotocol = headers
        .get("Sec-WebSocket-Protocol")
        .and_then(|offered| {
            offered
                .split(',')
                .map(str::trim)
                .find(|candidate| supported_subprotocols.contains(candidate))
                .map(str::to_string)
        });

    Ok(UpgradeRequest { accept_key, subprotocol })
}
