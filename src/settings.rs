//! Application configuration. Generalizes a flat
//! `Settings { debug, host, port, ws_port, template, other }` into a
//! fuller configuration surface; `template` is dropped since the
//! template engine is out of scope for this core.

use std::sync::Arc;
use std::time::Duration;

use crate::context::Context;
use crate::websocket::WsSettings;

/// `ws.*` configuration. Wraps
/// [`WsSettings`] with the upgrade-path-specific fields that don't belong
/// on the frame/heartbeat layer itself.
#[derive(Clone)]
pub struct WsConfig {
    pub path: String,
    pub heartbeat: Duration,
    pub pong_timeout: Duration,
    pub max_connections: usize,
    pub max_message_size: usize,
    pub allow_origins: Vec<String>,
    /// `ws.verifyClient`: an optional last-chance predicate over the
    /// pre-upgrade context, run after origin checking and before the
    /// handshake completes. Returning `false` rejects the upgrade with
    /// 403, the same as an origin mismatch.
    pub verify_client: Option<Arc<dyn Fn(&Context) -> bool + Send + Sync>>,
}

impl std::fmt::Debug for WsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConfig")
            .field("path", &self.path)
            .field("heartbeat", &self.heartbeat)
            .field("pong_timeout", &self.pong_timeout)
            .field("max_connections", &self.max_connections)
            .field("max_message_size", &self.max_message_size)
            .field("allow_origins", &self.allow_origins)
            .field("verify_client", &self.verify_client.is_some())
            .finish()
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        WsConfig {
            path: "/ws".to_string(),
            heartbeat: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
            max_connections: 1000,
            max_message_size: 16 * 1024 * 1024,
            allow_origins: Vec::new(),
            verify_client: None,
        }
    }
}

impl WsConfig {
    pub fn frame_settings(&self) -> WsSettings {
        WsSettings {
            heartbeat: self.heartbeat,
            pong_timeout: self.pong_timeout,
            max_message_size: self.max_message_size,
        }
    }
}

/// Top-level application configuration.
#[derive(Clone, Debug)]
pub struct Settings {
    pub debug: bool,
    pub host: String,
    pub port: u16,
    pub trust_proxy: bool,
    pub case_sensitive: bool,
    pub strict: bool,
    pub strict_content_type: bool,
    /// Body-parser read timeout (§4.D): first byte to completion of the
    /// request body. Distinct from `request_timeout` below.
    pub body_timeout: Duration,
    /// Overall per-request timeout (§5/§6): first byte of the request to
    /// completion of the response. Enforced around the whole middleware +
    /// handler dispatch, separately from `body_timeout`.
    pub request_timeout: Duration,
    pub max_request_size: usize,
    /// Body size above which the parser surfaces a lazy chunk sequence
    /// (`ParsedBody::Stream`) instead of a fully materialized value,
    /// regardless of content-type (spec.md §4.D's streaming threshold).
    pub streaming_threshold: usize,
    pub streaming_enabled: bool,
    pub drain_timeout: Duration,
    pub ws: WsConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            debug: false,
            host: "127.0.0.1".to_string(),
            port: 8080,
            trust_proxy: false,
            // Routing is case-insensitive by default.
            case_sensitive: false,
            // `/foo` and `/foo/` are equivalent by default.
            strict: false,
            strict_content_type: true,
            body_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            max_request_size: 10 * 1024 * 1024,
            streaming_threshold: 2 * 1024 * 1024,
            streaming_enabled: true,
            drain_timeout: Duration::from_secs(10),
            ws: WsConfig::default(),
        }
    }
}

impl Settings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.max_request_size, 10 * 1024 * 1024);
        assert_eq!(settings.streaming_threshold, 2 * 1024 * 1024);
        assert!(settings.streaming_enabled);
        assert_eq!(settings.body_timeout, Duration::from_secs(5));
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.ws.heartbeat, Duration::from_secs(30));
        assert_eq!(settings.ws.pong_timeout, Duration::from_secs(60));
        assert_eq!(settings.ws.max_connections, 1000);
        assert!(!settings.case_sensitive, "routing is case-insensitive by default");
        assert!(!settings.strict, "trailing slash is non-strict by default");
    }

    #[test]
    fn addr_joins_host_and_port() {
        let mut settings = Settings::default();
        settings.host = "0.0.0.0".to_string();
        settings.port = 3000;
        assert_eq!(settings.addr(), "0.0.0.0:3000");
    }
}
