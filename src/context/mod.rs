//! The per-request [`Context`] aggregate: a unified object carrying
//! parsed inputs, response-building operations and cross-middleware
//! state.
//!
//! Generalizes a narrower `RequestContext { path, params,
//! is_authenticated, start_time }` into a fuller field set, while
//! keeping the same "plain struct, middleware borrow mutably" ownership
//! model: single-owner, cooperative, one borrower at a time because a
//! request runs on one task.

pub mod content_type;
pub mod cookies;
pub mod headers;
pub mod query;
pub mod response;
pub mod user_agent;

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;

use crate::body::ParsedBody;
use crate::method::Method;

pub use content_type::{best_accepted, matches_media_pattern, mime_for_extension, mime_for_path};
pub use cookies::{sign as sign_cookie, unsign as unsign_cookie, CookieJar, CookieOptions};
pub use headers::HeaderMap;
pub use query::QueryMap;
pub use response::{ByteStream, Response, ResponseAlreadySent, Sendable};

/// Cooperative cancellation flag shared between the context and any task
/// watching the underlying connection. No operation is preemptively
/// aborted; long-running handlers poll this at I/O boundaries.
#[derive(Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        CancellationFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Connection-derived facts the context needs at construction time but
/// cannot compute itself (peer address, proxy trust, TLS-ness — the
/// listener knows these, not the context).
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub peer_addr: SocketAddr,
    pub trust_proxy: bool,
    pub secure: bool,
}

/// The per-request aggregate. See the module docs for the field-by-field
/// contract.
pub struct Context {
    pub method: Method,
    pub url: String,
    pub path: String,
    pub headers: HeaderMap,
    pub query: QueryMap,
    pub params: HashMap<String, String>,
    pub response: Response,
    pub id: String,
    pub start_time: Instant,

    body: Option<ParsedBody>,
    state: HashMap<String, Box<dyn Any + Send + Sync>>,
    cookies: CookieJar,
    cancellation: CancellationFlag,
    connection: ConnectionInfo,

    ip_cache: OnceCell<String>,
    protocol_cache: OnceCell<&'static str>,
    hostname_cache: OnceCell<String>,
    user_agent_cache: OnceCell<user_agent::UserAgent>,
}

impl Context {
    /// Builds a context from a parsed request line/headers, immediately
    /// after the listener accepts bytes and before any middleware runs.
    /// `params` starts empty; the router populates it just before
    /// entering route-specific middleware.
    pub fn new(
        method: Method,
        url: String,
        headers: HeaderMap,
        id: String,
        connection: ConnectionInfo,
    ) -> Self {
        let (path, query_str) = query::split_path_and_query(&url);
        let path = path.to_string();
        let query = QueryMap::parse(query_str);
        let cookie_header = headers.get("Cookie").map(|s| s.to_string());

        Context {
            method,
            url,
            path,
            headers,
            query,
            params: HashMap::new(),
            response: Response::new(),
            id,
            start_time: Instant::now(),
            body: None,
            state: HashMap::new(),
            cookies: CookieJar::new(cookie_header),
            cancellation: CancellationFlag::new(),
            connection,
            ip_cache: OnceCell::new(),
            protocol_cache: OnceCell::new(),
            hostname_cache: OnceCell::new(),
            user_agent_cache: OnceCell::new(),
        }
    }

    // ---- body: set-once-by-the-parser, read-many ----

    /// True once the body parser middleware has run, regardless of
    /// outcome.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn body(&self) -> Option<&ParsedBody> {
        self.body.as_ref()
    }

    /// Called exactly once, by `body::ParserMiddleware`. A second call is
    /// a programming error in this crate, not a client-triggerable one, so
    /// it panics the way an invariant violation should.
    pub fn set_body(&mut self, body: ParsedBody) {
        assert!(self.body.is_none(), "request body parsed more than once");
        self.body = Some(body);
    }

    // ---- cross-middleware state ----

    /// String-keyed state map, a fallback to a type-indexed container.
    /// Callers are responsible for namespacing keys; writes are not
    /// coordinated.
    pub fn set_state<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.state.insert(key.to_string(), Box::new(value));
    }

    pub fn get_state<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.state.get(key).and_then(|b| b.downcast_ref::<T>())
    }

    pub fn remove_state(&mut self, key: &str) {
        self.state.remove(key);
    }

    // ---- cancellation ----

    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    // ---- input accessors ----

    /// `ctx.is(type)`: does the request's `Content-Type` match `pattern`
    /// (with wildcard support)?
    pub fn is(&self, pattern: &str) -> bool {
        match self.headers.get("Content-Type") {
            Some(ct) => matches_media_pattern(ct, pattern),
            None => false,
        }
    }

    /// `ctx.accepts(types)`: best match from `offered` against the
    /// request's `Accept` header, or `None` for a not-acceptable signal.
    pub fn accepts<'a>(&self, offered: &[&'a str]) -> Option<&'a str> {
        best_accepted(self.headers.get("Accept"), offered)
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Resolves the client IP, honoring `trustProxy`. Memoized on first
    /// access.
    pub fn ip(&self) -> &str {
        self.ip_cache.get_or_init(|| {
            if self.connection.trust_proxy {
                if let Some(forwarded) = self.headers.get("X-Forwarded-For") {
                    if let Some(first) = forwarded.split(',').next() {
                        return first.trim().to_string();
                    }
                }
            }
            self.connection.peer_addr.ip().to_string()
        })
    }

    pub fn secure(&self) -> bool {
        self.connection.secure
    }

    pub fn protocol(&self) -> &'static str {
        *self.protocol_cache.get_or_init(|| if self.secure() { "https" } else { "http" })
    }

    pub fn hostname(&self) -> &str {
        self.hostname_cache.get_or_init(|| {
            self.headers
                .get("Host")
                .map(|h| h.split(':').next().unwrap_or(h).to_string())
                .unwrap_or_default()
        })
    }

    pub fn user_agent(&self) -> &user_agent::UserAgent {
        self.user_agent_cache
            .get_or_init(|| user_agent::parse(self.headers.get("User-Agent").unwrap_or("")))
    }

    // ---- convenience surfaces that delegate to `self.response` ----

    pub fn json<T: serde::Serialize>(&mut self, data: &T) -> Result<(), ResponseAlreadySent> {
        self.response.json(data)
    }

    pub fn send(&mut self, value: Sendable) -> Result<(), ResponseAlreadySent> {
        self.response.send(value)
    }

    pub fn redirect(&mut self, location: &str) -> Result<(), ResponseAlreadySent> {
        self.response.redirect(location)
    }

    pub fn set_cookie(&mut self, name: &str, value: &str, options: CookieOptions) {
        self.response.cookie(name, value, options);
    }
}
