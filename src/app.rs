//! The application core (component F): verb registration, global
//! middleware, the HTTP connection loop and the WebSocket upgrade hook.
//!
//! Splits what used to be a single `Router` struct mixing route storage
//! with server lifecycle into a clean split: [`crate::routing::Router`]
//! only stores routes, `Application` owns the router plus everything
//! about running a server. The accept loop itself — bind a
//! `TcpListener`, `tokio::spawn` one task per connection, read the
//! request by hand — follows the same shape as the original `run_http`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::body::{self, BodySettings, ParsedBody};
use crate::context::response::ResponseBody;
use crate::context::{Context, ConnectionInfo, HeaderMap, Response};
use crate::error::{AppError, ErrorMode, ExceptionFilter, ExceptionFilterChain};
use crate::method::Method;
use crate::middleware::{Middleware, Pipeline};
use crate::routing::matcher::CompiledPattern;
use crate::routing::router::{Router, RouterDispatch, RouterError};
use crate::settings::Settings;
use crate::websocket::room::outbox_pair;
use crate::websocket::{upgrade_request, Connection, ConnectionId, RoomManager, UpgradeError, WsSettings};

type WsFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Everything a WebSocket route handler needs: the live connection, its
/// matched path params, the shared room registry and its own id (used to
/// register/unregister with [`RoomManager`] and to exclude itself from
/// broadcasts it originates).
pub struct WsContext {
    pub conn: Connection<TcpStream>,
    pub params: HashMap<String, String>,
    pub rooms: RoomManager,
    pub id: ConnectionId,
    /// Messages broadcast to this connection via [`RoomManager::broadcast`]
    /// while it is open. A handler that joins rooms should
    /// `tokio::select!` between `conn.recv()` and `broadcasts.recv()` to
    /// forward these out over the socket.
    pub broadcasts: tokio::sync::mpsc::UnboundedReceiver<crate::websocket::Message>,
}

type WsHandler = Arc<dyn Fn(WsContext) -> WsFuture + Send + Sync>;

struct WsRoute {
    pattern: CompiledPattern,
    handler: WsHandler,
}

/// The application: owns the route table, global middleware, settings and
/// the WebSocket room registry, and drives the HTTP/WS server loop.
pub struct Application {
    router: Arc<Router>,
    global_middleware: Vec<Arc<dyn Middleware>>,
    ws_routes: Vec<WsRoute>,
    exception_filters: ExceptionFilterChain,
    settings: Settings,
    rooms: RoomManager,
    next_connection_id: std::sync::atomic::AtomicU64,
    /// Graceful-shutdown signal. `false` while serving normally; flipped
    /// to `true` by [`Self::request_shutdown`] (or a `ctrl-c` caught by
    /// [`Self::listen`]). `_shutdown_rx` keeps the channel alive so
    /// `send` never fails for lack of a receiver between requests.
    shutdown_tx: watch::Sender<bool>,
    _shutdown_rx: watch::Receiver<bool>,
}

impl Application {
    pub fn new(settings: Settings) -> Self {
        let mode = if settings.debug { ErrorMode::Development } else { ErrorMode::Production };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Application {
            router: Arc::new(Router::new(settings.case_sensitive, settings.strict)),
            global_middleware: Vec::new(),
            ws_routes: Vec::new(),
            exception_filters: ExceptionFilterChain::new(mode),
            settings,
            rooms: RoomManager::new(),
            next_connection_id: std::sync::atomic::AtomicU64::new(1),
            shutdown_tx,
            _shutdown_rx: shutdown_rx,
        }
    }

    /// Requests graceful shutdown: stop accepting new connections and
    /// start draining in-flight ones per `Settings::drain_timeout`.
    /// Cooperative — cancels each in-flight request's [`crate::context::Context`]
    /// cancellation flag rather than aborting it outright.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Registers global middleware, run for every request ahead of
    /// routing.
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.global_middleware.push(middleware);
        self
    }

    pub fn exception_filter(&mut self, filter: Box<dyn ExceptionFilter>) -> &mut Self {
        self.exception_filters.add(filter);
        self
    }

    fn route(&mut self, method: Method, pattern: &str, handlers: Vec<Arc<dyn Middleware>>) -> Result<&mut Self, RouterError> {
        Arc::get_mut(&mut self.router)
            .expect("routes must be registered before listen() shares the router across connections")
            .register(method, pattern, handlers)?;
        Ok(self)
    }

    pub fn get(&mut self, pattern: &str, handlers: Vec<Arc<dyn Middleware>>) -> Result<&mut Self, RouterError> {
        self.route(Method::Get, pattern, handlers)
    }

    pub fn post(&mut self, pattern: &str, handlers: Vec<Arc<dyn Middleware>>) -> Result<&mut Self, RouterError> {
        self.route(Method::Post, pattern, handlers)
    }

    pub fn put(&mut self, pattern: &str, handlers: Vec<Arc<dyn Middleware>>) -> Result<&mut Self, RouterError> {
        self.route(Method::Put, pattern, handlers)
    }

    pub fn patch(&mut self, pattern: &str, handlers: Vec<Arc<dyn Middleware>>) -> Result<&mut Self, RouterError> {
        self.route(Method::Patch, pattern, handlers)
    }

    pub fn delete(&mut self, pattern: &str, handlers: Vec<Arc<dyn Middleware>>) -> Result<&mut Self, RouterError> {
        self.route(Method::Delete, pattern, handlers)
    }

    pub fn options(&mut self, pattern: &str, handlers: Vec<Arc<dyn Middleware>>) -> Result<&mut Self, RouterError> {
        self.route(Method::Options, pattern, handlers)
    }

    pub fn head(&mut self, pattern: &str, handlers: Vec<Arc<dyn Middleware>>) -> Result<&mut Self, RouterError> {
        self.route(Method::Head, pattern, handlers)
    }

    /// Mounts every route of `sub_router` under `prefix`.
    pub fn mount(&mut self, prefix: &str, sub_router: &Router) -> Result<&mut Self, RouterError> {
        Arc::get_mut(&mut self.router)
            .expect("routes must be registered before listen() shares the router across connections")
            .mount(prefix, sub_router)?;
        Ok(self)
    }

    /// Registers a WebSocket route. `handler` receives a [`WsContext`]
    /// once the handshake has completed and owns the connection for its
    /// whole lifetime, from the successful upgrade handshake to any
    /// terminal close event.
    pub fn ws<F, Fut>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, RouterError>
    where
        F: Fn(WsContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let compiled = CompiledPattern::compile(pattern, self.settings.case_sensitive, self.settings.strict).map_err(RouterError::Pattern)?;
        self.ws_routes.push(WsRoute {
            pattern: compiled,
            handler: Arc::new(move |ctx| Box::pin(handler(ctx))),
        });
        Ok(self)
    }

    pub fn rooms(&self) -> RoomManager {
        self.rooms.clone()
    }

    /// Binds the listener and serves until a graceful shutdown is
    /// requested (a caught `ctrl-c` or [`Self::request_shutdown`]): one
    /// `tokio::spawn`ed task per accepted connection, directly
    /// generalizing `run_http`. Once a shutdown is requested, stops
    /// accepting new connections and waits for in-flight ones to finish
    /// up to `Settings::drain_timeout`, then forcibly aborts whatever is
    /// left (spec.md §4.F).
    pub async fn listen(self) -> std::io::Result<()> {
        let app = Arc::new(self);

        let ctrl_c_app = app.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("ctrl-c received, starting graceful shutdown");
                ctrl_c_app.request_shutdown();
            }
        });

        let listener = TcpListener::bind(app.settings.addr()).await?;
        log::info!("listening on http://{}", app.settings.addr());

        let mut connections = JoinSet::new();
        let mut shutdown_rx = app.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (socket, peer_addr) = accepted?;
                    let app = app.clone();
                    connections.spawn(async move {
                        if let Err(e) = app.serve_connection(socket, peer_addr).await {
                            log::warn!("connection {peer_addr} ended with error: {e}");
                        }
                    });
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        log::info!("no longer accepting new connections, draining in-flight requests");
                        break;
                    }
                }
            }
        }

        drop(listener);
        let drained = tokio::time::timeout(app.settings.drain_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            log::warn!(
                "drain timeout elapsed with {} connection(s) still in flight, forcing close",
                connections.len()
            );
            connections.shutdown().await;
        }

        Ok(())
    }

    /// Serves a connection, honoring HTTP/1.1 keep-alive: requests are
    /// read one after another off the same socket until the
    /// client or server signals `Connection: close`, the client closes
    /// the socket, or a WebSocket upgrade hands the socket off for good.
    async fn serve_connection(
        &self,
        socket: TcpStream,
        peer_addr: std::net::SocketAddr,
    ) -> Result<(), std::io::Error> {
        let mut reader = BufReader::new(socket);

        loop {
            let request_line = read_line(&mut reader).await?;
            if request_line.is_empty() {
                return Ok(());
            }

            let mut parts = request_line.split_whitespace();
            let method_token = parts.next().unwrap_or("");
            let url = parts.next().unwrap_or("/").to_string();

            let mut headers = HeaderMap::new();
            loop {
                let line = read_line(&mut reader).await?;
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    headers.append(name.trim(), value.trim());
                }
            }

            let method = match method_token.parse::<Method>() {
                Ok(m) => m,
                Err(_) => {
                    let response = self.exception_filters.handle(&AppError::BadRequest(format!(
                        "unsupported method: {method_token}"
                    )));
                    write_response(reader.get_mut(), response).await?;
                    return Ok(());
                }
            };

            if self.is_ws_upgrade(method, &url, &headers) {
                return self.serve_ws_upgrade(reader, peer_addr, &url, &headers).await;
            }

            let connection_id = format!("{peer_addr}-{}", self.next_connection_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed));
            let mut ctx = Context::new(
                method,
                url,
                headers,
                connection_id,
                ConnectionInfo {
                    peer_addr,
                    trust_proxy: self.settings.trust_proxy,
                    secure: false,
                },
            );

            let body_bytes = self.read_declared_body(&mut reader, &ctx).await;
            let body_bytes = match body_bytes {
                Ok(b) => b,
                Err(err) => {
                    let response = self.exception_filters.handle(&err);
                    write_response(reader.get_mut(), response).await?;
                    return Ok(());
                }
            };

            if let Some(bytes) = body_bytes {
                let body_settings = BodySettings {
                    max_size: self.settings.max_request_size,
                    timeout: self.settings.body_timeout,
                    strict_content_type: self.settings.strict_content_type,
                    streaming_threshold: self.settings.streaming_threshold,
                    streaming_enabled: self.settings.streaming_enabled,
                };
                match body::parse(ctx.headers.get("Content-Type"), &bytes, &body_settings, None) {
                    Ok(parsed) => ctx.set_body(parsed),
                    Err(err) => {
                        let response = self.exception_filters.handle(&err);
                        write_response(reader.get_mut(), response).await?;
                        return Ok(());
                    }
                }
            } else {
                ctx.set_body(ParsedBody::Empty);
            }

            let dispatch: Arc<dyn Middleware> = Arc::new(RouterDispatch::new(self.router.clone()));
            let pipeline = Pipeline::chain(&self.global_middleware, &[dispatch]);

            let flag = ctx.cancellation_flag();
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let shutdown_flag = flag.clone();
            let shutdown_watch = tokio::spawn(async move {
                if shutdown_rx.changed().await.is_ok() && *shutdown_rx.borrow() {
                    shutdown_flag.cancel();
                }
            });

            let outcome = tokio::select! {
                result = tokio::time::timeout(self.settings.request_timeout, pipeline.dispatch(&mut ctx)) => {
                    match result {
                        Ok(inner) => Some(inner),
                        Err(_elapsed) => {
                            flag.cancel();
                            Some(Err(AppError::RequestTimeout(
                                "request exceeded the configured per-request timeout".to_string(),
                            )))
                        }
                    }
                }
                _ = watch_for_disconnect(reader.get_ref()) => {
                    flag.cancel();
                    None
                }
            };
            shutdown_watch.abort();

            let dispatch_result = match outcome {
                Some(result) => result,
                // client disconnected mid-request; nothing to write back.
                None => return Ok(()),
            };
            if let Err(err) = dispatch_result {
                ctx.response = self.exception_filters.handle(&err);
            }

            let close_after = connection_should_close(&ctx.headers, &ctx.response);
            write_response(reader.get_mut(), ctx.response).await?;
            if close_after {
                return Ok(());
            }
        }
    }

    /// Drives a single already-accepted connection. Exposed so embedders
    /// (and tests) can feed this core a socket from their own accept loop
    /// instead of calling [`Self::listen`].
    pub async fn handle_connection(
        &self,
        socket: TcpStream,
        peer_addr: std::net::SocketAddr,
    ) -> Result<(), std::io::Error> {
        self.serve_connection(socket, peer_addr).await
    }

    /// Reads the request body off the wire when one is declared, honoring
    /// `Content-Length` or `Transfer-Encoding: chunked`. Returns `None`
    /// when the request has no body at all, so the caller
    /// can set [`ParsedBody::Empty`] without invoking a parser.
    async fn read_declared_body(
        &self,
        reader: &mut BufReader<TcpStream>,
        ctx: &Context,
    ) -> Result<Option<Vec<u8>>, AppError> {
        let chunked = ctx
            .headers
            .get("Transfer-Encoding")
            .map(|v| v.eq_ignore_ascii_case("chunked"))
            .unwrap_or(false);
        let content_length = ctx.headers.get("Content-Length").and_then(|v| v.parse::<usize>().ok());

        if body::request_has_no_body(ctx.method, content_length, chunked) {
            return Ok(None);
        }

        if chunked {
            let bytes = crate::body::limits::read_chunked(reader, self.settings.max_request_size, self.settings.body_timeout).await?;
            Ok(Some(bytes))
        } else {
            let len = content_length.unwrap_or(0);
            let bytes = crate::body::limits::read_fixed(reader, len, self.settings.max_request_size, self.settings.body_timeout).await?;
            Ok(Some(bytes))
        }
    }

    fn is_ws_upgrade(&self, method: Method, url: &str, headers: &HeaderMap) -> bool {
        if method != Method::Get {
            return false;
        }
        let path = url.split('?').next().unwrap_or(url);
        upgrade_request(headers, &[]).is_ok() && self.ws_routes.iter().any(|r| r.pattern.matches(path).is_some())
    }

    async fn serve_ws_upgrade(
        &self,
        reader: BufReader<TcpStream>,
        peer_addr: std::net::SocketAddr,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<(), std::io::Error> {
        let path = url.split('?').next().unwrap_or(url);
        let route = self.ws_routes.iter().find(|r| r.pattern.matches(path).is_some());

        let mut stream = reader.into_inner();

        let connection_id = format!("{peer_addr}-{}", self.next_connection_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed));
        let mut ctx = Context::new(
            Method::Get,
            url.to_string(),
            headers.clone(),
            connection_id,
            ConnectionInfo { peer_addr, trust_proxy: self.settings.trust_proxy, secure: false },
        );
        ctx.set_body(ParsedBody::Empty);

        // Run the application's middleware pipeline up to route
        // resolution; a middleware may reject the upgrade (e.g. an auth
        // check) by producing a non-101 response instead of calling
        // `next`, or by returning an error.
        let pre_upgrade = Pipeline::new(self.global_middleware.clone());
        if let Err(err) = pre_upgrade.dispatch(&mut ctx).await {
            let response = self.exception_filters.handle(&err);
            return write_response(&mut stream, response).await;
        }
        if ctx.response.state != crate::context::response::ResponseState::Building {
            return write_response(&mut stream, ctx.response).await;
        }

        let (route, params) = match route.and_then(|r| r.pattern.matches(path).map(|p| (r, p))) {
            Some(found) => found,
            None => {
                let response = self.exception_filters.handle(&AppError::NotFound(path.to_string()));
                return write_response(&mut stream, response).await;
            }
        };

        let upgrade = match upgrade_request(headers, &[]) {
            Ok(u) => u,
            Err(UpgradeError::NotAnUpgradeRequest) => {
                let response = self.exception_filters.handle(&AppError::BadRequest("not a websocket upgrade".to_string()));
                return write_response(&mut stream, response).await;
            }
        };

        if !crate::websocket::upgrade::origin_allowed(headers.get("Origin"), &self.settings.ws.allow_origins) {
            let response = self.exception_filters.handle(&AppError::Authorization("origin not allowed".to_string()));
            return write_response(&mut stream, response).await;
        }

        if let Some(verify) = &self.settings.ws.verify_client {
            if !verify(&ctx) {
                let response = self.exception_filters.handle(&AppError::Authorization("client verification failed".to_string()));
                return write_response(&mut stream, response).await;
            }
        }

        if self.rooms.connection_count().await >= self.settings.ws.max_connections {
            let response = self.exception_filters.handle(&AppError::ServiceUnavailable(
                "maximum WebSocket connection count reached".to_string(),
            ));
            return write_response(&mut stream, response).await;
        }

        let accept_headers = crate::websocket::handshake::accept_response_headers(
            headers.get("Sec-WebSocket-Key").unwrap_or_default(),
            upgrade.subprotocol.as_deref(),
        );
        let mut response_text = "HTTP/1.1 101 Switching Protocols\r\n".to_string();
        for (name, value) in accept_headers {
            response_text.push_str(&format!("{name}: {value}\r\n"));
        }
        response_text.push_str("\r\n");
        stream.write_all(response_text.as_bytes()).await?;

        let ws_settings: WsSettings = self.settings.ws.frame_settings();
        let conn = Connection::new(stream, ws_settings);
        let id = self.next_connection_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let (outbox, receiver) = outbox_pair();
        self.rooms.register(id, outbox).await;

        let ws_ctx = WsContext {
            conn,
            params,
            rooms: self.rooms.clone(),
            id,
            broadcasts: receiver,
        };
        (route.handler)(ws_ctx).await;
        self.rooms.unregister(id).await;
        Ok(())
    }

}

/// Whether the connection must close after this response, per HTTP/1.1
/// keep-alive defaults: close only when the request or the response
/// explicitly says `Connection: close`.
fn connection_should_close(request_headers: &HeaderMap, response: &Response) -> bool {
    let has_close_token = |value: &str| value.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("close"));
    if request_headers.get("Connection").map(has_close_token).unwrap_or(false) {
        return true;
    }
    response.headers.get("Connection").map(has_close_token).unwrap_or(false)
}

/// Resolves only on a genuine abrupt disconnect (a reset surfaces as a
/// read error here) while we're busy dispatching a request, so
/// `serve_connection` can stop waiting on a handler for a client that
/// already left (spec.md §5's "client disconnect" cancellation trigger).
///
/// A clean EOF (`peek` returning `Ok(0)`) is *not* treated as a
/// disconnect: by the time this races the dispatch, the full request has
/// already been read off this socket, so an EOF here just means the
/// client shut down its write half after sending — the ordinary
/// `Connection: close` pattern — and may still be waiting on a response.
/// That case is left to resolve the other way (the handler completing,
/// or the per-request timeout), rather than short-circuiting with no
/// response at all. Bytes arriving instead of an EOF (e.g. a pipelined
/// next request) are left queued and just re-checked after a short pause.
async fn watch_for_disconnect(stream: &TcpStream) {
    let mut probe = [0u8; 1];
    loop {
        if stream.readable().await.is_err() {
            return;
        }
        match stream.peek(&mut probe).await {
            Ok(0) => std::future::pending::<()>().await,
            Ok(_) => tokio::time::sleep(std::time::Duration::from_millis(50)).await,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(_) => return,
        }
    }
}

async fn read_line(reader: &mut BufReader<TcpStream>) -> std::io::Result<String> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(String::new());
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

async fn write_response(stream: &mut TcpStream, response: Response) -> std::io::Result<()> {
    let mut head = format!("HTTP/1.1 {} {}\r\n", response.status_code, status_text(response.status_code));
    if !response.headers.contains("Date") {
        head.push_str(&format!("Date: {}\r\n", http_date_now()));
    }
    for (name, value) in response.headers.iter() {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    for set_cookie in response.set_cookie_headers() {
        head.push_str(&format!("Set-Cookie: {set_cookie}\r\n"));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes()).await?;

    match response.body {
        ResponseBody::Empty => {}
        ResponseBody::Bytes(bytes) => stream.write_all(&bytes).await?,
        ResponseBody::Stream(mut s) => {
            use futures::StreamExt;
            while let Some(chunk) = s.next().await {
                match chunk {
                    Ok(bytes) => stream.write_all(&bytes).await?,
                    Err(e) => {
                        log::warn!("error streaming response body: {e}");
                        break;
                    }
                }
            }
        }
    }
    stream.flush().await
}

/// Formats the current time as an RFC 7231 HTTP-date (`Date` header),
/// e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
fn http_date_now() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    http_date_from_unix(now.as_secs())
}

fn http_date_from_unix(secs: u64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(secs as i64, 0)
        .unwrap_or_default()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_covers_error_table() {
        assert_eq!(status_text(404), "Not Found");
        assert_eq!(status_text(429), "Too Many Requests");
        assert_eq!(status_text(999), "Unknown");
    }

    #[test]
    fn http_date_formats_known_instant() {
        // 2021-01-01T00:00:00Z, a Friday.
        assert_eq!(http_date_from_unix(1_609_459_200), "Fri, 01 Jan 2021 00:00:00 GMT");
    }

    #[tokio::test]
    async fn request_shutdown_notifies_a_subscriber_started_before_the_call() {
        let app = Application::new(Settings::default());
        let mut rx = app.shutdown_tx.subscribe();
        assert!(!*rx.borrow());

        app.request_shutdown();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[test]
    fn connection_close_is_honored_from_either_side() {
        let mut request_headers = crate::context::HeaderMap::new();
        let response = Response::new();
        assert!(!connection_should_close(&request_headers, &response));

        request_headers.set("Connection", "keep-alive, close");
        assert!(connection_should_close(&request_headers, &response));

        let clean_request = crate::context::HeaderMap::new();
        let mut closing_response = Response::new();
        closing_response.set_header("Connection", "close");
        assert!(connection_should_close(&clean_request, &closing_response));
    }
}
