//! The response builder attached to every [`Context`](super::Context).
//!
//! Mirrors a simpler `Response { status_code, body, headers }` shape but
//! grows a state machine and a much larger operation surface: a handful
//! of terminal "sends" that commit body content exactly once, and a
//! larger set of non-terminal, cumulative header/status operations.

use std::path::Path;

use futures::Stream;
use serde::Serialize;
use serde_json::{json, Value};
use std::pin::Pin;

use super::content_type::mime_for_path;
use super::cookies::{render_clear_cookie, render_set_cookie, CookieOptions, SetCookie};
use super::headers::HeaderMap;

/// The response state machine: `building -> headers-sent -> body-sent ->
/// closed`. This builder collapses the middle transition
/// since headers and body are assembled together and only hit the wire
/// once the application layer serializes the whole response; `HeadersSent`
/// is reserved for a future streaming-headers-first mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    Building,
    HeadersSent,
    BodySent,
    Closed,
}

/// Failure from calling a terminal send a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseAlreadySent;

impl std::fmt::Display for ResponseAlreadySent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "response-already-sent")
    }
}

impl std::error::Error for ResponseAlreadySent {}

pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Vec<u8>>> + Send>>;

pub enum ResponseBody {
    Empty,
    Bytes(Vec<u8>),
    Stream(ByteStream),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Empty => write!(f, "Empty"),
            ResponseBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            ResponseBody::Stream(_) => write!(f, "Stream(..)"),
        }
    }
}

/// Input accepted by the smart-detecting `send` operation.
pub enum Sendable {
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

#[derive(Debug)]
pub struct Response {
    pub status_code: u16,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    pub state: ResponseState,
    pub(crate) set_cookies: Vec<SetCookie>,
    /// Set by `compress()`; a hint a compression middleware may act on.
    /// The response helper never performs compression itself.
    pub compress_hint: bool,
}

impl Default for Response {
    fn default() -> Self {
        Response {
            status_code: 200,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
            state: ResponseState::Building,
            set_cookies: Vec::new(),
            compress_hint: false,
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard_terminal(&mut self) -> Result<(), ResponseAlreadySent> {
        if self.state != ResponseState::Building {
            Err(ResponseAlreadySent)
        } else {
            Ok(())
        }
    }

    fn guard_header(&self, op: &str) -> bool {
        if self.state != ResponseState::Building {
            log::warn!("ignoring {op}: response already sent");
            false
        } else {
            true
        }
    }

    fn finish(&mut self, status: u16, content_type: &str, body: Vec<u8>) {
        self.status_code = status;
        if !self.headers.contains("Content-Type") {
            self.headers.set("Content-Type", content_type);
        }
        self.headers.set("Content-Length", body.len().to_string());
        self.body = ResponseBody::Bytes(body);
        self.state = ResponseState::BodySent;
    }

    // ---- non-terminal, cumulative operations ----

    pub fn status(&mut self, code: u16) -> &mut Self {
        if self.guard_header("status") {
            self.status_code = code;
        }
        self
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        if self.guard_header("set") {
            self.headers.set(name, value);
        }
        self
    }

    /// Alias kept for callers that prefer the `header` spelling.
    pub fn header(&mut self, name: &str, value: &str) -> &mut Self {
        self.set_header(name, value)
    }

    pub fn content_type(&mut self, mime: &str) -> &mut Self {
        if self.guard_header("type") {
            self.headers.set("Content-Type", mime);
        }
        self
    }

    pub fn length(&mut self, n: usize) -> &mut Self {
        if self.guard_header("length") {
            self.headers.set("Content-Length", n.to_string());
        }
        self
    }

    pub fn etag(&mut self, value: &str) -> &mut Self {
        if self.guard_header("etag") {
            self.headers.set("ETag", value);
        }
        self
    }

    pub fn last_modified(&mut self, http_date: &str) -> &mut Self {
        if self.guard_header("lastModified") {
            self.headers.set("Last-Modified", http_date);
        }
        self
    }

    pub fn cookie(&mut self, name: &str, value: &str, options: CookieOptions) -> &mut Self {
        if self.guard_header("cookie") {
            self.set_cookies.push(SetCookie {
                name: name.to_string(),
                value: value.to_string(),
                options,
            });
        }
        self
    }

    pub fn clear_cookie(&mut self, name: &str, path: Option<&str>) -> &mut Self {
        if self.guard_header("clearCookie") {
            self.headers.append("Set-Cookie", render_clear_cookie(name, path));
        }
        self
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        if self.guard_header("remove") {
            self.headers.remove(name);
        }
        self
    }

    pub fn remove(&mut self, name: &str) -> &mut Self {
        self.remove_header(name)
    }

    pub fn cache(&mut self, max_age_seconds: u64) -> &mut Self {
        if self.guard_header("cache") {
            self.headers
                .set("Cache-Control", format!("public, max-age={}", max_age_seconds));
        }
        self
    }

    pub fn no_cache(&mut self) -> &mut Self {
        if self.guard_header("noCache") {
            self.headers
                .set("Cache-Control", "no-store, no-cache, must-revalidate");
        }
        self
    }

    pub fn cors(&mut self, origin: &str) -> &mut Self {
        if self.guard_header("cors") {
            self.headers.set("Access-Control-Allow-Origin", origin);
            self.headers
                .set("Access-Control-Allow-Methods", "GET, POST, PUT, PATCH, DELETE, OPTIONS");
            self.headers.set("Access-Control-Allow-Headers", "Content-Type, Authorization");
        }
        self
    }

    pub fn security(&mut self) -> &mut Self {
        if self.guard_header("security") {
            self.headers.set("X-Content-Type-Options", "nosniff");
            self.headers.set("X-Frame-Options", "DENY");
            self.headers.set("X-XSS-Protection", "0");
            self.headers.set("Referrer-Policy", "no-referrer");
        }
        self
    }

    /// Hints that the body is a candidate for compression. Actual
    /// compression is a middleware concern; this only sets a flag a
    /// compression middleware can read off the context afterward.
    pub fn compress(&mut self) -> &mut Self {
        if self.guard_header("compress") {
            self.compress_hint = true;
        }
        self
    }

    pub fn time(&mut self, elapsed_ms: u128) -> &mut Self {
        if self.guard_header("time") {
            self.headers.set("X-Response-Time", format!("{}ms", elapsed_ms));
        }
        self
    }

    // ---- terminal sends ----

    pub fn json<T: Serialize>(&mut self, data: &T) -> Result<(), ResponseAlreadySent> {
        self.guard_terminal()?;
        let body = serde_json::to_vec(data).unwrap_or_else(|_| b"{}".to_vec());
        self.finish(self.status_code, "application/json", body);
        Ok(())
    }

    /// Same as [`Self::json`] but takes an already-built [`Value`], used
    /// by error filters that construct the body without a concrete type.
    pub fn json_value(data: Value, status: u16) -> Self {
        let mut response = Response::new();
        response.status_code = status;
        let _ = response.json(&data);
        response.status_code = status;
        response
    }

    pub fn html(&mut self, content: impl Into<String>) -> Result<(), ResponseAlreadySent> {
        self.guard_terminal()?;
        self.finish(self.status_code, "text/html; charset=utf-8", content.into().into_bytes());
        Ok(())
    }

    pub fn text(&mut self, content: impl Into<String>) -> Result<(), ResponseAlreadySent> {
        self.guard_terminal()?;
        self.finish(self.status_code, "text/plain; charset=utf-8", content.into().into_bytes());
        Ok(())
    }

    pub fn xml(&mut self, content: impl Into<String>) -> Result<(), ResponseAlreadySent> {
        self.guard_terminal()?;
        self.finish(self.status_code, "application/xml; charset=utf-8", content.into().into_bytes());
        Ok(())
    }

    /// Encodes `rows` as RFC-4180-ish CSV: comma-separated, CRLF line
    /// breaks, fields containing a delimiter/quote/newline are
    /// quote-wrapped with doubled internal quotes.
    pub fn csv(&mut self, rows: &[Vec<String>]) -> Result<(), ResponseAlreadySent> {
        self.guard_terminal()?;
        let mut out = String::new();
        for row in rows {
            let fields: Vec<String> = row.iter().map(|f| csv_escape(f)).collect();
            out.push_str(&fields.join(","));
            out.push_str("\r\n");
        }
        self.finish(self.status_code, "text/csv; charset=utf-8", out.into_bytes());
        Ok(())
    }

    pub fn stream(&mut self, stream: ByteStream) -> Result<(), ResponseAlreadySent> {
        self.guard_terminal()?;
        if !self.headers.contains("Content-Type") {
            self.headers.set("Content-Type", "application/octet-stream");
        }
        self.body = ResponseBody::Stream(stream);
        self.state = ResponseState::BodySent;
        Ok(())
    }

    pub async fn send_file(&mut self, path: impl AsRef<Path>) -> Result<(), ResponseAlreadySent> {
        self.guard_terminal()?;
        let path = path.as_ref();
        let mime = mime_for_path(&path.to_string_lossy());
        let bytes = tokio::fs::read(path)
            .await
            .unwrap_or_else(|e| {
                log::error!("send_file failed to read {}: {e}", path.display());
                Vec::new()
            });
        self.finish(self.status_code, mime, bytes);
        Ok(())
    }

    pub async fn download(
        &mut self,
        path: impl AsRef<Path>,
        filename: &str,
    ) -> Result<(), ResponseAlreadySent> {
        self.guard_terminal()?;
        self.headers.set(
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", filename),
        );
        let path = path.as_ref();
        let mime = mime_for_path(filename);
        let bytes = tokio::fs::read(path).await.unwrap_or_else(|e| {
            log::error!("download failed to read {}: {e}", path.display());
            Vec::new()
        });
        self.finish(self.status_code, mime, bytes);
        Ok(())
    }

    /// Commits a pre-rendered template body. The template engine itself is
    /// an external collaborator; this only wires the already rendered HTML
    /// into the response the way `html` does.
    pub fn render(&mut self, rendered_html: impl Into<String>) -> Result<(), ResponseAlreadySent> {
        self.guard_terminal()?;
        self.finish(self.status_code, "text/html; charset=utf-8", rendered_html.into().into_bytes());
        Ok(())
    }

    fn redirect_with(&mut self, location: &str, status: u16) -> Result<(), ResponseAlreadySent> {
        self.guard_terminal()?;
        self.headers.set("Location", location);
        self.finish(status, "text/plain; charset=utf-8", Vec::new());
        Ok(())
    }

    /// 302 Found: the default, temporary redirect.
    pub fn redirect(&mut self, location: &str) -> Result<(), ResponseAlreadySent> {
        self.redirect_with(location, 302)
    }

    /// 301 Moved Permanently.
    pub fn redirect_permanent(&mut self, location: &str) -> Result<(), ResponseAlreadySent> {
        self.redirect_with(location, 301)
    }

    /// 307 Temporary Redirect (method/body preserving).
    pub fn redirect_temporary(&mut self, location: &str) -> Result<(), ResponseAlreadySent> {
        self.redirect_with(location, 307)
    }

    /// Smart-detecting terminal send: objects/arrays go out as JSON,
    /// strings as `text/plain` (unless a content-type was already set),
    /// byte buffers as `application/octet-stream`.
    pub fn send(&mut self, value: Sendable) -> Result<(), ResponseAlreadySent> {
        self.guard_terminal()?;
        match value {
            Sendable::Json(v) => {
                let body = serde_json::to_vec(&v).unwrap_or_else(|_| b"null".to_vec());
                self.finish(self.status_code, "application/json", body);
            }
            Sendable::Text(s) => {
                self.finish(self.status_code, "text/plain; charset=utf-8", s.into_bytes());
            }
            Sendable::Bytes(b) => {
                self.finish(self.status_code, "application/octet-stream", b);
            }
        }
        Ok(())
    }

    // ---- semantic sugar ----

    pub fn success<T: Serialize>(&mut self, data: T, message: Option<&str>) -> Result<(), ResponseAlreadySent> {
        let body = json!({
            "success": true,
            "data": data,
            "message": message,
        });
        self.json(&body)
    }

    pub fn error_response(
        &mut self,
        message: &str,
        code: Option<u16>,
        details: Option<Value>,
    ) -> Result<(), ResponseAlreadySent> {
        if let Some(code) = code {
            self.status_code = code;
        }
        let mut body = json!({
            "success": false,
            "error": message,
            "code": self.status_code,
        });
        if let Some(details) = details {
            body["details"] = details;
        }
        self.json(&body)
    }

    pub fn paginate<T: Serialize>(
        &mut self,
        items: &[T],
        page: u64,
        limit: u64,
        total: u64,
    ) -> Result<(), ResponseAlreadySent> {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        let body = json!({
            "success": true,
            "data": items,
            "pagination": {
                "page": page,
                "limit": limit,
                "total": total,
                "totalPages": total_pages,
            }
        });
        self.json(&body)
    }

    /// Renders all accumulated `Set-Cookie` values, folding explicit
    /// `cookie()` calls together with any set via `clear_cookie()`.
    pub fn set_cookie_headers(&self) -> Vec<String> {
        let mut out: Vec<String> = self.set_cookies.iter().map(render_set_cookie).collect();
        out.extend(self.headers.get_all("Set-Cookie").iter().cloned());
        out
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_sets_content_type_and_body() {
        let mut r = Response::new();
        r.json(&json!({"a": 1})).unwrap();
        assert_eq!(r.status_code, 200);
        assert_eq!(r.headers.get("Content-Type"), Some("application/json"));
        match &r.body {
            ResponseBody::Bytes(b) => assert_eq!(b, br#"{"a":1}"#),
            _ => panic!("expected bytes body"),
        }
    }

    #[test]
    fn second_terminal_send_fails() {
        let mut r = Response::new();
        r.text("first").unwrap();
        let second = r.html("second");
        assert!(second.is_err());
    }

    #[test]
    fn header_mutation_after_send_is_noop() {
        let mut r = Response::new();
        r.text("done").unwrap();
        r.set_header("X-Late", "value");
        assert_eq!(r.headers.get("X-Late"), None);
    }

    #[test]
    fn csv_quotes_fields_with_delimiters() {
        let mut r = Response::new();
        r.csv(&[vec!["a,b".to_string(), "plain".to_string()]]).unwrap();
        match &r.body {
            ResponseBody::Bytes(b) => {
                assert_eq!(String::from_utf8_lossy(b), "\"a,b\",plain\r\n");
            }
            _ => panic!("expected bytes body"),
        }
    }

    #[test]
    fn redirect_sets_location_and_status() {
        let mut r = Response::new();
        r.redirect_permanent("/new").unwrap();
        assert_eq!(r.status_code, 301);
        assert_eq!(r.headers.get("Location"), Some("/new"));
    }

    #[test]
    fn success_wraps_payload() {
        let mut r = Response::new();
        r.success(json!({"id": 1}), Some("created")).unwrap();
        match &r.body {
            ResponseBody::Bytes(b) => {
                let parsed: Value = serde_json::from_slice(b).unwrap();
                assert_eq!(parsed["success"], json!(true));
                assert_eq!(parsed["message"], json!("created"));
            }
            _ => panic!("expected bytes body"),
        }
    }

    #[test]
    fn paginate_computes_total_pages() {
        let mut r = Response::new();
        r.paginate(&[1, 2, 3], 1, 10, 25).unwrap();
        match &r.body {
            ResponseBody::Bytes(b) => {
                let parsed: Value = serde_json::from_slice(b).unwrap();
                assert_eq!(parsed["pagination"]["totalPages"], json!(3));
            }
            _ => panic!("expected bytes body"),
        }
    }

    #[test]
    fn cors_sets_allow_headers() {
        let mut r = Response::new();
        r.cors("https://example.com");
        assert_eq!(r.headers.get("Access-Control-Allow-Origin"), Some("https://example.com"));
    }
}
