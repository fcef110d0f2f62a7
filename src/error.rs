//! Typed error taxonomy and exception filters.
//!
//! Every failure that can reach a client is represented as an [`AppError`]
//! variant mirroring the HTTP status table in the framework design notes.
//! [`ExceptionFilter`]s turn an `AppError` into a [`Response`](crate::context::Response);
//! the router and body parser never format HTTP text directly, they just
//! produce an `AppError` and let the filter chain do it.

use std::fmt;

use serde_json::json;

use crate::context::Response;

/// The typed error kinds produced anywhere in the request-handling core.
#[derive(Debug, Clone)]
pub enum AppError {
    Validation(String),
    BadRequest(String),
    Authentication(String),
    Authorization(String),
    NotFound(String),
    MethodNotAllowed { allow: Vec<String> },
    RequestTimeout(String),
    Conflict(String),
    PayloadTooLarge(String),
    UnsupportedMediaType(String),
    RateLimit(String),
    Internal(String),
    NotImplemented(String),
    ServiceUnavailable(String),
}

impl AppError {
    /// The HTTP status code this error kind maps to.
    pub fn status(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::BadRequest(_) => 400,
            AppError::Authentication(_) => 401,
            AppError::Authorization(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::MethodNotAllowed { .. } => 405,
            AppError::RequestTimeout(_) => 408,
            AppError::Conflict(_) => 409,
            AppError::PayloadTooLarge(_) => 413,
            AppError::UnsupportedMediaType(_) => 415,
            AppError::RateLimit(_) => 429,
            AppError::Internal(_) => 500,
            AppError::NotImplemented(_) => 501,
            AppError::ServiceUnavailable(_) => 503,
        }
    }

    /// A short machine-stable name for the error kind, used as `code` in
    /// the default JSON error body and for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::BadRequest(_) => "bad_request",
            AppError::Authentication(_) => "authentication",
            AppError::Authorization(_) => "authorization",
            AppError::NotFound(_) => "not_found",
            AppError::MethodNotAllowed { .. } => "method_not_allowed",
            AppError::RequestTimeout(_) => "request_timeout",
            AppError::Conflict(_) => "conflict",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::UnsupportedMediaType(_) => "unsupported_media_type",
            AppError::RateLimit(_) => "rate_limit",
            AppError::Internal(_) => "internal",
            AppError::NotImplemented(_) => "not_implemented",
            AppError::ServiceUnavailable(_) => "service_unavailable",
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::Validation(m)
            | AppError::BadRequest(m)
            | AppError::Authentication(m)
            | AppError::Authorization(m)
            | AppError::NotFound(m)
            | AppError::RequestTimeout(m)
            | AppError::Conflict(m)
            | AppError::PayloadTooLarge(m)
            | AppError::UnsupportedMediaType(m)
            | AppError::RateLimit(m)
            | AppError::Internal(m)
            | AppError::NotImplemented(m)
            | AppError::ServiceUnavailable(m) => m,
            AppError::MethodNotAllowed { .. } => "method not allowed",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl std::error::Error for AppError {}

/// Whether stack traces / internal detail may be included in error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorMode {
    Development,
    Production,
}

/// A predicate-matched transformer from a typed error into a response.
///
/// Filters are tried in registration order; the first one whose
/// [`ExceptionFilter::matches`] returns true produces the response. The
/// application always installs [`DefaultExceptionFilter`] as the tail so
/// every error maps to *some* response.
pub trait ExceptionFilter: Send + Sync {
    fn matches(&self, error: &AppError) -> bool;
    fn handle(&self, error: &AppError, mode: ErrorMode) -> Response;
}

/// Ordered chain of exception filters with a mandatory catch-all tail.
pub struct ExceptionFilterChain {
    filters: Vec<Box<dyn ExceptionFilter>>,
    mode: ErrorMode,
}

impl ExceptionFilterChain {
    pub fn new(mode: ErrorMode) -> Self {
        ExceptionFilterChain {
            filters: Vec::new(),
            mode,
        }
    }

    /// Register a filter ahead of the default catch-all.
    pub fn add(&mut self, filter: Box<dyn ExceptionFilter>) {
        self.filters.push(filter);
    }

    /// Convert an error into a response, trying user filters first and
    /// falling back to [`DefaultExceptionFilter`].
    pub fn handle(&self, error: &AppError) -> Response {
        for filter in &self.filters {
            if filter.matches(error) {
                return filter.handle(error, self.mode);
            }
        }
        DefaultExceptionFilter.handle(error, self.mode)
    }
}

/// The catch-all filter every application ships with: renders
/// `{success, error, code, details?}` as JSON.
pub struct DefaultExceptionFilter;

impl ExceptionFilter for DefaultExceptionFilter {
    fn matches(&self, _error: &AppError) -> bool {
        true
    }

    fn handle(&self, error: &AppError, mode: ErrorMode) -> Response {
        let status = error.status();
        let mut body = json!({
            "success": false,
            "error": error.message(),
            "code": status,
        });
        if mode == ErrorMode::Development {
            body["details"] = json!(format!("{:?}", error));
        }
        let mut response = Response::json_value(body, status);
        if let AppError::MethodNotAllowed { allow } = error {
            // `json_value` already ran the terminal send, so `state` is
            // `BodySent` and the guarded `set_header` would silently drop
            // this. Write the header directly.
            response.headers.set("Allow", allow.join(", "));
        }
        response
    }
}
