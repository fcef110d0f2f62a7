//! The smart body parser (component D): content-type-driven, lazily
//! dispatched, size- and time-capped.
//!
//! Each format lives in its own submodule so it can be "loaded on first
//! use" — a request that never triggers multipart parsing never touches
//! `multipart::parse` or allocates anything multipart-shaped.

pub mod json;
pub mod limits;
pub mod multipart;
pub mod raw;
pub mod text;
pub mod urlencoded;

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::context::response::ByteStream;
use crate::error::AppError;
use crate::method::Method;

pub use multipart::{MultipartField, MultipartForm};

/// The parsed body, tagged by which parser produced it. `Empty` is the
/// sentinel for "no body" (GET/HEAD, or `Content-Length: 0` with no
/// chunked encoding) — the parser is never invoked in that case.
/// `Stream` is the streaming-threshold contract of spec.md §4.D: above
/// `BodySettings::streaming_threshold`, the body is surfaced as a lazy
/// chunk sequence instead of a fully materialized value, regardless of
/// content-type.
pub enum ParsedBody {
    Empty,
    Json(Value),
    Form(HashMap<String, Vec<String>>),
    Multipart(MultipartForm),
    Text(String),
    Raw(Vec<u8>),
    Stream(ByteStream),
}

impl std::fmt::Debug for ParsedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParsedBody::Empty => write!(f, "Empty"),
            ParsedBody::Json(v) => f.debug_tuple("Json").field(v).finish(),
            ParsedBody::Form(v) => f.debug_tuple("Form").field(v).finish(),
            ParsedBody::Multipart(v) => f.debug_tuple("Multipart").field(v).finish(),
            ParsedBody::Text(v) => f.debug_tuple("Text").field(v).finish(),
            ParsedBody::Raw(v) => write!(f, "Raw({} bytes)", v.len()),
            ParsedBody::Stream(_) => write!(f, "Stream(..)"),
        }
    }
}

/// Body-parser configuration; every field has a conservative documented
/// default.
#[derive(Debug, Clone)]
pub struct BodySettings {
    pub max_size: usize,
    pub timeout: Duration,
    pub streaming_threshold: usize,
    /// Whether a body over `streaming_threshold` is surfaced as
    /// [`ParsedBody::Stream`] at all; when `false`, `streaming_threshold`
    /// is ignored and every body under `max_size` is parsed normally.
    pub streaming_enabled: bool,
    pub strict_content_type: bool,
}

impl Default for BodySettings {
    fn default() -> Self {
        BodySettings {
            max_size: 10 * 1024 * 1024,
            timeout: Duration::from_secs(5),
            streaming_threshold: 2 * 1024 * 1024,
            streaming_enabled: true,
            strict_content_type: true,
        }
    }
}

/// Per-content-type invocation counters, optional metrics support: when
/// enabled, the parser records per-content-type counters.
#[derive(Debug, Clone, Default)]
pub struct ParserMetrics {
    counts: HashMap<&'static str, u64>,
}

impl ParserMetrics {
    fn record(&mut self, kind: &'static str) {
        *self.counts.entry(kind).or_insert(0) += 1;
    }

    pub fn count(&self, kind: &str) -> u64 {
        self.counts.get(kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

fn extract_boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .find_map(|param| param.trim().strip_prefix("boundary=").map(|v| v.trim_matches('"').to_string()))
}

fn base_media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}

/// Returns true when the request, per method and headers, carries no body
/// at all: GET/HEAD, or `Content-Length: 0` with no chunked
/// transfer-encoding.
pub fn request_has_no_body(method: Method, content_length: Option<usize>, chunked: bool) -> bool {
    if matches!(method, Method::Get | Method::Head) {
        return true;
    }
    !chunked && content_length.unwrap_or(0) == 0
}

/// Dispatches already-read `bytes` to the parser selected by
/// `content_type`, recording metrics if `metrics` is supplied. This is
/// the only entry point the application core calls; raw socket reads
/// (and their size/timeout enforcement) happen in [`limits`] before this
/// is reached.
pub fn parse(
    content_type: Option<&str>,
    bytes: &[u8],
    settings: &BodySettings,
    metrics: Option<&mut ParserMetrics>,
) -> Result<ParsedBody, AppError> {
    if settings.streaming_enabled && bytes.len() > settings.streaming_threshold {
        if let Some(metrics) = metrics {
            metrics.record("stream");
        }
        return Ok(ParsedBody::Stream(limits::chunk_buffer(bytes.to_vec())));
    }

    let Some(content_type) = content_type else {
        if settings.strict_content_type {
            return Err(AppError::UnsupportedMediaType(
                "missing Content-Type for a request with a body".to_string(),
            ));
        }
        if let Some(metrics) = metrics {
            metrics.record("raw");
        }
        return Ok(ParsedBody::Raw(raw::parse(bytes)));
    };

    let media = base_media_type(content_type);

    let result = if media == "application/json" || (media.starts_with("application/") && media.ends_with("+json")) {
        json::parse(bytes).map(ParsedBody::Json)
    } else if media == "application/x-www-form-urlencoded" {
        urlencoded::parse(bytes).map(ParsedBody::Form)
    } else if media == "multipart/form-data" {
        let boundary = extract_boundary(content_type)
            .ok_or_else(|| AppError::BadRequest("multipart/form-data missing boundary parameter".to_string()))?;
        multipart::parse(bytes, &boundary).map(ParsedBody::Multipart)
    } else if media.starts_with("text/") {
        text::parse(bytes, content_type).map(ParsedBody::Text)
    } else if settings.strict_content_type {
        return Err(AppError::UnsupportedMediaType(format!(
            "unrecognized Content-Type: {media}"
        )));
    } else {
        Ok(ParsedBody::Raw(raw::parse(bytes)))
    };

    if let (Ok(parsed), Some(metrics)) = (&result, metrics) {
        metrics.record(match parsed {
            ParsedBody::Json(_) => "json",
            ParsedBody::Form(_) => "form",
            ParsedBody::Multipart(_) => "multipart",
            ParsedBody::Text(_) => "text",
            ParsedBody::Raw(_) => "raw",
            ParsedBody::Empty => "empty",
            ParsedBody::Stream(_) => "stream",
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_body_for_get_and_head() {
        assert!(request_has_no_body(Method::Get, None, false));
        assert!(request_has_no_body(Method::Head, Some(10), false));
    }

    #[test]
    fn no_body_for_zero_content_length() {
        assert!(request_has_no_body(Method::Post, Some(0), false));
        assert!(!request_has_no_body(Method::Post, Some(0), true));
    }

    #[test]
    fn dispatches_json() {
        let settings = BodySettings::default();
        let body = parse(Some("application/json"), br#"{"a":1}"#, &settings, None).unwrap();
        assert!(matches!(body, ParsedBody::Json(_)));
    }

    #[test]
    fn dispatches_json_plus_suffix() {
        let settings = BodySettings::default();
        let body = parse(Some("application/ld+json"), br#"{}"#, &settings, None).unwrap();
        assert!(matches!(body, ParsedBody::Json(_)));
    }

    #[test]
    fn dispatches_multipart_with_boundary() {
        let settings = BodySettings::default();
        let wire = multipart::build(
            &HashMap::from([(
                "a".to_string(),
                vec![MultipartField::Text("1".to_string())],
            )]),
            "B",
        );
        let body = parse(Some("multipart/form-data; boundary=B"), &wire, &settings, None).unwrap();
        assert!(matches!(body, ParsedBody::Multipart(_)));
    }

    #[test]
    fn strict_mode_rejects_unknown_content_type() {
        let settings = BodySettings::default();
        let err = parse(Some("application/x-custom"), b"data", &settings, None).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedMediaType(_)));
    }

    #[test]
    fn non_strict_mode_falls_back_to_raw() {
        let mut settings = BodySettings::default();
        settings.strict_content_type = false;
        let body = parse(Some("application/x-custom"), b"data", &settings, None).unwrap();
        assert!(matches!(body, ParsedBody::Raw(_)));
    }

    #[test]
    fn body_over_streaming_threshold_surfaces_as_a_stream() {
        let mut settings = BodySettings::default();
        settings.streaming_threshold = 8;
        let body = parse(Some("application/json"), b"{\"a\":123456}", &settings, None).unwrap();
        assert!(matches!(body, ParsedBody::Stream(_)));
    }

    #[test]
    fn streaming_disabled_ignores_the_threshold() {
        let mut settings = BodySettings::default();
        settings.streaming_threshold = 8;
        settings.streaming_enabled = false;
        let body = parse(Some("application/json"), b"{\"a\":123456}", &settings, None).unwrap();
        assert!(matches!(body, ParsedBody::Json(_)));
    }

    #[test]
    fn metrics_count_by_content_type() {
        let settings = BodySettings::default();
        let mut metrics = ParserMetrics::default();
        parse(Some("application/json"), b"1", &settings, Some(&mut metrics)).unwrap();
        parse(Some("text/plain"), b"hi", &settings, Some(&mut metrics)).unwrap();
        assert_eq!(metrics.count("json"), 1);
        assert_eq!(metrics.count("text"), 1);
        assert_eq!(metrics.total(), 2);
    }
}
