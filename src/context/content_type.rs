//! Content-type helpers: media-type pattern matching (`ctx.is`), content
//! negotiation (`ctx.accepts`) and the extension-to-mime-type table used by
//! `send`'s smart content-type inference.

/// Built-in extension → mime-type table covering common static-asset types.
const EXTENSION_TABLE: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("csv", "text/csv"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
    ("ico", "image/x-icon"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("zip", "application/zip"),
    ("pdf", "application/pdf"),
];

/// Looks up the mime type for a file extension (without the leading dot),
/// falling back to `application/octet-stream`.
pub fn mime_for_extension(ext: &str) -> &'static str {
    let ext = ext.to_ascii_lowercase();
    EXTENSION_TABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or("application/octet-stream")
}

/// Looks up the mime type from a path's extension, if any.
pub fn mime_for_path(path: &str) -> &'static str {
    match path.rsplit_once('.') {
        Some((_, ext)) => mime_for_extension(ext),
        None => "application/octet-stream",
    }
}

/// Splits a `Content-Type` header value into (type, subtype), ignoring any
/// `; charset=...`/`; boundary=...` parameters.
fn split_type(content_type: &str) -> (String, String) {
    let base = content_type.split(';').next().unwrap_or("").trim();
    match base.split_once('/') {
        Some((t, s)) => (t.to_ascii_lowercase(), s.to_ascii_lowercase()),
        None => (base.to_ascii_lowercase(), String::new()),
    }
}

/// Returns true if `content_type` matches `pattern`, where pattern may use
/// `*` for either half (`application/*`, `*/json`) or a `+suffix` form
/// (`application/*+json` matches `application/ld+json`).
pub fn matches_media_pattern(content_type: &str, pattern: &str) -> bool {
    let (ct_type, ct_subtype) = split_type(content_type);
    let (p_type, p_subtype) = split_type(pattern);

    let type_ok = p_type == "*" || p_type == ct_type;
    let subtype_ok = if p_subtype == "*" {
        true
    } else if let Some(suffix) = p_subtype.strip_prefix("*+") {
        ct_subtype.ends_with(&format!("+{}", suffix)) || ct_subtype == suffix
    } else {
        p_subtype == ct_subtype
    };

    type_ok && subtype_ok
}

/// One entry of a parsed `Accept` header: a media pattern plus its
/// quality value (defaults to 1.0).
#[derive(Debug, Clone)]
struct AcceptEntry {
    pattern: String,
    quality: f32,
}

/// Parses an `Accept` header into quality-sorted entries (highest first).
fn parse_accept(header: &str) -> Vec<AcceptEntry> {
    let mut entries: Vec<AcceptEntry> = header
        .split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            let mut segments = part.split(';');
            let pattern = segments.next()?.trim().to_string();
            let mut quality = 1.0f32;
            for seg in segments {
                let seg = seg.trim();
                if let Some(q) = seg.strip_prefix("q=") {
                    quality = q.trim().parse().unwrap_or(1.0);
                }
            }
            Some(AcceptEntry { pattern, quality })
        })
        .collect();
    entries.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap_or(std::cmp::Ordering::Equal));
    entries
}

/// Returns the best match from `offered` against the request's `Accept`
/// header, or `None` if nothing offered is acceptable (caller should
/// respond 406).
pub fn best_accepted<'a>(accept_header: Option<&str>, offered: &[&'a str]) -> Option<&'a str> {
    let header = accept_header.unwrap_or("*/*");
    let entries = parse_accept(header);
    if entries.is_empty() {
        return offered.first().copied();
    }
    for entry in &entries {
        if entry.quality <= 0.0 {
            continue;
        }
        for candidate in offered {
            if matches_media_pattern(candidate, &entry.pattern) {
                return Some(candidate);
            }
        }
    }
    None
}
