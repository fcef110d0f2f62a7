//! `text/*` body parsing. UTF-8 by default, respecting an explicit
//! `charset` parameter when it names a UTF-8-compatible encoding.

use crate::error::AppError;

fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .find_map(|param| param.trim().strip_prefix("charset=").map(|v| v.trim_matches('"').to_ascii_lowercase()))
}

pub fn parse(bytes: &[u8], content_type: &str) -> Result<String, AppError> {
    let charset = charset_from_content_type(content_type).unwrap_or_else(|| "utf-8".to_string());
    match charset.as_str() {
        "utf-8" | "utf8" | "us-ascii" | "ascii" => String::from_utf8(bytes.to_vec())
            .map_err(|e| AppError::BadRequest(format!("text body is not valid {charset}: {e}"))),
        other => Err(AppError::UnsupportedMediaType(format!(
            "unsupported text charset: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_default_utf8() {
        let text = parse("héllo".as_bytes(), "text/plain").unwrap();
        assert_eq!(text, "héllo");
    }

    #[test]
    fn respects_explicit_utf8_charset() {
        let text = parse(b"hi", "text/plain; charset=UTF-8").unwrap();
        assert_eq!(text, "hi");
    }

    #[test]
    fn rejects_unsupported_charset() {
        let err = parse(b"hi", "text/plain; charset=latin1").unwrap_err();
        assert!(matches!(err, AppError::UnsupportedMediaType(_)));
    }
}
