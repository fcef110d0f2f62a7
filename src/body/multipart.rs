//! `multipart/form-data` parsing and (for tests) re-encoding.
//!
//! Spec.md §8 names `parseMultipart(buildMultipart(parts, boundary)) =
//! parts` as a round-trip law, so both directions live here.

use std::collections::HashMap;

use crate::error::AppError;

/// One field of a parsed multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartField {
    Text(String),
    File {
        filename: String,
        content_type: String,
        data: Vec<u8>,
    },
}

pub type MultipartForm = HashMap<String, Vec<MultipartField>>;

fn find_subslice(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

struct PartHeaders {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
}

fn parse_part_headers(raw: &str) -> Option<PartHeaders> {
    let mut name = None;
    let mut filename = None;
    let mut content_type = None;

    for line in raw.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        let (header_name, value) = line.split_once(':')?;
        let header_name = header_name.trim().to_ascii_lowercase();
        let value = value.trim();

        if header_name == "content-disposition" {
            for segment in value.split(';').skip(1) {
                let segment = segment.trim();
                if let Some(v) = segment.strip_prefix("name=") {
                    name = Some(v.trim_matches('"').to_string());
                } else if let Some(v) = segment.strip_prefix("filename=") {
                    filename = Some(v.trim_matches('"').to_string());
                }
            }
        } else if header_name == "content-type" {
            content_type = Some(value.to_string());
        }
    }

    Some(PartHeaders {
        name: name?,
        filename,
        content_type,
    })
}

/// Parses a multipart body given the `boundary` parameter extracted from
/// the request's `Content-Type` header.
pub fn parse(bytes: &[u8], boundary: &str) -> Result<MultipartForm, AppError> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut form: MultipartForm = HashMap::new();
    let mut cursor = find_subslice(bytes, delimiter, 0)
        .ok_or_else(|| AppError::BadRequest("multipart boundary not found".to_string()))?
        + delimiter.len();

    loop {
        // Final boundary is `--boundary--`.
        if bytes.get(cursor..cursor + 2) == Some(b"--") {
            break;
        }
        // Skip the CRLF after the boundary line.
        if bytes.get(cursor..cursor + 2) == Some(b"\r\n") {
            cursor += 2;
        }

        let header_end = find_subslice(bytes, b"\r\n\r\n", cursor)
            .ok_or_else(|| AppError::BadRequest("truncated multipart part headers".to_string()))?;
        let header_text = std::str::from_utf8(&bytes[cursor..header_end])
            .map_err(|_| AppError::BadRequest("multipart headers are not valid UTF-8".to_string()))?;
        let headers = parse_part_headers(header_text)
            .ok_or_else(|| AppError::BadRequest("missing Content-Disposition in multipart part".to_string()))?;

        let body_start = header_end + 4;
        let next_boundary = find_subslice(bytes, delimiter, body_start)
            .ok_or_else(|| AppError::BadRequest("truncated multipart part body".to_string()))?;
        // The part body ends two bytes before the boundary (its own
        // trailing CRLF).
        let body_end = next_boundary.saturating_sub(2).max(body_start);
        let data = bytes[body_start..body_end].to_vec();

        let field = match headers.filename {
            Some(filename) => MultipartField::File {
                filename,
                content_type: headers.content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
                data,
            },
            None => {
                let text = String::from_utf8(data)
                    .map_err(|_| AppError::BadRequest("multipart text field is not valid UTF-8".to_string()))?;
                MultipartField::Text(text)
            }
        };
        form.entry(headers.name).or_default().push(field);

        cursor = next_boundary + delimiter.len();
    }

    Ok(form)
}

/// Re-encodes a parsed form back into multipart wire format, used to
/// exercise the round-trip law in tests.
pub fn build(parts: &MultipartForm, boundary: &str) -> Vec<u8> {
    let mut out = Vec::new();
    let mut names: Vec<&String> = parts.keys().collect();
    names.sort();

    for name in names {
        for field in &parts[name] {
            out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            match field {
                MultipartField::Text(value) => {
                    out.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                    );
                    out.extend_from_slice(value.as_bytes());
                }
                MultipartField::File {
                    filename,
                    content_type,
                    data,
                } => {
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                        )
                        .as_bytes(),
                    );
                    out.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
                    out.extend_from_slice(data);
                }
            }
            out.extend_from_slice(b"\r\n");
        }
    }
    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_and_file_fields() {
        let body = b"--B\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\r\n\
hello\r\n\
--B\r\n\
Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\r\n\
file-bytes\r\n\
--B--\r\n";

        let form = parse(body, "B").unwrap();
        assert_eq!(form.get("title").unwrap(), &vec![MultipartField::Text("hello".to_string())]);
        match &form.get("upload").unwrap()[0] {
            MultipartField::File { filename, content_type, data } => {
                assert_eq!(filename, "a.txt");
                assert_eq!(content_type, "text/plain");
                assert_eq!(data, b"file-bytes");
            }
            _ => panic!("expected file field"),
        }
    }

    #[test]
    fn missing_boundary_is_bad_request() {
        let err = parse(b"no boundary here", "B").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn round_trips_build_then_parse() {
        let mut parts: MultipartForm = HashMap::new();
        parts.insert("name".to_string(), vec![MultipartField::Text("Ada".to_string())]);
        parts.insert(
            "avatar".to_string(),
            vec![MultipartField::File {
                filename: "pic.png".to_string(),
                content_type: "image/png".to_string(),
                data: vec![0xde, 0xad, 0xbe, 0xef],
            }],
        );

        let wire = build(&parts, "XYZ");
        let parsed = parse(&wire, "XYZ").unwrap();
        assert_eq!(parsed, parts);
    }
}
