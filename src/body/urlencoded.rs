//! `application/x-www-form-urlencoded` body parsing.

use std::collections::HashMap;

use crate::context::query::decode;
use crate::error::AppError;

/// Parses a urlencoded body into a multi-map, mirroring
/// [`crate::context::query::QueryMap`]'s shape (same wire grammar).
pub fn parse(bytes: &[u8]) -> Result<HashMap<String, Vec<String>>, AppError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| AppError::BadRequest(format!("urlencoded body is not valid UTF-8: {e}")))?;

    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for pair in text.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (decode(k), decode(v)),
            None => (decode(pair), String::new()),
        };
        if key.is_empty() {
            continue;
        }
        map.entry(key).or_default().push(value);
    }
    Ok(map)
}

/// Encodes a multi-map back into `application/x-www-form-urlencoded`
/// form, used by the round-trip tests.
pub fn encode(form: &HashMap<String, Vec<String>>) -> String {
    let mut keys: Vec<&String> = form.keys().collect();
    keys.sort();
    let mut pairs = Vec::new();
    for key in keys {
        for value in &form[key] {
            pairs.push(format!("{}={}", percent_encode(key), percent_encode(value)));
        }
    }
    pairs.join("&")
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_form_pairs_and_repeats() {
        let form = parse(b"name=Ada&tag=a&tag=b").unwrap();
        assert_eq!(form.get("name").unwrap(), &vec!["Ada".to_string()]);
        assert_eq!(form.get("tag").unwrap(), &vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn round_trips_modulo_field_order() {
        let mut original = HashMap::new();
        original.insert("a".to_string(), vec!["1".to_string()]);
        original.insert("b c".to_string(), vec!["2 3".to_string()]);

        let encoded = encode(&original);
        let parsed = parse(encoded.as_bytes()).unwrap();
        assert_eq!(parsed, original);
    }
}
