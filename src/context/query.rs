//! Query-string parsing into a multi-valued map (`?tag=a&tag=b`).

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct QueryMap {
    entries: HashMap<String, Vec<String>>,
}

impl QueryMap {
    pub fn parse(raw: &str) -> Self {
        let mut entries: HashMap<String, Vec<String>> = HashMap::new();
        for pair in raw.split('&') {
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
            entries.entry(key).or_default().push(value);
        }
        QueryMap { entries }
    }

    /// First value bound to `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|v| v.first()).map(|s| s.as_str())
    }

    /// All values bound to `key`.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(bytes[i]);
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Splits a raw request target into (path, query-string-or-empty),
/// stripping the `?` separator.
pub fn split_path_and_query(target: &str) -> (&str, &str) {
    match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    }
}
