//! Case-insensitive header storage shared by requests and responses.

use std::collections::HashMap;

/// A header map that normalizes keys for lookup but remembers the casing
/// it was first inserted with, so a response written with `X-Request-Id`
/// round-trips on the wire as `X-Request-Id`, not `x-request-id`.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    // normalized (lowercase) key -> (original-case key, values)
    entries: HashMap<String, (String, Vec<String>)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        HeaderMap {
            entries: HashMap::new(),
        }
    }

    fn norm(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    /// Insert, replacing any existing value(s) for this header name.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .insert(Self::norm(name), (name.to_string(), vec![value.into()]));
    }

    /// Append a value, keeping any existing ones (used for repeated
    /// headers such as `Set-Cookie`).
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let key = Self::norm(name);
        self.entries
            .entry(key)
            .and_modify(|(_, values)| values.push(value.into()))
            .or_insert_with(|| (name.to_string(), vec![value.into()]));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&Self::norm(name))
            .and_then(|(_, values)| values.first())
            .map(|s| s.as_str())
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .get(&Self::norm(name))
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&Self::norm(name))
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.remove(&Self::norm(name));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in (original-case-name, value) pairs, one per value, in the
    /// order needed to serialize the header block of an HTTP response.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut h = HeaderMap::new();
        h.set("Content-Type", "application/json");
        assert_eq!(h.get("content-type"), Some("application/json"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn preserves_first_insert_casing() {
        let mut h = HeaderMap::new();
        h.set("X-Request-Id", "abc");
        let (name, _) = h.entries.get("x-request-id").unwrap();
        assert_eq!(name, "X-Request-Id");
    }

    #[test]
    fn append_keeps_multiple_values() {
        let mut h = HeaderMap::new();
        h.append("Set-Cookie", "a=1");
        h.append("Set-Cookie", "b=2");
        assert_eq!(h.get_all("set-cookie"), &["a=1".to_string(), "b=2".to_string()]);
    }
}
