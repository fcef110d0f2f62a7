//! Cookie parsing and serialization.
//!
//! Parsing is lazy and memoized on first access (the lazy-init pattern the
//! teacher uses for `DISPLAY_LOGS` in `template.rs`, here applied per
//! request via `once_cell::sync::OnceCell` instead of a process-wide
//! static).

use std::collections::HashMap;

use base64::Engine;
use hmac::{Hmac, Mac};
use once_cell::sync::OnceCell;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Options attached to an outgoing `Set-Cookie` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOptions {
    pub domain: Option<String>,
    pub path: Option<String>,
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<String>,
}

/// A cookie to be sent with `set("Set-Cookie", ...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub options: CookieOptions,
}

/// Lazily-parsed, memoized view of the request's `Cookie` header.
#[derive(Debug, Default)]
pub struct CookieJar {
    raw: Option<String>,
    parsed: OnceCell<HashMap<String, String>>,
}

impl CookieJar {
    pub fn new(raw_header: Option<String>) -> Self {
        CookieJar {
            raw: raw_header,
            parsed: OnceCell::new(),
        }
    }

    /// Parses on first call, memoizes thereafter.
    pub fn all(&self) -> &HashMap<String, String> {
        self.parsed
            .get_or_init(|| parse_cookie_header(self.raw.as_deref().unwrap_or("")))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.all().get(name).map(|s| s.as_str())
    }
}

/// Parses a `Cookie:` header value into name/value pairs.
///
/// Values are URL-decoded; malformed pairs (no `=`, or an empty name) are
/// silently dropped, per spec.
pub fn parse_cookie_header(raw: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for pair in raw.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        map.insert(name.to_string(), percent_decode(value.trim()));
    }
    map
}

/// Serializes cookies back into the textual form a `Cookie:` header would
/// carry (`name=value; name2=value2`), used by the round-trip law
/// `serializeCookie(parseCookies(s))`.
pub fn serialize_cookie_header(cookies: &HashMap<String, String>) -> String {
    let mut names: Vec<&String> = cookies.keys().collect();
    names.sort();
    names
        .into_iter()
        .map(|name| format!("{}={}", name, percent_encode(&cookies[name])))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Renders a single `Set-Cookie` header value from name/value/options.
pub fn render_set_cookie(cookie: &SetCookie) -> String {
    let mut out = format!("{}={}", cookie.name, percent_encode(&cookie.value));
    let opts = &cookie.options;
    if let Some(domain) = &opts.domain {
        out.push_str(&format!("; Domain={}", domain));
    }
    out.push_str(&format!("; Path={}", opts.path.as_deref().unwrap_or("/")));
    if let Some(max_age) = opts.max_age {
        out.push_str(&format!("; Max-Age={}", max_age));
    }
    if opts.http_only {
        out.push_str("; HttpOnly");
    }
    if opts.secure {
        out.push_str("; Secure");
    }
    if let Some(same_site) = &opts.same_site {
        out.push_str(&format!("; SameSite={}", same_site));
    }
    out
}

/// Renders a `Set-Cookie` header that clears a cookie (empty value,
/// immediate expiry).
pub fn render_clear_cookie(name: &str, path: Option<&str>) -> String {
    format!("{}=; Path={}; Max-Age=0", name, path.unwrap_or("/"))
}

/// Signs `value` with HMAC-SHA256 keyed on `secret`, appending the
/// URL-safe-base64 digest as `value.signature`. Used by the signed-cookie
/// helpers callers reach for when a cookie must resist client-side
/// tampering (e.g. a session id).
pub fn sign(value: &str, secret: &str) -> String {
    format!("{value}.{}", encode_digest(digest(value.as_bytes(), secret.as_bytes())))
}

/// Reverses [`sign`]: returns the original value only if `signed` carries
/// a digest that matches `secret`. A tampered value or signature, or a
/// value signed under a different secret, yields `None`.
pub fn unsign(signed: &str, secret: &str) -> Option<String> {
    let (value, given_b64) = signed.rsplit_once('.')?;
    let given = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(given_b64).ok()?;
    let expected = digest(value.as_bytes(), secret.as_bytes());
    if constant_time_eq(&given, &expected) {
        Some(value.to_string())
    } else {
        None
    }
}

fn digest(value: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts a key of any length");
    mac.update(value);
    mac.finalize().into_bytes().to_vec()
}

fn encode_digest(digest: Vec<u8>) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn percent_decode(s: &str) -> String {
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

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_pairs() {
        let jar = CookieJar::new(Some("a=1; b=2".to_string()));
        assert_eq!(jar.get("a"), Some("1"));
        assert_eq!(jar.get("b"), Some("2"));
    }

    #[test]
    fn drops_malformed_pairs() {
        let jar = CookieJar::new(Some("a=1; noequals; =novalue; b=2".to_string()));
        assert_eq!(jar.all().len(), 2);
        assert_eq!(jar.get("a"), Some("1"));
        assert_eq!(jar.get("b"), Some("2"));
    }

    #[test]
    fn url_decodes_values() {
        let jar = CookieJar::new(Some("name=hello%20world".to_string()));
        assert_eq!(jar.get("name"), Some("hello world"));
    }

    #[test]
    fn memoizes_across_calls() {
        let jar = CookieJar::new(Some("a=1".to_string()));
        let first = jar.all() as *const _;
        let second = jar.all() as *const _;
        assert_eq!(first, second);
    }

    #[test]
    fn round_trips_through_serialize_and_parse() {
        let mut original = HashMap::new();
        original.insert("session".to_string(), "xyz 123".to_string());
        original.insert("theme".to_string(), "dark".to_string());

        let header = serialize_cookie_header(&original);
        let parsed = parse_cookie_header(&header);
        assert_eq!(parsed, original);
    }

    #[test]
    fn set_cookie_renders_options() {
        let cookie = SetCookie {
            name: "session".to_string(),
            value: "abc".to_string(),
            options: CookieOptions {
                http_only: true,
                secure: true,
                path: Some("/app".to_string()),
                max_age: Some(3600),
                same_site: Some("Strict".to_string()),
                domain: None,
            },
        };
        let rendered = render_set_cookie(&cookie);
        assert!(rendered.starts_with("session=abc"));
        assert!(rendered.contains("Path=/app"));
        assert!(rendered.contains("Max-Age=3600"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("Secure"));
        assert!(rendered.contains("SameSite=Strict"));
    }

    #[test]
    fn unsign_recovers_signed_value() {
        let signed = sign("user-42", "top-secret");
        assert_eq!(unsign(&signed, "top-secret"), Some("user-42".to_string()));
    }

    #[test]
    fn unsign_rejects_tampered_signature() {
        let mut signed = sign("user-42", "top-secret");
        signed.push('x');
        assert_eq!(unsign(&signed, "top-secret"), None);
    }

    #[test]
    fn unsign_rejects_wrong_secret() {
        let signed = sign("user-42", "top-secret");
        assert_eq!(unsign(&signed, "wrong-secret"), None);
    }

    #[test]
    fn unsign_rejects_value_without_signature() {
        assert_eq!(unsign("unsigned-value", "top-secret"), None);
    }
}
