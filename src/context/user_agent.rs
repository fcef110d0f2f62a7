//! A small, deliberately unscientific `User-Agent` rule table.
//!
//! A documented-but-unscientific mapping is fine as long as it is
//! consistent: this one checks a short ordered list of substrings, first
//! match wins, the same ordered-fallback style used elsewhere for route
//! matching.

/// Parsed user-agent summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgent {
    pub browser: String,
    pub os: String,
    pub device: String,
    pub is_mobile: bool,
    pub is_bot: bool,
}

const BOT_MARKERS: &[&str] = &["bot", "spider", "crawler", "curl", "wget", "httpclient"];
const BROWSER_TABLE: &[(&str, &str)] = &[
    ("edg/", "Edge"),
    ("chrome/", "Chrome"),
    ("crios/", "Chrome"),
    ("firefox/", "Firefox"),
    ("fxios/", "Firefox"),
    ("safari/", "Safari"),
];
const OS_TABLE: &[(&str, &str)] = &[
    ("windows nt", "Windows"),
    ("android", "Android"),
    ("iphone", "iOS"),
    ("ipad", "iOS"),
    ("mac os x", "macOS"),
    ("linux", "Linux"),
];

/// Parses a raw `User-Agent` header value.
pub fn parse(raw: &str) -> UserAgent {
    let lower = raw.to_ascii_lowercase();

    let is_bot = BOT_MARKERS.iter().any(|m| lower.contains(m));
    let is_mobile = lower.contains("mobile") || lower.contains("android") || lower.contains("iphone");

    let mut browser = "Unknown".to_string();
    for (marker, name) in BROWSER_TABLE {
        if lower.contains(marker) {
            // Safari UA strings also contain "chrome/" on some Chromium
            // forks; since Chrome/Edge entries are listed first, the
            // first textual match in BROWSER_TABLE order wins, mirroring
            // how browsers themselves resolve these UA string ambiguities.
            browser = name.to_string();
            break;
        }
    }

    let mut os = "Unknown".to_string();
    for (marker, name) in OS_TABLE {
        if lower.contains(marker) {
            os = name.to_string();
            break;
        }
    }

    let device = if lower.contains("ipad") || lower.contains("tablet") {
        "Tablet".to_string()
    } else if is_mobile {
        "Mobile".to_string()
    } else {
        "Desktop".to_string()
    };

    UserAgent {
        browser,
        os,
        device,
        is_mobile,
        is_bot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_desktop_browser() {
        let ua = parse(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36",
        );
        assert_eq!(ua.browser, "Chrome");
        assert_eq!(ua.os, "Windows");
        assert_eq!(ua.device, "Desktop");
        assert!(!ua.is_mobile);
        assert!(!ua.is_bot);
    }

    #[test]
    fn detects_mobile_and_bot() {
        let ua = parse("Mozilla/5.0 (Linux; Android 13) Mobile");
        assert!(ua.is_mobile);
        assert_eq!(ua.device, "Mobile");

        let bot = parse("Googlebot/2.1 (+http://www.google.com/bot.html)");
        assert!(bot.is_bot);
    }
}
