//! Scrubbing of credentials from messages surfaced to the host.
//!
//! Error text from tools can embed URLs, command lines or HTTP headers. Before
//! such text leaves the process it goes through [`sanitize_message`]; the
//! unmodified detail is only ever written to the diagnostic channel.

use std::sync::LazyLock;

use regex::Regex;

const REDACTED: &str = "[REDACTED]";

/// Longest message forwarded to the host.
const MAX_MESSAGE_CHARS: usize = 2048;

static PRIVATE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)-----BEGIN [A-Z ]*PRIVATE KEY-----.*?(-----END [A-Z ]*PRIVATE KEY-----|$)")
        .expect("valid private key pattern")
});

static URL_USERINFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<scheme>[a-zA-Z][a-zA-Z0-9+.-]*://)[^/\s:@]+:[^/\s@]+@")
        .expect("valid userinfo pattern")
});

static AUTH_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?P<key>authorization|proxy-authorization|x-api-key|cookie)\s*:\s*[^\r\n,}]+")
        .expect("valid header pattern")
});

static BEARER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?P<kind>bearer|basic)\s+[A-Za-z0-9._~+/=-]{8,}")
        .expect("valid bearer pattern")
});

static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?P<key>password|passwd|pwd|secret|token|api[_-]?key|access[_-]?key|client[_-]?secret)(?P<sep>["']?\s*[=:]\s*["']?)[^\s&"',;}]+"#,
    )
    .expect("valid key/value pattern")
});

/// Remove credentials and bound the length of a host-facing message.
pub fn sanitize_message(message: &str) -> String {
    let cleaned = PRIVATE_KEY.replace_all(message, REDACTED);
    let cleaned = URL_USERINFO.replace_all(&cleaned, format!("${{scheme}}{}@", REDACTED));
    let cleaned = AUTH_HEADER.replace_all(&cleaned, format!("${{key}}: {}", REDACTED));
    let cleaned = BEARER.replace_all(&cleaned, format!("${{kind}} {}", REDACTED));
    let cleaned = KEY_VALUE.replace_all(&cleaned, format!("${{key}}${{sep}}{}", REDACTED));

    truncate_chars(&cleaned, MAX_MESSAGE_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
