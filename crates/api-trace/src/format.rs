//! Text formatting for trace output: JSON pretty-printing, URL trimming and
//! method padding.

/// Pretty-print a body if it parses as JSON, otherwise return it unchanged.
pub fn pretty_json(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| body.to_string()),
        Err(_) => body.to_string(),
    }
}

/// Cut `s` to at most `max_chars` characters, appending `...` when cut.
pub fn trim_str(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Shorten a URL for display when it is a `data:` URL or matches one of the
/// long-URL patterns.
pub fn display_url(url: &str, long_url_patterns: &[String], max_chars: usize) -> String {
    let long = url.starts_with("data:")
        || long_url_patterns
            .iter()
            .any(|p| !p.is_empty() && url.contains(p.as_str()));
    if long {
        trim_str(url, max_chars)
    } else {
        url.to_string()
    }
}

/// Pad an HTTP method to the width of `POST` so summary columns line up.
pub fn pad_method(method: &str) -> String {
    format!("{method:<4}")
}
