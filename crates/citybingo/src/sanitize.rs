//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Signed download URLs carry credentials in their query string; these
//! helpers keep them out of logs.

use std::path::Path;

use reqwest::Url;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Drops userinfo, query and fragment from a URL.
///
/// - `https://host/a.png?sig=secret` → `https://host/a.png?…`
/// - `https://user:pw@host/a.png` → `https://host/a.png`
/// - `data:image/png;base64,...` → `data:image/png`
pub fn redact_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("data:") {
        let header = rest.split([';', ',']).next().unwrap_or_default();
        return format!("data:{}", header);
    }

    let Ok(mut parsed) = Url::parse(url) else {
        return "<invalid url>".to_string();
    };
    let had_query = parsed.query().is_some();
    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);
    parsed.set_query(None);
    parsed.set_fragment(None);

    if had_query {
        format!("{}?…", parsed)
    } else {
        parsed.to_string()
    }
}
