//! Display-time rewriting of short-lived upstream image URLs.
//!
//! Images served by the upstream provider's blob host expire after a while.
//! References to that host are rewritten to the local proxy route, which
//! fetches the image on demand.

use reqwest::Url;

/// Route of the on-demand proxy.
pub const PROXY_PATH: &str = "/proxy";

/// Route under which stored artifacts are served.
pub const IMAGES_PATH: &str = "/images/";

/// Hosts whose URLs expire.
const EXPIRING_HOST_SUFFIXES: &[&str] = &["oaidalleapiprodscus.blob.core.windows.net"];

/// Whether `url` points at a host known to expire its links.
pub fn is_expiring_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    parsed.host_str().is_some_and(|host| {
        let host = host.to_ascii_lowercase();
        EXPIRING_HOST_SUFFIXES
            .iter()
            .any(|suffix| host == *suffix || host.ends_with(&format!(".{}", suffix)))
    })
}

/// Whether `reference` already points at the proxy route.
pub fn is_proxied(reference: &str) -> bool {
    reference == PROXY_PATH || reference.starts_with(&format!("{}?", PROXY_PATH))
}

/// Rewrites expiring upstream URLs to the proxy route. Local paths, proxy
/// paths and every other URL are returned unchanged.
pub fn rewrite_for_display(url: &str) -> String {
    if url.starts_with(IMAGES_PATH) || is_proxied(url) {
        return url.to_string();
    }
    if is_expiring_url(url) {
        return proxy_url(url);
    }
    url.to_string()
}

/// Builds `/proxy?src=<percent-encoded url>`.
pub fn proxy_url(src: &str) -> String {
    let mut base = Url::parse("http://localhost/").expect("static URL parses");
    base.set_path(PROXY_PATH);
    base.query_pairs_mut().append_pair("src", src);
    format!("{}?{}", PROXY_PATH, base.query().unwrap_or_default())
}

/// Extracts the original URL from a proxy reference.
pub fn proxied_source(reference: &str) -> Option<String> {
    if !is_proxied(reference) {
        return None;
    }
    let parsed = Url::parse(&format!("http://localhost{}", reference)).ok()?;
    parsed
        .query_pairs()
        .find(|(name, _)| name == "src")
        .map(|(_, value)| value.into_owned())
}
