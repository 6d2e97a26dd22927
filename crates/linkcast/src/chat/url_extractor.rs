//! Pulls the requested link out of a chat message.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

static LINK_WITH_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^|>]+)\|[^>]+>").expect("valid regex"));

static BARE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^>]+)>").expect("valid regex"));

static HTTP_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)https?://(www\.)?[-a-z0-9@:%._+~#=]{1,256}\.[a-z0-9()]{1,6}\b([-a-z0-9()@:%_+.~#?&/=]*)",
    )
    .expect("valid regex")
});

/// Returns the first http(s) URL in `text`.
///
/// Slack wraps links as `<url|label>` or `<url>`; the markup is unwrapped
/// first so the label never leaks into the result.
pub fn extract_url(text: &str) -> Option<String> {
    let unwrapped = LINK_WITH_LABEL.replace_all(text, "$1");
    let unwrapped = BARE_LINK.replace_all(&unwrapped, "$1");

    let found = HTTP_URL.find(&unwrapped).map(|m| m.as_str().to_string());
    if found.is_none() {
        debug!(chars = text.chars().count(), "No URL in message");
    }
    found
}

/// Like [`extract_url`], but only returns URLs that parse with an http or
/// https scheme.
pub fn extract_and_validate_url(text: &str) -> Option<String> {
    let candidate = extract_url(text)?;
    match Url::parse(&candidate) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(candidate),
        _ => {
            debug!("Extracted URL failed validation");
            None
        }
    }
}

/// Prefers a URL in the mention itself, then falls back to the thread's
/// parent message.
pub fn extract_url_from_thread(mention_text: &str, parent_text: Option<&str>) -> Option<String> {
    extract_and_validate_url(mention_text)
        .or_else(|| parent_text.and_then(extract_and_validate_url))
}
