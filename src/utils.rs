//! Text, URL and file-system helpers shared by the pipeline stages.
//!
//! - Markup stripping and whitespace collapsing for feed and page text
//! - Summary and log truncation
//! - Stable record ids
//! - URL canonicalization, host comparison and absolutization
//! - Output directory validation

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Element tags, comments and declarations; a bare `<` or `>` in prose is left alone.
static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:/?[A-Za-z][A-Za-z0-9:-]*(?:\s[^<>]*)?/?|!--.*?--|![A-Za-z][^<>]*|\?[^<>]*\?)>").unwrap()
});
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static NBSP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\u{00A0}\u{2009}\u{202F}]").unwrap());

/// Maximum summary length in characters before an ellipsis is appended.
pub const SUMMARY_MAX_CHARS: usize = 220;

/// Decode entities, drop tags and collapse whitespace.
///
/// Entities are decoded twice because feeds routinely double-escape HTML
/// inside `<description>` (`&amp;lt;p&amp;gt;`).
pub fn clean_text(input: &str) -> String {
    if input.trim().is_empty() {
        return String::new();
    }
    let once = html_escape::decode_html_entities(input);
    let decoded = html_escape::decode_html_entities(&once);
    let without_tags = HTML_TAG_RE.replace_all(&decoded, " ");
    let without_nbsp = NBSP_RE.replace_all(&without_tags, " ");
    WHITESPACE_RE.replace_all(&without_nbsp, " ").trim().to_string()
}

/// Cut a cleaned summary to [`SUMMARY_MAX_CHARS`], ending in `…` when cut.
pub fn truncate_summary(s: &str) -> String {
    if s.chars().count() <= SUMMARY_MAX_CHARS {
        return s.to_string();
    }
    let head: String = s.chars().take(SUMMARY_MAX_CHARS).collect();
    format!("{}…", head.trim_end())
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` bytes (on a char boundary) with a
/// `"…(+N bytes)"` marker appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Deterministic id for a record, derived from its URL (or title when the URL is empty).
///
/// The same input always yields the same id across runs so consumers can cache by it.
pub fn stable_id(url: &str, title: &str) -> String {
    let key = if url.trim().is_empty() { title.trim() } else { url.trim() };
    let digest = Sha256::digest(key.as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// Normalize an article URL for comparison and output.
///
/// Drops the fragment and `utm_*` tracking parameters. Unparseable input is
/// returned trimmed but otherwise untouched.
pub fn canonicalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    url.set_fragment(None);

    let total = url.query_pairs().count();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.to_ascii_lowercase().starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else if kept.len() != total {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.to_string()
}

/// Host of a URL without a leading `www.`, lowercased.
pub fn bare_host(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
}

/// Whether `host` equals `domain` or is a subdomain of it.
pub fn host_matches(host: &str, domain: &str) -> bool {
    let host = host.trim_start_matches("www.").to_ascii_lowercase();
    let domain = domain.trim_start_matches("www.").to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Resolve a possibly relative URL against `base`, keeping only http(s) results.
///
/// Handles protocol-relative (`//cdn...`) and root-relative (`/img/...`) forms.
pub fn absolutize(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let resolved = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(raw).ok()?,
        Err(_) => return None,
    };
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

/// Ensure the parent directory of `path` exists and is writable.
///
/// Creates the directory if needed, then writes and removes a scratch file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    fs::create_dir_all(&dir).await?;
    let scratch_path = dir.join(".__write_check__");
    stdfs::File::create(&scratch_path)?;
    let _ = stdfs::remove_file(&scratch_path);
    info!(dir = %dir.display(), "Output directory is writable");
    Ok(())
}
