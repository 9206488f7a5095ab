//! Article discovery on HTML listing pages.
//!
//! Official sites rarely publish feeds, but their "news" pages link to every
//! recent article. All anchors on the page are resolved against the page URL,
//! reduced to same-site article-looking targets, scored, and the best `limit`
//! are returned for individual fetching.

use crate::utils::{bare_host, clean_text};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(19|20)\d{2}(/|-|$)").unwrap());
static DATE_IN_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(19|20)\d{2}[/-]\d{1,2}([/-]\d{1,2})?").unwrap());
static NUMERIC_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4,}").unwrap());

/// Extensions that mark a target as a downloadable asset rather than a page.
const ASSET_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "zip", "rar", "jpg", "jpeg",
    "png", "gif", "webp", "svg", "bmp", "ico", "css", "js", "json", "xml", "mp3", "mp4", "avi",
    "wav", "txt", "csv",
];

/// Path words that suggest an article.
const ARTICLE_WORDS: &[&str] = &["noticia", "noticias", "news", "artigo", "materia", "imprensa", "comunicado"];

/// Path words that suggest navigation, taxonomy or utility pages.
const NAVIGATION_WORDS: &[&str] = &[
    "tag", "tags", "categoria", "category", "autor", "author", "page", "pagina", "login", "busca",
    "search", "contato", "contact", "sobre", "about", "feed", "rss", "wp-admin", "wp-login",
    "privacidade", "privacy", "ouvidoria", "transparencia",
];

/// One candidate article link.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingCandidate {
    pub url: String,
    /// Visible anchor text, used as the fallback title.
    pub anchor_text: String,
    pub score: i32,
}

fn is_asset(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    path.rsplit('/')
        .next()
        .and_then(|last| last.rsplit_once('.'))
        .is_some_and(|(_, ext)| ASSET_EXTENSIONS.contains(&ext))
}

fn path_segments(url: &Url) -> Vec<String> {
    url.path_segments()
        .map(|segs| {
            segs.filter(|s| !s.is_empty())
                .map(|s| s.to_ascii_lowercase())
                .collect()
        })
        .unwrap_or_default()
}

/// Heuristic article-likeness of a same-site link.
///
/// Rewards dates or years in the path, slug-like final segments, article
/// words, long paths and numeric ids; penalizes navigation words and very
/// short paths.
pub fn score_candidate(url: &Url, anchor_text: &str) -> i32 {
    let path = url.path().to_ascii_lowercase();
    let segments = path_segments(url);
    let mut score = 0;

    if DATE_IN_PATH_RE.is_match(&path) {
        score += 4;
    } else if YEAR_RE.is_match(&path) {
        score += 2;
    }

    if let Some(last) = segments.last() {
        let words = last.split(['-', '_']).filter(|w| !w.is_empty()).count();
        if words >= 4 {
            score += 3;
        } else if words >= 2 {
            score += 1;
        }
        if NUMERIC_ID_RE.is_match(last) {
            score += 1;
        }
    }

    if segments
        .iter()
        .any(|s| ARTICLE_WORDS.iter().any(|w| s.contains(w)))
    {
        score += 2;
    }
    if segments.len() >= 2 {
        score += 1;
    }
    if path.len() > 40 {
        score += 1;
    }
    if anchor_text.chars().count() >= 25 {
        score += 1;
    }

    if segments
        .iter()
        .any(|s| NAVIGATION_WORDS.contains(&s.as_str()))
    {
        score -= 4;
    }
    if segments.len() <= 1 && segments.last().is_none_or(|s| !s.contains('-')) {
        score -= 2;
    }

    score
}

/// Find the most article-like same-site links on a listing page.
///
/// # Arguments
///
/// * `html` - Listing page markup
/// * `page_url` - URL the page was served from, used to resolve relative links
/// * `limit` - Maximum number of candidates to return
///
/// # Returns
///
/// At most `limit` candidates with a positive score, best first; ties keep
/// page order. An unparseable `page_url` yields nothing.
pub fn discover_articles(html: &str, page_url: &str, limit: usize) -> Vec<ListingCandidate> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let Some(site) = bare_host(&base) else {
        return Vec::new();
    };
    let Ok(anchor_sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut page_no_fragment = base.clone();
    page_no_fragment.set_fragment(None);

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    let mut total = 0usize;

    for anchor in document.select(&anchor_sel) {
        total += 1;
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        let lower = href.to_ascii_lowercase();
        if href.is_empty()
            || href.starts_with('#')
            || lower.starts_with("mailto:")
            || lower.starts_with("tel:")
            || lower.starts_with("javascript:")
        {
            continue;
        }
        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        resolved.set_fragment(None);
        if !matches!(resolved.scheme(), "http" | "https")
            || bare_host(&resolved).as_deref() != Some(site.as_str())
            || resolved == page_no_fragment
            || is_asset(&resolved)
        {
            continue;
        }

        let key = resolved.to_string();
        if !seen.insert(key.clone()) {
            // Same target linked twice (image + headline): keep the longer text.
            let text = clean_text(&anchor.text().collect::<Vec<_>>().join(" "));
            if let Some(existing) = candidates
                .iter_mut()
                .find(|c: &&mut ListingCandidate| c.url == key)
            {
                if text.len() > existing.anchor_text.len() {
                    existing.anchor_text = text;
                }
            }
            continue;
        }

        let anchor_text = clean_text(&anchor.text().collect::<Vec<_>>().join(" "));
        let anchor_text = if anchor_text.is_empty() {
            anchor
                .value()
                .attr("title")
                .map(clean_text)
                .unwrap_or_default()
        } else {
            anchor_text
        };
        candidates.push(ListingCandidate {
            score: 0,
            url: key,
            anchor_text,
        });
    }

    for c in candidates.iter_mut() {
        if let Ok(url) = Url::parse(&c.url) {
            c.score = score_candidate(&url, &c.anchor_text);
        }
    }
    candidates.retain(|c| c.score > 0);
    // Stable sort keeps page order among equal scores.
    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates.truncate(limit);

    debug!(
        anchors = total,
        kept = candidates.len(),
        page = %page_url,
        "Ranked listing candidates"
    );
    candidates
}
