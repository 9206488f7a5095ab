//! Article-page metadata enrichment.
//!
//! Feed entries often lack an image or a date, and aggregator links hide the
//! publisher's URL behind a redirector. [`Enricher::enrich`] follows the link,
//! reads the article page's embedded metadata and reports what it found
//! together with the fetch failure, if any. It never fails: the caller merges
//! whatever subset came back with the feed values.

use crate::config::Config;
use crate::dates::{find_in_text, local_offset, parse_instant};
use crate::fetcher::{FetchError, FetchedPage, HttpFetch};
use crate::models::EnrichedItem;
use crate::utils::{absolutize, bare_host, canonicalize_url, clean_text, host_matches};
use chrono::{DateTime, FixedOffset, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

static LD_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""datePublished"\s*:\s*"([^"]+)""#).unwrap());

const TITLE_META: &[&str] = &["meta[property='og:title']", "meta[name='twitter:title']"];

const SITE_NAME_META: &[&str] = &["meta[property='og:site_name']", "meta[name='application-name']"];

const IMAGE_META: &[&str] = &[
    "meta[property='og:image']",
    "meta[property='og:image:url']",
    "meta[property='og:image:secure_url']",
    "meta[name='twitter:image']",
    "meta[name='twitter:image:src']",
    "meta[property='twitter:image']",
];

const DATE_META: &[&str] = &[
    "meta[property='article:published_time']",
    "meta[name='article:published_time']",
    "meta[itemprop='datePublished']",
    "meta[property='og:published_time']",
    "meta[name='pubdate']",
    "meta[name='publishdate']",
    "meta[name='DC.date.issued']",
    "meta[name='date']",
    "meta[property='og:updated_time']",
];

/// What an article page says about itself.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub site_name: Option<String>,
    /// Absolute image URL, before aggregator-host rejection.
    pub image_url: Option<String>,
    /// Date from structured metadata (meta tags, JSON-LD, `<time>`).
    pub published_at: Option<DateTime<Utc>>,
    /// Date guessed from the visible text.
    pub text_published_at: Option<DateTime<Utc>>,
    /// `<link rel="canonical">`, absolute.
    pub canonical_url: Option<String>,
}

/// Result of enriching one article link.
#[derive(Debug)]
pub struct EnrichOutcome {
    pub item: EnrichedItem,
    /// First fetch failure met while resolving or downloading the page.
    pub error: Option<FetchError>,
}

/// Follows article links and extracts page metadata.
#[derive(Debug, Clone)]
pub struct Enricher {
    aggregator_domains: Vec<String>,
    aggregator_image_hosts: Vec<String>,
    offset: FixedOffset,
}

fn selector(selector: &str) -> Option<Selector> {
    Selector::parse(selector).ok()
}

fn first_meta_content(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors
        .iter()
        .filter_map(|s| selector(s))
        .flat_map(|sel| {
            document
                .select(&sel)
                .filter_map(|el| el.value().attr("content").map(str::trim))
                .filter(|v| !v.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .next()
}

fn element_text(document: &Html, selector_str: &str) -> Option<String> {
    let sel = selector(selector_str)?;
    document
        .select(&sel)
        .next()
        .map(|el| clean_text(&el.text().collect::<Vec<_>>().join(" ")))
        .filter(|t| !t.is_empty())
}

fn extract_title(document: &Html) -> Option<String> {
    first_meta_content(document, TITLE_META)
        .map(|t| clean_text(&t))
        .filter(|t| !t.is_empty())
        .or_else(|| element_text(document, "title"))
}

fn extract_canonical(document: &Html, base: Option<&Url>) -> Option<String> {
    let sel = selector("link[rel='canonical']")?;
    document
        .select(&sel)
        .filter_map(|el| el.value().attr("href"))
        .find_map(|href| absolutize(href, base))
}

fn extract_published(document: &Html, offset: FixedOffset) -> Option<DateTime<Utc>> {
    if let Some(ts) = first_meta_content(document, DATE_META).and_then(|v| parse_instant(&v, offset)) {
        return Some(ts);
    }

    if let Some(sel) = selector("script[type='application/ld+json']") {
        let from_ld = document.select(&sel).find_map(|el| {
            let json = el.text().collect::<String>();
            LD_DATE_RE
                .captures(&json)
                .and_then(|c| parse_instant(&c[1], offset))
        });
        if from_ld.is_some() {
            return from_ld;
        }
    }

    if let Some(sel) = selector("time[datetime]") {
        let from_time = document
            .select(&sel)
            .filter_map(|el| el.value().attr("datetime"))
            .find_map(|v| parse_instant(v, offset));
        if from_time.is_some() {
            return from_time;
        }
    }
    None
}

fn extract_text_date(document: &Html, offset: FixedOffset) -> Option<DateTime<Utc>> {
    ["article", "main", "body"]
        .iter()
        .find_map(|s| element_text(document, s))
        .and_then(|text| find_in_text(&text, offset))
}

/// Pull title, site name, image, date and canonical link out of page markup.
///
/// Relative image and canonical URLs are resolved against `page_url`.
pub fn extract_metadata(html: &str, page_url: &str, offset: FixedOffset) -> PageMetadata {
    if html.trim().is_empty() {
        return PageMetadata::default();
    }
    let base = Url::parse(page_url).ok();
    let document = Html::parse_document(html);

    PageMetadata {
        title: extract_title(&document),
        site_name: first_meta_content(&document, SITE_NAME_META)
            .map(|s| clean_text(&s))
            .filter(|s| !s.is_empty()),
        image_url: first_meta_content(&document, IMAGE_META)
            .and_then(|img| absolutize(&img, base.as_ref())),
        published_at: extract_published(&document, offset),
        text_published_at: extract_text_date(&document, offset),
        canonical_url: extract_canonical(&document, base.as_ref()),
    }
}

impl Enricher {
    pub fn new(aggregator_domains: Vec<String>, aggregator_image_hosts: Vec<String>, offset: FixedOffset) -> Self {
        Self {
            aggregator_domains,
            aggregator_image_hosts,
            offset,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.aggregator_domains.clone(),
            config.aggregator_image_hosts.clone(),
            local_offset(config.utc_offset_hours),
        )
    }

    /// Whether `url` points at an aggregator or search engine page.
    pub fn is_aggregator(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .is_some_and(|host| self.aggregator_domains.iter().any(|d| host_matches(&host, d)))
    }

    /// Absolute image URL unless it is hosted on an aggregator asset domain.
    pub fn accept_image(&self, raw: &str, base: Option<&Url>) -> Option<String> {
        let abs = absolutize(raw, base)?;
        let host = Url::parse(&abs).ok()?.host_str()?.to_string();
        if self
            .aggregator_image_hosts
            .iter()
            .any(|h| host_matches(&host, h))
        {
            debug!(image = %abs, "Rejected aggregator image");
            return None;
        }
        Some(abs)
    }

    /// Download a publisher page, recording the failure if there is one.
    async fn download<F: HttpFetch>(
        &self,
        fetcher: &F,
        url: &str,
        error: &mut Option<FetchError>,
    ) -> (String, String) {
        match fetcher.fetch_page(url).await {
            Ok(FetchedPage { final_url, body }) if !final_url.trim().is_empty() => (final_url, body),
            Ok(FetchedPage { body, .. }) => (url.to_string(), body),
            Err(e) => {
                debug!(error = %e, "Article fetch failed; continuing without markup");
                error.get_or_insert(e);
                (url.to_string(), String::new())
            }
        }
    }

    /// Follow `url` to its article page and extract metadata.
    ///
    /// Aggregator links are first resolved to the publisher URL; a resolution
    /// that stays on the aggregator is not fetched. Publisher links are
    /// downloaded once, redirects included.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - HTTP access used for the resolution and the download
    /// * `url` - Article link as found in the feed or listing page
    /// * `fallback_image` - Usually the feed's image, used when the page has
    ///   none and subject to the same aggregator-host rejection
    ///
    /// # Returns
    ///
    /// An [`EnrichOutcome`] holding whatever metadata was found (possibly
    /// none) and the first fetch failure, if any. This never fails.
    #[instrument(level = "debug", skip(self, fetcher, fallback_image))]
    pub async fn enrich<F: HttpFetch>(
        &self,
        fetcher: &F,
        url: &str,
        fallback_image: Option<&str>,
    ) -> EnrichOutcome {
        let mut error = None;

        let (final_url, html) = if self.is_aggregator(url) {
            let resolved = match fetcher.resolve_final_url(url).await {
                Ok(resolved) if !resolved.trim().is_empty() => resolved,
                Ok(_) => url.to_string(),
                Err(e) => {
                    debug!(error = %e, "Redirect resolution failed; using feed URL");
                    error = Some(e);
                    url.to_string()
                }
            };
            if self.is_aggregator(&resolved) {
                debug!(final_url = %resolved, "Final URL is an aggregator page; not fetching");
                (resolved, String::new())
            } else {
                self.download(fetcher, &resolved, &mut error).await
            }
        } else {
            self.download(fetcher, url, &mut error).await
        };
        let on_aggregator = self.is_aggregator(&final_url);

        let meta = extract_metadata(&html, &final_url, self.offset);
        let base = Url::parse(&final_url).ok();

        // Canonical link only counts when it stays on the same site.
        let canonical = meta
            .canonical_url
            .as_deref()
            .filter(|c| {
                let same_site = Url::parse(c).ok().and_then(|u| bare_host(&u));
                same_site.is_some() && same_site == base.as_ref().and_then(bare_host)
            })
            .unwrap_or(&final_url);

        let image_url = meta
            .image_url
            .as_deref()
            .and_then(|img| self.accept_image(img, base.as_ref()))
            .or_else(|| fallback_image.and_then(|img| self.accept_image(img, base.as_ref())));

        let site_name = meta.site_name.clone().unwrap_or_else(|| {
            if on_aggregator {
                String::new()
            } else {
                base.as_ref().and_then(bare_host).unwrap_or_default()
            }
        });

        EnrichOutcome {
            item: EnrichedItem {
                title: meta.title.unwrap_or_default(),
                canonical_url: canonicalize_url(canonical),
                image_url,
                published_at: meta.published_at,
                inferred_published_at: meta.text_published_at,
                site_name,
            },
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::StubFetcher;
    use chrono::TimeZone;

    const ARTICLE: &str = r#"<!doctype html><html><head>
<title>Feira de artesanato | Prefeitura</title>
<meta property="og:title" content="Feira de artesanato ocupa a praça central">
<meta property="og:site_name" content="Prefeitura de Colatina">
<meta property="og:image" content="/uploads/feira.jpg">
<meta property="article:published_time" content="2026-10-15T09:30:00-03:00">
<link rel="canonical" href="https://www.colatina.es.gov.br/noticias/feira-de-artesanato?utm_source=fb">
</head><body><p>Texto</p></body></html>"#;

    fn enricher() -> Enricher {
        Enricher::from_config(&Config::default())
    }

    #[test]
    fn test_extracts_open_graph_metadata() {
        let meta = extract_metadata(
            ARTICLE,
            "https://www.colatina.es.gov.br/noticias/feira-de-artesanato",
            local_offset(-3),
        );
        assert_eq!(meta.title.as_deref(), Some("Feira de artesanato ocupa a praça central"));
        assert_eq!(meta.site_name.as_deref(), Some("Prefeitura de Colatina"));
        assert_eq!(
            meta.image_url.as_deref(),
            Some("https://www.colatina.es.gov.br/uploads/feira.jpg")
        );
        assert_eq!(
            meta.published_at,
            Some(Utc.with_ymd_and_hms(2026, 10, 15, 12, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_title_falls_back_to_title_tag_and_time_element() {
        let html = r#"<html><head><title>Obras na avenida</title></head>
<body><time datetime="2026-10-14T08:00:00Z">14 out</time></body></html>"#;
        let meta = extract_metadata(html, "https://site.com.br/a", local_offset(-3));
        assert_eq!(meta.title.as_deref(), Some("Obras na avenida"));
        assert_eq!(
            meta.published_at,
            Some(Utc.with_ymd_and_hms(2026, 10, 14, 8, 0, 0).unwrap())
        );
        assert_eq!(meta.image_url, None);
    }

    #[test]
    fn test_date_from_json_ld_and_page_text() {
        let ld = r#"<html><head><script type="application/ld+json">
{"@type":"NewsArticle","datePublished":"2026-10-13T10:00:00Z"}</script></head><body></body></html>"#;
        let meta = extract_metadata(ld, "https://site.com.br/a", local_offset(-3));
        assert_eq!(
            meta.published_at,
            Some(Utc.with_ymd_and_hms(2026, 10, 13, 10, 0, 0).unwrap())
        );

        let text = r#"<html><body><article><p>Publicado em 15/10/2026 às 14h30</p></article></body></html>"#;
        let meta = extract_metadata(text, "https://site.com.br/a", local_offset(-3));
        assert_eq!(meta.published_at, None);
        assert_eq!(
            meta.text_published_at,
            Some(Utc.with_ymd_and_hms(2026, 10, 15, 17, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_page_text_date_kept_apart_from_structured_date() {
        let html = r#"<html><head>
<meta property="article:published_time" content="2026-10-15T09:30:00-03:00">
</head><body><article><p>Relatório de 01/02/2025 citado na matéria.</p></article></body></html>"#;
        let meta = extract_metadata(html, "https://site.com.br/a", local_offset(-3));
        assert_eq!(
            meta.published_at,
            Some(Utc.with_ymd_and_hms(2026, 10, 15, 12, 30, 0).unwrap())
        );
        assert_eq!(
            meta.text_published_at,
            Some(Utc.with_ymd_and_hms(2025, 2, 1, 3, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_enrich_follows_redirect_and_uses_canonical() {
        let article = "https://www.colatina.es.gov.br/noticias/feira-de-artesanato?ref=home";
        let stub = StubFetcher::new()
            .with_redirect("https://news.google.com/rss/articles/abc", article)
            .with_body(article, ARTICLE);

        let outcome = enricher()
            .enrich(&stub, "https://news.google.com/rss/articles/abc", None)
            .await;

        assert!(outcome.error.is_none());
        assert_eq!(
            outcome.item.canonical_url,
            "https://www.colatina.es.gov.br/noticias/feira-de-artesanato"
        );
        assert_eq!(outcome.item.site_name, "Prefeitura de Colatina");
        assert!(outcome.item.image_url.is_some());
    }

    #[tokio::test]
    async fn test_publisher_redirect_costs_one_request() {
        let link = "https://www.colatina.es.gov.br/?p=812";
        let article = "https://www.colatina.es.gov.br/noticias/feira-de-artesanato";
        let stub = StubFetcher::new()
            .with_redirect(link, article)
            .with_body(article, ARTICLE);

        let outcome = enricher().enrich(&stub, link, None).await;

        assert!(outcome.error.is_none());
        assert_eq!(stub.requests(), vec![link.to_string()]);
        assert!(stub.resolutions().is_empty());
        assert_eq!(outcome.item.canonical_url, article);
        assert_eq!(
            outcome.item.image_url.as_deref(),
            Some("https://www.colatina.es.gov.br/uploads/feira.jpg")
        );
    }

    #[tokio::test]
    async fn test_enrich_failure_reports_error_and_keeps_url() {
        let url = "https://site.com.br/noticia/sumiu";
        let stub = StubFetcher::new().with_status(url, 404);

        let outcome = enricher().enrich(&stub, url, None).await;

        assert!(matches!(outcome.error, Some(FetchError::Status { status: 404, .. })));
        assert_eq!(outcome.item.canonical_url, url);
        assert_eq!(outcome.item.title, "");
        assert_eq!(outcome.item.image_url, None);
        assert_eq!(outcome.item.published_at, None);
        assert_eq!(outcome.item.site_name, "site.com.br");
    }

    #[tokio::test]
    async fn test_aggregator_page_is_not_fetched() {
        let url = "https://news.google.com/rss/articles/xyz";
        let stub = StubFetcher::new();

        let outcome = enricher()
            .enrich(&stub, url, Some("https://lh3.googleusercontent.com/logo.png"))
            .await;

        assert!(stub.requests().is_empty());
        assert_eq!(stub.resolutions().len(), 1);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.item.image_url, None);
        assert_eq!(outcome.item.site_name, "");
    }

    #[tokio::test]
    async fn test_feed_image_used_when_page_has_none() {
        let url = "https://site.com.br/noticia/a";
        let stub = StubFetcher::new().with_body(url, "<html><head><title>A</title></head></html>");

        let outcome = enricher()
            .enrich(&stub, url, Some("https://site.com.br/img/a.jpg"))
            .await;

        assert_eq!(outcome.item.image_url.as_deref(), Some("https://site.com.br/img/a.jpg"));
    }

    #[test]
    fn test_canonical_link_and_aggregator_hosts() {
        let html = r#"<html><head><link rel="canonical" href="https://other.com/x"></head></html>"#;
        let meta = extract_metadata(html, "https://site.com.br/a", local_offset(-3));
        assert_eq!(meta.canonical_url.as_deref(), Some("https://other.com/x"));
        assert!(enricher().is_aggregator("https://www.google.com/url?q=x"));
        assert!(!enricher().is_aggregator("https://site.com.br/a"));
    }
}
