//! Data models for sources, parsed entries and the emitted news payload.
//!
//! This module defines the records that flow through the pipeline:
//! - [`Source`]: one configured feed, search feed or listing page
//! - [`RawEntry`]: a candidate entry as found in a feed or listing page
//! - [`EnrichedItem`]: metadata recovered from the article page itself
//! - [`OutputRecord`]: the externally visible unit written to `news.json`
//! - [`RunStats`]: counters and failures collected during one run
//!
//! Serialized types use camelCase field names to match the JSON shape the
//! panel's presentation layer reads.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Editorial tier of a news item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Local,
    State,
    National,
    Health,
}

impl Scope {
    pub const ALL: [Scope; 4] = [Scope::Local, Scope::State, Scope::National, Scope::Health];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Local => "local",
            Scope::State => "state",
            Scope::National => "national",
            Scope::Health => "health",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a source's origin document is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A plain RSS 2.0 or Atom feed.
    #[default]
    Rss,
    /// A Google News RSS search feed; items point at the aggregator's redirector.
    GoogleNews,
    /// An HTML page listing article links (typically an official site).
    Listing,
}

/// A configured news source.
///
/// Sources are built once from configuration and never mutated during a run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Display name, used as the record's `source` unless a publisher is known.
    pub name: String,
    pub scope: Scope,
    #[serde(default)]
    pub kind: SourceKind,
    /// Feed or listing-page URL. Optional for `google_news` sources with a `query`.
    #[serde(default)]
    pub url: Option<String>,
    /// Google News search terms.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub hl: Option<String>,
    #[serde(default)]
    pub gl: Option<String>,
    #[serde(default)]
    pub ceid: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// Follow each item to its article page for image/date metadata. Defaults to on.
    #[serde(default)]
    pub enrich: Option<bool>,
}

impl Source {
    /// Whether article pages may be fetched for this source.
    pub fn enrichment_enabled(&self) -> bool {
        self.enrich.unwrap_or(true)
    }

    /// Resolve the URL the pipeline fetches first for this source.
    ///
    /// For Google News sources without an explicit URL this is the RSS search
    /// endpoint built from `query` and the locale parameters.
    pub fn origin(&self) -> Option<String> {
        if let Some(url) = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }
        match (self.kind, self.query.as_deref().map(str::trim)) {
            (SourceKind::GoogleNews, Some(query)) if !query.is_empty() => Some(format!(
                "https://news.google.com/rss/search?q={}&hl={}&gl={}&ceid={}",
                urlencoding::encode(query),
                urlencoding::encode(self.hl.as_deref().unwrap_or("pt-BR")),
                urlencoding::encode(self.gl.as_deref().unwrap_or("BR")),
                urlencoding::encode(self.ceid.as_deref().unwrap_or("BR:pt-419")),
            )),
            _ => None,
        }
    }
}

/// A candidate entry produced by the feed or listing parser.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    pub title: String,
    pub link: String,
    /// Publication date exactly as written in the source document.
    pub raw_published: Option<String>,
    pub raw_image: Option<String>,
    /// Markup-stripped description/summary text.
    pub summary: String,
    /// Publisher named by an RSS `<source>` element.
    pub source_label: Option<String>,
}

/// Metadata recovered from an article page.
///
/// Every field is best-effort: empty strings and `None` mean "not found".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedItem {
    pub title: String,
    pub canonical_url: String,
    pub image_url: Option<String>,
    /// Date from the page's structured metadata.
    pub published_at: Option<DateTime<Utc>>,
    /// Date found by scanning the page text; weaker than any feed date.
    pub inferred_published_at: Option<DateTime<Utc>>,
    pub site_name: String,
}

/// One news item as written to the output file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub source: String,
    #[serde(with = "instant_opt")]
    pub published_at: Option<DateTime<Utc>>,
    pub url: String,
    pub image_url: Option<String>,
    pub scope: Scope,
    pub city: Option<String>,
}

impl OutputRecord {
    /// Key used for deduplication: the URL, or the title when no URL exists.
    pub fn dedupe_key(&self) -> String {
        if self.url.trim().is_empty() {
            format!("title:{}", self.title.trim().to_lowercase())
        } else {
            self.url.trim().to_string()
        }
    }
}

/// Per-source tally reported in [`RunStats`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceTally {
    pub source: String,
    pub scope: Option<Scope>,
    /// Entries or candidate links found before any filtering.
    pub discovered: usize,
    /// Records from this source present in the final output.
    pub kept: usize,
    pub error: Option<String>,
}

/// Pipeline stage at which a failure was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Config,
    Source,
    Enrichment,
}

/// A recorded, non-fatal failure.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub source: String,
    pub url: String,
    pub stage: FailureStage,
    pub error: String,
}

/// Counters and failures for one run, emitted alongside the items.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub sources: usize,
    pub sources_failed: usize,
    pub discovered: usize,
    pub enriched: usize,
    pub enrichment_failures: usize,
    pub blocked: usize,
    pub too_old: usize,
    pub undated: usize,
    pub duplicates: usize,
    pub produced: usize,
    pub duration_ms: u64,
    pub per_source: Vec<SourceTally>,
    pub failures: Vec<Failure>,
}

/// The document written for the presentation layer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsPayload {
    #[serde(with = "instant")]
    pub generated_at: DateTime<Utc>,
    pub items: Vec<OutputRecord>,
    pub stats: RunStats,
}

/// ISO-8601 with a `Z` suffix and millisecond precision.
pub fn iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

mod instant {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::iso(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

mod instant_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_str(&super::iso(ts)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn google_source(query: Option<&str>, url: Option<&str>) -> Source {
        Source {
            name: "Google News".to_string(),
            scope: Scope::Local,
            kind: SourceKind::GoogleNews,
            url: url.map(String::from),
            query: query.map(String::from),
            hl: None,
            gl: None,
            ceid: None,
            city: Some("Colatina".to_string()),
            state: None,
            enrich: None,
        }
    }

    #[test]
    fn test_google_news_origin_from_query() {
        let source = google_source(Some("Colatina ES"), None);
        assert_eq!(
            source.origin().as_deref(),
            Some("https://news.google.com/rss/search?q=Colatina%20ES&hl=pt-BR&gl=BR&ceid=BR%3Apt-419")
        );
    }

    #[test]
    fn test_explicit_url_wins_over_query() {
        let source = google_source(Some("ignored"), Some(" https://example.com/rss "));
        assert_eq!(source.origin().as_deref(), Some("https://example.com/rss"));
    }

    #[test]
    fn test_rss_source_without_url_has_no_origin() {
        let mut source = google_source(Some("Colatina"), None);
        source.kind = SourceKind::Rss;
        assert_eq!(source.origin(), None);
    }

    #[test]
    fn test_enrichment_defaults_on() {
        let mut source = google_source(Some("x"), None);
        assert!(source.enrichment_enabled());
        source.enrich = Some(false);
        assert!(!source.enrichment_enabled());
    }

    #[test]
    fn test_output_record_json_shape() {
        let record = OutputRecord {
            id: "abc".to_string(),
            title: "Feira de artesanato".to_string(),
            summary: String::new(),
            source: "Prefeitura".to_string(),
            published_at: Some(Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap()),
            url: "https://example.com/a".to_string(),
            image_url: None,
            scope: Scope::Health,
            city: None,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["publishedAt"], "2026-10-15T12:00:00.000Z");
        assert_eq!(value["scope"], "health");
        assert!(value["city"].is_null());
        assert!(value["imageUrl"].is_null());

        let back: OutputRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_dedupe_key_falls_back_to_title() {
        let record = OutputRecord {
            id: "x".to_string(),
            title: " Vacinação ".to_string(),
            summary: String::new(),
            source: "s".to_string(),
            published_at: None,
            url: String::new(),
            image_url: None,
            scope: Scope::Local,
            city: None,
        };
        assert_eq!(record.dedupe_key(), "title:vacinação");
    }
}
