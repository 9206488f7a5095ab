//! Record building and content policy.
//!
//! [`build_record`] merges a feed entry with its enrichment into an
//! [`OutputRecord`]. [`apply`] then drops blocklisted, stale and duplicate
//! records. It is a pure function of its inputs, so running it twice over the
//! same records changes nothing the second time.

use crate::config::Config;
use crate::dates::parse_instant;
use crate::models::{EnrichedItem, OutputRecord, RawEntry, Source, SourceKind};
use crate::utils::{canonicalize_url, clean_text, stable_id};
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use itertools::Itertools;
use tracing::debug;

/// How far in the future a publication date may be before it is distrusted.
pub fn clock_skew() -> TimeDelta {
    TimeDelta::minutes(10)
}

/// Blocklist and age policy.
#[derive(Debug, Clone)]
pub struct FilterPolicy {
    /// Lowercased substrings; a match in title or summary drops the record.
    pub blocklist: Vec<String>,
    pub max_age: TimeDelta,
    pub require_date: bool,
}

impl FilterPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            blocklist: config.blocklist_tokens(),
            max_age: TimeDelta::days(i64::from(config.max_age_days)),
            require_date: config.require_date,
        }
    }

    /// Case-insensitive substring match against the blocklist.
    pub fn is_blocked(&self, title: &str, summary: &str) -> bool {
        let haystack = format!("{} {}", title, summary).to_lowercase();
        self.blocklist.iter().any(|token| haystack.contains(token.as_str()))
    }
}

/// Counts of records each rule removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FilterReport {
    pub blocked: usize,
    pub too_old: usize,
    /// Dropped for lacking a date while dates are required.
    pub undated: usize,
    pub duplicates: usize,
}

/// Strip the ` - Publisher` suffix aggregator titles carry.
fn strip_publisher_suffix(title: &str, publisher: Option<&str>) -> String {
    if let Some(publisher) = publisher.map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(head) = title.strip_suffix(publisher).and_then(|h| h.trim_end().strip_suffix('-')) {
            let head = head.trim_end();
            if !head.is_empty() {
                return head.to_string();
            }
        }
        return title.to_string();
    }
    match title.rsplit_once(" - ") {
        Some((head, tail)) if !head.trim().is_empty() && tail.chars().count() <= 60 => {
            head.trim_end().to_string()
        }
        _ => title.to_string(),
    }
}

/// Merge a feed entry and its enrichment into an output record.
///
/// Enriched values win when non-empty. Returns `None` when no title or no URL
/// survives.
pub fn build_record(
    source: &Source,
    raw: &RawEntry,
    enriched: Option<&EnrichedItem>,
    offset: FixedOffset,
) -> Option<OutputRecord> {
    let is_aggregated = source.kind == SourceKind::GoogleNews;

    let url = enriched
        .map(|e| e.canonical_url.trim())
        .filter(|u| !u.is_empty())
        .map(canonicalize_url)
        .unwrap_or_else(|| canonicalize_url(&raw.link));

    let raw_title = clean_text(&raw.title);
    let raw_title = if is_aggregated {
        strip_publisher_suffix(&raw_title, raw.source_label.as_deref())
    } else {
        raw_title
    };
    let title = enriched
        .map(|e| clean_text(&e.title))
        .filter(|t| !t.is_empty())
        .unwrap_or(raw_title);

    if title.is_empty() || url.is_empty() {
        return None;
    }

    // Page metadata, then the feed, then whatever the page text mentions.
    let published_at = enriched
        .and_then(|e| e.published_at)
        .or_else(|| {
            raw.raw_published
                .as_deref()
                .and_then(|d| parse_instant(d, offset))
        })
        .or_else(|| enriched.and_then(|e| e.inferred_published_at));

    let image_url = enriched
        .and_then(|e| e.image_url.clone())
        .or_else(|| raw.raw_image.clone())
        .filter(|i| !i.trim().is_empty());

    let source_name = if is_aggregated {
        raw.source_label
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .or_else(|| {
                enriched
                    .map(|e| e.site_name.trim().to_string())
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or_else(|| source.name.clone())
    } else {
        source.name.clone()
    };

    Some(OutputRecord {
        id: stable_id(&url, &title),
        title,
        summary: raw.summary.clone(),
        source: source_name,
        published_at,
        url,
        image_url,
        scope: source.scope,
        city: source.city.clone(),
    })
}

/// Apply blocklist, age and dedupe rules, in that order.
///
/// Dates further in the future than [`clock_skew`] are cleared first and the
/// record is then treated as undated. The first occurrence of a URL wins.
///
/// # Arguments
///
/// * `records` - Candidates from every source, in source order
/// * `now` - Reference time for the age cutoff
/// * `policy` - Blocklist, maximum age and whether dates are required
///
/// # Returns
///
/// The surviving records in input order and a [`FilterReport`] counting what
/// each rule removed. Feeding the survivors back in removes nothing.
pub fn apply(
    records: Vec<OutputRecord>,
    now: DateTime<Utc>,
    policy: &FilterPolicy,
) -> (Vec<OutputRecord>, FilterReport) {
    let mut report = FilterReport::default();
    let oldest = now - policy.max_age;
    let latest = now + clock_skew();

    let survivors: Vec<OutputRecord> = records
        .into_iter()
        .map(|mut r| {
            if r.published_at.is_some_and(|ts| ts > latest) {
                debug!(url = %r.url, "Future publication date cleared");
                r.published_at = None;
            }
            r
        })
        .filter(|r| {
            if policy.is_blocked(&r.title, &r.summary) {
                debug!(title = %r.title, "Blocked by content policy");
                report.blocked += 1;
                return false;
            }
            match r.published_at {
                Some(ts) if ts < oldest => {
                    report.too_old += 1;
                    false
                }
                None if policy.require_date => {
                    report.undated += 1;
                    false
                }
                _ => true,
            }
        })
        .collect();

    let before = survivors.len();
    let unique: Vec<OutputRecord> = survivors
        .into_iter()
        .unique_by(|r| r.dedupe_key())
        .collect();
    report.duplicates = before - unique.len();

    (unique, report)
}
