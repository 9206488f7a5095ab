//! The news run: collect every source, filter, interleave.
//!
//! Sources are collected concurrently and joined all-settled; one failing
//! source contributes nothing and never aborts the others. Within a source,
//! entries are handled one at a time with a short paced delay before each
//! article request, so no single publisher sees a burst.
//!
//! ```text
//! source ─ fetch ─ parse ─┬─ entry ─ blocklist ─ enrich ─ build ─┐
//!                         └─ entry ─ ...                         ├─ filter ─ bucket ─ interleave
//! source ─ ...                                                   ┘
//! ```

use crate::config::Config;
use crate::dates::{local_offset, parse_instant};
use crate::enrich::Enricher;
use crate::fetcher::HttpFetch;
use crate::filter::{self, FilterPolicy, build_record};
use crate::interleave::{bucket, interleave};
use crate::models::{
    Failure, FailureStage, NewsPayload, OutputRecord, RawEntry, RunStats, Source, SourceKind,
    SourceTally,
};
use crate::outputs::json::with_placeholder;
use crate::parsers::listing::discover_articles;
use crate::parsers::syndication::{looks_like_feed, parse_feed};
use crate::utils::truncate_for_log;
use chrono::{DateTime, FixedOffset, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// What one source contributed before cross-source filtering.
#[derive(Debug, Default)]
struct SourceOutcome {
    records: Vec<OutputRecord>,
    tally: SourceTally,
    failures: Vec<Failure>,
    enriched: usize,
    enrichment_failures: usize,
    blocked: usize,
}

/// What happened to one entry.
#[derive(Debug, Default)]
struct EntryOutcome {
    record: Option<OutputRecord>,
    blocked: bool,
    enriched: bool,
    failure: Option<Failure>,
}

/// One configured run over an [`HttpFetch`] implementation.
pub struct Pipeline<F: HttpFetch> {
    config: Config,
    fetcher: F,
    enricher: Enricher,
    policy: FilterPolicy,
    offset: FixedOffset,
}

impl<F: HttpFetch> Pipeline<F> {
    pub fn new(config: Config, fetcher: F) -> Self {
        let enricher = Enricher::from_config(&config);
        let policy = FilterPolicy::from_config(&config);
        let offset = local_offset(config.utc_offset_hours);
        Self {
            config,
            fetcher,
            enricher,
            policy,
            offset,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every source and assemble the payload.
    ///
    /// Never fails: when nothing survives, the payload holds the placeholder
    /// record and the stats say why.
    #[instrument(level = "info", skip_all, fields(sources = self.config.sources.len()))]
    pub async fn run(&self, now: DateTime<Utc>) -> NewsPayload {
        let t0 = Instant::now();

        let outcomes = join_all(
            self.config
                .sources
                .iter()
                .map(|source| self.collect_source(source)),
        )
        .await;

        let mut stats = RunStats {
            sources: self.config.sources.len(),
            ..RunStats::default()
        };
        let mut records = Vec::new();
        // Record id -> index into per_source, first source wins like dedupe does.
        let mut origin_of: HashMap<String, usize> = HashMap::new();

        for (idx, outcome) in outcomes.into_iter().enumerate() {
            if outcome.tally.error.is_some() {
                stats.sources_failed += 1;
            }
            stats.discovered += outcome.tally.discovered;
            stats.enriched += outcome.enriched;
            stats.enrichment_failures += outcome.enrichment_failures;
            stats.blocked += outcome.blocked;
            stats.failures.extend(outcome.failures);
            for record in &outcome.records {
                origin_of.entry(record.id.clone()).or_insert(idx);
            }
            records.extend(outcome.records);
            stats.per_source.push(outcome.tally);
        }

        let (kept, report) = filter::apply(records, now, &self.policy);
        stats.blocked += report.blocked;
        stats.too_old += report.too_old;
        stats.undated += report.undated;
        stats.duplicates += report.duplicates;

        let items = interleave(
            bucket(kept),
            &self.config.effective_pattern(),
            self.config.max_items,
        );

        for item in &items {
            if let Some(&idx) = origin_of.get(&item.id) {
                stats.per_source[idx].kept += 1;
            }
        }
        stats.produced = items.len();
        stats.duration_ms = t0.elapsed().as_millis() as u64;

        if items.is_empty() {
            warn!(
                failed = stats.sources_failed,
                discovered = stats.discovered,
                "No items survived; emitting placeholder"
            );
        } else {
            info!(
                produced = stats.produced,
                discovered = stats.discovered,
                blocked = stats.blocked,
                too_old = stats.too_old,
                duplicates = stats.duplicates,
                "Run complete"
            );
        }

        NewsPayload {
            generated_at: now,
            items: with_placeholder(items, &self.config.placeholder_title, now),
            stats,
        }
    }

    /// Fetch, parse and enrich one source. Failures are recorded, not raised.
    #[instrument(level = "info", skip_all, fields(source = %source.name, scope = %source.scope))]
    async fn collect_source(&self, source: &Source) -> SourceOutcome {
        let mut outcome = SourceOutcome {
            tally: SourceTally {
                source: source.name.clone(),
                scope: Some(source.scope),
                ..SourceTally::default()
            },
            ..SourceOutcome::default()
        };

        let Some(origin) = source.origin() else {
            self.source_failed(&mut outcome, source, "", "source has no url or query".to_string());
            return outcome;
        };

        let body = match self.fetcher.fetch(&origin).await {
            Ok(body) => body,
            Err(e) => {
                self.source_failed(&mut outcome, source, &origin, e.to_string());
                return outcome;
            }
        };

        let entries = match self.entries_from(source, &origin, &body) {
            Ok(entries) => entries,
            Err(reason) => {
                self.source_failed(&mut outcome, source, &origin, reason);
                return outcome;
            }
        };
        outcome.tally.discovered = entries.len();
        info!(count = entries.len(), url = %origin, "Discovered entries");

        let results: Vec<EntryOutcome> = stream::iter(entries)
            .then(|raw| async move { self.process_entry(source, raw).await })
            .collect()
            .await;

        for result in results {
            if result.blocked {
                outcome.blocked += 1;
            }
            if result.enriched {
                outcome.enriched += 1;
            }
            if let Some(failure) = result.failure {
                outcome.enrichment_failures += 1;
                outcome.failures.push(failure);
            }
            outcome.records.extend(result.record);
        }

        debug!(records = outcome.records.len(), "Source collected");
        outcome
    }

    /// Turn the origin document into at most `per_source_limit` entries.
    fn entries_from(&self, source: &Source, origin: &str, body: &str) -> Result<Vec<RawEntry>, String> {
        let limit = self.config.per_source_limit;
        let as_feed = looks_like_feed(body);

        match source.kind {
            SourceKind::Listing if !as_feed => Ok(discover_articles(body, origin, limit)
                .into_iter()
                .map(|candidate| RawEntry {
                    title: candidate.anchor_text,
                    link: candidate.url,
                    ..RawEntry::default()
                })
                .collect()),
            _ if as_feed => Ok(parse_feed(body).into_iter().take(limit).collect()),
            _ => Err("response is not an RSS or Atom feed".to_string()),
        }
    }

    fn source_failed(&self, outcome: &mut SourceOutcome, source: &Source, url: &str, error: String) {
        warn!(url, error = %truncate_for_log(&error, 300), "Source failed");
        outcome.failures.push(Failure {
            source: source.name.clone(),
            url: url.to_string(),
            stage: FailureStage::Source,
            error: error.clone(),
        });
        outcome.tally.error = Some(error);
    }

    async fn pace(&self) {
        if self.config.pace_ms == 0 {
            return;
        }
        let jitter = rand::rng().random_range(0..=100u64);
        tokio::time::sleep(Duration::from_millis(self.config.pace_ms + jitter)).await;
    }

    /// Whether the article page can add anything to this entry.
    ///
    /// Aggregator links always need resolving to the publisher. Otherwise an
    /// entry that already has a parseable date and a usable image is complete.
    fn needs_enrichment(&self, source: &Source, raw: &RawEntry) -> bool {
        if source.kind == SourceKind::GoogleNews || self.enricher.is_aggregator(&raw.link) {
            return true;
        }
        let has_date = raw
            .raw_published
            .as_deref()
            .and_then(|d| parse_instant(d, self.offset))
            .is_some();
        let base = Url::parse(&raw.link).ok();
        let has_image = raw
            .raw_image
            .as_deref()
            .and_then(|img| self.enricher.accept_image(img, base.as_ref()))
            .is_some();
        !(has_date && has_image)
    }

    #[instrument(level = "debug", skip_all, fields(url = %raw.link))]
    async fn process_entry(&self, source: &Source, mut raw: RawEntry) -> EntryOutcome {
        if self.policy.is_blocked(&raw.title, &raw.summary) {
            debug!(title = %raw.title, "Blocked before enrichment");
            return EntryOutcome {
                blocked: true,
                ..EntryOutcome::default()
            };
        }

        let skip_enrichment = !source.enrichment_enabled()
            || raw.link.trim().is_empty()
            || !self.needs_enrichment(source, &raw);
        if skip_enrichment {
            let base = Url::parse(&raw.link).ok();
            raw.raw_image = raw
                .raw_image
                .as_deref()
                .and_then(|img| self.enricher.accept_image(img, base.as_ref()));
            return EntryOutcome {
                record: build_record(source, &raw, None, self.offset),
                ..EntryOutcome::default()
            };
        }

        self.pace().await;
        let enriched = self
            .enricher
            .enrich(&self.fetcher, &raw.link, raw.raw_image.as_deref())
            .await;

        let failure = enriched.error.as_ref().map(|e| {
            warn!(error = %e, "Enrichment failed; keeping feed values");
            Failure {
                source: source.name.clone(),
                url: e.url().to_string(),
                stage: FailureStage::Enrichment,
                error: e.to_string(),
            }
        });

        EntryOutcome {
            record: build_record(source, &raw, Some(&enriched.item), self.offset),
            blocked: false,
            enriched: failure.is_none(),
            failure,
        }
    }
}
