//! Scope bucketing and weighted round-robin interleaving.
//!
//! Records are grouped by [`Scope`], each group ordered newest first, then
//! merged by walking a repeating scope pattern so that the panel alternates
//! between local, state, national and health news.

use crate::models::{OutputRecord, Scope};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Group records by scope, each bucket sorted by `published_at` descending.
///
/// Undated records go after dated ones; ties keep input order.
pub fn bucket(records: Vec<OutputRecord>) -> HashMap<Scope, VecDeque<OutputRecord>> {
    let mut buckets: HashMap<Scope, Vec<OutputRecord>> = HashMap::new();
    for record in records {
        buckets.entry(record.scope).or_default().push(record);
    }
    buckets
        .into_iter()
        .map(|(scope, mut items)| {
            // `None < Some`, so reversing the comparison puts undated last.
            items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
            (scope, VecDeque::from(items))
        })
        .collect()
}

/// Merge buckets by cycling through `pattern`, skipping empty buckets.
///
/// Stops at `max_items` or once every bucket is exhausted. Scopes absent from
/// `pattern` are never drawn from.
///
/// # Arguments
///
/// * `buckets` - Output of [`bucket`]
/// * `pattern` - Scope order to cycle through; a scope may repeat to weight it
/// * `max_items` - Upper bound on the result length
///
/// # Examples
///
/// ```ignore
/// // local: [L1, L2, L3], health: [H1], pattern [Local, Local, Health]
/// let items = interleave(buckets, &[Scope::Local, Scope::Local, Scope::Health], 10);
/// // -> L1, L2, H1, L3
/// ```
pub fn interleave(
    mut buckets: HashMap<Scope, VecDeque<OutputRecord>>,
    pattern: &[Scope],
    max_items: usize,
) -> Vec<OutputRecord> {
    let mut out = Vec::new();
    if pattern.is_empty() {
        return out;
    }

    while out.len() < max_items {
        let mut progressed = false;
        for scope in pattern {
            if out.len() >= max_items {
                break;
            }
            if let Some(record) = buckets.get_mut(scope).and_then(VecDeque::pop_front) {
                out.push(record);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    debug!(count = out.len(), "Interleaved records");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, Utc};

    fn rec(id: &str, scope: Scope, age_hours: Option<i64>) -> OutputRecord {
        let base: DateTime<Utc> = DateTime::parse_from_rfc3339("2026-10-16T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        OutputRecord {
            id: id.to_string(),
            title: id.to_string(),
            summary: String::new(),
            source: "Fonte".to_string(),
            published_at: age_hours.map(|h| base - TimeDelta::hours(h)),
            url: format!("https://example.com/{id}"),
            image_url: None,
            scope,
            city: None,
        }
    }

    fn ids(records: &[OutputRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_pattern_cycles_until_exhausted() {
        let records = vec![
            rec("l1", Scope::Local, Some(1)),
            rec("l2", Scope::Local, Some(2)),
            rec("l3", Scope::Local, Some(3)),
            rec("s1", Scope::State, Some(1)),
            rec("n1", Scope::National, Some(1)),
        ];
        let pattern = [Scope::Local, Scope::Local, Scope::State, Scope::National];

        let out = interleave(bucket(records), &pattern, 6);
        let scopes: Vec<Scope> = out.iter().map(|r| r.scope).collect();
        assert_eq!(
            scopes,
            vec![Scope::Local, Scope::Local, Scope::State, Scope::National, Scope::Local]
        );
        assert_eq!(ids(&out), vec!["l1", "l2", "s1", "n1", "l3"]);
    }

    #[test]
    fn test_max_items_caps_output() {
        let records = (0..10)
            .map(|i| rec(&format!("h{i}"), Scope::Health, Some(i)))
            .collect();
        let out = interleave(bucket(records), &[Scope::Health], 4);
        assert_eq!(ids(&out), vec!["h0", "h1", "h2", "h3"]);
    }

    #[test]
    fn test_bucket_orders_newest_first_undated_last() {
        let records = vec![
            rec("undated-a", Scope::Local, None),
            rec("old", Scope::Local, Some(30)),
            rec("new", Scope::Local, Some(1)),
            rec("undated-b", Scope::Local, None),
        ];
        let buckets = bucket(records);
        let local: Vec<&str> = buckets[&Scope::Local].iter().map(|r| r.id.as_str()).collect();
        assert_eq!(local, vec!["new", "old", "undated-a", "undated-b"]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(interleave(HashMap::new(), &[Scope::Local], 10).is_empty());
        let records = vec![rec("x", Scope::Local, Some(1))];
        assert!(interleave(bucket(records.clone()), &[], 10).is_empty());
        assert!(interleave(bucket(records), &[Scope::Local], 0).is_empty());
    }
}
