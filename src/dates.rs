//! Publication date parsing.
//!
//! Feeds and article pages express dates in many shapes: RFC 2822 in RSS
//! `pubDate`, RFC 3339 in Atom and Open Graph tags, and Brazilian
//! `dd/mm/aaaa` or `15 de outubro de 2026` forms in page text. Values without
//! an explicit offset are interpreted in the configured local offset.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static BR_DATETIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\s*(?:às|as|-|,|\|)?\s*(\d{1,2})[h:](\d{2})").unwrap()
});
static BR_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());
static BR_LONG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2})\s+de\s+(janeiro|fevereiro|março|marco|abril|maio|junho|julho|agosto|setembro|outubro|novembro|dezembro)\s+de\s+(\d{4})",
    )
    .unwrap()
});

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Build the fixed offset used for dates that carry none.
pub fn local_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours.clamp(-23, 23) * 3600)
        .unwrap_or_else(|| Utc.fix())
}

/// Parse a single date value as found in a feed field or meta tag.
pub fn parse_instant(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return from_local(naive, offset);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return from_local(date.and_time(NaiveTime::MIN), offset);
    }
    find_in_text(s, offset)
}

/// Find the first Brazilian-style date in free text.
///
/// Patterns are tried in a fixed order: `dd/mm/aaaa hh:mm` (with `às`, `-`
/// or `h` separators), then `dd/mm/aaaa`, then `dd de <mês> de aaaa`. Within
/// a pattern, matches that are not real calendar dates (`31/02`, `25h90`) are
/// skipped in favor of later ones.
pub fn find_in_text(text: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    BR_DATETIME_RE
        .captures_iter(text)
        .find_map(|c| {
            let date = ymd(&c[3], &c[2], &c[1])?;
            let time = NaiveTime::from_hms_opt(c[4].parse().ok()?, c[5].parse().ok()?, 0)?;
            from_local(date.and_time(time), offset)
        })
        .or_else(|| {
            BR_DATE_RE.captures_iter(text).find_map(|c| {
                let date = ymd(&c[3], &c[2], &c[1])?;
                from_local(date.and_time(NaiveTime::MIN), offset)
            })
        })
        .or_else(|| {
            BR_LONG_RE.captures_iter(text).find_map(|c| {
                let month = month_number(&c[2])?;
                let date = NaiveDate::from_ymd_opt(c[3].parse().ok()?, month, c[1].parse().ok()?)?;
                from_local(date.and_time(NaiveTime::MIN), offset)
            })
        })
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

fn from_local(naive: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn month_number(name: &str) -> Option<u32> {
    let n = match name.to_lowercase().as_str() {
        "janeiro" => 1,
        "fevereiro" => 2,
        "março" | "marco" => 3,
        "abril" => 4,
        "maio" => 5,
        "junho" => 6,
        "julho" => 7,
        "agosto" => 8,
        "setembro" => 9,
        "outubro" => 10,
        "novembro" => 11,
        "dezembro" => 12,
        _ => return None,
    };
    Some(n)
}
