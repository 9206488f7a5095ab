//! Parsers turning a source's origin document into candidate entries.
//!
//! - [`syndication`]: RSS 2.0 and Atom feeds, including Google News search feeds
//! - [`listing`]: HTML pages that link to articles without offering a feed

pub mod listing;
pub mod syndication;
