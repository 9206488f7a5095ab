//! Command-line interface definitions.
//!
//! Every option can also come from an environment variable so the builder can
//! run unattended from a scheduled job. Options given here override the values
//! in the configuration file.

use clap::Parser;
use std::path::PathBuf;

/// Build the news playlist for the signage panels.
///
/// # Examples
///
/// ```sh
/// # Built-in sources, default output path (data/news.json)
/// pontoview_news
///
/// # Custom sources and a wider age window
/// pontoview_news -c data/news_sources.yaml --max-age-days 5
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Sources/configuration file (YAML or JSON). Built-in sources are used when omitted.
    #[arg(short, long, env = "NEWS_SOURCES")]
    pub config: Option<PathBuf>,

    /// Output JSON file
    #[arg(short, long, env = "NEWS_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Drop items published more than this many days ago
    #[arg(long, env = "NEWS_MAX_AGE_DAYS")]
    pub max_age_days: Option<u32>,

    /// Maximum number of items in the output
    #[arg(long, env = "NEWS_MAX_ITEMS")]
    pub max_items: Option<usize>,

    /// Maximum entries taken from each source before filtering
    #[arg(long, env = "NEWS_PER_SOURCE_LIMIT")]
    pub per_source_limit: Option<usize>,

    /// Network timeout per request, in milliseconds
    #[arg(long, env = "NEWS_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Drop items without a publication date
    #[arg(long, env = "NEWS_REQUIRE_DATE")]
    pub require_date: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["pontoview_news"]);
        assert!(cli.config.is_none());
        assert!(cli.max_items.is_none());
        assert!(!cli.require_date);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "pontoview_news",
            "-c",
            "/etc/pontoview/sources.yaml",
            "-o",
            "/srv/panel/data/news.json",
            "--timeout-ms",
            "5000",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/etc/pontoview/sources.yaml")));
        assert_eq!(cli.output, Some(PathBuf::from("/srv/panel/data/news.json")));
        assert_eq!(cli.timeout_ms, Some(5000));
    }
}
