//! Run configuration.
//!
//! A single [`Config`] value describes everything one run needs: the sources,
//! the filtering policy, the interleaving pattern and the output location.
//! It is read from a YAML file (JSON works too, being a YAML subset) or built
//! from defaults, then adjusted by command-line overrides before the pipeline
//! is constructed.

use crate::cli::Cli;
use crate::models::{Failure, FailureStage, Scope, Source, SourceKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Sensitive-topic stems; any title or summary containing one is dropped.
pub const DEFAULT_BLOCKLIST: &[&str] = &[
    "morte", "morto", "assassin", "homic", "crime", "violên", "tirote", "trág", "trag", "estupro",
    "roubo", "furto", "sequestro", "corpo", "política", "eleição", "partido", "corrup", "escând",
    "acidente grave", "desastre", "catástro", "explos",
];

const DEFAULT_PATTERN: &[Scope] = &[
    Scope::Local,
    Scope::Local,
    Scope::State,
    Scope::Local,
    Scope::National,
    Scope::State,
    Scope::Health,
];

/// Everything a run needs, resolved before the pipeline starts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Where the JSON payload is written.
    pub output: PathBuf,
    pub max_age_days: u32,
    pub max_items: usize,
    /// Entries (or listing candidates) taken from each source before filtering.
    pub per_source_limit: usize,
    pub timeout_ms: u64,
    /// Drop entries with no publication date instead of keeping them.
    pub require_date: bool,
    /// Delay between consecutive requests made on behalf of one source.
    pub pace_ms: u64,
    pub user_agent: String,
    /// Offset applied to dates written without one (Brasília is -3).
    pub utc_offset_hours: i32,
    pub pattern: Vec<Scope>,
    pub blocklist: Vec<String>,
    /// Hosts whose pages are redirectors, never articles.
    pub aggregator_domains: Vec<String>,
    /// Hosts serving aggregator placeholder art rather than article images.
    pub aggregator_image_hosts: Vec<String>,
    pub placeholder_title: String,
    pub sources: Vec<Source>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: PathBuf::from("data/news.json"),
            max_age_days: 3,
            max_items: 36,
            per_source_limit: 12,
            timeout_ms: 20_000,
            require_date: false,
            pace_ms: 250,
            user_agent: format!(
                "PontoViewBot/{} (+https://pontoview.com.br)",
                env!("CARGO_PKG_VERSION")
            ),
            utc_offset_hours: -3,
            pattern: DEFAULT_PATTERN.to_vec(),
            blocklist: DEFAULT_BLOCKLIST.iter().map(|s| s.to_string()).collect(),
            aggregator_domains: vec![
                "news.google.com".to_string(),
                "google.com".to_string(),
                "bing.com".to_string(),
            ],
            aggregator_image_hosts: vec![
                "googleusercontent.com".to_string(),
                "gstatic.com".to_string(),
                "news.google.com".to_string(),
            ],
            placeholder_title: "Sem notícias recentes no momento".to_string(),
            sources: default_sources(),
        }
    }
}

impl Config {
    /// Read a configuration file. Missing keys take their defaults.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        info!(sources = config.sources.len(), "Loaded configuration");
        Ok(config)
    }

    /// Resolve the run configuration from the command line.
    ///
    /// A sources file that cannot be read or parsed does not stop the run:
    /// the built-in defaults are used and the problem comes back as a
    /// [`Failure`] for the output stats. Overrides are applied either way.
    pub fn load_or_default(cli: &Cli) -> (Self, Option<Failure>) {
        let (mut config, failure) = match &cli.config {
            Some(path) => match Self::from_file(path) {
                Ok(config) => (config, None),
                Err(e) => {
                    warn!(error = %e, "Configuration unusable; falling back to built-in sources");
                    let failure = Failure {
                        source: "config".to_string(),
                        url: path.display().to_string(),
                        stage: FailureStage::Config,
                        error: e.to_string(),
                    };
                    (Self::default(), Some(failure))
                }
            },
            None => {
                info!("No sources file given; using built-in sources");
                (Self::default(), None)
            }
        };
        config.apply_overrides(cli);
        (config, failure)
    }

    /// Apply command-line and environment overrides.
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(output) = &cli.output {
            self.output = output.clone();
        }
        if let Some(days) = cli.max_age_days {
            self.max_age_days = days;
        }
        if let Some(n) = cli.max_items {
            self.max_items = n;
        }
        if let Some(n) = cli.per_source_limit {
            self.per_source_limit = n;
        }
        if let Some(ms) = cli.timeout_ms {
            self.timeout_ms = ms;
        }
        if cli.require_date {
            self.require_date = true;
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }

    /// The interleaving pattern with every scope reachable.
    ///
    /// Scopes missing from the configured pattern are appended once, in
    /// declaration order; an empty pattern becomes the default one.
    pub fn effective_pattern(&self) -> Vec<Scope> {
        let mut pattern = if self.pattern.is_empty() {
            DEFAULT_PATTERN.to_vec()
        } else {
            self.pattern.clone()
        };
        for scope in Scope::ALL {
            if !pattern.contains(&scope) {
                warn!(%scope, "Scope missing from pattern; appending it");
                pattern.push(scope);
            }
        }
        pattern
    }

    /// Blocklist tokens lowercased and trimmed, empties removed.
    pub fn blocklist_tokens(&self) -> Vec<String> {
        self.blocklist
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

fn google(name: &str, scope: Scope, query: &str, city: Option<&str>) -> Source {
    Source {
        name: name.to_string(),
        scope,
        kind: SourceKind::GoogleNews,
        url: None,
        query: Some(query.to_string()),
        hl: None,
        gl: None,
        ceid: None,
        city: city.map(String::from),
        state: Some("ES".to_string()),
        enrich: Some(true),
    }
}

fn fixed(name: &str, scope: Scope, kind: SourceKind, url: &str, city: Option<&str>) -> Source {
    Source {
        name: name.to_string(),
        scope,
        kind,
        url: Some(url.to_string()),
        query: None,
        hl: None,
        gl: None,
        ceid: None,
        city: city.map(String::from),
        state: Some("ES".to_string()),
        enrich: None,
    }
}

/// Built-in sources used when no configuration file is given.
pub fn default_sources() -> Vec<Source> {
    vec![
        fixed(
            "Prefeitura de Colatina",
            Scope::Local,
            SourceKind::Listing,
            "https://www.colatina.es.gov.br/noticias/",
            Some("Colatina"),
        ),
        google("Notícias de Colatina", Scope::Local, "Colatina ES when:3d", Some("Colatina")),
        google("Espírito Santo", Scope::State, "\"Espírito Santo\" governo when:3d", None),
        fixed(
            "Governo do ES",
            Scope::State,
            SourceKind::Listing,
            "https://www.es.gov.br/Noticias",
            None,
        ),
        google("Brasil", Scope::National, "serviço público Brasil when:2d", None),
        fixed(
            "Agência Brasil",
            Scope::National,
            SourceKind::Rss,
            "https://agenciabrasil.ebc.com.br/rss/ultimasnoticias/feed.xml",
            None,
        ),
        fixed(
            "Ministério da Saúde",
            Scope::Health,
            SourceKind::Rss,
            "https://www.gov.br/saude/pt-br/assuntos/noticias/RSS",
            None,
        ),
        google("Saúde", Scope::Health, "vacinação saúde Espírito Santo when:3d", None),
    ]
}
