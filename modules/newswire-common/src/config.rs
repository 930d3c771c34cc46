use std::env;
use std::time::Duration;

/// Relevance-scoring component weights (§4.5). Must sum to 1.0 within 0.01.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryWeights {
    pub text: f64,
    pub location: f64,
    pub date: f64,
    pub event_type: f64,
}

impl Default for QueryWeights {
    fn default() -> Self {
        Self {
            text: 0.40,
            location: 0.25,
            date: 0.20,
            event_type: 0.15,
        }
    }
}

impl QueryWeights {
    pub fn sum(&self) -> f64 {
        self.text + self.location + self.date + self.event_type
    }

    pub fn is_valid(&self) -> bool {
        (self.sum() - 1.0).abs() <= 0.01
    }
}

/// Operational configuration for the search pipeline, loaded from environment
/// variables (see the recognized configuration keys table). Values fall back
/// to the documented defaults when unset or unparsable.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Per-article LLM deadline.
    pub ollama_timeout: Duration,
    /// Hard cap on articles sent to the LLM per search.
    pub ollama_max_articles: usize,
    /// Per-search total LLM wall-clock budget.
    pub ollama_total_timeout: Duration,
    /// Whether C1 honors robots.txt.
    pub scraper_respect_robots: bool,
    /// Fan-out for C3 (concurrent source scrapes).
    pub max_concurrent_scrapes: usize,
    /// Fan-out for C4 (concurrent LLM extractions).
    pub max_concurrent_extractions: usize,
    /// Default per-host rate-limit seconds when a source doesn't specify one.
    pub scraper_delay: f64,
    /// Session eviction age.
    pub session_ttl: Duration,
    /// Relevance-scoring component weights.
    pub query_weights: QueryWeights,
    /// Drop-floor for relevance scoring.
    pub min_relevance: f64,
    /// Maximum candidate article links per source search-results page.
    pub max_articles_per_source: usize,
    /// Overall per-fetch HTTP timeout.
    pub fetch_timeout: Duration,
    /// Per-host robots.txt cache TTL.
    pub robots_cache_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ollama_timeout: Duration::from_secs(120),
            ollama_max_articles: 5,
            ollama_total_timeout: Duration::from_secs(480),
            scraper_respect_robots: false,
            max_concurrent_scrapes: 5,
            max_concurrent_extractions: 5,
            scraper_delay: 1.0,
            session_ttl: Duration::from_secs(24 * 60 * 60),
            query_weights: QueryWeights::default(),
            min_relevance: 0.30,
            max_articles_per_source: 10,
            fetch_timeout: Duration::from_secs(30),
            robots_cache_ttl: Duration::from_secs(60 * 60),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut config = Self {
            ollama_timeout: env_secs("OLLAMA_TIMEOUT", defaults.ollama_timeout),
            ollama_max_articles: env_usize("OLLAMA_MAX_ARTICLES", defaults.ollama_max_articles),
            ollama_total_timeout: env_secs("OLLAMA_TOTAL_TIMEOUT", defaults.ollama_total_timeout),
            scraper_respect_robots: env_bool(
                "SCRAPER_RESPECT_ROBOTS",
                defaults.scraper_respect_robots,
            ),
            max_concurrent_scrapes: env_usize(
                "MAX_CONCURRENT_SCRAPES",
                defaults.max_concurrent_scrapes,
            ),
            max_concurrent_extractions: defaults.max_concurrent_extractions,
            scraper_delay: env_f64("SCRAPER_DELAY", defaults.scraper_delay),
            session_ttl: env_secs(
                "SESSION_TTL_HOURS_AS_SECONDS",
                defaults.session_ttl,
            ),
            query_weights: env_query_weights(defaults.query_weights),
            min_relevance: env_f64("MIN_RELEVANCE", defaults.min_relevance),
            max_articles_per_source: defaults.max_articles_per_source,
            fetch_timeout: defaults.fetch_timeout,
            robots_cache_ttl: defaults.robots_cache_ttl,
        };

        if let Ok(hours) = env::var("SESSION_TTL_HOURS") {
            if let Ok(hours) = hours.parse::<u64>() {
                config.session_ttl = Duration::from_secs(hours * 3600);
            }
        }

        let concurrency_cap = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        config.max_concurrent_extractions = config.ollama_max_articles.min(concurrency_cap);

        config
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Parses `QUERY_WEIGHTS` as a `text,location,date,event_type` comma list
/// (§6.4). Falls back to `default` if the key is unset, malformed, or the
/// parsed weights don't sum to 1.0 within 0.01 (`QueryWeights::is_valid`).
fn env_query_weights(default: QueryWeights) -> QueryWeights {
    match env::var("QUERY_WEIGHTS") {
        Ok(raw) => env_query_weights_from(&raw, default),
        Err(_) => default,
    }
}

fn env_query_weights_from(raw: &str, default: QueryWeights) -> QueryWeights {
    let parsed: Option<Vec<f64>> = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>().ok())
        .collect();
    let Some(parts) = parsed else {
        return default;
    };
    let [text, location, date, event_type] = parts[..] else {
        return default;
    };
    let weights = QueryWeights {
        text,
        location,
        date,
        event_type,
    };
    if weights.is_valid() {
        weights
    } else {
        default
    }
}
