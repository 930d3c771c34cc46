use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::{Claude, OpenAi, TextGenerator};
use newswire_common::PipelineConfig;
use newswire_core::model::{EventType, Query, Selectors, SourceConfig};
use newswire_core::{
    EventExtractor, HeuristicEntityHinter, SearchOrchestrator, SessionStatus,
    StaticSourceConfigLoader, StreamFrame, StreamSink,
};

/// Runs one search against the pipeline and streams frames to stdout.
/// Stands in for the out-of-scope HTTP transport shell, the same way
/// `rootsignal-scout`'s binary runs the scout directly without a web layer.
#[derive(Parser, Debug)]
#[command(name = "newswire", version, about = "Search news sources for events matching a query")]
struct Cli {
    /// Free-text search phrase
    query: String,

    /// Restrict/boost results to this location (city, region, or country)
    #[arg(long)]
    location: Option<String>,

    /// Restrict/boost results to this event type (e.g. "protest", "bombing")
    #[arg(long = "event-type")]
    event_type: Option<String>,

    /// Earliest event date, YYYY-MM-DD
    #[arg(long = "date-from")]
    date_from: Option<String>,

    /// Latest event date, YYYY-MM-DD
    #[arg(long = "date-to")]
    date_to: Option<String>,

    /// LLM provider to extract events with
    #[arg(long, value_enum, default_value = "openai")]
    provider: Provider,

    /// Model identifier passed to the provider; defaults to a sensible
    /// per-provider choice if omitted
    #[arg(long)]
    model: Option<String>,

    /// Emit each stream frame as a JSON line instead of a human-readable one
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Provider {
    Openai,
    Claude,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("newswire=info".parse()?))
        .init();

    let cli = Cli::parse();
    let query = build_query(&cli)?;

    let generator: Arc<dyn TextGenerator> = match cli.provider {
        Provider::Openai => Arc::new(
            OpenAi::from_env().context("failed to construct OpenAI client from environment")?,
        ),
        Provider::Claude => Arc::new(
            Claude::from_env().context("failed to construct Claude client from environment")?,
        ),
    };
    let model = cli.model.clone().unwrap_or_else(|| match cli.provider {
        Provider::Openai => "gpt-4o-mini".to_string(),
        Provider::Claude => "claude-haiku-4-5-20251001".to_string(),
    });

    let config = PipelineConfig::from_env();
    let event_extractor = Arc::new(EventExtractor::new(generator, model));
    let source_loader = Arc::new(StaticSourceConfigLoader::new(builtin_sources()));

    let orchestrator = SearchOrchestrator::with_entity_hinter(
        config,
        event_extractor,
        source_loader,
        Arc::new(HeuristicEntityHinter),
    );

    let sink = Arc::new(StdoutSink { json: cli.json });
    let session_id = orchestrator.start_search(query, sink.clone());
    info!(%session_id, "search started");

    let mut signal = std::pin::pin!(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            _ = &mut signal => {
                info!(%session_id, "interrupt received, cancelling session");
                let _ = orchestrator.cancel_session(session_id);
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }

        match orchestrator.get_session(session_id) {
            Ok(session) if session.status != SessionStatus::Running => break,
            Ok(_) => continue,
            Err(_) => break,
        }
    }

    Ok(())
}

fn build_query(cli: &Cli) -> Result<Query> {
    let event_type = cli.event_type.as_deref().and_then(parse_event_type);
    let date_from = cli
        .date_from
        .as_deref()
        .map(parse_date_boundary)
        .transpose()?;
    let date_to = cli.date_to.as_deref().map(parse_date_boundary).transpose()?;

    Query::new(
        cli.query.clone(),
        cli.location.clone(),
        event_type,
        date_from,
        date_to,
    )
    .map_err(anyhow::Error::msg)
}

fn parse_event_type(raw: &str) -> Option<EventType> {
    let normalized = raw.trim().to_lowercase().replace([' ', '-'], "_");
    EventType::ALL
        .iter()
        .find(|e| e.canonical_name() == normalized)
        .copied()
}

fn parse_date_boundary(raw: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date {raw:?}, expected YYYY-MM-DD"))?;
    Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()))
}

/// A handful of illustrative sources. Loading `SourceConfig` from a file or
/// remote store is out of scope for the pipeline core; a real deployment
/// plugs its own `SourceConfigLoader` in here instead.
fn builtin_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "Reuters".to_string(),
            base_url: "https://www.reuters.com".to_string(),
            search_url_template: "https://www.reuters.com/site-search/?query={query}".to_string(),
            enabled: true,
            category: "general".to_string(),
            rate_limit_seconds: 2.0,
            selectors: Selectors::new(
                "h1, h1[data-testid='Heading']",
                "article p, div[data-testid='paragraph']",
                "time, [data-testid='datestamp']",
                "[data-testid='byline']",
                "a[data-testid='Title'], article a",
            ),
            user_agent: None,
        },
        SourceConfig {
            name: "Associated Press".to_string(),
            base_url: "https://apnews.com".to_string(),
            search_url_template: "https://apnews.com/search?q={query}".to_string(),
            enabled: true,
            category: "general".to_string(),
            rate_limit_seconds: 2.0,
            selectors: Selectors::new(
                "h1",
                "div.RichTextStoryBody p, article p",
                "span.Timestamp, time",
                "div.Component-bylines",
                "a.Link, div.PagePromo a",
            ),
            user_agent: None,
        },
        SourceConfig {
            name: "BBC News".to_string(),
            base_url: "https://www.bbc.com".to_string(),
            search_url_template: "https://www.bbc.co.uk/search?q={query}".to_string(),
            enabled: true,
            category: "general".to_string(),
            rate_limit_seconds: 2.0,
            selectors: Selectors::new(
                "h1#main-heading, h1",
                "article p, div[data-component='text-block'] p",
                "time",
                "div[data-component='byline-block']",
                "a.ssrcss-1mrs5ns-PromoLink, article a",
            ),
            user_agent: None,
        },
    ]
}

/// Prints each frame as it is emitted: one JSON line with `--json`, a short
/// human-readable line otherwise.
struct StdoutSink {
    json: bool,
}

#[async_trait]
impl StreamSink for StdoutSink {
    async fn emit(&self, frame: StreamFrame) {
        if self.json {
            if let Ok(line) = serde_json::to_string(&frame) {
                println!("{line}");
            }
            return;
        }

        match frame {
            StreamFrame::Session { session_id } => println!("[session] {session_id}"),
            StreamFrame::Progress {
                message,
                articles_scraped,
                articles_extracted,
                events_matched,
                sources_done,
                sources_total,
            } => println!(
                "[progress] {message} (sources {sources_done}/{sources_total}, \
                 scraped {articles_scraped}, extracted {articles_extracted}, matched {events_matched})"
            ),
            StreamFrame::Event { event } => {
                println!(
                    "[event] {:.2} {} — {}",
                    event.relevance_score,
                    event.event_type.canonical_name(),
                    event.title
                );
            }
            StreamFrame::Complete {
                total_events,
                articles_processed,
                processing_time,
            } => println!(
                "[complete] {total_events} events from {articles_processed} articles in {processing_time:.1}s"
            ),
            StreamFrame::Cancelled { total_events, message } => {
                println!("[cancelled] {message} ({total_events} events collected)")
            }
            StreamFrame::Error { message, recoverable } => {
                println!("[error] {message} (recoverable: {recoverable})")
            }
        }
    }
}
