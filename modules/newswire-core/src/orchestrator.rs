use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, Utc};
use tokio::sync::Semaphore;
use tracing::info;
use uuid::Uuid;

use newswire_common::{urls::canonical_url, PipelineConfig, PipelineError};

use crate::budget::LlmBudget;
use crate::cancel::CancelToken;
use crate::event_extractor::{EntityHinter, EventExtractor, NoopEntityHinter};
use crate::fetcher::HttpFetcher;
use crate::model::{ArticleContent, Query, SearchSession, SessionStatus, SourceConfig};
use crate::relevance::RelevanceMatcher;
use crate::scraper_manager::ScraperManager;
use crate::session::{SessionHandle, SessionRegistry};
use crate::sources::SourceConfigLoader;
use crate::stream::{StreamFrame, StreamSink};

const SESSION_ANNOUNCE_DELAY: Duration = Duration::from_millis(100);

/// Drives one search end-to-end: scrape → extract → match → emit (§4.6 /
/// C6). Owns the session registry, the per-search cancellation and
/// timeout model, and the streaming protocol.
pub struct SearchOrchestrator {
    config: PipelineConfig,
    registry: Arc<SessionRegistry>,
    scraper_manager: Arc<ScraperManager>,
    event_extractor: Arc<EventExtractor>,
    relevance_matcher: Arc<RelevanceMatcher>,
    entity_hinter: Arc<dyn EntityHinter>,
    source_loader: Arc<dyn SourceConfigLoader>,
}

impl SearchOrchestrator {
    pub fn new(
        config: PipelineConfig,
        event_extractor: Arc<EventExtractor>,
        source_loader: Arc<dyn SourceConfigLoader>,
    ) -> Arc<Self> {
        Self::with_entity_hinter(config, event_extractor, source_loader, Arc::new(NoopEntityHinter))
    }

    pub fn with_entity_hinter(
        config: PipelineConfig,
        event_extractor: Arc<EventExtractor>,
        source_loader: Arc<dyn SourceConfigLoader>,
        entity_hinter: Arc<dyn EntityHinter>,
    ) -> Arc<Self> {
        let fetcher = Arc::new(HttpFetcher::new());
        let registry = SessionRegistry::new(config.session_ttl);
        registry.spawn_eviction_task(Duration::from_secs(300));
        let relevance_matcher = Arc::new(RelevanceMatcher::new(
            config.query_weights,
            config.min_relevance,
        ));
        Arc::new(Self {
            scraper_manager: Arc::new(ScraperManager::new(fetcher)),
            registry,
            event_extractor,
            relevance_matcher,
            entity_hinter,
            source_loader,
            config,
        })
    }

    /// `StartSearch(query) → (sessionId, Stream)` (§6.2). Creates the
    /// session synchronously so the caller can `CancelSession` immediately;
    /// the pipeline itself runs on a spawned task and talks to `sink`.
    pub fn start_search(self: &Arc<Self>, query: Query, sink: Arc<dyn StreamSink>) -> Uuid {
        let handle = self.registry.create(query.phrase.clone());
        let id = handle.id;
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.run_search(handle, query, sink).await;
        });
        id
    }

    /// `GetSession(sessionId) → SearchSession | not_found` (§6.2).
    pub fn get_session(&self, id: Uuid) -> Result<SearchSession, PipelineError> {
        self.registry.get(id).ok_or(PipelineError::NotFound)
    }

    /// `CancelSession(sessionId) → cancelled | not_found | already_terminal`
    /// (§6.2). `already_terminal` is folded into success — marking a
    /// terminal session is defined as a no-op (§4.6) rather than an error.
    pub fn cancel_session(&self, id: Uuid) -> Result<(), PipelineError> {
        self.registry.mark_cancelled(id)
    }

    async fn run_search(self: Arc<Self>, handle: SessionHandle, query: Query, sink: Arc<dyn StreamSink>) {
        let start = Instant::now();
        sink.emit(StreamFrame::Session {
            session_id: handle.id,
        })
        .await;

        tokio::time::sleep(SESSION_ANNOUNCE_DELAY).await;

        if handle.cancel.is_cancelled() {
            self.finish_cancelled(&handle, &sink).await;
            return;
        }

        let mut scrape_query = query.clone();
        scrape_query.phrase = enhance_phrase_with_date_context(
            &query.phrase,
            query.date_from,
            query.date_to,
        );

        let sources = self.source_loader.load().await;
        let enabled_sources: Vec<SourceConfig> =
            sources.into_iter().filter(|s| s.enabled).collect();

        let articles = if enabled_sources.is_empty() {
            handle.update_counters(|c| c.sources_total = 0);
            Vec::new()
        } else {
            self.scrape_all_sources(&enabled_sources, &scrape_query, &handle, &sink)
                .await
        };

        if !handle.cancel.is_cancelled() {
            self.run_llm_phase(articles, &query, &handle, &sink).await;
        }

        if handle.cancel.is_cancelled() {
            self.finish_cancelled(&handle, &sink).await;
        } else {
            self.finish_completed(&handle, &sink, start).await;
        }
    }

    async fn scrape_all_sources(
        &self,
        sources: &[SourceConfig],
        query: &Query,
        handle: &SessionHandle,
        sink: &Arc<dyn StreamSink>,
    ) -> Vec<ArticleContent> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_scrapes.max(1)));
        let mut tasks = Vec::new();

        for source in sources {
            if handle.cancel.is_cancelled() {
                break;
            }
            let semaphore = Arc::clone(&semaphore);
            let scraper_manager = Arc::clone(&self.scraper_manager);
            let source = source.clone();
            let query = query.clone();
            let cancel = handle.cancel.clone();
            let respect_robots = self.config.scraper_respect_robots;
            let max_per_source = self.config.max_articles_per_source;
            let scraper_delay = self.config.scraper_delay;
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                // Re-check after the permit wait, not just at dispatch time: with
                // `max_concurrent_scrapes` >= source count every task acquires its
                // permit immediately, so this is what actually stops a later source's
                // fetch from starting once cancellation lands mid-scrape (S2).
                if cancel.is_cancelled() {
                    return Vec::new();
                }
                scraper_manager
                    .scrape_source_bounded(
                        &source,
                        &query,
                        max_per_source,
                        respect_robots,
                        scraper_delay,
                        &cancel,
                    )
                    .await
            }));
        }

        let sources_total = tasks.len() as u64;
        let mut articles = Vec::new();
        let mut seen_canonical = HashSet::new();

        for task in tasks {
            let scraped = task.await.unwrap_or_default();
            for article in scraped {
                let key = canonical_url(&article.url).unwrap_or_else(|| article.url.clone());
                if seen_canonical.insert(key) {
                    articles.push(article);
                }
            }
            handle.update_counters(|c| {
                c.sources_done += 1;
                c.sources_total = sources_total;
                c.articles_scraped = articles.len() as u64;
            });
            sink.emit(StreamFrame::progress("source scraped", handle.counters()))
                .await;
        }

        articles
    }

    async fn run_llm_phase(
        &self,
        articles: Vec<ArticleContent>,
        query: &Query,
        handle: &SessionHandle,
        sink: &Arc<dyn StreamSink>,
    ) {
        let capped: Vec<ArticleContent> = articles
            .into_iter()
            .take(self.config.ollama_max_articles)
            .collect();

        let budget = LlmBudget::new(self.config.ollama_total_timeout);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_extractions.max(1)));
        let mut tasks = Vec::new();

        for article in capped {
            if handle.cancel.is_cancelled() {
                break;
            }
            let semaphore = Arc::clone(&semaphore);
            let extractor = Arc::clone(&self.event_extractor);
            let entity_hinter = Arc::clone(&self.entity_hinter);
            let cancel = handle.cancel.clone();
            let ollama_timeout = self.config.ollama_timeout;
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                // Budget is only resolved once this task actually holds a permit and is
                // about to run, not when it was dispatched — a task queued behind the
                // semaphore must see the budget as it stands when its turn comes, not a
                // deadline snapshotted before it waited in line (§4.6 step 5).
                if cancel.is_cancelled() || budget.is_exhausted() {
                    return None;
                }
                let deadline = ollama_timeout.min(budget.remaining());
                let entities = entity_hinter.extract(&article.title, &article.content).await;
                let event = extractor
                    .extract_from_article(&article, &entities, deadline)
                    .await;
                if cancel.is_cancelled() {
                    return Some(None);
                }
                Some(event.map(|e| (article, e)))
            }));
        }

        for task in tasks {
            // `None` means the task never started an extraction (cancelled or the
            // total budget ran out before its permit came up) — it was dropped, not
            // processed, so it does not count toward `articles_extracted` (§4.6 step 5,
            // S4: "stop enqueuing" / "remaining articles dropped").
            let Some(outcome) = task.await.unwrap_or(None) else {
                continue;
            };
            handle.update_counters(|c| c.articles_extracted += 1);

            if let Some((_article, event)) = outcome {
                let breakdown = self.relevance_matcher.score(query, &event);
                let mut event = event;
                event.relevance_score = breakdown.total;
                if breakdown.total >= self.config.min_relevance {
                    handle.push_event(event.clone());
                    sink.emit(StreamFrame::Event { event }).await;
                }
            }

            sink.emit(StreamFrame::progress("article processed", handle.counters()))
                .await;
        }
    }

    async fn finish_cancelled(&self, handle: &SessionHandle, sink: &Arc<dyn StreamSink>) {
        handle.finish(SessionStatus::Cancelled);
        let total_events = handle.event_count() as u64;
        info!(session_id = %handle.id, total_events, "session cancelled");
        sink.emit(StreamFrame::Cancelled {
            total_events,
            message: "search cancelled".to_string(),
        })
        .await;
    }

    async fn finish_completed(&self, handle: &SessionHandle, sink: &Arc<dyn StreamSink>, start: Instant) {
        handle.finish(SessionStatus::Completed);
        let counters = handle.counters();
        sink.emit(StreamFrame::Complete {
            total_events: handle.event_count() as u64,
            articles_processed: counters.articles_extracted,
            processing_time: start.elapsed().as_secs_f64(),
        })
        .await;
    }
}

/// Treats a client disconnect mid-stream as an implicit `MarkCancelled`
/// (§4.6). Callers of the CLI/transport shell call this when their
/// connection drops.
pub fn cancel_on_disconnect(cancel: &CancelToken) {
    cancel.cancel();
}

/// Builds the date-context phrase suffix appended for scraping only (§4.6
/// step 3); `location`/`event_type` are never appended, only used in
/// scoring and filtering.
fn enhance_phrase_with_date_context(
    phrase: &str,
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
) -> String {
    let suffix = match (date_from, date_to) {
        (Some(from), Some(to)) if from.year() == to.year() && from.month() == to.month() => {
            format!("{}", from.format("%B %Y"))
        }
        (Some(from), Some(to)) => {
            format!("{} to {}", from.format("%B %Y"), to.format("%B %Y"))
        }
        (Some(from), None) => format!("after {}", from.format("%B %Y")),
        (None, Some(to)) => format!("before {}", to.format("%B %Y")),
        (None, None) => "recent".to_string(),
    };
    format!("{phrase} {suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_enhance_phrase_no_dates_appends_recent() {
        assert_eq!(
            enhance_phrase_with_date_context("protest", None, None),
            "protest recent"
        );
    }

    #[test]
    fn test_enhance_phrase_same_month_appends_single_month() {
        let from = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap();
        assert_eq!(
            enhance_phrase_with_date_context("protest", Some(from), Some(to)),
            "protest March 2025"
        );
    }

    #[test]
    fn test_enhance_phrase_different_months_appends_range() {
        let from = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(
            enhance_phrase_with_date_context("protest", Some(from), Some(to)),
            "protest January 2025 to March 2025"
        );
    }

    #[test]
    fn test_enhance_phrase_only_from_appends_after() {
        let from = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            enhance_phrase_with_date_context("protest", Some(from), None),
            "protest after January 2025"
        );
    }

    #[test]
    fn test_enhance_phrase_only_to_appends_before() {
        let to = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            enhance_phrase_with_date_context("protest", None, Some(to)),
            "protest before January 2025"
        );
    }

    struct SlowGenerator {
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl ai_client::TextGenerator for SlowGenerator {
        async fn generate(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _opts: &ai_client::GenerateOptions,
        ) -> ai_client::Result<String> {
            tokio::time::sleep(self.delay).await;
            Ok(r#"{"event_type":"protest","title":"t","summary":"s","confidence":0.8}"#.to_string())
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    fn fixture_article(n: usize) -> ArticleContent {
        ArticleContent {
            url: format!("https://example.com/{n}"),
            source_name: "example".to_string(),
            title: "t".to_string(),
            content: "c".repeat(200),
            published_date: None,
            author: None,
            scraped_at: Utc::now(),
        }
    }

    /// S4 — once the total LLM budget runs out, articles still waiting on the
    /// extraction semaphore are dropped rather than run with a full
    /// per-article deadline (§4.6 step 5).
    #[tokio::test]
    async fn test_run_llm_phase_drops_articles_once_total_budget_is_exhausted() {
        let mut config = PipelineConfig::default();
        config.ollama_total_timeout = Duration::from_millis(120);
        config.ollama_timeout = Duration::from_secs(5);
        config.max_concurrent_extractions = 1;

        let generator: Arc<dyn ai_client::TextGenerator> = Arc::new(SlowGenerator {
            delay: Duration::from_millis(50),
        });
        let extractor = Arc::new(EventExtractor::new(generator, "fake-model"));
        let loader = Arc::new(crate::sources::StaticSourceConfigLoader::new(vec![]));
        let orchestrator = SearchOrchestrator::new(config, extractor, loader);

        let registry = SessionRegistry::new(Duration::from_secs(3600));
        let handle = registry.create("test".to_string());
        let sink: Arc<dyn StreamSink> = Arc::new(crate::stream::VecStreamSink::new());
        let query = Query::new("test", None, None, None, None).unwrap();

        let articles: Vec<ArticleContent> = (0..5).map(fixture_article).collect();
        orchestrator.run_llm_phase(articles, &query, &handle, &sink).await;

        let counters = handle.counters();
        assert!(
            counters.articles_extracted < 5,
            "later articles should be dropped once the total budget runs out, got {}",
            counters.articles_extracted
        );
        assert!(counters.articles_extracted >= 1);
    }
}
