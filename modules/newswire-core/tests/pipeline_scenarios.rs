use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use ai_client::{GenerateOptions, TextGenerator};
use newswire_common::PipelineConfig;
use newswire_core::event_extractor::EventExtractor;
use newswire_core::model::{ArticleContent, Entities, EventType, Query};
use newswire_core::orchestrator::SearchOrchestrator;
use newswire_core::relevance::RelevanceMatcher;
use newswire_core::sources::StaticSourceConfigLoader;
use newswire_core::stream::{StreamFrame, VecStreamSink};
use newswire_core::SessionStatus;

/// Returns a fixed response after an optional delay, standing in for the
/// external LLM collaborator in scenario tests (§8).
struct FakeTextGenerator {
    response: String,
    delay: Duration,
}

impl FakeTextGenerator {
    fn immediate(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            delay: Duration::ZERO,
        }
    }

    fn delayed(response: impl Into<String>, delay: Duration) -> Self {
        Self {
            response: response.into(),
            delay,
        }
    }
}

#[async_trait]
impl TextGenerator for FakeTextGenerator {
    async fn generate(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _opts: &GenerateOptions,
    ) -> ai_client::Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok(self.response.clone())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

fn mumbai_article() -> ArticleContent {
    ArticleContent {
        url: "https://example.com/mumbai-protest".to_string(),
        source_name: "example".to_string(),
        title: "Large protest in Mumbai city center".to_string(),
        content: "Thousands gathered in Mumbai on Saturday to protest new tax policy changes \
                  announced earlier this week, blocking major roads downtown for several hours \
                  before dispersing peacefully at nightfall."
            .to_string(),
        published_date: Some(Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap()),
        author: None,
        scraped_at: Utc::now(),
    }
}

/// S1 — happy path, single source, single event.
#[tokio::test]
async fn test_s1_happy_path_single_event_scores_above_floor() {
    let llm_response = r#"{"event_type":"protest","title":"Large protest in Mumbai city center",
        "summary":"Thousands gathered to protest new policy",
        "location":{"city":"Mumbai","country":"India"},
        "event_date":"2025-03-15","confidence":0.9}"#;
    let generator = Arc::new(FakeTextGenerator::immediate(llm_response));
    let extractor = EventExtractor::new(generator, "fake-model");

    let article = mumbai_article();
    let event = extractor
        .extract_from_article(&article, &Entities::default(), Duration::from_secs(5))
        .await
        .expect("should extract an event");

    let query = Query::new(
        "protest in Mumbai",
        Some("Mumbai".to_string()),
        Some(EventType::Protest),
        None,
        None,
    )
    .unwrap();
    let matcher = RelevanceMatcher::new(PipelineConfig::default().query_weights, 0.30);
    let ranked = matcher.score_and_rank(&query, vec![event]);

    assert_eq!(ranked.len(), 1, "event should clear the relevance floor");
    assert!(ranked[0].relevance_score >= 0.30);
    assert_eq!(ranked[0].event_type, EventType::Protest);
}

/// S5 — relevance floor drops a low-scoring, off-topic event.
#[tokio::test]
async fn test_s5_off_topic_event_dropped_by_relevance_floor() {
    let llm_response = r#"{"event_type":"cyberattack","title":"Cyberattack hits New York systems",
        "summary":"Hackers breached infrastructure in New York",
        "location":{"city":"New York","country":"USA"},
        "confidence":0.9}"#;
    let generator = Arc::new(FakeTextGenerator::immediate(llm_response));
    let extractor = EventExtractor::new(generator, "fake-model");

    let article = mumbai_article();
    let event = extractor
        .extract_from_article(&article, &Entities::default(), Duration::from_secs(5))
        .await
        .expect("should extract an event");

    let query = Query::new("protest in Mumbai", None, None, None, None).unwrap();
    let matcher = RelevanceMatcher::new(PipelineConfig::default().query_weights, 0.30);
    let ranked = matcher.score_and_rank(&query, vec![event]);

    assert!(ranked.is_empty(), "off-topic event should be dropped by the floor");
}

/// S6 — event-type fuzzy normalization via a noisy LLM label.
#[tokio::test]
async fn test_s6_fuzzy_event_type_normalization() {
    let bombing_response = r#"{"event_type":"BOMBING ATTACK","title":"t","summary":"s","confidence":0.8}"#;
    let generator = Arc::new(FakeTextGenerator::immediate(bombing_response));
    let extractor = EventExtractor::new(generator, "fake-model");
    let event = extractor
        .extract_from_article(&mumbai_article(), &Entities::default(), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(event.event_type, EventType::Bombing);

    let unknown_response = r#"{"event_type":"xyz","title":"t","summary":"s","confidence":0.8}"#;
    let generator = Arc::new(FakeTextGenerator::immediate(unknown_response));
    let extractor = EventExtractor::new(generator, "fake-model");
    let event = extractor
        .extract_from_article(&mumbai_article(), &Entities::default(), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(event.event_type, EventType::Other);
}

/// LLM returning non-JSON yields no event, and does not panic (boundary
/// behavior, §8).
#[tokio::test]
async fn test_llm_non_json_response_yields_no_event_without_panic() {
    let generator = Arc::new(FakeTextGenerator::immediate("I'm sorry, I can't help with that."));
    let extractor = EventExtractor::new(generator, "fake-model");
    let event = extractor
        .extract_from_article(&mumbai_article(), &Entities::default(), Duration::from_secs(5))
        .await;
    assert!(event.is_none());
}

/// A per-article deadline shorter than the fake LLM's delay times out and
/// yields no event, mirroring S3's per-article timeout behavior.
#[tokio::test]
async fn test_per_article_timeout_yields_no_event() {
    let generator = Arc::new(FakeTextGenerator::delayed(
        r#"{"event_type":"protest","title":"t","summary":"s","confidence":0.8}"#,
        Duration::from_millis(200),
    ));
    let extractor = EventExtractor::new(generator, "fake-model");
    let event = extractor
        .extract_from_article(&mumbai_article(), &Entities::default(), Duration::from_millis(20))
        .await;
    assert!(event.is_none());
}

/// Boundary: zero enabled sources completes immediately with all counters
/// zero, exactly one `session` frame and one `complete` frame, no `event`
/// frames (§8).
#[tokio::test]
async fn test_zero_sources_completes_with_all_counters_zero() {
    let config = PipelineConfig::default();
    let generator: Arc<dyn TextGenerator> = Arc::new(FakeTextGenerator::immediate("{}"));
    let extractor = Arc::new(EventExtractor::new(generator, "fake-model"));
    let loader = Arc::new(StaticSourceConfigLoader::new(vec![]));
    let orchestrator = SearchOrchestrator::new(config, extractor, loader);

    let sink = Arc::new(VecStreamSink::new());
    let query = Query::new("anything", None, None, None, None).unwrap();
    let session_id = orchestrator.start_search(query, sink.clone());

    wait_for_terminal_frame(&orchestrator, session_id).await;

    let frames = sink.frames_snapshot().await;
    assert!(matches!(frames.first(), Some(StreamFrame::Session { .. })));
    assert!(matches!(frames.last(), Some(StreamFrame::Complete { .. })));
    assert!(!frames.iter().any(|f| matches!(f, StreamFrame::Event { .. })));

    let session = orchestrator.get_session(session_id).unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.counters.articles_scraped, 0);
    assert_eq!(session.counters.events_matched, 0);
}

/// Cancellation requested immediately after `start_search` (before the
/// ~100ms session-announce delay elapses, simulating a client disconnect
/// that races the `session` frame) still yields a terminal `cancelled`
/// frame with zero events, never a further `event` frame (§5, §8).
#[tokio::test]
async fn test_cancellation_before_session_announce_settles_yields_no_events() {
    let config = PipelineConfig::default();
    let generator: Arc<dyn TextGenerator> = Arc::new(FakeTextGenerator::immediate("{}"));
    let extractor = Arc::new(EventExtractor::new(generator, "fake-model"));
    let loader = Arc::new(StaticSourceConfigLoader::new(vec![]));
    let orchestrator = SearchOrchestrator::new(config, extractor, loader);

    let sink = Arc::new(VecStreamSink::new());
    let query = Query::new("anything", None, None, None, None).unwrap();
    let session_id = orchestrator.start_search(query, sink.clone());
    orchestrator.cancel_session(session_id).unwrap();

    wait_for_terminal_frame(&orchestrator, session_id).await;

    let frames = sink.frames_snapshot().await;
    assert!(!frames.iter().any(|f| matches!(f, StreamFrame::Event { .. })));
    assert!(matches!(frames.last(), Some(StreamFrame::Cancelled { total_events: 0, .. })));

    let session = orchestrator.get_session(session_id).unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
}

/// A second cancellation request on an already-terminal session is a no-op
/// and still reports success (§4.6).
#[tokio::test]
async fn test_cancel_on_terminal_session_is_noop() {
    let config = PipelineConfig::default();
    let generator: Arc<dyn TextGenerator> = Arc::new(FakeTextGenerator::immediate("{}"));
    let extractor = Arc::new(EventExtractor::new(generator, "fake-model"));
    let loader = Arc::new(StaticSourceConfigLoader::new(vec![]));
    let orchestrator = SearchOrchestrator::new(config, extractor, loader);

    let sink = Arc::new(VecStreamSink::new());
    let query = Query::new("anything", None, None, None, None).unwrap();
    let session_id = orchestrator.start_search(query, sink.clone());
    wait_for_terminal_frame(&orchestrator, session_id).await;

    assert!(orchestrator.cancel_session(session_id).is_ok());
    let session = orchestrator.get_session(session_id).unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
}

async fn wait_for_terminal_frame(orchestrator: &Arc<SearchOrchestrator>, session_id: uuid::Uuid) {
    for _ in 0..100 {
        if let Ok(session) = orchestrator.get_session(session_id) {
            if session.status != SessionStatus::Running {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("session did not reach a terminal state in time");
}
