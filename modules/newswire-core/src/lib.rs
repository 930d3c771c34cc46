pub mod budget;
pub mod cancel;
pub mod entity_hints;
pub mod event_extractor;
pub mod extractor;
pub mod fetcher;
pub mod model;
pub mod orchestrator;
pub mod relevance;
pub mod scraper_manager;
pub mod session;
pub mod sources;
pub mod stream;

pub use cancel::CancelToken;
pub use entity_hints::HeuristicEntityHinter;
pub use event_extractor::{EntityHinter, EventExtractor, NoopEntityHinter};
pub use extractor::ContentExtractor;
pub use fetcher::HttpFetcher;
pub use model::{
    ArticleContent, Casualties, EventData, EventType, Location, PerpetratorType, Query,
    SearchSession, Selectors, SessionCounters, SessionStatus, SourceConfig,
};
pub use orchestrator::SearchOrchestrator;
pub use relevance::RelevanceMatcher;
pub use scraper_manager::ScraperManager;
pub use session::{SessionHandle, SessionRegistry};
pub use sources::{SourceConfigLoader, StaticSourceConfigLoader};
pub use stream::{StreamFrame, StreamSink, VecStreamSink};
