use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// CSS-selector fallback lists for one source, parsed once at config load
/// time rather than re-split on every extraction call.
#[derive(Debug, Clone, Default)]
pub struct Selectors {
    pub title: Vec<String>,
    pub content: Vec<String>,
    pub published_date: Vec<String>,
    pub author: Vec<String>,
    pub article_links: Vec<String>,
}

impl Selectors {
    /// Builds a `Selectors` from comma-separated fallback-list strings,
    /// trimming whitespace and dropping empty entries from each list.
    pub fn new(
        title: &str,
        content: &str,
        published_date: &str,
        author: &str,
        article_links: &str,
    ) -> Self {
        Self {
            title: split_fallbacks(title),
            content: split_fallbacks(content),
            published_date: split_fallbacks(published_date),
            author: split_fallbacks(author),
            article_links: split_fallbacks(article_links),
        }
    }
}

fn split_fallbacks(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// A configured news source: a search URL template and its CSS selectors.
/// Immutable once loaded (§3).
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub name: String,
    pub base_url: String,
    pub search_url_template: String,
    pub enabled: bool,
    pub category: String,
    pub rate_limit_seconds: f64,
    pub selectors: Selectors,
    pub user_agent: Option<String>,
}

impl SourceConfig {
    /// Registrable hosts this source's article links are allowed to point at.
    /// Falls back to `base_url`'s own host.
    pub fn registered_host(&self) -> Option<String> {
        newswire_common::urls::registrable_domain(&self.base_url)
    }
}

/// A search query, already validated against §3's invariants.
#[derive(Debug, Clone)]
pub struct Query {
    pub phrase: String,
    pub location: Option<String>,
    pub event_type: Option<EventType>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl Query {
    /// Validates and normalizes a raw query, returning `input_invalid`
    /// style errors (§7) as a plain `Result` the caller maps to its own
    /// failure representation.
    pub fn new(
        phrase: impl Into<String>,
        location: Option<String>,
        event_type: Option<EventType>,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> Result<Self, String> {
        let phrase = phrase.into().trim().to_string();
        if phrase.is_empty() {
            return Err("query phrase must not be empty".to_string());
        }
        if phrase.chars().count() > 500 {
            return Err("query phrase exceeds 500 characters".to_string());
        }
        if let (Some(from), Some(to)) = (date_from, date_to) {
            if from > to {
                return Err("date_from must not be after date_to".to_string());
            }
        }
        Ok(Self {
            phrase,
            location,
            event_type,
            date_from,
            date_to,
        })
    }
}

/// The scraped title+content+metadata of one article (§3). Produced by C2,
/// consumed by C4, never mutated afterward.
#[derive(Debug, Clone)]
pub struct ArticleContent {
    pub url: String,
    pub source_name: String,
    pub title: String,
    pub content: String,
    pub published_date: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

/// Deduplicated entity hints fed into the extraction prompt (§4.4).
#[derive(Debug, Clone, Default)]
pub struct Entities {
    pub persons: Vec<String>,
    pub organizations: Vec<String>,
    pub locations: Vec<String>,
    pub dates: Vec<String>,
}

impl Entities {
    /// Adds values to a category, deduping case-insensitively while
    /// preserving the first-seen capitalization.
    pub fn merge_into(target: &mut Vec<String>, values: impl IntoIterator<Item = String>) {
        let mut seen: std::collections::HashSet<String> =
            target.iter().map(|s| s.to_lowercase()).collect();
        for value in values {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                continue;
            }
            let key = trimmed.to_lowercase();
            if seen.insert(key) {
                target.push(trimmed);
            }
        }
    }
}

/// Controlled vocabulary for who/what caused an event (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerpetratorType {
    TerroristGroup,
    StateActor,
    CriminalOrganization,
    Individual,
    MultipleParties,
    Unknown,
    NotApplicable,
}

impl Default for PerpetratorType {
    fn default() -> Self {
        PerpetratorType::Unknown
    }
}

impl PerpetratorType {
    pub const ALL: [PerpetratorType; 7] = [
        PerpetratorType::TerroristGroup,
        PerpetratorType::StateActor,
        PerpetratorType::CriminalOrganization,
        PerpetratorType::Individual,
        PerpetratorType::MultipleParties,
        PerpetratorType::Unknown,
        PerpetratorType::NotApplicable,
    ];

    pub fn canonical_name(&self) -> &'static str {
        match self {
            PerpetratorType::TerroristGroup => "terrorist_group",
            PerpetratorType::StateActor => "state_actor",
            PerpetratorType::CriminalOrganization => "criminal_organization",
            PerpetratorType::Individual => "individual",
            PerpetratorType::MultipleParties => "multiple_parties",
            PerpetratorType::Unknown => "unknown",
            PerpetratorType::NotApplicable => "not_applicable",
        }
    }
}

/// Controlled event-category vocabulary (§3), partitioned by theme below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // violence / security
    Bombing,
    Shooting,
    ArmedAssault,
    Kidnapping,
    Assassination,
    Riot,
    Protest,
    // cyber
    Cyberattack,
    DataBreach,
    // meetings
    Summit,
    DiplomaticMeeting,
    PressConference,
    // disasters
    NaturalDisaster,
    IndustrialAccident,
    Fire,
    // political / military
    Election,
    PolicyAnnouncement,
    MilitaryOperation,
    Coup,
    Sanctions,
    // crisis
    Humanitarian,
    Epidemic,
    Evacuation,
    // other
    Other,
}

impl Default for EventType {
    fn default() -> Self {
        EventType::Other
    }
}

impl EventType {
    pub const ALL: [EventType; 23] = [
        EventType::Bombing,
        EventType::Shooting,
        EventType::ArmedAssault,
        EventType::Kidnapping,
        EventType::Assassination,
        EventType::Riot,
        EventType::Protest,
        EventType::Cyberattack,
        EventType::DataBreach,
        EventType::Summit,
        EventType::DiplomaticMeeting,
        EventType::PressConference,
        EventType::NaturalDisaster,
        EventType::IndustrialAccident,
        EventType::Fire,
        EventType::Election,
        EventType::PolicyAnnouncement,
        EventType::MilitaryOperation,
        EventType::Coup,
        EventType::Sanctions,
        EventType::Humanitarian,
        EventType::Epidemic,
        EventType::Evacuation,
        EventType::Other,
    ];

    pub fn canonical_name(&self) -> &'static str {
        match self {
            EventType::Bombing => "bombing",
            EventType::Shooting => "shooting",
            EventType::ArmedAssault => "armed_assault",
            EventType::Kidnapping => "kidnapping",
            EventType::Assassination => "assassination",
            EventType::Riot => "riot",
            EventType::Protest => "protest",
            EventType::Cyberattack => "cyberattack",
            EventType::DataBreach => "data_breach",
            EventType::Summit => "summit",
            EventType::DiplomaticMeeting => "diplomatic_meeting",
            EventType::PressConference => "press_conference",
            EventType::NaturalDisaster => "natural_disaster",
            EventType::IndustrialAccident => "industrial_accident",
            EventType::Fire => "fire",
            EventType::Election => "election",
            EventType::PolicyAnnouncement => "policy_announcement",
            EventType::MilitaryOperation => "military_operation",
            EventType::Coup => "coup",
            EventType::Sanctions => "sanctions",
            EventType::Humanitarian => "humanitarian",
            EventType::Epidemic => "epidemic",
            EventType::Evacuation => "evacuation",
            EventType::Other => "other",
        }
    }
}

/// A place an event occurred. At least one field is expected to be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
}

impl Location {
    pub fn fields(&self) -> [Option<&str>; 4] {
        [
            self.city.as_deref(),
            self.region.as_deref(),
            self.country.as_deref(),
            self.venue.as_deref(),
        ]
    }
}

/// Reported deaths/injuries. An absent key means "not stated", distinct
/// from a reported count of zero (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Casualties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub killed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub injured: Option<u32>,
}

/// The normalized event record (§3), the unit the rest of the pipeline
/// scores, ranks, and streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub event_type: EventType,
    pub title: String,
    pub summary: String,
    pub confidence: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub perpetrator: Option<PerpetratorType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_sub_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_published_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub casualties: Option<Casualties>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub organizations: Vec<String>,

    pub collection_timestamp: DateTime<Utc>,
    pub relevance_score: f64,
}

impl EventData {
    /// The date used for matching: `event_date` if present, else the
    /// article's own publication date (§3 invariant).
    pub fn matching_date(&self) -> Option<DateTime<Utc>> {
        self.event_date.or(self.article_published_date)
    }

    pub fn clamp_unit_fields(&mut self) {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self.relevance_score = self.relevance_score.clamp(0.0, 1.0);
    }
}

/// Lifecycle state of a `SearchSession` (§3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Monotonic progress counters for one session (§3, §6.3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionCounters {
    pub articles_scraped: u64,
    pub articles_extracted: u64,
    pub events_matched: u64,
    pub sources_done: u64,
    pub sources_total: u64,
    pub processing_seconds: f64,
}

/// A server-side handle for one in-flight or recently completed search
/// (§3). The cancellation flag and the counters are the only fields
/// mutated after construction; both are updated under the registry's
/// synchronization (see `session.rs`).
#[derive(Debug, Clone)]
pub struct SearchSession {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub query_phrase: String,
    pub status: SessionStatus,
    pub events: Vec<EventData>,
    pub counters: SessionCounters,
}

/// Quality breakdown for one `Score` call, useful for debugging and tests;
/// not part of the wire protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreBreakdown {
    pub text: f64,
    pub location: f64,
    pub date: f64,
    pub event_type: f64,
    pub confidence: f64,
    pub total: f64,
}

/// Known-host → canonical source-name table used by C4 when the LLM omits
/// `source_name` (§4.4). Keyed by registrable domain.
pub fn known_host_source_names() -> BTreeMap<&'static str, &'static str> {
    [
        ("reuters.com", "Reuters"),
        ("apnews.com", "Associated Press"),
        ("bbc.com", "BBC News"),
        ("bbc.co.uk", "BBC News"),
        ("cnn.com", "CNN"),
        ("nytimes.com", "The New York Times"),
        ("washingtonpost.com", "The Washington Post"),
        ("theguardian.com", "The Guardian"),
        ("aljazeera.com", "Al Jazeera"),
        ("npr.org", "NPR"),
        ("bloomberg.com", "Bloomberg"),
        ("ft.com", "Financial Times"),
        ("wsj.com", "The Wall Street Journal"),
        ("politico.com", "Politico"),
        ("axios.com", "Axios"),
        ("timesofindia.indiatimes.com", "The Times of India"),
        ("hindustantimes.com", "Hindustan Times"),
    ]
    .into_iter()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors_splits_fallback_list() {
        let selectors = Selectors::new("h1.title, h1", ".body, article", "", "", "a.link");
        assert_eq!(selectors.title, vec!["h1.title", "h1"]);
        assert_eq!(selectors.content, vec![".body", "article"]);
        assert_eq!(selectors.published_date, Vec::<String>::new());
        assert_eq!(selectors.article_links, vec!["a.link"]);
    }

    #[test]
    fn test_query_rejects_empty_phrase() {
        assert!(Query::new("   ", None, None, None, None).is_err());
    }

    #[test]
    fn test_query_rejects_inverted_dates() {
        use chrono::TimeZone;
        let from = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(Query::new("x", None, None, Some(from), Some(to)).is_err());
    }

    #[test]
    fn test_query_trims_phrase() {
        let query = Query::new("  protest  ", None, None, None, None).unwrap();
        assert_eq!(query.phrase, "protest");
    }

    #[test]
    fn test_entities_merge_dedupes_case_insensitively() {
        let mut target = vec!["Jane Doe".to_string()];
        Entities::merge_into(&mut target, vec!["jane doe".to_string(), "John Roe".to_string()]);
        assert_eq!(target, vec!["Jane Doe", "John Roe"]);
    }

    #[test]
    fn test_event_type_has_at_least_23_members() {
        assert!(EventType::ALL.len() >= 23);
    }

    #[test]
    fn test_clamp_unit_fields() {
        let mut event = sample_event();
        event.confidence = 1.5;
        event.relevance_score = -0.2;
        event.clamp_unit_fields();
        assert_eq!(event.confidence, 1.0);
        assert_eq!(event.relevance_score, 0.0);
    }

    fn sample_event() -> EventData {
        EventData {
            event_type: EventType::Other,
            title: "t".into(),
            summary: "s".into(),
            confidence: 0.5,
            perpetrator: None,
            event_sub_type: None,
            event_date: None,
            event_time: None,
            source_name: None,
            source_url: None,
            article_published_date: None,
            impact: None,
            full_content: None,
            location: None,
            casualties: None,
            participants: vec![],
            organizations: vec![],
            collection_timestamp: Utc::now(),
            relevance_score: 0.0,
        }
    }
}
