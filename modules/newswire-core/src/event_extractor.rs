use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

use ai_client::{util, GenerateOptions, TextGenerator};

use crate::model::{Casualties, Entities, EventData, EventType, Location, PerpetratorType};
use newswire_common::urls::registrable_domain;

const LEDE_CHARS: usize = 1500;
const TAIL_CHARS: usize = 500;
const ELISION_MARKER: &str = "\n\n[... article truncated ...]\n\n";
const MAX_HINT_ENTITIES: usize = 10;
const LLM_MAX_TOKENS: u32 = 500;
const LLM_TEMPERATURE: f32 = 0.2;

/// Optional NER-style hint producer (§6.1, "NER/Entity Hinter"). C4 must
/// still function with an empty `Entities` if unavailable.
#[async_trait]
pub trait EntityHinter: Send + Sync {
    async fn extract(&self, title: &str, content: &str) -> Entities;
}

/// Produces an empty hint set; the default when no NER collaborator is wired
/// up, matching §6.1's "optional" contract.
pub struct NoopEntityHinter;

#[async_trait]
impl EntityHinter for NoopEntityHinter {
    async fn extract(&self, _title: &str, _content: &str) -> Entities {
        Entities::default()
    }
}

/// Wire shape of the LLM's JSON response: every field optional and loosely
/// typed, per §9's "permissive wire schema" design note. `EventData` is the
/// strict internal schema this bridges into.
#[derive(Debug, Default, Deserialize)]
struct RawEventResponse {
    event_type: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    confidence: Option<f64>,
    perpetrator_type: Option<String>,
    event_sub_type: Option<String>,
    event_date: Option<String>,
    event_time: Option<String>,
    source_name: Option<String>,
    impact: Option<String>,
    location: Option<RawLocation>,
    casualties: Option<RawCasualties>,
    #[serde(default)]
    participants: Vec<String>,
    #[serde(default)]
    organizations: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLocation {
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
    venue: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCasualties {
    killed: Option<serde_json::Value>,
    injured: Option<serde_json::Value>,
}

/// Produces one `EventData` per article by invoking the LLM and normalizing
/// its output (§4.4 / C4).
pub struct EventExtractor {
    generator: std::sync::Arc<dyn TextGenerator>,
    model: String,
}

impl EventExtractor {
    pub fn new(generator: std::sync::Arc<dyn TextGenerator>, model: impl Into<String>) -> Self {
        Self {
            generator,
            model: model.into(),
        }
    }

    /// Extracts an event from one article, bounded by `deadline`. Returns
    /// `None` on timeout, cancellation, LLM failure, or unparsable output —
    /// callers treat all of these as "article skipped", never a pipeline
    /// failure (§7).
    pub async fn extract_from_article(
        &self,
        article: &crate::model::ArticleContent,
        entities: &Entities,
        deadline: Duration,
    ) -> Option<EventData> {
        let prompt = build_prompt(&article.content, entities);
        let opts = GenerateOptions::new(self.model.clone())
            .max_tokens(LLM_MAX_TOKENS)
            .temperature(LLM_TEMPERATURE);

        let call = self.generator.generate(SYSTEM_PROMPT, &prompt, &opts);
        let response = match tokio::time::timeout(deadline, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                warn!(url = %article.url, ?err, "LLM call failed, skipping article");
                return None;
            }
            Err(_) => {
                warn!(url = %article.url, "LLM call timed out, skipping article");
                return None;
            }
        };

        let raw = match parse_response(&response) {
            Some(raw) => raw,
            None => {
                debug!(url = %article.url, "LLM response was not parsable JSON");
                return None;
            }
        };

        Some(normalize(raw, article, entities))
    }
}

const SYSTEM_PROMPT: &str = "You are an information-extraction assistant. Read the news article \
excerpt and emit a single JSON object describing the primary event it reports, using the field \
names and controlled vocabularies you are given. Emit JSON only, with no surrounding prose.";

fn build_prompt(content: &str, entities: &Entities) -> String {
    let truncated = truncate_lede_and_tail(content, LEDE_CHARS, TAIL_CHARS);
    let hints = format_entity_hints(entities);
    let event_types = EventType::ALL
        .iter()
        .map(|e| e.canonical_name())
        .collect::<Vec<_>>()
        .join(", ");
    let perpetrator_types = PerpetratorType::ALL
        .iter()
        .map(|p| p.canonical_name())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Article excerpt:\n{truncated}\n\n{hints}\nRespond with a single JSON object with these \
         fields: event_type (one of: {event_types}), title, summary, confidence (0 to 1), \
         perpetrator_type (one of: {perpetrator_types}), event_sub_type, event_date \
         (YYYY-MM-DD), event_time, source_name, impact, location (city, region, country, venue), \
         casualties (killed, injured), participants (list), organizations (list)."
    )
}

fn truncate_lede_and_tail(content: &str, lede_chars: usize, tail_chars: usize) -> String {
    let total_chars = content.chars().count();
    if total_chars <= lede_chars + tail_chars {
        return content.to_string();
    }
    let lede: String = content.chars().take(lede_chars).collect();
    let tail: String = content
        .chars()
        .skip(total_chars - tail_chars)
        .collect();
    format!("{lede}{ELISION_MARKER}{tail}")
}

fn format_entity_hints(entities: &Entities) -> String {
    let persons = join_capped(&entities.persons);
    let orgs = join_capped(&entities.organizations);
    let locations = join_capped(&entities.locations);
    let dates = join_capped(&entities.dates);

    if persons.is_empty() && orgs.is_empty() && locations.is_empty() && dates.is_empty() {
        return String::new();
    }

    format!(
        "Detected entities (hints, may be incomplete): persons: [{persons}]; organizations: \
         [{orgs}]; locations: [{locations}]; dates: [{dates}]\n\n"
    )
}

fn join_capped(items: &[String]) -> String {
    items
        .iter()
        .take(MAX_HINT_ENTITIES)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_response(response: &str) -> Option<RawEventResponse> {
    let stripped = util::strip_code_blocks(response);
    let candidate = util::extract_balanced_braces(stripped).unwrap_or(stripped);
    serde_json::from_str(candidate).ok()
}

fn normalize(
    raw: RawEventResponse,
    article: &crate::model::ArticleContent,
    entities: &Entities,
) -> EventData {
    let event_type = raw
        .event_type
        .as_deref()
        .map(fuzzy_match_event_type)
        .unwrap_or_default();
    let perpetrator = raw
        .perpetrator_type
        .as_deref()
        .map(fuzzy_match_perpetrator_type);

    let confidence = raw.confidence.unwrap_or(0.75).clamp(0.0, 1.0);

    let event_date = raw
        .event_date
        .as_deref()
        .and_then(crate::extractor::parse_date_loose);

    let source_name = raw
        .source_name
        .filter(|s| !s.trim().is_empty())
        .or_else(|| derive_source_name(&article.url));

    let location = raw.location.map(|l| Location {
        city: non_empty(l.city),
        region: non_empty(l.region),
        country: non_empty(l.country),
        venue: non_empty(l.venue),
    });

    let casualties = raw.casualties.map(|c| Casualties {
        killed: non_negative_int(c.killed),
        injured: non_negative_int(c.injured),
    });

    let mut participants = raw.participants;
    Entities::merge_into(&mut participants, entities.persons.iter().cloned());
    let mut organizations = raw.organizations;
    Entities::merge_into(&mut organizations, entities.organizations.iter().cloned());

    let mut event = EventData {
        event_type,
        title: raw.title.unwrap_or_else(|| article.title.clone()),
        summary: raw.summary.unwrap_or_default(),
        confidence,
        perpetrator,
        event_sub_type: non_empty(raw.event_sub_type),
        event_date,
        event_time: non_empty(raw.event_time),
        source_name,
        source_url: Some(article.url.clone()),
        article_published_date: article.published_date,
        impact: non_empty(raw.impact),
        full_content: Some(article.content.clone()),
        location,
        casualties,
        participants,
        organizations,
        collection_timestamp: Utc::now(),
        relevance_score: 0.0,
    };
    event.clamp_unit_fields();
    event
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn non_negative_int(value: Option<serde_json::Value>) -> Option<u32> {
    match value {
        Some(serde_json::Value::Number(n)) => {
            let as_i64 = n.as_i64()?;
            if as_i64 >= 0 {
                Some(as_i64 as u32)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn derive_source_name(url: &str) -> Option<String> {
    let domain = registrable_domain(url)?;
    if let Some(name) = crate::model::known_host_source_names().get(domain.as_str()) {
        return Some(name.to_string());
    }
    Some(domain)
}

/// Compares `raw` case-insensitively against every enum member; on no exact
/// match, picks the member whose canonical name shares the longest common
/// substring with `raw` (ties broken alphabetically); defaults to `other`
/// (§4.4).
fn fuzzy_match_event_type(raw: &str) -> EventType {
    let lower = raw.to_lowercase();
    for candidate in EventType::ALL {
        if candidate.canonical_name() == lower || candidate.canonical_name().replace('_', " ") == lower {
            return candidate;
        }
    }
    best_fuzzy_match(&lower, &EventType::ALL, |e| e.canonical_name())
        .unwrap_or(EventType::Other)
}

fn fuzzy_match_perpetrator_type(raw: &str) -> PerpetratorType {
    let lower = raw.to_lowercase();
    for candidate in PerpetratorType::ALL {
        if candidate.canonical_name() == lower || candidate.canonical_name().replace('_', " ") == lower {
            return candidate;
        }
    }
    best_fuzzy_match(&lower, &PerpetratorType::ALL, |p| p.canonical_name())
        .unwrap_or(PerpetratorType::Unknown)
}

fn best_fuzzy_match<T: Copy>(
    lower_raw: &str,
    candidates: &[T],
    name_of: impl Fn(&T) -> &'static str,
) -> Option<T> {
    let mut best: Option<(T, usize, &'static str)> = None;
    for candidate in candidates {
        let name = name_of(candidate);
        let score = longest_common_substring_len(lower_raw, name);
        if score == 0 {
            continue;
        }
        let better = match &best {
            None => true,
            Some((_, best_score, best_name)) => {
                score > *best_score || (score == *best_score && name < *best_name)
            }
        };
        if better {
            best = Some((*candidate, score, name));
        }
    }
    best.map(|(c, _, _)| c)
}

fn longest_common_substring_len(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut best = 0;
    for i in 1..=a.len() {
        let mut curr = vec![0usize; b.len() + 1];
        for j in 1..=b.len() {
            if a[i - 1] == b[j - 1] {
                curr[j] = prev[j - 1] + 1;
                best = best.max(curr[j]);
            }
        }
        prev = curr;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_lede_and_tail() {
        let content = "A".repeat(3000);
        let truncated = truncate_lede_and_tail(&content, 1500, 500);
        assert!(truncated.contains(ELISION_MARKER));
        assert_eq!(truncated.chars().filter(|c| *c == 'A').count(), 2000);
    }

    #[test]
    fn test_truncate_noop_for_short_content() {
        let content = "short article";
        assert_eq!(truncate_lede_and_tail(content, 1500, 500), content);
    }

    #[test]
    fn test_fuzzy_match_event_type_exact() {
        assert_eq!(fuzzy_match_event_type("bombing"), EventType::Bombing);
    }

    #[test]
    fn test_fuzzy_match_event_type_bombing_attack() {
        assert_eq!(fuzzy_match_event_type("BOMBING ATTACK"), EventType::Bombing);
    }

    #[test]
    fn test_fuzzy_match_event_type_unmatched_defaults_other() {
        assert_eq!(fuzzy_match_event_type("xyz"), EventType::Other);
    }

    #[test]
    fn test_fuzzy_match_is_idempotent() {
        let first = fuzzy_match_event_type("BOMBING ATTACK");
        let second = fuzzy_match_event_type(first.canonical_name());
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_response_strips_fences_and_prose() {
        let response = "Sure thing! ```json\n{\"event_type\": \"protest\", \"confidence\": 0.9}\n```";
        let raw = parse_response(response).expect("should parse");
        assert_eq!(raw.event_type.as_deref(), Some("protest"));
    }

    #[test]
    fn test_parse_response_rejects_non_json() {
        assert!(parse_response("not json at all").is_none());
    }

    #[test]
    fn test_non_negative_int_drops_negative() {
        assert_eq!(
            non_negative_int(Some(serde_json::json!(-3))),
            None
        );
        assert_eq!(non_negative_int(Some(serde_json::json!(5))), Some(5));
    }

    #[test]
    fn test_derive_source_name_known_host() {
        assert_eq!(
            derive_source_name("https://www.reuters.com/world/article"),
            Some("Reuters".to_string())
        );
    }

    #[test]
    fn test_derive_source_name_unknown_host_falls_back_to_domain() {
        assert_eq!(
            derive_source_name("https://obscure-gazette.example.org/a"),
            Some("obscure-gazette.example.org".to_string())
        );
    }
}
