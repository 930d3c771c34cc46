use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::event_extractor::EntityHinter;
use crate::model::Entities;

const MAX_RAW_SPANS: usize = 40;

const ORG_SUFFIXES: &[&str] = &[
    "Inc", "Inc.", "Corp", "Corp.", "Ltd", "Ltd.", "LLC", "Co", "Co.", "Party", "Group",
    "Organization", "Organisation", "Ministry", "Department", "Agency", "Administration",
    "Union", "Authority", "Council", "Committee", "Commission", "Bank", "University",
    "Hospital", "Force", "Forces", "Army", "Police",
];

static CAPITALIZED_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-zA-Z.'-]*(?:\s+[A-Z][a-zA-Z.'-]*)*\b").unwrap());

static MONTH_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2}(?:st|nd|rd|th)?(?:,\s*\d{4})?\b",
    )
    .unwrap()
});

const SENTENCE_STARTERS: &[&str] = &[
    "The", "A", "An", "This", "That", "These", "Those", "It", "He", "She", "They", "We", "In",
    "On", "At", "For", "But", "And", "Last", "Next", "According",
];

/// A dependency-free NER stand-in (§6.1's "Entity Hinter" collaborator):
/// finds capitalized word spans and month-day mentions by regex, then
/// buckets spans by shallow surface cues. No ML dependency, since training
/// or hosting a model is out of scope.
pub struct HeuristicEntityHinter;

#[async_trait]
impl EntityHinter for HeuristicEntityHinter {
    async fn extract(&self, title: &str, content: &str) -> Entities {
        let combined = format!("{title} {content}");

        let mut dates = Vec::new();
        for found in MONTH_DATE.find_iter(&combined) {
            dates.push(found.as_str().to_string());
        }

        let mut persons = Vec::new();
        let mut organizations = Vec::new();
        let mut locations = Vec::new();

        for found in CAPITALIZED_SPAN.find_iter(&combined).take(MAX_RAW_SPANS) {
            let span = found.as_str();
            if SENTENCE_STARTERS.contains(&span) {
                continue;
            }
            let words: Vec<&str> = span.split_whitespace().collect();
            if words.len() == 1 && words[0].len() < 3 {
                continue;
            }

            if words.last().is_some_and(|w| ORG_SUFFIXES.contains(w)) {
                organizations.push(span.to_string());
            } else if words.len() == 2 {
                persons.push(span.to_string());
            } else {
                locations.push(span.to_string());
            }
        }

        let mut entities = Entities::default();
        Entities::merge_into(&mut entities.persons, persons);
        Entities::merge_into(&mut entities.organizations, organizations);
        Entities::merge_into(&mut entities.locations, locations);
        Entities::merge_into(&mut entities.dates, dates);
        entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_two_word_capitalized_span_becomes_a_person_hint() {
        let hinter = HeuristicEntityHinter;
        let entities = hinter
            .extract("Officials respond", "John Smith spoke to reporters on Tuesday.")
            .await;
        assert!(entities.persons.contains(&"John Smith".to_string()));
    }

    #[tokio::test]
    async fn test_org_suffix_span_becomes_an_organization_hint() {
        let hinter = HeuristicEntityHinter;
        let entities = hinter
            .extract("", "The statement was issued by the Acme Relief Organization today.")
            .await;
        assert!(entities.organizations.contains(&"Acme Relief Organization".to_string()));
    }

    #[tokio::test]
    async fn test_month_day_mention_becomes_a_date_hint() {
        let hinter = HeuristicEntityHinter;
        let entities = hinter
            .extract("", "The event took place on March 14, 2025 in the capital.")
            .await;
        assert!(entities.dates.iter().any(|d| d.starts_with("March 14")));
    }

    #[tokio::test]
    async fn test_sentence_starter_is_not_treated_as_an_entity() {
        let hinter = HeuristicEntityHinter;
        let entities = hinter.extract("", "The city announced new measures.").await;
        assert!(!entities.locations.iter().any(|l| l == "The"));
    }
}
