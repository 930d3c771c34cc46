use std::collections::HashSet;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

use newswire_common::QueryWeights;

use crate::model::{EventData, EventType, Query, ScoreBreakdown};

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "be", "been", "being", "this", "that", "these",
    "those", "it", "its", "into", "over", "after", "before",
];

static STOP_WORD_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| STOP_WORDS.iter().copied().collect());

/// Scores and ranks events against a `Query` (§4.5 / C5).
pub struct RelevanceMatcher {
    weights: QueryWeights,
    min_relevance: f64,
}

impl RelevanceMatcher {
    pub fn new(weights: QueryWeights, min_relevance: f64) -> Self {
        Self {
            weights,
            min_relevance,
        }
    }

    /// Scores one event against a query, returning the weighted-sum
    /// component breakdown and the final (confidence-attenuated) score.
    pub fn score(&self, query: &Query, event: &EventData) -> ScoreBreakdown {
        let text = text_similarity(&query.phrase, &event.title, &event.summary);
        let location = location_match(query.location.as_deref(), event);
        let date = date_proximity(query.date_from, query.date_to, event.matching_date());
        let event_type = event_type_match(query.event_type, event.event_type);

        let weighted = self.weights.text * text
            + self.weights.location * location
            + self.weights.date * date
            + self.weights.event_type * event_type;

        ScoreBreakdown {
            text,
            location,
            date,
            event_type,
            confidence: event.confidence,
            total: (weighted * event.confidence).clamp(0.0, 1.0),
        }
    }

    /// Scores, filters below `min_relevance`, sets `relevance_score`, and
    /// sorts by score desc, then `event_date` desc, then insertion order.
    pub fn score_and_rank(&self, query: &Query, events: Vec<EventData>) -> Vec<EventData> {
        let mut scored: Vec<(usize, EventData)> = events
            .into_iter()
            .enumerate()
            .filter_map(|(idx, mut event)| {
                let breakdown = self.score(query, &event);
                if breakdown.total < self.min_relevance {
                    return None;
                }
                event.relevance_score = breakdown.total;
                Some((idx, event))
            })
            .collect();

        scored.sort_by(|(idx_a, a), (idx_b, b)| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.matching_date().cmp(&a.matching_date()))
                .then_with(|| idx_a.cmp(idx_b))
        });

        scored.into_iter().map(|(_, event)| event).collect()
    }

    pub fn filter_by_date_range(
        events: Vec<EventData>,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> Vec<EventData> {
        events
            .into_iter()
            .filter(|event| match event.matching_date() {
                Some(date) => {
                    date_from.map(|from| date >= from).unwrap_or(true)
                        && date_to.map(|to| date <= to).unwrap_or(true)
                }
                None => date_from.is_none() && date_to.is_none(),
            })
            .collect()
    }

    pub fn filter_by_location(events: Vec<EventData>, location: &str) -> Vec<EventData> {
        let needle = location.trim().to_lowercase();
        events
            .into_iter()
            .filter(|event| event_location_fields(event).iter().any(|field| {
                field
                    .as_ref()
                    .map(|f| location_field_matches(&needle, f) > 0.0)
                    .unwrap_or(false)
            }))
            .collect()
    }

    pub fn filter_by_event_type(events: Vec<EventData>, event_type: EventType) -> Vec<EventData> {
        events
            .into_iter()
            .filter(|event| event.event_type == event_type)
            .collect()
    }
}

fn event_location_fields(event: &EventData) -> Vec<Option<String>> {
    match &event.location {
        Some(loc) => loc
            .fields()
            .into_iter()
            .map(|f| f.map(|s| s.to_string()))
            .collect(),
        None => vec![None, None, None, None],
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !STOP_WORD_SET.contains(w))
        .map(|w| w.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Normalized longest-common-subsequence ratio between `a` and `b`: LCS
/// length divided by the length of the longer input.
fn lcs_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        let mut curr = vec![0usize; b.len() + 1];
        for j in 1..=b.len() {
            curr[j] = if a[i - 1] == b[j - 1] {
                prev[j - 1] + 1
            } else {
                curr[j - 1].max(prev[j])
            };
        }
        prev = curr;
    }
    let lcs_len = prev[b.len()] as f64;
    lcs_len / a.len().max(b.len()) as f64
}

fn text_similarity(query_phrase: &str, title: &str, summary: &str) -> f64 {
    let combined = format!("{title} {summary}");
    let j = jaccard(&tokenize(query_phrase), &tokenize(&combined));
    let s = lcs_ratio(query_phrase, &combined);
    0.7 * j + 0.3 * s
}

fn location_field_matches(needle: &str, field: &str) -> f64 {
    let field_lower = field.trim().to_lowercase();
    if needle == field_lower {
        1.0
    } else if field_lower.contains(needle) || needle.contains(&field_lower) {
        0.6
    } else {
        0.0
    }
}

fn location_match(query_location: Option<&str>, event: &EventData) -> f64 {
    let Some(query_location) = query_location else {
        return 0.5;
    };
    let needle = query_location.trim().to_lowercase();
    if needle.is_empty() {
        return 0.5;
    }
    event_location_fields(event)
        .iter()
        .filter_map(|f| f.as_ref())
        .map(|f| location_field_matches(&needle, f))
        .fold(0.0_f64, f64::max)
}

const DATE_FALLOFF_DAYS: f64 = 30.0;

fn date_proximity(
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
    event_date: Option<DateTime<Utc>>,
) -> f64 {
    let Some(event_date) = event_date else {
        return 0.0;
    };
    match (date_from, date_to) {
        (None, None) => 0.5,
        (from, to) => {
            if from.map(|f| event_date >= f).unwrap_or(true) && to.map(|t| event_date <= t).unwrap_or(true) {
                return 1.0;
            }
            let dist_from = from.map(|f| (f - event_date).num_days().abs() as f64);
            let dist_to = to.map(|t| (event_date - t).num_days().abs() as f64);
            let days_outside = match (dist_from, dist_to) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => 0.0,
            };
            (1.0 - days_outside / DATE_FALLOFF_DAYS).max(0.0)
        }
    }
}

fn event_type_match(query_event_type: Option<EventType>, event_type: EventType) -> f64 {
    match query_event_type {
        None => 0.5,
        Some(qt) if qt == event_type => 1.0,
        Some(_) => 0.0,
    }
}
