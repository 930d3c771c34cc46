use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::model::{ArticleContent, SourceConfig};

const MIN_CONTENT_CHARS: usize = 100;

/// Turns raw HTML into an `ArticleContent`, or rejects it, per §4.2.
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extracts one article's content using `source`'s selectors.
    /// `seen_urls` tracks URLs already extracted earlier in the session, per
    /// the "already extracted" rejection criterion.
    pub fn extract_article(
        &self,
        html: &str,
        url: &str,
        source: &SourceConfig,
        seen_urls: &HashSet<String>,
    ) -> Option<ArticleContent> {
        if seen_urls.contains(url) {
            return None;
        }

        let document = Html::parse_document(html);
        let title = extract_field(&document, &source.selectors.title)?;
        let title = title.trim().to_string();
        if title.is_empty() {
            return None;
        }

        let content = extract_field(&document, &source.selectors.content).unwrap_or_default();
        let content = normalize_whitespace(&content);
        if content.chars().filter(|c| !c.is_whitespace()).count() < MIN_CONTENT_CHARS {
            debug!(url, "article rejected: content too short");
            return None;
        }
        if content == title {
            debug!(url, "article rejected: content identical to title");
            return None;
        }

        let published_date = extract_published_date(&document, &source.selectors.published_date);
        let author = extract_field(&document, &source.selectors.author)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Some(ArticleContent {
            url: url.to_string(),
            source_name: source.name.clone(),
            title,
            content,
            published_date,
            author,
            scraped_at: Utc::now(),
        })
    }

    /// Extracts candidate article links from a search-results page,
    /// resolving relative URLs, deduping in first-seen order, and keeping
    /// only links whose host matches the source's registered host.
    pub fn extract_article_links(&self, html: &str, source: &SourceConfig) -> Vec<String> {
        let document = Html::parse_document(html);
        let registered_host = source.registered_host();
        let base = Url::parse(&source.base_url).ok();

        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for selector_str in &source.selectors.article_links {
            let Ok(selector) = Selector::parse(selector_str) else {
                continue;
            };
            for element in document.select(&selector) {
                let Some(href) = element.value().attr("href") else {
                    continue;
                };
                let resolved = resolve_url(href, base.as_ref());
                let Some(resolved) = resolved else {
                    continue;
                };
                if let Some(host) = &registered_host {
                    if Url::parse(&resolved)
                        .ok()
                        .and_then(|u| u.host_str().map(|h| h.to_string()))
                        .map(|h| !host_matches(&h, host))
                        .unwrap_or(true)
                    {
                        continue;
                    }
                }
                if seen.insert(resolved.clone()) {
                    links.push(resolved);
                }
            }
            if !links.is_empty() {
                break;
            }
        }

        links
    }
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn host_matches(candidate: &str, registered: &str) -> bool {
    let candidate = candidate.strip_prefix("www.").unwrap_or(candidate);
    candidate == registered || candidate.ends_with(&format!(".{registered}"))
}

fn resolve_url(href: &str, base: Option<&Url>) -> Option<String> {
    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute.to_string());
    }
    base.and_then(|b| b.join(href).ok()).map(|u| u.to_string())
}

/// Tries each selector in the fallback list in order, concatenating all
/// matching nodes' trimmed text with single spaces; stops at the first
/// selector yielding nonempty text (§4.2).
fn extract_field(document: &Html, fallbacks: &[String]) -> Option<String> {
    for selector_str in fallbacks {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        let text = document
            .select(&selector)
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !text.trim().is_empty() {
            return Some(text);
        }
    }
    None
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_published_date(document: &Html, fallbacks: &[String]) -> Option<DateTime<Utc>> {
    for selector_str in fallbacks {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        for element in document.select(&selector) {
            if let Some(datetime_attr) = element.value().attr("datetime") {
                if let Some(parsed) = parse_date_loose(datetime_attr) {
                    return Some(parsed);
                }
            }
            let text = element.text().collect::<Vec<_>>().join(" ");
            if let Some(parsed) = parse_date_loose(text.trim()) {
                return Some(parsed);
            }
        }
    }
    None
}

/// Tries ISO-8601, then a handful of common human formats, then RFC-2822.
pub fn parse_date_loose(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(start_of_day(date));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%B %d, %Y") {
        return Some(start_of_day(date));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("valid midnight"))
}
