use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;
use urlencoding::encode;

use crate::cancel::CancelToken;
use crate::extractor::ContentExtractor;
use crate::fetcher::HttpFetcher;
use crate::model::{ArticleContent, Query, SourceConfig};

const DEFAULT_MAX_ARTICLES: usize = 10;
const DEFAULT_SCRAPER_DELAY: f64 = 1.0;

/// Produces a bounded list of `ArticleContent` for one source and query
/// (§4.3 / C3). Best-effort: per-article failures are logged and skipped.
pub struct ScraperManager {
    fetcher: Arc<HttpFetcher>,
    extractor: ContentExtractor,
}

impl ScraperManager {
    pub fn new(fetcher: Arc<HttpFetcher>) -> Self {
        Self {
            fetcher,
            extractor: ContentExtractor::new(),
        }
    }

    pub async fn scrape_source(
        &self,
        source: &SourceConfig,
        query: &Query,
        respect_robots: bool,
        cancel: &CancelToken,
    ) -> Vec<ArticleContent> {
        self.scrape_source_bounded(
            source,
            query,
            DEFAULT_MAX_ARTICLES,
            respect_robots,
            DEFAULT_SCRAPER_DELAY,
            cancel,
        )
        .await
    }

    pub async fn scrape_source_bounded(
        &self,
        source: &SourceConfig,
        query: &Query,
        max_articles: usize,
        respect_robots: bool,
        default_rate_limit_seconds: f64,
        cancel: &CancelToken,
    ) -> Vec<ArticleContent> {
        if cancel.is_cancelled() {
            return Vec::new();
        }

        // `rate_limit_seconds <= 0.0` means the source left it unspecified;
        // fall back to the pipeline-wide default (§6.4 `scraper_delay`).
        let rate_limit_seconds = if source.rate_limit_seconds > 0.0 {
            source.rate_limit_seconds
        } else {
            default_rate_limit_seconds
        };

        let search_url = source
            .search_url_template
            .replace("{query}", &encode(&query.phrase));

        let Ok(search_page) = self
            .fetcher
            .fetch(
                &search_url,
                source.user_agent.as_deref(),
                rate_limit_seconds,
                respect_robots,
                cancel,
            )
            .await
        else {
            warn!(source = %source.name, "failed to fetch search results page");
            return Vec::new();
        };

        if cancel.is_cancelled() {
            return Vec::new();
        }

        let mut links = self.extractor.extract_article_links(&search_page, source);
        links.truncate(max_articles);

        let mut seen_urls = HashSet::new();
        let mut articles = Vec::new();

        for url in links {
            if cancel.is_cancelled() {
                break;
            }

            let html = match self
                .fetcher
                .fetch(
                    &url,
                    source.user_agent.as_deref(),
                    rate_limit_seconds,
                    respect_robots,
                    cancel,
                )
                .await
            {
                Ok(body) => body,
                Err(err) => {
                    warn!(%url, ?err, "failed to fetch article, skipping");
                    continue;
                }
            };

            if let Some(article) =
                self.extractor.extract_article(&html, &url, source, &seen_urls)
            {
                seen_urls.insert(article.url.clone());
                articles.push(article);
            }
        }

        articles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Selectors;

    fn source() -> SourceConfig {
        SourceConfig {
            name: "example".into(),
            base_url: "https://example.com".into(),
            search_url_template: "https://example.com/search?q={query}".into(),
            enabled: true,
            category: "general".into(),
            rate_limit_seconds: 0.0,
            selectors: Selectors::new("h1", ".body", "", "", "a"),
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn test_scrape_source_returns_empty_when_already_cancelled() {
        let manager = ScraperManager::new(Arc::new(HttpFetcher::new()));
        let query = Query::new("test", None, None, None, None).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let articles = manager.scrape_source(&source(), &query, false, &cancel).await;
        assert!(articles.is_empty());
    }
}
