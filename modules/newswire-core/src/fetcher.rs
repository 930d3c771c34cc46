use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::StatusCode;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use newswire_common::FetchError;

use crate::cancel::CancelToken;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(1);

struct RobotsEntry {
    disallowed_prefixes: Vec<String>,
    crawl_delay: Option<Duration>,
    cached_at: Instant,
}

impl RobotsEntry {
    fn is_fresh(&self) -> bool {
        self.cached_at.elapsed() < Duration::from_secs(3600)
    }
}

struct NegativeRobotsEntry {
    cached_at: Instant,
}

impl NegativeRobotsEntry {
    fn is_fresh(&self) -> bool {
        self.cached_at.elapsed() < Duration::from_secs(60)
    }
}

/// Per-host rate limiting, retry/backoff, and optional robots.txt
/// enforcement for a single `GET` (§4.1 / C1).
pub struct HttpFetcher {
    client: reqwest::Client,
    last_request_at: Mutex<HashMap<String, Instant>>,
    robots_cache: Mutex<HashMap<String, RobotsEntry>>,
    robots_negative_cache: Mutex<HashMap<String, NegativeRobotsEntry>>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            last_request_at: Mutex::new(HashMap::new()),
            robots_cache: Mutex::new(HashMap::new()),
            robots_negative_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fetches `url`, observing per-host rate limiting and, if
    /// `respect_robots` is set, the host's `robots.txt` policy.
    pub async fn fetch(
        &self,
        url: &str,
        user_agent: Option<&str>,
        rate_limit_seconds: f64,
        respect_robots: bool,
        cancel: &CancelToken,
    ) -> Result<String, FetchError> {
        let ua = user_agent.unwrap_or(DEFAULT_USER_AGENT);
        let host = host_of(url).ok_or_else(|| FetchError::Network("invalid url".to_string()))?;

        if respect_robots && !self.is_allowed(url, &host, ua).await? {
            return Err(FetchError::DisallowedByRobots);
        }

        let crawl_delay = if respect_robots {
            self.crawl_delay(&host).await
        } else {
            None
        };
        let wait = crawl_delay
            .map(|d| d.max(Duration::from_secs_f64(rate_limit_seconds.max(0.0))))
            .unwrap_or_else(|| Duration::from_secs_f64(rate_limit_seconds.max(0.0)));
        self.wait_for_host_slot(&host, wait, cancel).await;

        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        self.fetch_with_retry(url, ua).await
    }

    async fn fetch_with_retry(&self, url: &str, ua: &str) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = self.attempt_once(url, ua).await;
            match outcome {
                Ok(body) => return Ok(body),
                Err((err, retry_after)) => {
                    let retryable = err.is_retryable();
                    if !retryable || attempt >= MAX_RETRIES {
                        return Err(err);
                    }
                    let backoff = retry_after.unwrap_or_else(|| jittered_backoff(attempt));
                    debug!(%url, attempt, ?backoff, "retrying fetch");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn attempt_once(
        &self,
        url: &str,
        ua: &str,
    ) -> Result<String, (FetchError, Option<Duration>)> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, ua)
            .send()
            .await
            .map_err(|e| (classify_reqwest_error(&e), None))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| (classify_reqwest_error(&e), None))?;
            return Ok(body);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);

        let err = classify_status(status);
        warn!(%url, status = status.as_u16(), "non-success response");
        Err((err, retry_after))
    }

    async fn wait_for_host_slot(&self, host: &str, min_gap: Duration, cancel: &CancelToken) {
        let wait_until = {
            let mut map = self.last_request_at.lock().await;
            let now = Instant::now();
            let next_allowed = map
                .get(host)
                .map(|last| *last + min_gap)
                .unwrap_or(now);
            map.insert(host.to_string(), next_allowed.max(now));
            next_allowed
        };

        let remaining = wait_until.saturating_duration_since(Instant::now());
        if remaining > Duration::ZERO {
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }

    async fn is_allowed(
        &self,
        url: &str,
        host: &str,
        user_agent: &str,
    ) -> Result<bool, FetchError> {
        if let Some(entry) = self.robots_negative_cache.lock().await.get(host) {
            if entry.is_fresh() {
                return Ok(true);
            }
        }
        if let Some(entry) = self.robots_cache.lock().await.get(host) {
            if entry.is_fresh() {
                return Ok(self.path_allowed(url, &entry.disallowed_prefixes));
            }
        }

        let robots_url = format!("https://{host}/robots.txt");
        let fetched = self
            .client
            .get(&robots_url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await;

        let body = match fetched {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            _ => {
                self.robots_negative_cache.lock().await.insert(
                    host.to_string(),
                    NegativeRobotsEntry {
                        cached_at: Instant::now(),
                    },
                );
                return Ok(true);
            }
        };

        let (disallowed, crawl_delay) = parse_robots_txt(&body, user_agent);
        let allowed = self.path_allowed(url, &disallowed);
        self.robots_cache.lock().await.insert(
            host.to_string(),
            RobotsEntry {
                disallowed_prefixes: disallowed,
                crawl_delay,
                cached_at: Instant::now(),
            },
        );
        Ok(allowed)
    }

    async fn crawl_delay(&self, host: &str) -> Option<Duration> {
        self.robots_cache
            .lock()
            .await
            .get(host)
            .and_then(|e| e.crawl_delay)
    }

    fn path_allowed(&self, url: &str, disallowed_prefixes: &[String]) -> bool {
        let path = url::Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/".to_string());
        !disallowed_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url).ok()?.host_str().map(|h| h.to_string())
}

fn classify_reqwest_error(err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(err.to_string())
    }
}

fn classify_status(status: StatusCode) -> FetchError {
    if status.is_server_error() {
        FetchError::Http5xx(status.as_u16())
    } else {
        FetchError::Http4xx(status.as_u16())
    }
}

fn jittered_backoff(attempt: u32) -> Duration {
    let exp = BASE_BACKOFF.as_secs_f64() * 2f64.powi(attempt as i32 - 1);
    let jitter_frac = rand::thread_rng().gen_range(-0.25..=0.25);
    Duration::from_secs_f64((exp * (1.0 + jitter_frac)).max(0.0))
}

/// Parses only the directives relevant to this fetcher: `Disallow` prefixes
/// and `Crawl-delay` under a group matching `user_agent` or `*`.
fn parse_robots_txt(body: &str, user_agent: &str) -> (Vec<String>, Option<Duration>) {
    let ua_token = user_agent.split('/').next().unwrap_or(user_agent).to_lowercase();
    let mut disallowed = Vec::new();
    let mut crawl_delay = None;
    let mut in_matching_group = false;

    for line in body.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                let agent = value.to_lowercase();
                in_matching_group =
                    agent == "*" || ua_token.contains(&agent) || agent.contains(&ua_token);
            }
            "disallow" if in_matching_group && !value.is_empty() => {
                disallowed.push(value.to_string());
            }
            "crawl-delay" if in_matching_group => {
                if let Ok(secs) = value.parse::<f64>() {
                    crawl_delay = Some(Duration::from_secs_f64(secs));
                }
            }
            _ => {}
        }
    }

    (disallowed, crawl_delay)
}

pub type SharedFetcher = Arc<HttpFetcher>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_5xx_is_retryable() {
        let err = classify_status(StatusCode::BAD_GATEWAY);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_status_404_not_retryable() {
        let err = classify_status(StatusCode::NOT_FOUND);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_robots_txt_respects_wildcard_group() {
        let body = "User-agent: *\nDisallow: /private\nCrawl-delay: 2\n";
        let (disallowed, delay) = parse_robots_txt(body, "Mozilla/5.0 test-bot");
        assert_eq!(disallowed, vec!["/private".to_string()]);
        assert_eq!(delay, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_parse_robots_txt_ignores_other_agent_groups() {
        let body = "User-agent: otherbot\nDisallow: /secret\n";
        let (disallowed, _) = parse_robots_txt(body, "Mozilla/5.0 test-bot");
        assert!(disallowed.is_empty());
    }

    #[test]
    fn test_jittered_backoff_grows_with_attempt() {
        let first = jittered_backoff(1);
        let third = jittered_backoff(3);
        assert!(first.as_secs_f64() <= 2.0);
        assert!(third.as_secs_f64() >= 2.0);
    }
}
