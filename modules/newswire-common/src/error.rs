use thiserror::Error;

/// Error taxonomy for the search pipeline (see component contracts for which
/// layer raises which kind). Only `InputInvalid` and `Fatal` short-circuit a
/// search; every other kind is recorded and swallowed by the orchestrator.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid query: {0}")]
    InputInvalid(String),

    #[error("source unavailable: {source_name}: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("article skipped: {0}")]
    ArticleSkipped(String),

    #[error("LLM call timed out")]
    LlmTimeout,

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("LLM total budget exhausted")]
    TotalBudgetExhausted,

    #[error("search cancelled")]
    Cancelled,

    #[error("session not found")]
    NotFound,

    #[error("fatal pipeline error: {0}")]
    Fatal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Categorized outcome of a single HTTP fetch, per component C1's contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {0}")]
    Http4xx(u16),

    #[error("HTTP {0}")]
    Http5xx(u16),

    #[error("disallowed by robots.txt")]
    DisallowedByRobots,

    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether C1 should retry this failure per its retry contract.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Timeout | FetchError::Http5xx(_))
            || matches!(self, FetchError::Http4xx(429))
    }
}
