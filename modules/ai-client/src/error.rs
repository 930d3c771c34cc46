use thiserror::Error;

pub type Result<T> = std::result::Result<T, AiClientError>;

#[derive(Debug, Error)]
pub enum AiClientError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("no text content in response")]
    EmptyResponse,

    #[error("missing API key: {0}")]
    MissingApiKey(String),
}

impl From<reqwest::Error> for AiClientError {
    fn from(err: reqwest::Error) -> Self {
        AiClientError::Network(err.to_string())
    }
}
