use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Provider error: {0}")]
    Provider(String),

    /// HTTP 429 from the oracle. The loop backs off and retries on the next
    /// iteration instead of counting this as an action failure.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The conversation no longer fits the model's context window. The loop
    /// responds with an aggressive history trim and a retry.
    #[error("Context too large: {0}")]
    ContextTooLarge(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Relay error: {0}")]
    Relay(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
