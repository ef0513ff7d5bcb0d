use thiserror::Error;

/// 데이터 수집 계층의 오류
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed payload: {0}")]
    Parse(String),

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    /// Upstream answered 2xx but reported an error in the body
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("all relays failed: {}", .0.join("; "))]
    AllRelaysFailed(Vec<String>),

    #[error("cache error: {0}")]
    Cache(String),
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Parse(err.to_string())
    }
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;
