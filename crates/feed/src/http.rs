use async_trait::async_trait;
use coinwatch_common::{FeedError, FeedResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = "coinwatch/0.1";

/// 공급자와 릴레이가 공유하는 HTTP 전송 계층
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// GET `url` and return the body of a 2xx response.
    async fn get_text(&self, url: &str, timeout: Duration) -> FeedResult<String>;
}

/// reqwest 기반 구현
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new() -> FeedResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FeedError::Http(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get_text(&self, url: &str, timeout: Duration) -> FeedResult<String> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))
    }
}

fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> FeedError {
    if err.is_timeout() {
        FeedError::Timeout(timeout)
    } else {
        FeedError::Http(err.to_string())
    }
}

/// GET 후 JSON으로 역직렬화
pub async fn get_json<T: DeserializeOwned>(
    http: &dyn HttpFetch,
    url: &str,
    timeout: Duration,
) -> FeedResult<T> {
    let body = http.get_text(url, timeout).await?;
    serde_json::from_str(&body).map_err(|e| FeedError::Parse(format!("{}: {}", url, e)))
}
