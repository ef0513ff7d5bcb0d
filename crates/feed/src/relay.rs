//! CORS 릴레이 경주 요청
//!
//! The same target URL is requested through every relay at once; the first
//! relay to answer with a non-empty 2xx body wins and the rest are dropped.

use crate::http::HttpFetch;
use coinwatch_common::{FeedError, FeedResult};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pass-through endpoint that forwards an arbitrary target URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relay {
    pub name: String,
    prefix: String,
    encode_target: bool,
}

impl Relay {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>, encode_target: bool) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            encode_target,
        }
    }

    /// 대상 URL을 릴레이 URL로 감싼다
    pub fn wrap(&self, target: &str) -> String {
        if self.encode_target {
            format!("{}{}", self.prefix, urlencoding::encode(target))
        } else {
            format!("{}{}", self.prefix, target)
        }
    }
}

/// 기본 릴레이 3종
pub fn default_relays() -> Vec<Relay> {
    vec![
        Relay::new("allorigins", "https://api.allorigins.win/raw?url=", true),
        Relay::new("corsproxy", "https://corsproxy.io/?", true),
        Relay::new("codetabs", "https://api.codetabs.com/v1/proxy?quest=", false),
    ]
}

pub struct ProxyRaceFetcher {
    http: Arc<dyn HttpFetch>,
    relays: Vec<Relay>,
}

impl ProxyRaceFetcher {
    pub fn new(http: Arc<dyn HttpFetch>, relays: Vec<Relay>) -> Self {
        Self { http, relays }
    }

    pub fn with_default_relays(http: Arc<dyn HttpFetch>) -> Self {
        Self::new(http, default_relays())
    }

    /// Race `target` through every relay and return the first good body.
    ///
    /// Fails only when every relay errored, timed out or answered empty.
    pub async fn fetch(&self, target: &str, timeout: Duration) -> FeedResult<String> {
        if self.relays.is_empty() {
            return Err(FeedError::AllRelaysFailed(vec![
                "no relays configured".to_string(),
            ]));
        }

        let mut race: FuturesUnordered<_> = self
            .relays
            .iter()
            .map(|relay| self.fetch_via(relay, target, timeout))
            .collect();

        let mut failures = Vec::with_capacity(self.relays.len());
        while let Some(outcome) = race.next().await {
            match outcome {
                Ok((name, body)) => {
                    info!("✅ Relay {} won the race for {}", name, target);
                    // dropping `race` cancels the losers
                    return Ok(body);
                }
                Err(reason) => {
                    debug!("relay attempt failed: {}", reason);
                    failures.push(reason);
                }
            }
        }

        warn!("❌ All {} relays failed for {}", failures.len(), target);
        Err(FeedError::AllRelaysFailed(failures))
    }

    async fn fetch_via(
        &self,
        relay: &Relay,
        target: &str,
        timeout: Duration,
    ) -> Result<(String, String), String> {
        let url = relay.wrap(target);

        match tokio::time::timeout(timeout, self.http.get_text(&url, timeout)).await {
            Ok(Ok(body)) if !body.trim().is_empty() => Ok((relay.name.clone(), body)),
            Ok(Ok(_)) => Err(format!("{}: empty body", relay.name)),
            Ok(Err(e)) => Err(format!("{}: {}", relay.name, e)),
            Err(_) => Err(format!("{}: timed out after {:?}", relay.name, timeout)),
        }
    }
}
