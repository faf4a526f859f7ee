use crate::error::Result;
use crate::types::{Batch, Cursor, Order, RateLimitState};
use async_trait::async_trait;
use std::collections::HashMap;

// Transport port: implemented by reqwest in infra, by scripted fakes in tests
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse>;
    async fn post_json(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse>;
}

#[derive(Clone, Debug, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One fetched page plus the quota the source advertised with it.
#[derive(Clone, Debug, Default)]
pub struct FetchedPage {
    pub batch: Batch,
    pub rate_limit: Option<RateLimitState>,
}

// Relay-side ports
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch(&self, cursor: &Cursor, order: Order) -> Result<FetchedPage>;
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, batch: &Batch) -> Result<()>;
}
