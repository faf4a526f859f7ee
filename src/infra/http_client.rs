use crate::app::ports::{HttpClientPort, HttpResponse};
use crate::constants::{GITHUB_ACCEPT, USER_AGENT};
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::collections::HashMap;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    /// Client for the audit-log API, authenticated with the enterprise admin token.
    pub fn for_source(admin_token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer(admin_token)?);
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        Self::with_headers(headers)
    }

    /// Client for the downstream collector.
    pub fn for_sink(auth_token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer(auth_token)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self::with_headers(headers)
    }

    fn with_headers(headers: HeaderMap) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    async fn into_response(resp: reqwest::Response) -> Result<HttpResponse> {
        let status = resp.status().as_u16();
        let headers: HashMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await?.to_vec();
        Ok(HttpResponse { status, headers, body })
    }
}

fn bearer(token: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| RelayError::Config("auth token contains invalid header characters".into()))?;
    value.set_sensitive(true);
    Ok(value)
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse> {
        let resp = self.client.get(url).query(query).send().await?;
        Self::into_response(resp).await
    }

    async fn post_json(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse> {
        let resp = self.client.post(url).body(body).send().await?;
        Self::into_response(resp).await
    }
}
