use crate::app::ports::{EventSource, FetchedPage, HttpClientPort, HttpResponse};
use crate::constants::{
    audit_log_path, LINK_HEADER, PAGE_SIZE, RATE_LIMIT_REMAINING_HEADER, RATE_LIMIT_RESET_HEADER,
};
use crate::error::{RelayError, Result};
use crate::pipeline::ingestion::pagination::parse_link_header;
use crate::pipeline::ingestion::rate_limit_gate::RateLimitGate;
use crate::types::{Batch, Cursor, LogEvent, Order, RateLimitState};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Fetches one page of audit-log events, gated by the persisted rate-limit cooldown.
pub struct LogFetcher {
    http: Box<dyn HttpClientPort>,
    url: String,
    gate: RateLimitGate,
}

impl LogFetcher {
    pub fn new(
        http: Box<dyn HttpClientPort>,
        api_url: &str,
        enterprise: &str,
        gate: RateLimitGate,
    ) -> Self {
        let url = format!("{}{}", api_url.trim_end_matches('/'), audit_log_path(enterprise));
        Self { http, url, gate }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    #[instrument(skip_all, fields(cursor = %cursor, order = ?order))]
    pub async fn fetch_page(&self, cursor: &Cursor, order: Order) -> Result<FetchedPage> {
        self.gate.check()?;

        let query = [
            ("per_page", PAGE_SIZE.to_string()),
            ("include", "all".to_string()),
            ("order", order.as_query_value().to_string()),
            ("before", String::new()),
            ("after", cursor.as_str().to_string()),
        ];

        let t0 = Instant::now();
        let resp = self.http.get(&self.url, &query).await.map_err(|e| {
            crate::observability::metrics::source::request_error();
            e
        })?;

        // Quota headers accompany failures too (e.g. a 403 once the window is spent)
        let rate_limit = read_rate_limit(&resp);
        if let Some(state) = &rate_limit {
            self.gate.observe(state)?;
        }

        if !resp.is_success() {
            crate::observability::metrics::source::request_error();
            return Err(RelayError::SourceApi {
                status: resp.status,
                body: resp.body_text(),
            });
        }

        let links = parse_link_header(resp.header(LINK_HEADER).unwrap_or_default());
        let events = decode_events(&resp.body)?;
        crate::observability::metrics::source::page_fetched(events.len(), t0.elapsed().as_secs_f64());

        debug!(
            events = events.len(),
            after = %links.after,
            before = %links.before,
            remaining = rate_limit.map(|r| r.remaining),
            "Fetched audit-log page"
        );

        Ok(FetchedPage {
            batch: Batch {
                events,
                before: links.before,
                after: links.after,
            },
            rate_limit,
        })
    }
}

#[async_trait]
impl EventSource for LogFetcher {
    async fn fetch(&self, cursor: &Cursor, order: Order) -> Result<FetchedPage> {
        self.fetch_page(cursor, order).await
    }
}

fn read_rate_limit(resp: &HttpResponse) -> Option<RateLimitState> {
    let remaining = resp.header(RATE_LIMIT_REMAINING_HEADER)?.trim().parse::<i64>();
    let reset = resp.header(RATE_LIMIT_RESET_HEADER)?.trim().parse::<i64>();
    match (remaining, reset) {
        (Ok(remaining), Ok(reset_secs)) => Utc
            .timestamp_opt(reset_secs, 0)
            .single()
            .map(|reset_at| RateLimitState { remaining, reset_at }),
        _ => {
            warn!("Ignoring unparsable rate-limit headers");
            None
        }
    }
}

fn decode_events(body: &[u8]) -> Result<Vec<LogEvent>> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(body).map_err(|e| {
        RelayError::MalformedResponse(format!("body is not a JSON array of events: {}", e))
    })?;
    values.into_iter().map(LogEvent::from_value).collect()
}
