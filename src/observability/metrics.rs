//! Relay metrics
//!
//! Counters and gauges recorded through the `metrics` facade. Nothing is
//! exported unless `init` installs the Prometheus recorder; until then every
//! call is a cheap no-op.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::fmt;
use std::net::SocketAddr;
use tracing::info;

/// All metric names used by the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Source API
    SourcePagesFetched,
    SourceEventsFetched,
    SourceRequestsError,
    SourceRequestDuration,
    SourceRateLimited,
    SourceRemainingQuota,

    // Forwarding
    ForwardBatchesSent,
    ForwardEventsSent,
    ForwardRejected,
    ForwardUnconfirmedEvents,

    // Durable state
    StateCursorCommits,

    // Passes
    RelayPassesCompleted,
    RelayPassesFailed,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SourcePagesFetched => "audit_relay_source_pages_fetched_total",
            MetricName::SourceEventsFetched => "audit_relay_source_events_fetched_total",
            MetricName::SourceRequestsError => "audit_relay_source_requests_error_total",
            MetricName::SourceRequestDuration => "audit_relay_source_request_duration_seconds",
            MetricName::SourceRateLimited => "audit_relay_source_rate_limited_total",
            MetricName::SourceRemainingQuota => "audit_relay_source_remaining_quota",

            MetricName::ForwardBatchesSent => "audit_relay_forward_batches_sent_total",
            MetricName::ForwardEventsSent => "audit_relay_forward_events_sent_total",
            MetricName::ForwardRejected => "audit_relay_forward_rejected_total",
            MetricName::ForwardUnconfirmedEvents => "audit_relay_forward_unconfirmed_events_total",

            MetricName::StateCursorCommits => "audit_relay_state_cursor_commits_total",

            MetricName::RelayPassesCompleted => "audit_relay_passes_completed_total",
            MetricName::RelayPassesFailed => "audit_relay_passes_failed_total",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        [
            MetricName::SourcePagesFetched,
            MetricName::SourceEventsFetched,
            MetricName::SourceRequestsError,
            MetricName::SourceRequestDuration,
            MetricName::SourceRateLimited,
            MetricName::SourceRemainingQuota,
            MetricName::ForwardBatchesSent,
            MetricName::ForwardEventsSent,
            MetricName::ForwardRejected,
            MetricName::ForwardUnconfirmedEvents,
            MetricName::StateCursorCommits,
            MetricName::RelayPassesCompleted,
            MetricName::RelayPassesFailed,
        ]
        .into_iter()
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
}

/// Install the Prometheus recorder with an HTTP listener on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    builder()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))?;
    info!("Prometheus exporter listening at http://{}/metrics", addr);
    Ok(())
}

// ============================================================================
// Source API
// ============================================================================

pub mod source {
    use super::MetricName;

    pub fn page_fetched(events: usize, duration_secs: f64) {
        ::metrics::counter!(MetricName::SourcePagesFetched.as_str()).increment(1);
        ::metrics::counter!(MetricName::SourceEventsFetched.as_str()).increment(events as u64);
        ::metrics::histogram!(MetricName::SourceRequestDuration.as_str()).record(duration_secs);
    }

    pub fn request_error() {
        ::metrics::counter!(MetricName::SourceRequestsError.as_str()).increment(1);
    }

    pub fn rate_limited() {
        ::metrics::counter!(MetricName::SourceRateLimited.as_str()).increment(1);
    }

    pub fn remaining_quota(remaining: i64) {
        ::metrics::gauge!(MetricName::SourceRemainingQuota.as_str()).set(remaining as f64);
    }
}

// ============================================================================
// Forwarding
// ============================================================================

pub mod forward {
    use super::MetricName;

    pub fn batch_sent(events: usize) {
        ::metrics::counter!(MetricName::ForwardBatchesSent.as_str()).increment(1);
        ::metrics::counter!(MetricName::ForwardEventsSent.as_str()).increment(events as u64);
    }

    pub fn rejected() {
        ::metrics::counter!(MetricName::ForwardRejected.as_str()).increment(1);
    }

    /// Events delivered without a newer cursor to record; the next pass sends them again.
    pub fn unconfirmed(events: usize) {
        ::metrics::counter!(MetricName::ForwardUnconfirmedEvents.as_str()).increment(events as u64);
    }
}

// ============================================================================
// Durable state
// ============================================================================

pub mod state {
    use super::MetricName;

    pub fn cursor_committed() {
        ::metrics::counter!(MetricName::StateCursorCommits.as_str()).increment(1);
    }
}

// ============================================================================
// Passes
// ============================================================================

pub mod relay {
    use super::MetricName;

    pub fn pass_completed() {
        ::metrics::counter!(MetricName::RelayPassesCompleted.as_str()).increment(1);
    }

    pub fn pass_failed() {
        ::metrics::counter!(MetricName::RelayPassesFailed.as_str()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_are_unique_and_prefixed() {
        let mut seen = HashSet::new();
        for metric in MetricName::all_metrics() {
            assert!(metric.as_str().starts_with("audit_relay_"));
            assert!(seen.insert(metric.as_str()), "duplicate metric {}", metric);
        }
        assert_eq!(seen.len(), 13);
    }

    #[test]
    fn test_recorded_metrics_reach_the_exporter() {
        let recorder = builder().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            state::cursor_committed();
            forward::batch_sent(5);
            forward::unconfirmed(3);
            source::remaining_quota(42);
        });

        let rendered = handle.render();
        assert!(rendered.contains("audit_relay_state_cursor_commits_total 1"), "{}", rendered);
        assert!(rendered.contains("audit_relay_forward_batches_sent_total 1"), "{}", rendered);
        assert!(rendered.contains("audit_relay_forward_events_sent_total 5"), "{}", rendered);
        assert!(
            rendered.contains("audit_relay_forward_unconfirmed_events_total 3"),
            "{}",
            rendered
        );
        assert!(rendered.contains("audit_relay_source_remaining_quota 42"), "{}", rendered);
    }

    #[tokio::test]
    async fn test_init_serves_recorded_metrics() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        init(addr).unwrap();
        state::cursor_committed();
        relay::pass_completed();

        let mut body = String::new();
        for _ in 0..50 {
            if let Ok(resp) = reqwest::get(format!("http://{}/metrics", addr)).await {
                body = resp.text().await.unwrap();
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(body.contains("audit_relay_state_cursor_commits_total"), "{}", body);
        assert!(body.contains("audit_relay_passes_completed_total"), "{}", body);
    }
}
