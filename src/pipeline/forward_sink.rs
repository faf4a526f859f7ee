use crate::app::ports::{EventSink, HttpClientPort};
use crate::error::{RelayError, Result};
use crate::types::Batch;
use async_trait::async_trait;
use tracing::{error, info};

/// Posts whole batches to the downstream collector.
///
/// A batch counts as delivered only when the collector answers with exactly the
/// configured status code.
pub struct ForwardSink {
    http: Box<dyn HttpClientPort>,
    endpoint: String,
    expected_status: u16,
}

impl ForwardSink {
    pub fn new(http: Box<dyn HttpClientPort>, endpoint: &str, expected_status: u16) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            expected_status,
        }
    }
}

#[async_trait]
impl EventSink for ForwardSink {
    async fn send(&self, batch: &Batch) -> Result<()> {
        let body = serde_json::to_vec(&batch.events)?;
        let resp = self.http.post_json(&self.endpoint, body).await?;

        if resp.status != self.expected_status {
            crate::observability::metrics::forward::rejected();
            error!(
                status = resp.status,
                expected = self.expected_status,
                events = batch.len(),
                "Collector rejected batch"
            );
            return Err(RelayError::ForwardRejected {
                status: resp.status,
                expected: self.expected_status,
                body: resp.body_text(),
            });
        }

        crate::observability::metrics::forward::batch_sent(batch.len());
        match batch.time_span() {
            Some((first, last)) => info!(
                "Forwarded {} events: from {} to {}",
                batch.len(),
                first.to_rfc3339(),
                last.to_rfc3339()
            ),
            None => info!("Forwarded {} events", batch.len()),
        }
        Ok(())
    }
}
