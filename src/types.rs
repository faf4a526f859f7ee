use crate::constants::TIMESTAMP_FIELD;
use crate::error::{RelayError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque pagination token. The empty value means "no cursor recorded yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Cursor(token.into())
    }

    pub fn empty() -> Self {
        Cursor(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<none>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Result ordering requested from the audit-log API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// API default (most recent first). Only used for the bootstrap call.
    Default,
    /// Oldest first, for catching up from a cursor.
    Ascending,
}

impl Order {
    pub fn as_query_value(&self) -> &'static str {
        match self {
            Order::Default => "",
            Order::Ascending => "asc",
        }
    }
}

/// One audit-log record. Forwarded opaquely; only `@timestamp` is read, for log output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogEvent(serde_json::Value);

impl LogEvent {
    /// Wraps a decoded record, rejecting anything without a numeric millisecond timestamp.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            return Err(RelayError::MalformedResponse(format!(
                "expected event object, found {}",
                value
            )));
        }
        match value.get(TIMESTAMP_FIELD) {
            Some(ts) if ts.is_number() => Ok(LogEvent(value)),
            Some(other) => Err(RelayError::MalformedResponse(format!(
                "event field '{}' is not a number: {}",
                TIMESTAMP_FIELD, other
            ))),
            None => Err(RelayError::MalformedResponse(format!(
                "event is missing '{}'",
                TIMESTAMP_FIELD
            ))),
        }
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.0
            .get(TIMESTAMP_FIELD)
            .and_then(|v| v.as_f64())
            .map(|v| v as i64)
            .unwrap_or_default()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp_ms()).single()
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Forward/backward cursors taken from a response's pagination header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    pub before: Cursor,
    pub after: Cursor,
}

/// One page of events together with the cursors returned alongside it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub events: Vec<LogEvent>,
    pub before: Cursor,
    pub after: Cursor,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Timestamps of the first and last events, for diagnostic display only.
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.events.first()?.timestamp()?;
        let last = self.events.last()?.timestamp()?;
        Some((first, last))
    }
}

/// Quota figures advertised by one source API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
}
