use crate::constants::{RATE_LIMIT_CRITICAL_REMAINING, RATE_LIMIT_RESET_FILE};
use crate::error::{RelayError, Result};
use crate::pipeline::storage::DurableFile;
use crate::types::RateLimitState;
use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;
use tracing::{debug, warn};

/// Refuses source API calls until a persisted reset instant has passed.
///
/// Only the boundary is stored; the remaining count is transient and taken
/// fresh from every response.
#[derive(Debug, Clone)]
pub struct RateLimitGate {
    file: DurableFile,
}

impl RateLimitGate {
    pub fn open_at_root<P: AsRef<Path>>(data_root: P) -> Self {
        Self {
            file: DurableFile::new(data_root.as_ref().join(RATE_LIMIT_RESET_FILE)),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Persisted cooldown boundary, if any. Stored as integer seconds since the epoch.
    pub fn reset_at(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.file.read()? else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        match raw.parse::<i64>() {
            Ok(secs) => Ok(Utc.timestamp_opt(secs, 0).single()),
            Err(_) => {
                warn!(value = %raw, path = %self.file.path().display(), "Ignoring unreadable cooldown value");
                Ok(None)
            }
        }
    }

    pub fn check(&self) -> Result<()> {
        self.check_at(Utc::now())
    }

    /// Fails with `RateLimited` while `now` precedes the persisted boundary.
    pub fn check_at(&self, now: DateTime<Utc>) -> Result<()> {
        if let Some(reset_at) = self.reset_at()? {
            if now < reset_at {
                crate::observability::metrics::source::rate_limited();
                return Err(RelayError::RateLimited { reset_at });
            }
        }
        Ok(())
    }

    /// Records the reset instant as the new boundary once quota is nearly exhausted.
    pub fn observe(&self, state: &RateLimitState) -> Result<()> {
        crate::observability::metrics::source::remaining_quota(state.remaining);
        if state.remaining > RATE_LIMIT_CRITICAL_REMAINING {
            return Ok(());
        }
        warn!(
            remaining = state.remaining,
            reset_at = %state.reset_at.to_rfc3339(),
            "Rate limit nearly exhausted, recording cooldown"
        );
        self.file.write(&state.reset_at.timestamp().to_string())?;
        debug!("Cooldown persisted to {}", self.file.path().display());
        Ok(())
    }
}
