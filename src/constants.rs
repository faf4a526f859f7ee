/// Audit-log API constants shared across the relay

// Page size requested from the audit-log API (its practical maximum)
pub const PAGE_SIZE: u32 = 100;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";
pub const USER_AGENT: &str = concat!("audit_relay/", env!("CARGO_PKG_VERSION"));

// Response headers
pub const LINK_HEADER: &str = "link";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Remaining quota at or below which the reset instant becomes the cooldown boundary
pub const RATE_LIMIT_CRITICAL_REMAINING: i64 = 1;

/// Event field holding the millisecond epoch timestamp
pub const TIMESTAMP_FIELD: &str = "@timestamp";

// Durable state files, relative to the data directory
pub const CURSOR_FILE: &str = "cursor.txt";
pub const RATE_LIMIT_RESET_FILE: &str = "rate_limit_reset.txt";

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;

/// Audit-log path for an enterprise
pub fn audit_log_path(enterprise: &str) -> String {
    format!("/enterprises/{}/audit-log", enterprise)
}
