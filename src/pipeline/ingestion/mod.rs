// Ingestion: audit-log fetching, pagination parsing, and rate-limit gating

pub mod log_fetcher;
pub mod pagination;
pub mod rate_limit_gate;

pub use log_fetcher::LogFetcher;
pub use pagination::parse_link_header;
pub use rate_limit_gate::RateLimitGate;
