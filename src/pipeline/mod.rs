// Relay pipeline: ingestion from the audit-log API, forwarding, durable state, and the pass loop

pub mod forward_sink;
pub mod ingestion;
pub mod orchestrator;
pub mod storage;

pub use forward_sink::ForwardSink;
pub use ingestion::{LogFetcher, RateLimitGate};
pub use orchestrator::{CommitMode, Orchestrator, PassReport, RelayState};
pub use storage::CursorStore;
