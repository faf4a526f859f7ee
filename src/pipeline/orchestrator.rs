use crate::app::ports::{EventSink, EventSource};
use crate::error::{RelayError, Result};
use crate::pipeline::storage::CursorStore;
use crate::types::{Batch, Cursor, Order};
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// When a page's forward cursor is persisted relative to delivering the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    /// Persist after the sink accepts the batch. A crash in between re-delivers the page.
    #[default]
    AfterForward,
    /// Persist before forwarding. A crash in between loses the page.
    BeforeForward,
}

impl CommitMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "after-forward" | "after" => Some(CommitMode::AfterForward),
            "before-forward" | "before" => Some(CommitMode::BeforeForward),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitMode::AfterForward => "after-forward",
            CommitMode::BeforeForward => "before-forward",
        }
    }
}

/// Relay state machine. Each pass starts in `Bootstrap` or `Steady` and ends in `Idle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayState {
    Bootstrap,
    Steady(Cursor),
    Idle,
}

/// Summary of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub pass_id: Uuid,
    pub bootstrapped: bool,
    pub pages: usize,
    pub batches_forwarded: usize,
    pub events_forwarded: usize,
    /// Events forwarded from a page without a newer cursor; the next pass re-sends them.
    pub events_unconfirmed: usize,
    pub cursor: Cursor,
}

impl PassReport {
    fn new(pass_id: Uuid, cursor: Cursor) -> Self {
        Self {
            pass_id,
            bootstrapped: false,
            pages: 0,
            batches_forwarded: 0,
            events_forwarded: 0,
            events_unconfirmed: 0,
            cursor,
        }
    }
}

/// Drives read cursor → fetch → forward → persist cursor until the source runs dry.
pub struct Orchestrator<S: EventSource + ?Sized, K: EventSink + ?Sized> {
    source: Box<S>,
    sink: Box<K>,
    cursors: CursorStore,
    commit_mode: CommitMode,
}

impl<S: EventSource + ?Sized, K: EventSink + ?Sized> Orchestrator<S, K> {
    pub fn new(source: Box<S>, sink: Box<K>, cursors: CursorStore, commit_mode: CommitMode) -> Self {
        Self {
            source,
            sink,
            cursors,
            commit_mode,
        }
    }

    /// Runs one pass, then keeps running a pass every `poll_interval` if one is given.
    ///
    /// Returns the report of the single pass when not polling. Any error ends the loop.
    pub async fn run(&self, poll_interval: Option<Duration>) -> Result<PassReport> {
        loop {
            let report = match self.run_pass().await {
                Ok(report) => {
                    crate::observability::metrics::relay::pass_completed();
                    report
                }
                Err(e) => {
                    crate::observability::metrics::relay::pass_failed();
                    return Err(e);
                }
            };

            let Some(interval) = poll_interval else {
                return Ok(report);
            };
            debug!("Sleeping {:?} before next pass", interval);
            tokio::time::sleep(interval).await;
        }
    }

    pub async fn run_pass(&self) -> Result<PassReport> {
        let pass_id = Uuid::new_v4();
        let span = info_span!("relay_pass", pass_id = %pass_id);
        self.drive(pass_id).instrument(span).await
    }

    async fn drive(&self, pass_id: Uuid) -> Result<PassReport> {
        let cursor = self.cursors.get()?;
        let mut report = PassReport::new(pass_id, cursor.clone());

        let mut state = if cursor.is_empty() {
            RelayState::Bootstrap
        } else {
            RelayState::Steady(cursor)
        };

        loop {
            state = match state {
                RelayState::Bootstrap => self.bootstrap(&mut report).await?,
                RelayState::Steady(cursor) => self.step(cursor, &mut report).await?,
                RelayState::Idle => break,
            };
        }

        info!(
            pages = report.pages,
            batches = report.batches_forwarded,
            events = report.events_forwarded,
            unconfirmed = report.events_unconfirmed,
            cursor = %report.cursor,
            bootstrapped = report.bootstrapped,
            "Pass complete, caught up"
        );
        Ok(report)
    }

    /// Establishes a first resume point. Events from this call are not forwarded.
    async fn bootstrap(&self, report: &mut PassReport) -> Result<RelayState> {
        info!("No cursor found. Starting fresh...");
        let page = self.source.fetch(&Cursor::empty(), Order::Default).await?;
        report.pages += 1;

        let after = page.batch.after;
        if after.is_empty() {
            return Err(RelayError::BootstrapFailed);
        }
        self.commit(&after, report)?;
        report.bootstrapped = true;
        Ok(RelayState::Steady(after))
    }

    async fn step(&self, cursor: Cursor, report: &mut PassReport) -> Result<RelayState> {
        let page = self.source.fetch(&cursor, Order::Ascending).await?;
        report.pages += 1;
        let batch = page.batch;

        // An unchanged cursor means the page moved nowhere
        let advances = !batch.after.is_empty() && batch.after != cursor;

        if batch.is_empty() {
            if !advances {
                debug!(cursor = %cursor, "No new events");
                return Ok(RelayState::Idle);
            }
            self.commit(&batch.after, report)?;
            return Ok(RelayState::Steady(batch.after));
        }

        info!(
            events = batch.len(),
            cursor = %cursor,
            "Processing logs after cursor"
        );

        match self.commit_mode {
            CommitMode::AfterForward => {
                self.forward(&batch, report).await?;
                if advances {
                    self.commit(&batch.after, report)?;
                }
            }
            CommitMode::BeforeForward => {
                if advances {
                    self.commit(&batch.after, report)?;
                }
                self.forward(&batch, report).await?;
            }
        }

        if advances {
            Ok(RelayState::Steady(batch.after))
        } else {
            report.events_unconfirmed += batch.len();
            crate::observability::metrics::forward::unconfirmed(batch.len());
            warn!(
                cursor = %cursor,
                events = batch.len(),
                "Page carried no newer cursor; it will be delivered again on the next pass"
            );
            Ok(RelayState::Idle)
        }
    }

    async fn forward(&self, batch: &Batch, report: &mut PassReport) -> Result<()> {
        self.sink.send(batch).await?;
        report.batches_forwarded += 1;
        report.events_forwarded += batch.len();
        Ok(())
    }

    fn commit(&self, cursor: &Cursor, report: &mut PassReport) -> Result<()> {
        self.cursors.set(cursor)?;
        report.cursor = cursor.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::FetchedPage;
    use crate::types::LogEvent;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tempfile::tempdir;
    use tokio::sync::Mutex;

    type Calls = Arc<Mutex<Vec<(Cursor, Order)>>>;

    struct ScriptedSource {
        pages: Mutex<VecDeque<Batch>>,
        calls: Calls,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Batch>) -> (Self, Calls) {
            let calls: Calls = Arc::new(Mutex::new(Vec::new()));
            let source = Self {
                pages: Mutex::new(pages.into()),
                calls: calls.clone(),
            };
            (source, calls)
        }
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn fetch(&self, cursor: &Cursor, order: Order) -> Result<FetchedPage> {
            self.calls.lock().await.push((cursor.clone(), order));
            let batch = self
                .pages
                .lock()
                .await
                .pop_front()
                .expect("source called more times than scripted");
            Ok(FetchedPage { batch, rate_limit: None })
        }
    }

    struct RecordingSink {
        received: Arc<Mutex<Vec<Batch>>>,
        accept_limit: Option<usize>,
    }

    impl RecordingSink {
        fn new() -> (Self, Arc<Mutex<Vec<Batch>>>) {
            Self::accepting(None)
        }

        /// Accepts `limit` batches, then rejects everything.
        fn rejecting_after(limit: usize) -> (Self, Arc<Mutex<Vec<Batch>>>) {
            Self::accepting(Some(limit))
        }

        fn accepting(accept_limit: Option<usize>) -> (Self, Arc<Mutex<Vec<Batch>>>) {
            let received = Arc::new(Mutex::new(Vec::new()));
            (Self { received: received.clone(), accept_limit }, received)
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn send(&self, batch: &Batch) -> Result<()> {
            let mut received = self.received.lock().await;
            if self.accept_limit.is_some_and(|limit| received.len() >= limit) {
                return Err(RelayError::ForwardRejected {
                    status: 503,
                    expected: 200,
                    body: "unavailable".into(),
                });
            }
            received.push(batch.clone());
            Ok(())
        }
    }

    fn page(timestamps: &[i64], after: &str) -> Batch {
        Batch {
            events: timestamps
                .iter()
                .map(|ts| LogEvent::from_value(json!({"@timestamp": ts})).unwrap())
                .collect(),
            before: Cursor::empty(),
            after: Cursor::new(after),
        }
    }

    fn orchestrator(
        source: ScriptedSource,
        sink: RecordingSink,
        store: &CursorStore,
        mode: CommitMode,
    ) -> Orchestrator<ScriptedSource, RecordingSink> {
        Orchestrator::new(Box::new(source), Box::new(sink), store.clone(), mode)
    }

    #[tokio::test]
    async fn test_bootstrap_then_fetch_ascending() {
        let dir = tempdir().unwrap();
        let store = CursorStore::open_at_root(dir.path());
        let (source, calls) = ScriptedSource::new(vec![page(&[99], "c1"), page(&[], "")]);
        let (sink, received) = RecordingSink::new();

        let report = orchestrator(source, sink, &store, CommitMode::AfterForward)
            .run_pass()
            .await
            .unwrap();

        assert!(report.bootstrapped);
        assert_eq!(store.get().unwrap(), Cursor::new("c1"));
        assert_eq!(
            *calls.lock().await,
            vec![
                (Cursor::empty(), Order::Default),
                (Cursor::new("c1"), Order::Ascending)
            ]
        );
        // Bootstrap events only anchor the cursor
        assert!(received.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_without_forward_cursor_fails() {
        let dir = tempdir().unwrap();
        let store = CursorStore::open_at_root(dir.path());
        let (source, _) = ScriptedSource::new(vec![page(&[1], "")]);
        let (sink, _) = RecordingSink::new();

        let result = orchestrator(source, sink, &store, CommitMode::AfterForward)
            .run_pass()
            .await;

        assert!(matches!(result, Err(RelayError::BootstrapFailed)));
        assert!(store.get().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_idle_when_no_new_events() {
        let dir = tempdir().unwrap();
        let store = CursorStore::open_at_root(dir.path());
        store.set(&Cursor::new("c1")).unwrap();
        let (source, _) = ScriptedSource::new(vec![page(&[], "")]);
        let (sink, received) = RecordingSink::new();

        let report = orchestrator(source, sink, &store, CommitMode::AfterForward)
            .run_pass()
            .await
            .unwrap();

        assert_eq!(report.pages, 1);
        assert_eq!(report.events_forwarded, 0);
        assert!(received.lock().await.is_empty());
        assert_eq!(store.get().unwrap(), Cursor::new("c1"));
    }

    #[tokio::test]
    async fn test_drain_forwards_every_page_in_order() {
        let dir = tempdir().unwrap();
        let store = CursorStore::open_at_root(dir.path());
        store.set(&Cursor::new("c1")).unwrap();
        let (source, calls) = ScriptedSource::new(vec![page(&[1, 2], "c2"), page(&[3], "")]);
        let (sink, received) = RecordingSink::new();

        let report = orchestrator(source, sink, &store, CommitMode::AfterForward)
            .run_pass()
            .await
            .unwrap();

        let received = received.lock().await;
        let delivered: Vec<i64> = received
            .iter()
            .flat_map(|b| b.events.iter().map(|e| e.timestamp_ms()))
            .collect();
        assert_eq!(delivered, vec![1, 2, 3]);
        assert_eq!(report.batches_forwarded, 2);
        assert_eq!(report.events_forwarded, 3);
        assert_eq!(report.cursor, Cursor::new("c2"));
        assert_eq!(store.get().unwrap(), Cursor::new("c2"));
        assert_eq!(calls.lock().await[1], (Cursor::new("c2"), Order::Ascending));
    }

    #[tokio::test]
    async fn test_rejected_batch_does_not_advance_cursor() {
        let dir = tempdir().unwrap();
        let store = CursorStore::open_at_root(dir.path());
        store.set(&Cursor::new("c1")).unwrap();
        let (source, _) = ScriptedSource::new(vec![page(&[1], "c2")]);
        let (sink, _) = RecordingSink::rejecting_after(0);

        let result = orchestrator(source, sink, &store, CommitMode::AfterForward)
            .run_pass()
            .await;

        assert!(matches!(result, Err(RelayError::ForwardRejected { .. })));
        assert_eq!(store.get().unwrap(), Cursor::new("c1"));
    }

    #[tokio::test]
    async fn test_restart_replays_undelivered_batch() {
        let dir = tempdir().unwrap();
        let store = CursorStore::open_at_root(dir.path());
        store.set(&Cursor::new("c1")).unwrap();

        // First run: B1 delivered, B2 rejected.
        let (source, _) = ScriptedSource::new(vec![page(&[1], "c2"), page(&[2], "c3")]);
        let (sink, first_received) = RecordingSink::rejecting_after(1);
        let result = orchestrator(source, sink, &store, CommitMode::AfterForward)
            .run_pass()
            .await;
        assert!(matches!(result, Err(RelayError::ForwardRejected { .. })));
        assert_eq!(first_received.lock().await.len(), 1);
        assert_eq!(store.get().unwrap(), Cursor::new("c2"));

        // Restart resumes from the last committed cursor and re-sends B2.
        let (source, calls) = ScriptedSource::new(vec![page(&[2], "c3"), page(&[], "")]);
        let (sink, received) = RecordingSink::new();
        orchestrator(source, sink, &store, CommitMode::AfterForward)
            .run_pass()
            .await
            .unwrap();

        assert_eq!(calls.lock().await[0].0, Cursor::new("c2"));
        let received = received.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].events[0].timestamp_ms(), 2);
        assert_eq!(store.get().unwrap(), Cursor::new("c3"));
    }

    #[tokio::test]
    async fn test_before_forward_commits_even_when_rejected() {
        let dir = tempdir().unwrap();
        let store = CursorStore::open_at_root(dir.path());
        store.set(&Cursor::new("c1")).unwrap();
        let (source, _) = ScriptedSource::new(vec![page(&[1], "c2")]);
        let (sink, _) = RecordingSink::rejecting_after(0);

        let result = orchestrator(source, sink, &store, CommitMode::BeforeForward)
            .run_pass()
            .await;

        assert!(result.is_err());
        assert_eq!(store.get().unwrap(), Cursor::new("c2"));
    }

    #[tokio::test]
    async fn test_unchanged_cursor_ends_pass() {
        let dir = tempdir().unwrap();
        let store = CursorStore::open_at_root(dir.path());
        store.set(&Cursor::new("c1")).unwrap();
        let (source, calls) = ScriptedSource::new(vec![page(&[], "c1")]);
        let (sink, _) = RecordingSink::new();

        orchestrator(source, sink, &store, CommitMode::AfterForward)
            .run_pass()
            .await
            .unwrap();

        assert_eq!(calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_page_with_cursor_advances_without_forwarding() {
        let dir = tempdir().unwrap();
        let store = CursorStore::open_at_root(dir.path());
        store.set(&Cursor::new("c1")).unwrap();
        let (source, _) = ScriptedSource::new(vec![page(&[], "c2"), page(&[], "")]);
        let (sink, received) = RecordingSink::new();

        orchestrator(source, sink, &store, CommitMode::AfterForward)
            .run_pass()
            .await
            .unwrap();

        assert!(received.lock().await.is_empty());
        assert_eq!(store.get().unwrap(), Cursor::new("c2"));
    }

    #[tokio::test]
    async fn test_trailing_page_is_resent_each_pass_and_counted() {
        let dir = tempdir().unwrap();
        let store = CursorStore::open_at_root(dir.path());
        store.set(&Cursor::new("c1")).unwrap();

        for _ in 0..2 {
            let (source, calls) = ScriptedSource::new(vec![page(&[5, 6], "")]);
            let (sink, received) = RecordingSink::new();
            let report = orchestrator(source, sink, &store, CommitMode::AfterForward)
                .run_pass()
                .await
                .unwrap();

            assert_eq!(calls.lock().await[0].0, Cursor::new("c1"));
            assert_eq!(received.lock().await.len(), 1);
            assert_eq!(report.events_forwarded, 2);
            assert_eq!(report.events_unconfirmed, 2);
            assert_eq!(report.cursor, Cursor::new("c1"));
        }
    }

    #[tokio::test]
    async fn test_confirmed_pages_report_no_unconfirmed_events() {
        let dir = tempdir().unwrap();
        let store = CursorStore::open_at_root(dir.path());
        store.set(&Cursor::new("c1")).unwrap();
        let (source, _) = ScriptedSource::new(vec![page(&[1], "c2"), page(&[], "")]);
        let (sink, _) = RecordingSink::new();

        let report = orchestrator(source, sink, &store, CommitMode::AfterForward)
            .run_pass()
            .await
            .unwrap();

        assert_eq!(report.events_forwarded, 1);
        assert_eq!(report.events_unconfirmed, 0);
    }

    #[test]
    fn test_commit_mode_parse() {
        assert_eq!(CommitMode::parse("after-forward"), Some(CommitMode::AfterForward));
        assert_eq!(CommitMode::parse("BEFORE"), Some(CommitMode::BeforeForward));
        assert_eq!(CommitMode::parse("sometimes"), None);
        assert_eq!(CommitMode::default(), CommitMode::AfterForward);
    }
}
