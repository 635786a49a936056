//! Dispatcher behavior against in-memory collaborators.
//!
//! Exercises both dispatch modes end to end with fakes standing in for
//! the catalog, the signer and the recognition service.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use ocrsweep::config::{DispatchMode, Settings};
use ocrsweep::dispatch::{DispatchEvent, Dispatcher};
use ocrsweep::models::{Outcome, RecognizedText, SignedRequest};
use ocrsweep::recognize::{RecognitionClient, RecognizeError};
use ocrsweep::report::CANCELLED_MARKER;
use ocrsweep::storage::{ObjectCatalog, StorageError, UrlSigner};

/// Catalog over a fixed identifier list.
struct FixedCatalog {
    identifiers: Vec<String>,
}

impl FixedCatalog {
    fn new(identifiers: &[&str]) -> Self {
        Self {
            identifiers: identifiers.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl ObjectCatalog for FixedCatalog {
    async fn list_objects(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.identifiers.clone())
    }
}

/// Signer returning deterministic URLs, failing for configured keys.
struct FakeSigner {
    fail_for: HashSet<String>,
}

impl FakeSigner {
    fn ok() -> Self {
        Self {
            fail_for: HashSet::new(),
        }
    }

    fn failing(identifiers: &[&str]) -> Self {
        Self {
            fail_for: identifiers.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl UrlSigner for FakeSigner {
    async fn sign(&self, identifier: &str) -> Result<String, StorageError> {
        if self.fail_for.contains(identifier) {
            return Err(StorageError::Sign(format!(
                "no credentials for {identifier}"
            )));
        }
        Ok(format!("https://signed.example/{identifier}"))
    }
}

/// Recognizer with canned per-identifier failures and an in-flight gauge.
#[derive(Default)]
struct FakeRecognizer {
    /// Identifiers that should come back as HTTP failures.
    failures: HashMap<String, (u16, String)>,
    /// Whole-batch failure, when set.
    batch_error: Option<BatchFailure>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    batch_calls: Mutex<Vec<Vec<String>>>,
}

enum BatchFailure {
    Transport,
    Status(u16, String),
}

impl FakeRecognizer {
    fn ok() -> Self {
        Self::default()
    }

    fn with_failures(failures: &[(&str, u16, &str)]) -> Self {
        Self {
            failures: failures
                .iter()
                .map(|(id, status, body)| (id.to_string(), (*status, body.to_string())))
                .collect(),
            ..Self::default()
        }
    }

    fn failing_batches() -> Self {
        Self {
            batch_error: Some(BatchFailure::Transport),
            ..Self::default()
        }
    }

    fn with_batch_status(status: u16, body: &str) -> Self {
        Self {
            batch_error: Some(BatchFailure::Status(status, body.to_string())),
            ..Self::default()
        }
    }

    fn outcome_for(&self, request: &SignedRequest) -> Outcome {
        match self.failures.get(&request.identifier) {
            Some((status, body)) => {
                Outcome::status_failure(&request.identifier, *status, body.clone())
            }
            None => Outcome::success(
                &request.identifier,
                200,
                RecognizedText {
                    identifier: request.identifier.clone(),
                    source_url: Some(request.url.clone()),
                    full_text: format!("text of {}", request.identifier),
                },
            ),
        }
    }
}

#[async_trait]
impl RecognitionClient for FakeRecognizer {
    async fn recognize_one(&self, request: &SignedRequest) -> Outcome {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.outcome_for(request)
    }

    async fn recognize_batch(
        &self,
        requests: &[SignedRequest],
    ) -> Result<Vec<Outcome>, RecognizeError> {
        self.batch_calls
            .lock()
            .unwrap()
            .push(requests.iter().map(|r| r.identifier.clone()).collect());

        match &self.batch_error {
            Some(BatchFailure::Transport) => {
                Err(RecognizeError::Transport("connection refused".to_string()))
            }
            Some(BatchFailure::Status(status, body)) => Err(RecognizeError::Status {
                status_code: *status,
                body: body.clone(),
            }),
            None => Ok(requests.iter().map(|r| self.outcome_for(r)).collect()),
        }
    }
}

fn settings(mode: DispatchMode, concurrency: usize, batch_size: usize) -> Settings {
    Settings {
        bucket: "reports".to_string(),
        prefix: "scans/".to_string(),
        service_url: "http://recognizer.local:8080".to_string(),
        concurrency,
        batch_size,
        mode,
        ..Settings::default()
    }
}

fn dispatcher(
    identifiers: &[&str],
    signer: FakeSigner,
    recognizer: Arc<FakeRecognizer>,
    settings: Settings,
) -> Dispatcher {
    Dispatcher::new(
        Arc::new(FixedCatalog::new(identifiers)),
        Arc::new(signer),
        recognizer,
        settings,
    )
}

/// Event sender whose receiver is already gone; sends fail fast and the
/// dispatcher ignores them.
fn sink() -> mpsc::Sender<DispatchEvent> {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    tx
}

fn identifiers_of(outcomes: &[Outcome]) -> Vec<&str> {
    outcomes.iter().map(|o| o.identifier.as_str()).collect()
}

#[tokio::test]
async fn individual_mode_yields_one_outcome_per_identifier() {
    // Scenario: three objects, bound of two, one server-side failure.
    let recognizer = Arc::new(FakeRecognizer::with_failures(&[(
        "scans/c.pdf",
        500,
        "server error",
    )]));
    let dispatcher = dispatcher(
        &["scans/a.pdf", "scans/b.pdf", "scans/c.pdf"],
        FakeSigner::ok(),
        recognizer,
        settings(DispatchMode::Individual, 2, 50),
    );

    let report = dispatcher.run(sink()).await.unwrap();

    assert_eq!(report.processed_count, 3);
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(
        report.error_lines,
        vec!["scans/c.pdf: server error".to_string()]
    );

    let ids: HashSet<&str> = identifiers_of(&report.outcomes).into_iter().collect();
    assert_eq!(
        ids,
        HashSet::from(["scans/a.pdf", "scans/b.pdf", "scans/c.pdf"])
    );
}

#[tokio::test]
async fn individual_mode_covers_large_sets_exactly_once() {
    let identifiers: Vec<String> = (0..100).map(|i| format!("scans/doc-{i:03}.pdf")).collect();
    let refs: Vec<&str> = identifiers.iter().map(|s| s.as_str()).collect();

    let recognizer = Arc::new(FakeRecognizer::ok());
    let dispatcher = dispatcher(
        &refs,
        FakeSigner::ok(),
        recognizer,
        settings(DispatchMode::Individual, 8, 50),
    );

    let report = dispatcher.run(sink()).await.unwrap();

    assert_eq!(report.outcomes.len(), 100);
    assert!(report.error_lines.is_empty());

    let seen: HashSet<&str> = identifiers_of(&report.outcomes).into_iter().collect();
    assert_eq!(seen.len(), 100, "no duplicates, no omissions");
    for identifier in &refs {
        assert!(seen.contains(identifier));
    }
}

#[tokio::test]
async fn individual_mode_respects_admission_bound() {
    let identifiers: Vec<String> = (0..40).map(|i| format!("scans/doc-{i:02}.pdf")).collect();
    let refs: Vec<&str> = identifiers.iter().map(|s| s.as_str()).collect();

    let recognizer = Arc::new(FakeRecognizer::ok());
    let dispatcher = dispatcher(
        &refs,
        FakeSigner::ok(),
        Arc::clone(&recognizer),
        settings(DispatchMode::Individual, 4, 50),
    );

    let report = dispatcher.run(sink()).await.unwrap();
    assert_eq!(report.outcomes.len(), 40);

    let max = recognizer.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 4, "admission bound exceeded: {max} in flight");
    assert!(max > 0);
}

#[tokio::test]
async fn individual_mode_records_signing_failures_per_object() {
    let recognizer = Arc::new(FakeRecognizer::ok());
    let dispatcher = dispatcher(
        &["scans/a.pdf", "scans/b.pdf"],
        FakeSigner::failing(&["scans/b.pdf"]),
        recognizer,
        settings(DispatchMode::Individual, 2, 50),
    );

    let report = dispatcher.run(sink()).await.unwrap();

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.error_lines.len(), 1);
    assert!(report.error_lines[0].starts_with("scans/b.pdf: sign:"));

    let failed = report
        .outcomes
        .iter()
        .find(|o| o.identifier == "scans/b.pdf")
        .unwrap();
    assert!(failed.is_failed());
    assert_eq!(failed.status_code, None);
}

#[tokio::test]
async fn empty_catalog_yields_empty_report() {
    let recognizer = Arc::new(FakeRecognizer::ok());
    let dispatcher = dispatcher(
        &[],
        FakeSigner::ok(),
        recognizer,
        settings(DispatchMode::Individual, 10, 50),
    );

    let report = dispatcher.run(sink()).await.unwrap();

    assert_eq!(report.processed_count, 0);
    assert!(report.outcomes.is_empty());
    assert!(report.error_lines.is_empty());
}

#[tokio::test]
async fn batch_mode_groups_in_original_order() {
    let recognizer = Arc::new(FakeRecognizer::ok());
    let dispatcher = dispatcher(
        &["doc-1", "doc-2", "doc-3", "doc-4", "doc-5"],
        FakeSigner::ok(),
        Arc::clone(&recognizer),
        settings(DispatchMode::Batch, 10, 2),
    );

    let report = dispatcher.run(sink()).await.unwrap();

    assert_eq!(report.outcomes.len(), 5);
    assert!(report.error_lines.is_empty());
    assert_eq!(
        identifiers_of(&report.outcomes),
        vec!["doc-1", "doc-2", "doc-3", "doc-4", "doc-5"]
    );

    let calls = recognizer.batch_calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![
            vec!["doc-1".to_string(), "doc-2".to_string()],
            vec!["doc-3".to_string(), "doc-4".to_string()],
            vec!["doc-5".to_string()],
        ]
    );
}

#[tokio::test]
async fn batch_mode_collapses_group_on_signing_failure() {
    // Five objects, groups of two, signing fails inside the second group:
    // group one and group three emit member outcomes, group two collapses
    // to a single synthetic one.
    let recognizer = Arc::new(FakeRecognizer::ok());
    let dispatcher = dispatcher(
        &["doc-1", "doc-2", "doc-3", "doc-4", "doc-5"],
        FakeSigner::failing(&["doc-3"]),
        Arc::clone(&recognizer),
        settings(DispatchMode::Batch, 10, 2),
    );

    let report = dispatcher.run(sink()).await.unwrap();

    assert_eq!(report.processed_count, 5);
    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(
        identifiers_of(&report.outcomes),
        vec!["doc-1", "doc-2", "batch[doc-3..doc-4]", "doc-5"]
    );

    assert_eq!(report.error_lines.len(), 1);
    assert!(report.error_lines[0].starts_with("batch[doc-3..doc-4]: sign doc-3:"));

    // The failed group never reached the batch endpoint.
    let calls = recognizer.batch_calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![
            vec!["doc-1".to_string(), "doc-2".to_string()],
            vec!["doc-5".to_string()],
        ]
    );
}

#[tokio::test]
async fn batch_mode_collapses_group_on_transport_failure() {
    let recognizer = Arc::new(FakeRecognizer::failing_batches());
    let dispatcher = dispatcher(
        &["doc-1", "doc-2", "doc-3"],
        FakeSigner::ok(),
        recognizer,
        settings(DispatchMode::Batch, 10, 5),
    );

    let report = dispatcher.run(sink()).await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].identifier, "batch[doc-1..doc-3]");
    assert_eq!(report.outcomes[0].status_code, None);
    assert!(report
        .outcomes[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("http batch request:"));
    assert_eq!(report.error_lines.len(), 1);
}

#[tokio::test]
async fn batch_mode_synthetic_outcome_keeps_http_status() {
    let recognizer = Arc::new(FakeRecognizer::with_batch_status(503, "overloaded"));
    let dispatcher = dispatcher(
        &["doc-1", "doc-2"],
        FakeSigner::ok(),
        recognizer,
        settings(DispatchMode::Batch, 10, 5),
    );

    let report = dispatcher.run(sink()).await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].status_code, Some(503));
    assert_eq!(report.outcomes[0].error.as_deref(), Some("overloaded"));
}

#[tokio::test]
async fn cancelled_run_stops_admission_with_one_marker() {
    for mode in [DispatchMode::Individual, DispatchMode::Batch] {
        let recognizer = Arc::new(FakeRecognizer::ok());
        let dispatcher = dispatcher(
            &["doc-1", "doc-2", "doc-3"],
            FakeSigner::ok(),
            recognizer,
            settings(mode, 2, 2),
        );

        dispatcher.cancellation_token().cancel();
        let report = dispatcher.run(sink()).await.unwrap();

        assert_eq!(report.processed_count, 3);
        assert!(report.outcomes.is_empty());
        assert_eq!(report.error_lines, vec![CANCELLED_MARKER.to_string()]);
    }
}

#[tokio::test]
async fn rerunning_an_unchanged_catalog_is_idempotent() {
    let recognizer = Arc::new(FakeRecognizer::with_failures(&[(
        "doc-2",
        500,
        "server error",
    )]));
    let dispatcher = dispatcher(
        &["doc-1", "doc-2", "doc-3", "doc-4"],
        FakeSigner::ok(),
        recognizer,
        settings(DispatchMode::Individual, 3, 50),
    );

    let first = dispatcher.run(sink()).await.unwrap();
    let second = dispatcher.run(sink()).await.unwrap();

    assert_eq!(first.processed_count, second.processed_count);

    let first_ids: HashSet<&str> = identifiers_of(&first.outcomes).into_iter().collect();
    let second_ids: HashSet<&str> = identifiers_of(&second.outcomes).into_iter().collect();
    assert_eq!(first_ids, second_ids);
    assert_eq!(first.error_lines, second.error_lines);
}

#[tokio::test]
async fn events_trace_the_run() {
    let (tx, mut rx) = mpsc::channel(64);
    let collector = tokio::spawn(async move {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    });

    let recognizer = Arc::new(FakeRecognizer::ok());
    let dispatcher = dispatcher(
        &["doc-1", "doc-2", "doc-3"],
        FakeSigner::ok(),
        recognizer,
        settings(DispatchMode::Individual, 2, 50),
    );

    let report = dispatcher.run(tx).await.unwrap();
    let events = collector.await.unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert!(matches!(
        events.first(),
        Some(DispatchEvent::Started { total: 3, .. })
    ));
    let completed = events
        .iter()
        .filter(|e| matches!(e, DispatchEvent::ObjectCompleted { .. }))
        .count();
    assert_eq!(completed, 3);
}
