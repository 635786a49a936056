//! The dispatch engine.
//!
//! Drives every identifier the catalog lists through the recognition
//! service in one of two modes: bounded-concurrency fan-out (one call per
//! object) or sequential batching (one call per contiguous group of
//! objects). Partial failures are captured as outcomes; only listing
//! failures abort a run.
//!
//! Cancellation is cooperative and best-effort. The token is probed
//! before admitting each unit or group, never inside an in-flight call:
//! a call already issued runs to completion or to its own transport
//! timeout. The first positive probe records one marker line in the
//! report and stops admission immediately.

mod events;

pub use events::DispatchEvent;

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{DispatchMode, Settings};
use crate::models::{DispatchReport, Outcome, SignedRequest};
use crate::recognize::{RecognitionClient, RecognizeError};
use crate::report::ReportAssembler;
use crate::storage::{ObjectCatalog, StorageError, UrlSigner};

/// Fatal dispatch failures. Everything from signing onward is captured
/// as outcome data instead of surfacing here.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Catalog(#[from] StorageError),
}

/// Orchestrates one run over the catalog.
///
/// Collaborators are injected once at construction; the dispatcher holds
/// no other shared state.
pub struct Dispatcher {
    catalog: Arc<dyn ObjectCatalog>,
    signer: Arc<dyn UrlSigner>,
    recognizer: Arc<dyn RecognitionClient>,
    settings: Settings,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Create a dispatcher over the three collaborators.
    pub fn new(
        catalog: Arc<dyn ObjectCatalog>,
        signer: Arc<dyn UrlSigner>,
        recognizer: Arc<dyn RecognitionClient>,
        settings: Settings,
    ) -> Self {
        Self {
            catalog,
            signer,
            recognizer,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token (e.g. wired to ctrl-c).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops admission of not-yet-started work when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the dispatch and assemble the report.
    ///
    /// `events` receives progress notifications; send failures are
    /// ignored.
    pub async fn run(
        &self,
        events: mpsc::Sender<DispatchEvent>,
    ) -> Result<DispatchReport, DispatchError> {
        let started = Instant::now();

        let identifiers = self.catalog.list_objects().await?;
        info!(
            "listed {} objects under {}/{}",
            identifiers.len(),
            self.settings.bucket,
            self.settings.prefix
        );

        let mut assembler = ReportAssembler::new(
            &self.settings.bucket,
            &self.settings.prefix,
            identifiers.len(),
        );

        let _ = events
            .send(DispatchEvent::Started {
                total: identifiers.len(),
                mode: self.settings.mode,
            })
            .await;

        if !identifiers.is_empty() {
            match self.settings.mode {
                DispatchMode::Individual => {
                    self.run_individual(identifiers, &mut assembler, &events).await
                }
                DispatchMode::Batch => self.run_batched(identifiers, &mut assembler, &events).await,
            }
        }

        info!("dispatch finished in {:?}", started.elapsed());
        Ok(assembler.finish())
    }

    /// Mode A: semaphore-gated fan-out, one task per admitted identifier.
    ///
    /// Each task drops its admission permit before handing its outcome to
    /// the channel, so channel capacity never has to exceed the admission
    /// bound; the channel is still sized to the full identifier count so
    /// a producer can never block on a full buffer. Once the admission
    /// loop and every task have dropped their senders, `recv` returns
    /// `None` and the drain loop completes — that closure is the
    /// end-of-stream barrier.
    async fn run_individual(
        &self,
        identifiers: Vec<String>,
        assembler: &mut ReportAssembler,
        events: &mpsc::Sender<DispatchEvent>,
    ) {
        let (tx, mut rx) = mpsc::channel::<Outcome>(identifiers.len());
        let gate = Arc::new(Semaphore::new(self.settings.concurrency));

        for identifier in identifiers {
            if self.cancel.is_cancelled() {
                warn!("cancelled; stopping admission");
                assembler.note_cancelled();
                let _ = events.send(DispatchEvent::Cancelled).await;
                break;
            }

            let permit = gate
                .clone()
                .acquire_owned()
                .await
                .expect("admission gate closed");
            let signer = Arc::clone(&self.signer);
            let recognizer = Arc::clone(&self.recognizer);
            let tx = tx.clone();

            tokio::spawn(async move {
                let outcome = process_one(signer.as_ref(), recognizer.as_ref(), identifier).await;
                // Release the admission slot before the handoff.
                drop(permit);
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);

        while let Some(outcome) = rx.recv().await {
            let _ = events
                .send(DispatchEvent::ObjectCompleted {
                    identifier: outcome.identifier.clone(),
                    failed: outcome.is_failed(),
                })
                .await;
            assembler.push(outcome);
        }
    }

    /// Mode B: contiguous groups of at most `batch_size`, strictly one at
    /// a time.
    async fn run_batched(
        &self,
        identifiers: Vec<String>,
        assembler: &mut ReportAssembler,
        events: &mpsc::Sender<DispatchEvent>,
    ) {
        let mut start = 0;
        for group in identifiers.chunks(self.settings.batch_size) {
            if self.cancel.is_cancelled() {
                warn!("cancelled; stopping before the next group");
                assembler.note_cancelled();
                let _ = events.send(DispatchEvent::Cancelled).await;
                break;
            }

            info!(
                "processing group {}..{} ({} objects)",
                start + 1,
                start + group.len(),
                group.len()
            );

            match self.process_group(group).await {
                Ok(outcomes) => {
                    let _ = events
                        .send(DispatchEvent::GroupCompleted {
                            start,
                            size: group.len(),
                            collapsed: false,
                        })
                        .await;
                    for outcome in outcomes {
                        assembler.push(outcome);
                    }
                }
                Err(synthetic) => {
                    let _ = events
                        .send(DispatchEvent::GroupCompleted {
                            start,
                            size: group.len(),
                            collapsed: true,
                        })
                        .await;
                    assembler.push(synthetic);
                }
            }

            start += group.len();
        }
    }

    /// Sign every member, then run the whole group through the batch
    /// endpoint.
    ///
    /// Any failure collapses the group into one synthetic outcome
    /// (`Err`), dropping already-signed members with it: one network
    /// round trip per group is the trade-off.
    async fn process_group(&self, group: &[String]) -> Result<Vec<Outcome>, Outcome> {
        let marker = group_marker(group);

        let mut signed = Vec::with_capacity(group.len());
        for identifier in group {
            match self.signer.sign(identifier).await {
                Ok(url) => signed.push(SignedRequest {
                    identifier: identifier.clone(),
                    url,
                }),
                Err(e) => {
                    warn!("group {marker}: signing {identifier} failed: {e}");
                    return Err(Outcome::failure(marker, format!("sign {identifier}: {e}")));
                }
            }
        }

        match self.recognizer.recognize_batch(&signed).await {
            Ok(outcomes) => Ok(outcomes),
            Err(e) => {
                warn!("group {marker}: batch call failed: {e}");
                Err(match e {
                    RecognizeError::Status { status_code, body } => {
                        Outcome::status_failure(marker, status_code, body)
                    }
                    other => Outcome::failure(marker, other.to_string()),
                })
            }
        }
    }
}

/// Sign one identifier and run it through the single-object endpoint.
async fn process_one(
    signer: &dyn UrlSigner,
    recognizer: &dyn RecognitionClient,
    identifier: String,
) -> Outcome {
    let url = match signer.sign(&identifier).await {
        Ok(url) => url,
        Err(e) => return Outcome::failure(identifier, format!("sign: {e}")),
    };

    recognizer
        .recognize_one(&SignedRequest { identifier, url })
        .await
}

/// Identifier used for a synthetic whole-group outcome.
fn group_marker(group: &[String]) -> String {
    match (group.first(), group.last()) {
        (Some(first), Some(last)) if first != last => format!("batch[{first}..{last}]"),
        (Some(only), _) => format!("batch[{only}]"),
        _ => "batch[]".to_string(),
    }
}
