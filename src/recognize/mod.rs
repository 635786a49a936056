//! Recognition service client.

mod http;

pub use http::HttpRecognitionClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Outcome, SignedRequest};

/// Errors from a whole-batch recognition call.
///
/// Individual-mode calls never error at this level: every failure is
/// captured in the returned [`Outcome`]. Batch calls surface call-level
/// failures here so the dispatcher can collapse the group into one
/// synthetic outcome.
#[derive(Debug, Error)]
pub enum RecognizeError {
    #[error("http batch request: {0}")]
    Transport(String),

    #[error("{body}")]
    Status { status_code: u16, body: String },

    #[error("parse batch response: {0}")]
    Parse(String),
}

/// Client for the recognition service.
///
/// No retries at this layer; the dispatcher adds none either.
#[async_trait]
pub trait RecognitionClient: Send + Sync {
    /// Recognize a single object. Transport failures, non-2xx statuses
    /// and unparseable bodies are all folded into the returned outcome.
    async fn recognize_one(&self, request: &SignedRequest) -> Outcome;

    /// Recognize a whole group in one call. On success the outcomes align
    /// with the input order.
    async fn recognize_batch(
        &self,
        requests: &[SignedRequest],
    ) -> Result<Vec<Outcome>, RecognizeError>;
}
