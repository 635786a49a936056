//! Per-object processing results.

use serde::{Deserialize, Serialize};

/// An identifier paired with its time-limited retrieval URL.
///
/// Produced immediately before a recognition call and never persisted;
/// the URL expires on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub identifier: String,
    pub url: String,
}

/// Success payload from the recognition service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedText {
    /// Identifier of the object the text was extracted from.
    pub identifier: String,
    /// URL the service fetched the object from, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// The extracted text.
    pub full_text: String,
}

/// The result of processing one identifier, or one whole group when a
/// batch call failed wholesale.
///
/// Exactly one of `result`/`error` is meaningfully populated. An outcome
/// counts as failed when `error` is non-empty or `status_code` is 400 or
/// above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub identifier: String,
    /// HTTP status of the recognition call; absent on transport or
    /// signing failures where no response was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RecognizedText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    /// A successful recognition.
    pub fn success(identifier: impl Into<String>, status_code: u16, result: RecognizedText) -> Self {
        Self {
            identifier: identifier.into(),
            status_code: Some(status_code),
            result: Some(result),
            error: None,
        }
    }

    /// A failure with no HTTP status (transport or signing errors).
    pub fn failure(identifier: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            status_code: None,
            result: None,
            error: Some(error.into()),
        }
    }

    /// A failure carrying the HTTP status of the recognition call.
    pub fn status_failure(
        identifier: impl Into<String>,
        status_code: u16,
        error: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            status_code: Some(status_code),
            result: None,
            error: Some(error.into()),
        }
    }

    /// Whether this outcome counts as failed.
    pub fn is_failed(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.is_empty())
            || self.status_code.is_some_and(|s| s >= 400)
    }

    /// The line recorded in the report's error list for a failed outcome.
    pub fn error_line(&self) -> String {
        format!("{}: {}", self.identifier, self.error.as_deref().unwrap_or_default())
    }
}
