//! HTTP implementation of the recognition client.
//!
//! Talks to the recognition microservice's `/ocr` (single object) and
//! `/ocr/batch` (whole group) endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RecognitionClient, RecognizeError};
use crate::models::{Outcome, RecognizedText, SignedRequest};

/// Client for the recognition microservice.
#[derive(Clone)]
pub struct HttpRecognitionClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct RecognizeRequest<'a> {
    key: &'a str,
    url: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchRecognizeRequest<'a> {
    items: Vec<RecognizeRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct RecognizedTextWire {
    key: String,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    full_text: String,
}

#[derive(Debug, Deserialize)]
struct BatchItemWire {
    key: String,
    #[serde(default)]
    status_code: Option<u16>,
    #[serde(default)]
    result: Option<RecognizedTextWire>,
    #[serde(default)]
    err: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchResponseWire {
    results: Vec<BatchItemWire>,
}

impl From<RecognizedTextWire> for RecognizedText {
    fn from(wire: RecognizedTextWire) -> Self {
        RecognizedText {
            identifier: wire.key,
            source_url: wire.source_url,
            full_text: wire.full_text,
        }
    }
}

impl From<BatchItemWire> for Outcome {
    fn from(item: BatchItemWire) -> Self {
        Outcome {
            identifier: item.key,
            // The service reports 0 for "no status", matching its
            // transport-failure shape.
            status_code: item.status_code.filter(|s| *s != 0),
            result: item.result.map(RecognizedText::from),
            error: item.err.filter(|e| !e.is_empty()),
        }
    }
}

impl HttpRecognitionClient {
    /// Create a client for the service at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl RecognitionClient for HttpRecognitionClient {
    async fn recognize_one(&self, request: &SignedRequest) -> Outcome {
        let body = RecognizeRequest {
            key: &request.identifier,
            url: &request.url,
        };

        debug!("recognizing {}", request.identifier);
        let response = match self
            .client
            .post(self.endpoint("/ocr"))
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Outcome::failure(&request.identifier, format!("http: {e}")),
        };

        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Outcome::failure(&request.identifier, format!("read response: {e}")),
        };

        if status.is_success() {
            match serde_json::from_slice::<RecognizedTextWire>(&bytes) {
                Ok(wire) => Outcome::success(&request.identifier, status.as_u16(), wire.into()),
                Err(e) => Outcome::status_failure(
                    &request.identifier,
                    status.as_u16(),
                    format!("parse json: {e}"),
                ),
            }
        } else {
            Outcome::status_failure(
                &request.identifier,
                status.as_u16(),
                String::from_utf8_lossy(&bytes).into_owned(),
            )
        }
    }

    async fn recognize_batch(
        &self,
        requests: &[SignedRequest],
    ) -> Result<Vec<Outcome>, RecognizeError> {
        let body = BatchRecognizeRequest {
            items: requests
                .iter()
                .map(|r| RecognizeRequest {
                    key: &r.identifier,
                    url: &r.url,
                })
                .collect(),
        };

        debug!("recognizing batch of {}", requests.len());
        let response = self
            .client
            .post(self.endpoint("/ocr/batch"))
            .json(&body)
            .send()
            .await
            .map_err(|e| RecognizeError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RecognizeError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(RecognizeError::Status {
                status_code: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let parsed: BatchResponseWire =
            serde_json::from_slice(&bytes).map_err(|e| RecognizeError::Parse(e.to_string()))?;

        Ok(parsed.results.into_iter().map(Outcome::from).collect())
    }
}
