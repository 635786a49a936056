//! Object storage collaborators: listing and URL signing.

mod s3;

pub use s3::S3ObjectStore;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the storage collaborators.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The listing failed. No partial list is returned; this aborts the
    /// whole run.
    #[error("listing objects failed: {0}")]
    List(String),

    /// Minting a retrieval URL failed. Recorded as a per-identifier (or
    /// per-group) outcome, never fatal.
    #[error("{0}")]
    Sign(String),
}

/// Lists the identifiers a run should process.
#[async_trait]
pub trait ObjectCatalog: Send + Sync {
    /// Return every candidate identifier under the configured location,
    /// in listing order. Fails atomically: an error on any page yields no
    /// identifiers at all.
    async fn list_objects(&self) -> Result<Vec<String>, StorageError>;
}

/// Mints time-limited retrieval URLs.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    /// Produce a URL granting read access to `identifier` for the
    /// configured window.
    async fn sign(&self, identifier: &str) -> Result<String, StorageError>;
}
