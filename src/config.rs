//! Run configuration.

use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Default admission bound for individual mode.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default group size for batch mode.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default lifetime of a signed retrieval URL, in seconds (10 minutes).
pub const DEFAULT_SIGN_TTL_SECS: u64 = 600;

/// Default recognition request timeout, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Configuration errors. All of these are fatal: no run is attempted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// How the dispatcher hands work to the recognition service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// One call per object, fanned out under the concurrency bound.
    #[default]
    Individual,
    /// One call per contiguous group of objects, groups run sequentially.
    Batch,
}

/// Settings for one dispatch run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Storage bucket holding the objects.
    pub bucket: String,
    /// Key prefix narrowing the listing; may be empty.
    pub prefix: String,
    /// Base address of the recognition service.
    pub service_url: String,
    /// Admission bound for individual mode.
    pub concurrency: usize,
    /// Group size for batch mode.
    pub batch_size: usize,
    pub mode: DispatchMode,
    /// Signed URL lifetime in seconds.
    pub sign_ttl_secs: u64,
    /// Recognition request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: String::new(),
            service_url: String::new(),
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            mode: DispatchMode::default(),
            sign_ttl_secs: DEFAULT_SIGN_TTL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Check that required fields are present and bounds are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.is_empty() {
            return Err(ConfigError::Missing("bucket (BUCKET_NAME)"));
        }
        if self.service_url.is_empty() {
            return Err(ConfigError::Missing("recognition service URL (API_URL)"));
        }
        if Url::parse(&self.service_url).is_err() {
            return Err(ConfigError::Invalid(
                "recognition service URL must be an absolute URL",
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch size must be at least 1"));
        }
        Ok(())
    }

    /// Lifetime of signed retrieval URLs.
    pub fn sign_ttl(&self) -> Duration {
        Duration::from_secs(self.sign_ttl_secs)
    }

    /// Timeout applied to each recognition request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
