//! Storage options passed alongside every URI.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default region for S3 clients.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Options controlling how remote objects are fetched.
///
/// Unrecognised keys are kept in `extra` and handed on untouched to
/// whatever consumes the storage options downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageOptions {
    /// Disable request signing for object-storage reads (public buckets)
    #[serde(default)]
    pub anon: bool,
    /// S3 region (defaults to us-east-1)
    #[serde(default)]
    pub region: Option<String>,
    /// Custom S3 endpoint (MinIO, localstack)
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Use path-style bucket addressing
    #[serde(default)]
    pub force_path_style: bool,
    /// Whole-request timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Connection establishment timeout
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    /// Scheme-specific options, passed through
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl StorageOptions {
    /// Options for anonymous access to public buckets.
    pub fn anonymous() -> Self {
        Self {
            anon: true,
            ..Default::default()
        }
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }
}
