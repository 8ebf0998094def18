//! Fetchers that record what they were asked for.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hypothetic_common::HypotheticResult;
use storage::{LocalObject, ObjectFetcher, RemoteAccess, StorageOptions};

/// Wraps another fetcher and records every requested URI in order.
pub struct CountingFetcher {
    inner: Arc<dyn ObjectFetcher>,
    requests: Mutex<Vec<String>>,
}

impl CountingFetcher {
    pub fn new(inner: Arc<dyn ObjectFetcher>) -> Self {
        Self {
            inner,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Counting wrapper around a default [`RemoteAccess`].
    pub fn remote() -> Self {
        Self::new(Arc::new(RemoteAccess::new().expect("create RemoteAccess")))
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    pub fn reset(&self) {
        self.requests.lock().expect("requests lock").clear();
    }
}

#[async_trait]
impl ObjectFetcher for CountingFetcher {
    async fn open_as_local(&self, uri: &str, options: &StorageOptions) -> HypotheticResult<LocalObject> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(uri.to_string());
        self.inner.open_as_local(uri, options).await
    }
}
