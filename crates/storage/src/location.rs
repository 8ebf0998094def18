//! URI scheme dispatch.

use std::path::{Path, PathBuf};

use hypothetic_common::{HypotheticError, HypotheticResult};

/// Where an object lives, decided by its URI scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectLocation {
    /// `s3://bucket/key`
    S3 { bucket: String, key: String },
    /// `http://...` or `https://...`
    Http(String),
    /// Anything else: a local filesystem path
    Local(PathBuf),
}

impl ObjectLocation {
    pub fn parse(uri: &str) -> HypotheticResult<Self> {
        if let Some(rest) = uri.strip_prefix("s3://") {
            let (bucket, key) = rest.split_once('/').ok_or_else(|| {
                HypotheticError::configuration(format!("S3 URI has no object key: {}", uri))
            })?;
            if bucket.is_empty() || key.is_empty() {
                return Err(HypotheticError::configuration(format!(
                    "S3 URI must look like s3://bucket/key: {}",
                    uri
                )));
            }
            return Ok(ObjectLocation::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        if uri.starts_with("http://") || uri.starts_with("https://") {
            return Ok(ObjectLocation::Http(uri.to_string()));
        }

        Ok(ObjectLocation::Local(PathBuf::from(uri)))
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            ObjectLocation::S3 { .. } => "s3",
            ObjectLocation::Http(_) => "http",
            ObjectLocation::Local(_) => "file",
        }
    }

    /// File extension of the object, if its name has one.
    pub fn extension(&self) -> Option<String> {
        let name = match self {
            ObjectLocation::S3 { key, .. } => key.as_str(),
            ObjectLocation::Http(url) => url.split(['?', '#']).next().unwrap_or(url),
            ObjectLocation::Local(path) => path.to_str().unwrap_or_default(),
        };
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_string())
    }
}
