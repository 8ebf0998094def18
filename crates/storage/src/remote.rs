//! Remote access adapter.
//!
//! Fetches an object named by URI and materializes its full body into a
//! fresh temporary file, so readers that only understand local paths can
//! open it. The temporary file lives exactly as long as the returned
//! [`LocalObject`].

use std::collections::HashMap;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use hypothetic_common::{HypotheticError, HypotheticResult};

use crate::location::ObjectLocation;
use crate::options::StorageOptions;

/// Anything that can turn a URI into a local temporary file.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    /// Fetch `uri` into a local temporary file.
    ///
    /// Fails with `NotFound` when the object does not exist and `IoFailure`
    /// for any other transport error.
    async fn open_as_local(&self, uri: &str, options: &StorageOptions) -> HypotheticResult<LocalObject>;
}

/// A fetched object held in a temporary local file.
///
/// Dropping the value deletes the file.
#[derive(Debug)]
pub struct LocalObject {
    source_uri: String,
    file: NamedTempFile,
    len: u64,
}

impl LocalObject {
    /// Write `body` into a new temporary file positioned at its start.
    ///
    /// The file is written on the blocking thread pool.
    pub async fn materialize(
        source_uri: &str,
        body: Bytes,
        extension: Option<&str>,
        temp_dir: Option<&Path>,
    ) -> HypotheticResult<Self> {
        let source_uri = source_uri.to_string();
        let suffix = extension.map(|e| format!(".{}", e)).unwrap_or_default();
        let temp_dir = temp_dir.map(Path::to_path_buf);

        tokio::task::spawn_blocking(move || {
            Self::write_temp(source_uri, &body, &suffix, temp_dir.as_deref())
        })
        .await
        .map_err(|e| HypotheticError::io_failure(format!("temporary file writer failed: {}", e)))?
    }

    fn write_temp(
        source_uri: String,
        body: &[u8],
        suffix: &str,
        temp_dir: Option<&Path>,
    ) -> HypotheticResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("hypothetic-").suffix(suffix);
        let mut file = match temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        file.write_all(body)?;
        file.flush()?;
        file.as_file_mut().seek(SeekFrom::Start(0))?;

        Ok(Self {
            source_uri,
            file,
            len: body.len() as u64,
        })
    }

    /// Path of the temporary file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// URI the object was fetched from.
    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Delete the temporary file now, reporting any error.
    pub fn release(self) -> HypotheticResult<()> {
        self.file.close()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct S3ClientKey {
    anon: bool,
    region: String,
    endpoint_url: Option<String>,
    force_path_style: bool,
    timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
}

impl From<&StorageOptions> for S3ClientKey {
    fn from(options: &StorageOptions) -> Self {
        Self {
            anon: options.anon,
            region: options.region().to_string(),
            endpoint_url: options.endpoint_url.clone(),
            force_path_style: options.force_path_style,
            timeout_secs: options.timeout_secs,
            connect_timeout_secs: options.connect_timeout_secs,
        }
    }
}

/// Fetches objects over S3, HTTP(S) or from the local filesystem.
pub struct RemoteAccess {
    http: Client,
    s3_clients: Mutex<HashMap<S3ClientKey, aws_sdk_s3::Client>>,
    temp_dir: Option<PathBuf>,
}

impl RemoteAccess {
    pub fn new() -> HypotheticResult<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| HypotheticError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            s3_clients: Mutex::new(HashMap::new()),
            temp_dir: None,
        })
    }

    /// Place temporary files in `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    async fn get_local(&self, path: &Path) -> HypotheticResult<Bytes> {
        let data = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                HypotheticError::not_found(format!("{}", path.display()))
            }
            _ => HypotheticError::io_failure(format!("{}: {}", path.display(), e)),
        })?;
        Ok(Bytes::from(data))
    }

    async fn get_http(&self, url: &str, options: &StorageOptions) -> HypotheticResult<Bytes> {
        let client = match options.connect_timeout() {
            Some(connect_timeout) => Client::builder()
                .connect_timeout(connect_timeout)
                .build()
                .map_err(|e| HypotheticError::configuration(format!("Failed to create HTTP client: {}", e)))?,
            None => self.http.clone(),
        };

        let mut request = client.get(url);
        if let Some(timeout) = options.timeout() {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HypotheticError::io_failure(format!("GET {}: {}", url, e)))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(HypotheticError::not_found(url)),
            status if status.is_success() => response
                .bytes()
                .await
                .map_err(|e| HypotheticError::io_failure(format!("GET {}: {}", url, e))),
            status => Err(HypotheticError::io_failure(format!(
                "GET {} returned {}",
                url, status
            ))),
        }
    }

    async fn get_s3(&self, bucket: &str, key: &str, options: &StorageOptions) -> HypotheticResult<Bytes> {
        let client = self.s3_client(options).await;

        let output = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_s3_error(bucket, key, e))?;

        let body = output.body.collect().await.map_err(|e| {
            HypotheticError::io_failure(format!("s3://{}/{}: {}", bucket, key, e))
        })?;

        Ok(body.into_bytes())
    }

    async fn s3_client(&self, options: &StorageOptions) -> aws_sdk_s3::Client {
        let key = S3ClientKey::from(options);
        let mut clients = self.s3_clients.lock().await;
        if let Some(client) = clients.get(&key) {
            return client.clone();
        }

        let client = build_s3_client(options).await;
        clients.insert(key, client.clone());
        client
    }
}

#[async_trait]
impl ObjectFetcher for RemoteAccess {
    #[instrument(skip(self, options), fields(uri = %uri))]
    async fn open_as_local(&self, uri: &str, options: &StorageOptions) -> HypotheticResult<LocalObject> {
        let location = ObjectLocation::parse(uri)?;

        let body = match &location {
            ObjectLocation::S3 { bucket, key } => self.get_s3(bucket, key, options).await?,
            ObjectLocation::Http(url) => self.get_http(url, options).await?,
            ObjectLocation::Local(path) => self.get_local(path).await?,
        };
        debug!(scheme = location.scheme(), size = body.len(), "Fetched object");

        let extension = location.extension();
        LocalObject::materialize(uri, body, extension.as_deref(), self.temp_dir.as_deref()).await
    }
}

async fn build_s3_client(options: &StorageOptions) -> aws_sdk_s3::Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(options.region().to_string()));

    // Unsigned requests for public buckets
    if options.anon {
        loader = loader.no_credentials();
    }
    if let Some(endpoint) = &options.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    let mut timeouts = aws_config::timeout::TimeoutConfig::builder();
    if let Some(timeout) = options.timeout() {
        timeouts = timeouts.operation_timeout(timeout);
    }
    if let Some(timeout) = options.connect_timeout() {
        timeouts = timeouts.connect_timeout(timeout);
    }
    loader = loader.timeout_config(timeouts.build());

    let sdk_config = loader.load().await;
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(options.force_path_style)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}

fn classify_s3_error(bucket: &str, key: &str, err: SdkError<GetObjectError>) -> HypotheticError {
    let status = err.raw_response().map(|r| r.status().as_u16());
    let no_such_key = err
        .as_service_error()
        .map(|e| e.is_no_such_key())
        .unwrap_or(false);

    if no_such_key || status == Some(404) {
        HypotheticError::not_found(format!("s3://{}/{}", bucket, key))
    } else {
        HypotheticError::io_failure(format!(
            "s3://{}/{}: {}",
            bucket,
            key,
            DisplayErrorContext(&err)
        ))
    }
}
