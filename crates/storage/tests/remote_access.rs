//! Integration tests for the remote access adapter.
//!
//! HTTP and S3 paths are exercised against a local axum server; the S3
//! tests point the SDK at it with a custom endpoint and path-style addressing.

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use hypothetic_common::HypotheticError;
use storage::{ObjectFetcher, RemoteAccess, StorageOptions};

const NO_SUCH_KEY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message><Key>missing-key</Key><RequestId>1</RequestId></Error>"#;

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/files/present.grib2", get(|| async { "GRIB-PAYLOAD" }))
        .route(
            "/files/broken.grib2",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route("/bucket/present-key", get(|| async { "S3-PAYLOAD" }))
        .fallback(|| async {
            (
                StatusCode::NOT_FOUND,
                [("content-type", "application/xml")],
                NO_SUCH_KEY,
            )
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

fn s3_options(endpoint: &str) -> StorageOptions {
    StorageOptions {
        anon: true,
        endpoint_url: Some(endpoint.to_string()),
        force_path_style: true,
        timeout_secs: Some(10),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_local_file_is_copied_to_temporary_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.nc");
    std::fs::write(&source, b"local-bytes").unwrap();

    let remote = RemoteAccess::new().unwrap();
    let object = remote
        .open_as_local(source.to_str().unwrap(), &StorageOptions::default())
        .await
        .unwrap();

    assert_ne!(object.path(), source.as_path());
    assert_eq!(std::fs::read(object.path()).unwrap(), b"local-bytes");
    assert_eq!(object.path().extension().unwrap(), "nc");

    let temp = object.path().to_path_buf();
    drop(object);
    assert!(!temp.exists());
    assert!(source.exists());
}

#[tokio::test]
async fn test_missing_local_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.grib2");

    let err = RemoteAccess::new()
        .unwrap()
        .open_as_local(missing.to_str().unwrap(), &StorageOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, HypotheticError::NotFound(_)), "{:?}", err);
}

#[tokio::test]
async fn test_temp_dir_override() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let source = dir.path().join("a.grib2");
    std::fs::write(&source, b"x").unwrap();

    let remote = RemoteAccess::new().unwrap().with_temp_dir(scratch.path());
    let object = remote
        .open_as_local(source.to_str().unwrap(), &StorageOptions::default())
        .await
        .unwrap();

    assert!(object.path().starts_with(scratch.path()));
}

#[tokio::test]
async fn test_http_get() {
    let base = spawn_server().await;
    let remote = RemoteAccess::new().unwrap();

    let object = remote
        .open_as_local(&format!("{}/files/present.grib2", base), &StorageOptions::default())
        .await
        .unwrap();
    assert_eq!(std::fs::read(object.path()).unwrap(), b"GRIB-PAYLOAD");
    assert_eq!(object.len(), 12);
}

#[tokio::test]
async fn test_http_404_is_not_found() {
    let base = spawn_server().await;
    let err = RemoteAccess::new()
        .unwrap()
        .open_as_local(&format!("{}/files/absent.grib2", base), &StorageOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, HypotheticError::NotFound(_)), "{:?}", err);
}

#[tokio::test]
async fn test_http_server_error_is_io_failure() {
    let base = spawn_server().await;
    let err = RemoteAccess::new()
        .unwrap()
        .open_as_local(&format!("{}/files/broken.grib2", base), &StorageOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, HypotheticError::IoFailure(_)), "{:?}", err);
}

#[tokio::test]
async fn test_http_connection_refused_is_io_failure() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let options = StorageOptions {
        connect_timeout_secs: Some(2),
        ..Default::default()
    };
    let err = RemoteAccess::new()
        .unwrap()
        .open_as_local(&format!("http://{}/a.grib2", addr), &options)
        .await
        .unwrap_err();

    assert!(matches!(err, HypotheticError::IoFailure(_)), "{:?}", err);
}

#[tokio::test]
async fn test_s3_missing_key_is_not_found() {
    let endpoint = spawn_server().await;
    let err = RemoteAccess::new()
        .unwrap()
        .open_as_local("s3://bucket/missing-key", &s3_options(&endpoint))
        .await
        .unwrap_err();

    assert!(matches!(err, HypotheticError::NotFound(_)), "{:?}", err);
}

#[tokio::test]
async fn test_s3_anonymous_get() {
    let endpoint = spawn_server().await;
    let object = RemoteAccess::new()
        .unwrap()
        .open_as_local("s3://bucket/present-key", &s3_options(&endpoint))
        .await
        .unwrap();

    assert_eq!(std::fs::read(object.path()).unwrap(), b"S3-PAYLOAD");
    assert_eq!(object.source_uri(), "s3://bucket/present-key");
}

#[tokio::test]
async fn test_malformed_s3_uri_is_configuration_error() {
    let err = RemoteAccess::new()
        .unwrap()
        .open_as_local("s3://bucket-without-key", &StorageOptions::anonymous())
        .await
        .unwrap_err();

    assert!(matches!(err, HypotheticError::Configuration(_)), "{:?}", err);
}
