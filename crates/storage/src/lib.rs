//! Remote access for hypothetic datasets.
//!
//! Provides a single interface for fetching one object by URI:
//! - Object storage (`s3://bucket/key`), signed or anonymous
//! - HTTP(S) URLs
//! - Local filesystem paths
//!
//! Every fetch lands in a temporary local file owned by the caller.

pub mod location;
pub mod options;
pub mod remote;

pub use location::ObjectLocation;
pub use options::{StorageOptions, DEFAULT_REGION};
pub use remote::{LocalObject, ObjectFetcher, RemoteAccess};
