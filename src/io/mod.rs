//! Remote object storage.
//!
//! [`ObjectStore`] is the narrow interface the rest of the crate uses to
//! reach bulk storage; [`S3ObjectStore`] implements it for S3 and
//! S3-compatible services.

mod object_store;
mod s3_store;

pub use object_store::{ObjectStore, RemoteKey};
pub use s3_store::{create_s3_client, S3ObjectStore};
