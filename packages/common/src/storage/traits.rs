use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::error::StorageError;
use super::policy::Bucket;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Bucketed object storage.
///
/// Keys are scoped to a [`Bucket`] and generated by the caller via
/// [`super::generate_key`], so a put can never overwrite an existing object.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store data from an async reader under the given key.
    ///
    /// `size` is the spooled byte count, already checked against the bucket
    /// policy by the caller; backends may use it for content-length hints.
    async fn put(
        &self,
        bucket: Bucket,
        key: &str,
        reader: BoxReader,
        size: u64,
    ) -> Result<(), StorageError>;

    /// Retrieve an object as a streaming async reader.
    async fn get_stream(&self, bucket: Bucket, key: &str) -> Result<BoxReader, StorageError>;

    /// Delete an object.
    ///
    /// Idempotent: returns `Ok(true)` if the object was deleted, `Ok(false)`
    /// if it did not exist. Callers log the `false` case.
    async fn delete(&self, bucket: Bucket, key: &str) -> Result<bool, StorageError>;

    /// Produce a time-boxed retrieval URL. Transfers no bytes.
    async fn presign_get(
        &self,
        bucket: Bucket,
        key: &str,
        ttl_secs: u32,
    ) -> Result<String, StorageError>;

    /// Produce a permanent retrieval URL for objects in public buckets.
    fn public_url(&self, bucket: Bucket, key: &str) -> String;
}
