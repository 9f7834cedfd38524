use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use s3::bucket::Bucket as S3Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use tokio::time::timeout;
use tokio_util::io::StreamReader;

use super::error::StorageError;
use super::policy::Bucket;
use super::traits::{BoxReader, ObjectStore};

/// Connection settings for the S3-compatible backing store.
#[derive(Clone, Debug)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    /// Bound on every store round-trip, so an unreachable store surfaces
    /// `Unavailable` instead of hanging the request.
    pub request_timeout_secs: u64,
}

/// S3-backed object store.
///
/// Logical buckets map to key prefixes inside one physical bucket.
pub struct S3ObjectStore {
    bucket: Box<S3Bucket>,
    public_base: String,
    request_timeout: Duration,
}

impl S3ObjectStore {
    pub fn new(settings: &S3Settings) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: settings.region.clone(),
            endpoint: settings.endpoint.clone(),
        };
        let credentials = Credentials::new(
            Some(settings.access_key.as_str()),
            Some(settings.secret_key.as_str()),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        let bucket = S3Bucket::new(&settings.bucket, region, credentials)
            .map_err(|e| StorageError::Unavailable(e.to_string()))?
            .with_path_style();

        let public_base = format!(
            "{}/{}",
            settings.endpoint.trim_end_matches('/'),
            settings.bucket
        );

        Ok(Self {
            bucket,
            public_base,
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
        })
    }

    fn object_path(bucket: Bucket, key: &str) -> String {
        format!("{}/{}", bucket.prefix(), key)
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, S3Error>>,
    {
        match timeout(self.request_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(map_s3_error(e)),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.request_timeout.as_secs(),
                    "Object store request timed out"
                );
                Err(StorageError::Unavailable("request timed out".into()))
            }
        }
    }
}

fn map_s3_error(err: S3Error) -> StorageError {
    match err {
        S3Error::HttpFailWithBody(404, body) => StorageError::NotFound(body),
        other => StorageError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        bucket: Bucket,
        key: &str,
        reader: BoxReader,
        _size: u64,
    ) -> Result<(), StorageError> {
        let path = Self::object_path(bucket, key);
        let mut reader = reader;
        let _ = self
            .bounded(self.bucket.put_object_stream(&mut reader, &path))
            .await?;
        Ok(())
    }

    async fn get_stream(&self, bucket: Bucket, key: &str) -> Result<BoxReader, StorageError> {
        let path = Self::object_path(bucket, key);
        let response = self
            .bounded(self.bucket.get_object_stream(&path))
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => StorageError::NotFound(path.clone()),
                other => other,
            })?;

        let stream = response
            .bytes
            .map(|chunk| chunk.map_err(std::io::Error::other));
        Ok(Box::new(StreamReader::new(stream)))
    }

    async fn delete(&self, bucket: Bucket, key: &str) -> Result<bool, StorageError> {
        let path = Self::object_path(bucket, key);
        match self.bounded(self.bucket.delete_object(&path)).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn presign_get(
        &self,
        bucket: Bucket,
        key: &str,
        ttl_secs: u32,
    ) -> Result<String, StorageError> {
        let path = Self::object_path(bucket, key);
        self.bounded(self.bucket.presign_get(&path, ttl_secs, None))
            .await
    }

    fn public_url(&self, bucket: Bucket, key: &str) -> String {
        format!("{}/{}", self.public_base, Self::object_path(bucket, key))
    }
}
