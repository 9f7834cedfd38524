use std::collections::HashMap;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

use super::error::StorageError;
use super::policy::Bucket;
use super::traits::{BoxReader, ObjectStore};

/// In-memory object store for tests and local development.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(Bucket, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an object exists. Test helper.
    pub async fn contains(&self, bucket: Bucket, key: &str) -> bool {
        self.objects
            .read()
            .await
            .contains_key(&(bucket, key.to_string()))
    }

    /// Total number of stored objects across all buckets. Test helper.
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        bucket: Bucket,
        key: &str,
        mut reader: BoxReader,
        _size: u64,
    ) -> Result<(), StorageError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        self.objects
            .write()
            .await
            .insert((bucket, key.to_string()), data);
        Ok(())
    }

    async fn get_stream(&self, bucket: Bucket, key: &str) -> Result<BoxReader, StorageError> {
        let objects = self.objects.read().await;
        let data = objects
            .get(&(bucket, key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn delete(&self, bucket: Bucket, key: &str) -> Result<bool, StorageError> {
        Ok(self
            .objects
            .write()
            .await
            .remove(&(bucket, key.to_string()))
            .is_some())
    }

    async fn presign_get(
        &self,
        bucket: Bucket,
        key: &str,
        ttl_secs: u32,
    ) -> Result<String, StorageError> {
        if !self.contains(bucket, key).await {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(format!(
            "memory://{}/{key}?expires={ttl_secs}",
            bucket.prefix()
        ))
    }

    fn public_url(&self, bucket: Bucket, key: &str) -> String {
        format!("memory://{}/{key}", bucket.prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(data: &[u8]) -> BoxReader {
        Box::new(std::io::Cursor::new(data.to_vec()))
    }

    async fn read_all(mut r: BoxReader) -> Vec<u8> {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn put_get_round_trip() {
        let store = MemoryObjectStore::new();
        store
            .put(Bucket::Deposits, "k1", reader(b"hello"), 5)
            .await
            .unwrap();

        let got = store.get_stream(Bucket::Deposits, "k1").await.unwrap();
        assert_eq!(read_all(got).await, b"hello");
    }

    #[tokio::test]
    async fn buckets_are_isolated() {
        let store = MemoryObjectStore::new();
        store
            .put(Bucket::Deposits, "k", reader(b"a"), 1)
            .await
            .unwrap();

        assert!(store.get_stream(Bucket::ActivityFiles, "k").await.is_err());
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = MemoryObjectStore::new();
        assert!(matches!(
            store.get_stream(Bucket::Deposits, "nope").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryObjectStore::new();
        store
            .put(Bucket::Deposits, "k", reader(b"x"), 1)
            .await
            .unwrap();

        assert!(store.delete(Bucket::Deposits, "k").await.unwrap());
        assert!(!store.delete(Bucket::Deposits, "k").await.unwrap());
    }

    #[tokio::test]
    async fn presign_requires_existing_object() {
        let store = MemoryObjectStore::new();
        assert!(store.presign_get(Bucket::Deposits, "k", 60).await.is_err());

        store
            .put(Bucket::Deposits, "k", reader(b"x"), 1)
            .await
            .unwrap();
        let url = store.presign_get(Bucket::Deposits, "k", 60).await.unwrap();
        assert!(url.contains("deposits/k"));
    }

    #[tokio::test]
    async fn public_url_is_stable() {
        let store = MemoryObjectStore::new();
        assert_eq!(
            store.public_url(Bucket::CourseImages, "banner.png"),
            "memory://course-images/banner.png"
        );
    }
}
