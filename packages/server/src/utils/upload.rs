use std::path::PathBuf;

use common::storage::{Bucket, BoxReader, ObjectStore, generate_key};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::AppError;
use crate::utils::filename::validate_upload_filename;

/// A multipart upload spooled to a temp file, not yet in the object store.
///
/// Spooling lets every validation run before the first byte reaches the
/// store: a rejected request leaves nothing to compensate.
pub struct SpooledFile {
    path: PathBuf,
    pub filename: String,
    pub content_type: Option<String>,
    pub size: u64,
}

impl SpooledFile {
    /// Stream a multipart field to a temp file, enforcing `max_size`.
    pub async fn from_field(
        mut field: axum::extract::multipart::Field<'_>,
        max_size: u64,
    ) -> Result<Self, AppError> {
        let filename = field
            .file_name()
            .ok_or_else(|| AppError::Validation("File field must have a filename".into()))?;
        let filename = validate_upload_filename(filename)
            .map_err(|e| AppError::Validation(e.message().into()))?
            .to_string();
        let content_type = field.content_type().map(|ct| ct.to_string());

        let path = std::env::temp_dir().join(format!("tilleul-upload-{}", Uuid::new_v4()));

        let result = async {
            let mut temp_file = tokio::fs::File::create(&path)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to create temp file: {e}")))?;

            let mut size: u64 = 0;
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| AppError::Validation(format!("Upload read error: {e}")))?
            {
                size += chunk.len() as u64;
                if size > max_size {
                    return Err(AppError::PolicyViolation(format!(
                        "File exceeds maximum size of {max_size} bytes"
                    )));
                }
                temp_file
                    .write_all(&chunk)
                    .await
                    .map_err(|e| AppError::Internal(format!("Temp file write failed: {e}")))?;
            }

            temp_file
                .flush()
                .await
                .map_err(|e| AppError::Internal(format!("Temp file flush failed: {e}")))?;

            Ok(size)
        }
        .await;

        match result {
            Ok(size) => Ok(Self {
                path,
                filename,
                content_type,
                size,
            }),
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                Err(e)
            }
        }
    }

    /// Build a spooled file from raw bytes. Test helper.
    #[cfg(test)]
    pub async fn from_bytes(filename: &str, data: &[u8]) -> Self {
        let path = std::env::temp_dir().join(format!("tilleul-upload-{}", Uuid::new_v4()));
        tokio::fs::write(&path, data).await.unwrap();
        Self {
            path,
            filename: filename.to_string(),
            content_type: mime_guess::from_path(filename)
                .first()
                .map(|m| m.to_string()),
            size: data.len() as u64,
        }
    }

    async fn open(&self) -> Result<BoxReader, AppError> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to reopen temp file: {e}")))?;
        Ok(Box::new(file))
    }

    /// Remove the temp file. Best effort.
    pub async fn cleanup(&self) {
        let _ = tokio::fs::remove_file(&self.path).await;
    }
}

/// Upload one spooled file under a freshly generated key.
pub async fn upload_spooled(
    store: &dyn ObjectStore,
    bucket: Bucket,
    file: &SpooledFile,
) -> Result<String, AppError> {
    let key = generate_key(&file.filename);
    let reader = file.open().await?;
    store.put(bucket, &key, reader, file.size).await?;
    Ok(key)
}

/// Compensating deletion of already-uploaded objects after a later step
/// failed. Failures here are logged, never surfaced: the user-visible
/// outcome is already decided.
pub async fn rollback_uploads(store: &dyn ObjectStore, bucket: Bucket, keys: &[String]) {
    for key in keys {
        match store.delete(bucket, key).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(key = %key, "Rollback: object already absent");
            }
            Err(e) => {
                tracing::warn!(key = %key, "Rollback: failed to delete object: {e}");
            }
        }
    }
}
