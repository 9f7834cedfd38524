use std::sync::Arc;

use async_zip::tokio::write::ZipFileWriter;
use async_zip::{Compression, ZipEntryBuilder};
use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::Response;
use common::storage::{Bucket, ObjectStore, sanitize_filename};
use tokio::io::AsyncWrite;
use tokio_util::compat::FuturesAsyncWriteCompatExt;
use tokio_util::io::ReaderStream;

use crate::error::AppError;
use crate::utils::filename::content_disposition_value;

/// One file to place into an archive under `path`.
pub struct ArchiveEntry {
    /// Entry path inside the archive (folder/filename for bulk exports).
    pub path: String,
    pub bucket: Bucket,
    pub key: String,
}

/// Download filename for a single participant's archive.
pub fn single_archive_name(last_name: &str, first_name: &str, activity_title: &str) -> String {
    format!(
        "{}-{}.zip",
        participant_folder(last_name, first_name),
        sanitize_filename(activity_title)
    )
}

/// Download filename for a bulk archive.
pub fn bulk_archive_name(activity_title: &str) -> String {
    format!("{}-All_Submissions.zip", sanitize_filename(activity_title))
}

/// Folder name grouping one participant's files in a bulk archive.
pub fn participant_folder(last_name: &str, first_name: &str) -> String {
    format!(
        "{}_{}",
        sanitize_filename(last_name),
        sanitize_filename(first_name)
    )
}

/// Build a response streaming a zip of the given entries.
///
/// The encoder writes into one half of a duplex pipe while the response body
/// reads from the other, so bytes reach the caller as they are produced and
/// neither a file nor the archive is ever held in memory whole. Client
/// backpressure throttles the pipe; a disconnect simply ends the writer task.
pub fn zip_response(
    filename: String,
    entries: Vec<ArchiveEntry>,
    store: Arc<dyn ObjectStore>,
) -> Result<Response, AppError> {
    let (writer, reader) = tokio::io::duplex(64 * 1024);

    tokio::spawn(async move {
        if let Err(e) = write_archive(writer, entries, store.as_ref()).await {
            // Encoder or pipe failure aborts the stream; the client sees a
            // truncated body.
            tracing::error!("Archive stream aborted: {e}");
        }
    });

    let body = Body::from_stream(ReaderStream::new(reader));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_value(&filename),
        )
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

/// Encode the entries into `writer` as a deflate-compressed zip.
///
/// Each blob is copied chunk-by-chunk from the store into the encoder. A
/// file that cannot be fetched is logged and skipped — a partial archive
/// beats no archive — while encoder errors are fatal.
pub async fn write_archive<W: AsyncWrite + Unpin>(
    writer: W,
    entries: Vec<ArchiveEntry>,
    store: &dyn ObjectStore,
) -> anyhow::Result<()> {
    let mut zip = ZipFileWriter::with_tokio(writer);

    for entry in entries {
        let reader = match store.get_stream(entry.bucket, &entry.key).await {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!(key = %entry.key, path = %entry.path,
                    "Skipping unreadable file in archive: {e}");
                continue;
            }
        };

        let builder = ZipEntryBuilder::new(entry.path.into(), Compression::Deflate);
        let entry_writer = zip.write_entry_stream(builder).await?;
        let mut entry_writer = entry_writer.compat_write();

        let mut reader = reader;
        tokio::io::copy(&mut reader, &mut entry_writer).await?;
        entry_writer.into_inner().close().await?;
    }

    zip.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_archive_name_format() {
        assert_eq!(
            single_archive_name("Dupont", "Marie", "TP2 Rendu"),
            "Dupont_Marie-TP2_Rendu.zip"
        );
    }

    #[test]
    fn bulk_archive_name_format() {
        assert_eq!(bulk_archive_name("TP2 Rendu"), "TP2_Rendu-All_Submissions.zip");
    }

    #[test]
    fn participant_folder_sanitizes_names() {
        assert_eq!(participant_folder("Le Goff", "Anne"), "Le_Goff_Anne");
    }
}
