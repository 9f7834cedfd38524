use std::io::{Cursor, Read};

use common::storage::memory::MemoryObjectStore;
use common::storage::{Bucket, ObjectStore};
use server::archive::{
    ArchiveEntry, bulk_archive_name, participant_folder, single_archive_name, write_archive,
};
use tokio::io::AsyncReadExt;

async fn put(store: &MemoryObjectStore, key: &str, data: &[u8]) {
    store
        .put(
            Bucket::Deposits,
            key,
            Box::new(Cursor::new(data.to_vec())),
            data.len() as u64,
        )
        .await
        .unwrap();
}

/// Run the exporter against one end of a duplex pipe while draining the
/// other, the way the HTTP response body does.
async fn collect_archive(entries: Vec<ArchiveEntry>, store: &MemoryObjectStore) -> Vec<u8> {
    let (writer, mut reader) = tokio::io::duplex(16 * 1024);

    let write = write_archive(writer, entries, store);
    let read = async {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        buf
    };

    let (result, buf) = tokio::join!(write, read);
    result.unwrap();
    buf
}

fn entry(path: &str, key: &str) -> ArchiveEntry {
    ArchiveEntry {
        path: path.to_string(),
        bucket: Bucket::Deposits,
        key: key.to_string(),
    }
}

#[tokio::test]
async fn single_export_contains_each_file_under_its_original_name() {
    let store = MemoryObjectStore::new();
    put(&store, "k1", b"report body").await;
    put(&store, "k2", b"appendix body").await;

    let buf = collect_archive(
        vec![entry("rapport.pdf", "k1"), entry("annexe.pdf", "k2")],
        &store,
    )
    .await;

    let mut archive = zip::ZipArchive::new(Cursor::new(buf)).unwrap();
    assert_eq!(archive.len(), 2);

    let mut content = String::new();
    archive
        .by_name("rapport.pdf")
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert_eq!(content, "report body");
}

#[tokio::test]
async fn bulk_export_nests_one_folder_per_participant() {
    let store = MemoryObjectStore::new();
    put(&store, "k-marie", b"marie's work").await;
    put(&store, "k-jean", b"jean's work").await;

    let folder_a = participant_folder("Dupont", "Marie");
    let folder_b = participant_folder("Martin", "Jean");

    let buf = collect_archive(
        vec![
            entry(&format!("{folder_a}/rapport.pdf"), "k-marie"),
            entry(&format!("{folder_b}/projet.zip"), "k-jean"),
        ],
        &store,
    )
    .await;

    let archive = zip::ZipArchive::new(Cursor::new(buf)).unwrap();
    let names: Vec<&str> = archive.file_names().collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Dupont_Marie/rapport.pdf"));
    assert!(names.contains(&"Martin_Jean/projet.zip"));
}

#[tokio::test]
async fn unreadable_file_is_skipped_not_fatal() {
    let store = MemoryObjectStore::new();
    put(&store, "k-present", b"still here").await;

    let buf = collect_archive(
        vec![
            entry("missing.pdf", "k-gone"),
            entry("present.pdf", "k-present"),
        ],
        &store,
    )
    .await;

    let mut archive = zip::ZipArchive::new(Cursor::new(buf)).unwrap();
    assert_eq!(archive.len(), 1);
    assert!(archive.by_name("present.pdf").is_ok());
}

#[tokio::test]
async fn empty_entry_list_yields_a_valid_empty_archive() {
    let store = MemoryObjectStore::new();
    let buf = collect_archive(Vec::new(), &store).await;

    let archive = zip::ZipArchive::new(Cursor::new(buf)).unwrap();
    assert_eq!(archive.len(), 0);
}

#[test]
fn download_filenames_follow_the_convention() {
    assert_eq!(
        single_archive_name("Dupont", "Marie", "TP2"),
        "Dupont_Marie-TP2.zip"
    );
    assert_eq!(bulk_archive_name("TP2"), "TP2-All_Submissions.zip");
}
