//! Downloader tests against an in-memory object store

use afs_storage::{Downloader, Manifest, PathFilter};
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use tempfile::TempDir;

const MANIFEST: &str = "\
name,size,md5
s3://afs-akkio/files_from_affinity/Data_dictionary/x.pdf,5,5d41402abc4b2a76b9719d911017c592
s3://afs-akkio/other_folder/file.csv,3,
s3://afs-akkio/files_from_affinity/Data_dictionary/missing.pdf,10,
s3://afs-akkio/files_from_affinity/Data_dictionary/nested/dict.xlsx,4,
";

async fn seeded_store() -> Arc<InMemory> {
    let store = Arc::new(InMemory::new());
    store
        .put(
            &ObjectPath::from("files_from_affinity/Data_dictionary/x.pdf"),
            PutPayload::from_static(b"hello"),
        )
        .await
        .unwrap();
    store
        .put(
            &ObjectPath::from("files_from_affinity/Data_dictionary/nested/dict.xlsx"),
            PutPayload::from_static(b"xlsx"),
        )
        .await
        .unwrap();
    store
        .put(&ObjectPath::from("other_folder/file.csv"), PutPayload::from_static(b"a,b"))
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn downloads_selected_entries_and_continues_past_failures() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store().await;

    let entries = Manifest::from_reader(MANIFEST.as_bytes())
        .unwrap()
        .select(&PathFilter::default());
    assert_eq!(entries.len(), 3);

    let downloader = Downloader::new(store, PathFilter::default(), temp.path());
    let summary = downloader.download_all(&entries).await;

    assert_eq!(summary.downloaded, 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.failures[0].0, "files_from_affinity/Data_dictionary/missing.pdf");

    let root = temp.path().join("files_from_affinity/Data_dictionary");
    assert_eq!(std::fs::read(root.join("x.pdf")).unwrap(), b"hello");
    assert_eq!(std::fs::read(root.join("nested/dict.xlsx")).unwrap(), b"xlsx");
    assert!(!root.join("missing.pdf").exists());
    assert!(!temp.path().join("other_folder").exists());
}

#[tokio::test]
async fn checksum_mismatch_counts_as_failure() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store().await;

    let manifest = "\
name,size,md5
s3://afs-akkio/files_from_affinity/Data_dictionary/x.pdf,5,5d41402abc4b2a76b9719d911017c592
s3://afs-akkio/files_from_affinity/Data_dictionary/nested/dict.xlsx,4,00000000000000000000000000000000
";
    let entries = Manifest::from_reader(manifest.as_bytes())
        .unwrap()
        .select(&PathFilter::default());

    let downloader = Downloader::new(store, PathFilter::default(), temp.path()).with_verify(true);
    let summary = downloader.download_all(&entries).await;

    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.failed(), 1);
    assert!(summary.failures[0].1.contains("Checksum mismatch"));
    assert!(!temp
        .path()
        .join("files_from_affinity/Data_dictionary/nested/dict.xlsx")
        .exists());
}

#[tokio::test]
async fn custom_prefix_selects_other_folder() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store().await;
    let filter = PathFilter::new("afs-akkio", "other_folder/");

    let entries = Manifest::from_reader(MANIFEST.as_bytes()).unwrap().select(&filter);
    assert_eq!(entries.len(), 1);

    let summary = Downloader::new(store, filter, temp.path())
        .download_all(&entries)
        .await;
    assert_eq!(summary.downloaded, 1);
    assert_eq!(
        std::fs::read_to_string(temp.path().join("other_folder/file.csv")).unwrap(),
        "a,b"
    );
}

#[tokio::test]
async fn keys_with_special_characters_are_fetched_verbatim() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(InMemory::new());
    let key = "files_from_affinity/Data_dictionary/Dict [v2] 100%.pdf";
    store
        .put(&ObjectPath::parse(key).unwrap(), PutPayload::from_static(b"v2"))
        .await
        .unwrap();

    let manifest = format!("name,size,md5\ns3://afs-akkio/{},2,\n", key);
    let entries = Manifest::from_reader(manifest.as_bytes())
        .unwrap()
        .select(&PathFilter::default());

    let summary = Downloader::new(store, PathFilter::default(), temp.path())
        .download_all(&entries)
        .await;

    assert_eq!(summary.failed(), 0, "{:?}", summary.failures);
    assert_eq!(summary.downloaded, 1);
    assert_eq!(std::fs::read(temp.path().join(key)).unwrap(), b"v2");
}
