use ndisk_storage::*;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinSet;

const KEY: &str = "0f9e8d7c6b5a49382716a5b4c3d2e1f0";

async fn open(temp: &TempDir, compression: Compression) -> FsBlobStore {
    FsBlobStore::builder()
        .root(temp.path().join("blobs"))
        .compression(compression)
        .connect()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_put_read_roundtrip_uncompressed() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, Compression::None).await;

    store.put(KEY, b"hello world").await.unwrap();
    assert!(store.exists(KEY).await.unwrap());
    assert_eq!(store.read(KEY).await.unwrap(), b"hello world");

    let path = store.resolve(KEY).unwrap();
    assert!(path.ends_with(format!("objects/0f/9e/{KEY}")));
}

#[tokio::test]
async fn test_put_read_roundtrip_compressed() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, Compression::Lz4).await;

    let payload = vec![7u8; 16 * 1024];
    store.put(KEY, &payload).await.unwrap();
    assert_eq!(store.read(KEY).await.unwrap(), payload);

    let on_disk = std::fs::metadata(store.resolve(KEY).unwrap()).unwrap().len();
    assert!(on_disk < payload.len() as u64, "repetitive payload should shrink");
}

#[tokio::test]
async fn test_put_stream_counts_bytes() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, Compression::None).await;

    let mut reader: &[u8] = b"streamed content";
    let written = store.put_stream(KEY, &mut reader).await.unwrap();
    assert_eq!(written, 16);
    assert_eq!(store.read(KEY).await.unwrap(), b"streamed content");
}

#[tokio::test]
async fn test_copy_and_delete() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, Compression::Lz4).await;

    store.put("source01", b"payload").await.unwrap();
    store.copy("source01", "target01").await.unwrap();
    assert_eq!(store.read("target01").await.unwrap(), b"payload");

    store.delete("source01").await.unwrap();
    assert!(!store.exists("source01").await.unwrap());
    assert!(store.exists("target01").await.unwrap());

    let err = store.delete("source01").await.unwrap_err();
    assert!(matches!(err, StorageError::ObjectNotFound { .. }));
    let err = store.copy("source01", "other001").await.unwrap_err();
    assert!(matches!(err, StorageError::ObjectNotFound { .. }));
}

#[tokio::test]
async fn test_read_missing_returns_object_not_found() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, Compression::None).await;

    match store.read("missing1").await.expect_err("expected error") {
        StorageError::ObjectNotFound { key, .. } => assert_eq!(key, "missing1"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_hostile_keys_blocked() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, Compression::None).await;

    assert!(store.put("../escape", b"x").await.is_err());
    assert!(store.put("/etc/passwd", b"x").await.is_err());
    assert!(store.read("a/../../b").await.is_err());
    assert!(store.init_multipart("..", &MultipartOptions::default()).await.is_err());
}

#[tokio::test]
async fn test_multipart_out_of_order_matches_in_order() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, Compression::None).await;
    let chunks: [&[u8]; 3] = [b"alpha-", b"beta-", b"gamma"];

    let ordered = store.init_multipart("ordered1", &MultipartOptions::default()).await.unwrap();
    let mut parts = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let position = u32::try_from(i + 1).unwrap();
        parts.push(store.upload_part(position, chunk.to_vec(), "ordered1", &ordered).await.unwrap());
    }
    store.complete_multipart("ordered1", &ordered, parts).await.unwrap();

    let shuffled = store.init_multipart("shuffle1", &MultipartOptions::default()).await.unwrap();
    let p3 = store.upload_part(3, chunks[2].to_vec(), "shuffle1", &shuffled).await.unwrap();
    let p1 = store.upload_part(1, chunks[0].to_vec(), "shuffle1", &shuffled).await.unwrap();
    let p2 = store.upload_part(2, chunks[1].to_vec(), "shuffle1", &shuffled).await.unwrap();
    store.complete_multipart("shuffle1", &shuffled, vec![p3, p1, p2]).await.unwrap();

    let expected = b"alpha-beta-gamma".to_vec();
    assert_eq!(store.read("ordered1").await.unwrap(), expected);
    assert_eq!(store.read("shuffle1").await.unwrap(), expected);
}

#[tokio::test]
async fn test_missing_position_fails_and_upload_stays_open() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, Compression::Lz4).await;

    let upload = store.init_multipart(KEY, &MultipartOptions::default()).await.unwrap();
    let p1 = store.upload_part(1, b"one".to_vec(), KEY, &upload).await.unwrap();
    let p3 = store.upload_part(3, b"three".to_vec(), KEY, &upload).await.unwrap();

    let err = store.complete_multipart(KEY, &upload, vec![p1.clone(), p3.clone()]).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidPart { .. }));
    assert!(!store.exists(KEY).await.unwrap());

    let p2 = store.upload_part(2, b"two".to_vec(), KEY, &upload).await.unwrap();
    store.complete_multipart(KEY, &upload, vec![p1, p2, p3]).await.unwrap();
    assert_eq!(store.read(KEY).await.unwrap(), b"onetwothree");
}

#[tokio::test]
async fn test_expected_part_count_is_enforced() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, Compression::None).await;

    let options = MultipartOptions { content_type: None, expected_parts: Some(2) };
    let upload = store.init_multipart(KEY, &options).await.unwrap();
    let p1 = store.upload_part(1, b"only".to_vec(), KEY, &upload).await.unwrap();

    let err = store.complete_multipart(KEY, &upload, vec![p1]).await.unwrap_err();
    assert!(err.to_string().contains("missing position 2"));
}

#[tokio::test]
async fn test_tag_mismatch_is_rejected() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, Compression::None).await;

    let upload = store.init_multipart(KEY, &MultipartOptions::default()).await.unwrap();
    let mut part = store.upload_part(1, b"data".to_vec(), KEY, &upload).await.unwrap();
    part.tag = "00".repeat(32);

    let err = store.complete_multipart(KEY, &upload, vec![part]).await.unwrap_err();
    assert!(err.to_string().contains("tag mismatch"));
}

#[tokio::test]
async fn test_abort_discards_upload() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, Compression::None).await;

    let upload = store.init_multipart(KEY, &MultipartOptions::default()).await.unwrap();
    let p1 = store.upload_part(1, b"doomed".to_vec(), KEY, &upload).await.unwrap();
    store.abort_multipart(KEY, &upload).await.unwrap();

    let err = store.complete_multipart(KEY, &upload, vec![p1]).await.unwrap_err();
    assert!(matches!(err, StorageError::UploadNotFound { .. }));
    let err = store.upload_part(2, b"late".to_vec(), KEY, &upload).await.unwrap_err();
    assert!(matches!(err, StorageError::UploadNotFound { .. }));
    let err = store.abort_multipart(KEY, &upload).await.unwrap_err();
    assert!(matches!(err, StorageError::UploadNotFound { .. }));
    assert!(!store.exists(KEY).await.unwrap());
}

#[tokio::test]
async fn test_upload_is_bound_to_its_key() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, Compression::None).await;

    let upload = store.init_multipart(KEY, &MultipartOptions::default()).await.unwrap();
    let err = store.upload_part(1, b"x".to_vec(), "otherkey", &upload).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidKey { .. }));

    let err = store.upload_part(0, b"x".to_vec(), KEY, &upload).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidPart { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_parts_through_trait_object() {
    let temp = TempDir::new().unwrap();
    let store: Arc<dyn BlobStore> = Arc::new(open(&temp, Compression::Lz4).await);
    let upload = store.init_multipart(KEY, &MultipartOptions::default()).await.unwrap();

    let mut tasks = JoinSet::new();
    for position in 1..=16u32 {
        let store = Arc::clone(&store);
        let upload = upload.clone();
        tasks.spawn(async move {
            let data = vec![u8::try_from(position).unwrap(); 1024];
            store.upload_part(position, data, KEY, &upload).await
        });
    }

    let mut parts = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        parts.push(joined.unwrap().unwrap());
    }
    store.complete_multipart(KEY, &upload, parts).await.unwrap();

    let object = store.read(KEY).await.unwrap();
    assert_eq!(object.len(), 16 * 1024);
    for (index, chunk) in object.chunks(1024).enumerate() {
        assert!(chunk.iter().all(|b| usize::from(*b) == index + 1));
    }
}

#[tokio::test]
async fn test_purge_keeps_live_uploads() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, Compression::None).await;

    let upload = store.init_multipart(KEY, &MultipartOptions::default()).await.unwrap();
    let p1 = store.upload_part(1, b"kept".to_vec(), KEY, &upload).await.unwrap();

    let report = store.purge().await;
    assert_eq!(report.uploads_removed, 0);
    assert_eq!(report.tmp_removed, 0);

    store.complete_multipart(KEY, &upload, vec![p1]).await.unwrap();
    assert_eq!(store.read(KEY).await.unwrap(), b"kept");
}
