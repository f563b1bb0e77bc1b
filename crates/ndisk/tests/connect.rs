use ndisk::domain::config::LedgerConfig;
use ndisk::ledger::UploadRequest;
use ndisk::{NdiskError, connect, load_config};
use std::fs;
use tempfile::tempdir;

#[tokio::test]
async fn config_file_drives_the_ledger() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("blobs");
    let file = temp.path().join("ndisk.toml");
    fs::write(
        &file,
        format!(
            r#"
[storage]
root = "{}"
compression = true

[database]
path = "{}"
lock_timeout_ms = 250
max_connections = 4

[upload]
multipart_threshold = 32
part_size = 8
part_concurrency = 2
"#,
            root.display().to_string().replace('\\', "/"),
            temp.path().join("ledger.db").display().to_string().replace('\\', "/")
        ),
    )
    .unwrap();

    let config = load_config(Some(file.as_path())).unwrap();
    assert_eq!(config.upload.part_size, 8);
    assert_eq!(config.database.lock_timeout_ms, 250);
    assert_eq!(config.database.max_connections, 4);
    assert!(config.logging.console);

    let ledger = connect(&config).await.unwrap();
    ledger.open_account("u-1", "u1@example.com", 1024).await.unwrap();
    let data: Vec<u8> = (0..100u8).collect();
    let receipt = ledger.upload(UploadRequest::new("u-1", "data.bin"), &mut data.as_slice()).await.unwrap();

    let blob = ledger.blob(&receipt.blob_uuid).await.unwrap();
    assert_eq!(ledger.store().read(&blob.storage_key).await.unwrap(), data);
    assert!(root.is_dir());
    assert!(temp.path().join("ledger.db").is_file());
    assert!(ledger.audit_links().await.unwrap().is_consistent());
}

fn config_in(temp: &tempfile::TempDir) -> LedgerConfig {
    let mut config = LedgerConfig::default();
    config.storage.root = temp.path().join("blobs");
    config.database.path = temp.path().join("db").join("ledger.db");
    config
}

#[tokio::test]
async fn reconnecting_finds_the_committed_ledger() {
    let temp = tempdir().unwrap();
    let config = config_in(&temp);

    let ledger = connect(&config).await.unwrap();
    ledger.open_account("u-1", "u1@example.com", 1024).await.unwrap();
    let first = ledger.upload(UploadRequest::new("u-1", "hello.txt"), &mut &b"hello"[..]).await.unwrap();
    drop(ledger);

    let ledger = connect(&config).await.unwrap();
    assert_eq!(ledger.usage("u-1").await.unwrap().now, 5);
    assert_eq!(ledger.user_by_email("u1@example.com").await.unwrap().id, "u-1");
    assert_eq!(ledger.entry("u-1", &first.entry.uuid).await.unwrap(), first.entry);
    let blob = ledger.blob(&first.blob_uuid).await.unwrap();
    assert_eq!(ledger.store().read(&blob.storage_key).await.unwrap(), b"hello");

    // The pooled content is still known, so the same bytes are not transferred again.
    let again = ledger.upload(UploadRequest::new("u-1", "again.txt"), &mut &b"hello"[..]).await.unwrap();
    assert!(again.deduplicated);
    assert_eq!(again.blob_uuid, first.blob_uuid);
    assert_eq!(ledger.blob(&first.blob_uuid).await.unwrap().link_count, 2);
    assert_eq!(ledger.children("u-1", None).await.unwrap().len(), 2);

    let err = ledger.open_account("u-1", "other@example.com", 1024).await.unwrap_err();
    assert!(matches!(err, ndisk::ledger::LedgerError::Conflict { .. }), "{err}");
}

#[test]
fn missing_config_file_is_reported() {
    let temp = tempdir().unwrap();
    let err = load_config(Some(temp.path().join("absent.toml").as_path())).unwrap_err();
    assert!(matches!(err, NdiskError::Config { .. }), "{err}");
}

#[tokio::test]
async fn out_of_range_settings_are_rejected() {
    let temp = tempdir().unwrap();
    let mut config = config_in(&temp);

    config.upload.part_concurrency = 0;
    let err = connect(&config).await.unwrap_err();
    assert!(matches!(err, NdiskError::Ledger { .. }), "{err}");

    config.upload.part_concurrency = 1;
    config.database.lock_timeout_ms = 0;
    let err = connect(&config).await.unwrap_err();
    assert!(matches!(err, NdiskError::Database { .. }), "{err}");
    assert!(err.is_opaque());

    config.database.lock_timeout_ms = 250;
    config.database.max_connections = 1;
    let err = connect(&config).await.unwrap_err();
    assert!(matches!(err, NdiskError::Database { .. }), "{err}");
}
