use ndisk_domain::config::{DatabaseConfig, LedgerConfig, LoggingConfig, StorageConfig, UploadConfig};
use serde_json::json;
use std::time::Duration;

#[test]
fn config_defaults_are_sane() {
    let storage = StorageConfig::default();
    assert_eq!(storage.root, std::path::PathBuf::from("data"));
    assert!(!storage.compression);

    let db = DatabaseConfig::default();
    assert_eq!(db.lock_timeout(), Duration::from_secs(5));
    assert_eq!(db.path, std::path::PathBuf::from("data/ledger.db"));
    assert_eq!(db.max_connections, 8);

    let upload = UploadConfig::default();
    assert!(upload.part_size as u64 <= upload.multipart_threshold);
    assert_eq!(upload.part_concurrency, 4);
    assert!(upload.spool_dir.is_none());

    let logging = LoggingConfig::default();
    assert_eq!(logging.name, "ndisk");
    assert!(logging.directory.is_none());
}

#[test]
fn ledger_config_deserializes_partial_sections() {
    let raw = json!({
        "storage": { "root": "/tmp/blobs", "compression": true },
        "database": { "path": "/var/lib/ndisk/ledger.db" },
        "upload": { "multipart_threshold": 1024, "part_size": 256, "spool_dir": "/tmp/spool" }
    });

    let cfg: LedgerConfig = serde_json::from_value(raw).expect("config deserialize");
    assert_eq!(cfg.storage.root, std::path::PathBuf::from("/tmp/blobs"));
    assert!(cfg.storage.compression);
    assert!(cfg.storage.purge_tmp_on_start);
    assert_eq!(cfg.upload.multipart_threshold, 1024);
    assert_eq!(cfg.upload.part_size, 256);
    assert_eq!(cfg.upload.part_concurrency, 4);
    assert_eq!(cfg.database.lock_timeout_ms, 5_000);
    assert_eq!(cfg.database.path, std::path::PathBuf::from("/var/lib/ndisk/ledger.db"));
    assert_eq!(cfg.upload.spool_dir, Some(std::path::PathBuf::from("/tmp/spool")));
}

#[test]
fn cloned_config_is_copy_on_write() {
    let base = LedgerConfig::default();
    let mut tuned = base.clone();
    tuned.upload.part_concurrency = 16;

    assert_eq!(base.upload.part_concurrency, 4);
    assert_eq!(tuned.upload.part_concurrency, 16);
}
