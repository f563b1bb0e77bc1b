use ndisk_kernel::config::{ConfigError, load_config};
use ndisk_kernel::domain::config::LedgerConfig;
use std::io::Write;

#[test]
fn loads_toml_file_over_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().expect("tempfile");
    writeln!(
        file,
        r#"
[storage]
root = "/srv/ndisk"

[upload]
multipart_threshold = 4096
"#
    )
    .expect("write config");

    let cfg: LedgerConfig = load_config(Some(file.path())).expect("load config");
    assert_eq!(cfg.storage.root, std::path::PathBuf::from("/srv/ndisk"));
    assert_eq!(cfg.upload.multipart_threshold, 4096);
    assert_eq!(cfg.upload.part_concurrency, 4);
    assert_eq!(cfg.logging.name, "ndisk");
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load_config::<LedgerConfig>(Some(dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Config { .. }));
    assert!(err.to_string().contains("Failed to build config"));
}
