use ndisk_domain::constants::ROOT_PARENT;
use ndisk_domain::{Blob, NamespaceEntry, NewEntry, User};

fn entry(blob: Option<&str>) -> NamespaceEntry {
    NewEntry {
        uuid: "e1".to_owned(),
        parent_id: ROOT_PARENT,
        name: "report".to_owned(),
        extension: "pdf".to_owned(),
        owner_uuid: "u1".to_owned(),
        blob_uuid: blob.map(str::to_owned),
    }
    .into_entry(7)
}

#[test]
fn user_available_never_underflows() {
    let user = User { id: "u1".into(), email: "a@b.c".into(), now_volume: 900, total_volume: 1000 };
    assert_eq!(user.available(), 100);

    let over = User { now_volume: 1200, ..user };
    assert_eq!(over.available(), 0);
}

#[test]
fn blob_orphan_flag_follows_link_count() {
    let blob = Blob {
        uuid: "b1".into(),
        content_hash: "h".into(),
        size: 3,
        storage_key: "k".into(),
        link_count: 0,
    };
    assert!(blob.is_orphan());
    assert!(!Blob { link_count: 1, ..blob }.is_orphan());
}

#[test]
fn entry_helpers() {
    let file = entry(Some("b1"));
    assert_eq!(file.id, 7);
    assert!(!file.is_folder());
    assert!(file.is_top_level());
    assert_eq!(file.file_name(), "report.pdf");
    assert!(file.collides_with("u1", ROOT_PARENT, "report", "pdf"));
    assert!(!file.collides_with("u2", ROOT_PARENT, "report", "pdf"));
    assert!(!file.collides_with("u1", ROOT_PARENT, "report", "txt"));

    let folder = NamespaceEntry { extension: String::new(), ..entry(None) };
    assert!(folder.is_folder());
    assert_eq!(folder.file_name(), "report");
}
