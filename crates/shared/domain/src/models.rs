use crate::constants::ROOT_PARENT;
use serde::{Deserialize, Serialize};

/// Store-allocated numeric id of a namespace entry.
pub type EntryId = i64;

/// A storage account and its quota counters (bytes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub now_volume: u64,
    pub total_volume: u64,
}

impl User {
    #[must_use]
    pub const fn available(&self) -> u64 {
        self.total_volume.saturating_sub(self.now_volume)
    }
}

/// A unique piece of stored content, shared by every entry that references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub uuid: String,
    pub content_hash: String,
    pub size: u64,
    pub storage_key: String,
    pub link_count: u64,
}

impl Blob {
    /// No entry references this blob any more; left for an external sweep.
    #[must_use]
    pub const fn is_orphan(&self) -> bool {
        self.link_count == 0
    }
}

/// A file or folder in a user's tree. Folders carry no blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceEntry {
    pub id: EntryId,
    pub uuid: String,
    pub parent_id: EntryId,
    pub name: String,
    pub extension: String,
    pub owner_uuid: String,
    pub blob_uuid: Option<String>,
}

impl NamespaceEntry {
    #[must_use]
    pub const fn is_folder(&self) -> bool {
        self.blob_uuid.is_none()
    }

    #[must_use]
    pub const fn is_top_level(&self) -> bool {
        self.parent_id == ROOT_PARENT
    }

    /// `name.extension`, or just `name` when there is no extension.
    #[must_use]
    pub fn file_name(&self) -> String {
        if self.extension.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.extension)
        }
    }

    /// Whether `other` would occupy the same slot in the same directory.
    #[must_use]
    pub fn collides_with(&self, owner: &str, parent_id: EntryId, name: &str, extension: &str) -> bool {
        self.owner_uuid == owner
            && self.parent_id == parent_id
            && self.name == name
            && self.extension == extension
    }
}

/// An entry that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub uuid: String,
    pub parent_id: EntryId,
    pub name: String,
    pub extension: String,
    pub owner_uuid: String,
    pub blob_uuid: Option<String>,
}

impl NewEntry {
    #[must_use]
    pub fn into_entry(self, id: EntryId) -> NamespaceEntry {
        NamespaceEntry {
            id,
            uuid: self.uuid,
            parent_id: self.parent_id,
            name: self.name,
            extension: self.extension,
            owner_uuid: self.owner_uuid,
            blob_uuid: self.blob_uuid,
        }
    }
}
