//! Namespace tree: per-user folders and file entries bound to pooled blobs.
//!
//! Every query against the entry table is built here. Inserts, renames and moves into a
//! directory hold that directory's lock, which makes the sibling name check race free.

use crate::error::LedgerError;
use crate::pool::ContentPoolManager;
use fxhash::{FxHashMap, FxHashSet};
use ndisk_database::{EntryQuery, Reader, Transaction};
use ndisk_domain::constants::ROOT_PARENT;
use ndisk_domain::{EntryId, NamespaceEntry, NewEntry};
use ndisk_kernel::ids;
use tracing::{debug, instrument};

const COPY_SUFFIX: &str = "_copy";

#[derive(Debug, Clone, Copy, Default)]
pub struct NamespaceTreeManager {
    pool: ContentPoolManager,
}

impl NamespaceTreeManager {
    #[must_use]
    pub const fn new(pool: ContentPoolManager) -> Self {
        Self { pool }
    }

    /// Inserts an entry below the root or a folder of the same owner.
    ///
    /// Link counts are left alone: binding the blob is the caller's job, in the same
    /// transaction.
    ///
    /// # Errors
    /// [`LedgerError::NameConflict`] if a sibling has the same name and extension,
    /// [`LedgerError::NotFound`] for a missing parent, [`LedgerError::InvalidArgument`] for
    /// a parent that is not a folder or an invalid name.
    #[instrument(skip(self, tx, entry), fields(tx = tx.id(), uuid = %entry.uuid, parent = entry.parent_id))]
    pub async fn create_entry(
        &self,
        tx: &mut Transaction,
        entry: NewEntry,
    ) -> Result<NamespaceEntry, LedgerError> {
        validate_name(&entry.name, &entry.extension)?;
        tx.lock_directory(&entry.owner_uuid, entry.parent_id);
        check_parent(&*tx, &entry.owner_uuid, entry.parent_id).await?;
        check_free(&*tx, &entry.owner_uuid, entry.parent_id, &entry.name, &entry.extension, None).await?;

        let created = tx.insert_entry(entry).await?;
        debug!(id = created.id, "Entry created");
        Ok(created)
    }

    pub async fn create_folder(
        &self,
        tx: &mut Transaction,
        owner: &str,
        parent_id: EntryId,
        name: &str,
    ) -> Result<NamespaceEntry, LedgerError> {
        let folder = NewEntry {
            uuid: ids::entry_id(owner, name),
            parent_id,
            name: name.to_owned(),
            extension: String::new(),
            owner_uuid: owner.to_owned(),
            blob_uuid: None,
        };
        self.create_entry(tx, folder).await
    }

    pub async fn get_entry(&self, reader: &impl Reader, uuid: &str) -> Result<NamespaceEntry, LedgerError> {
        reader.entry_by_uuid(uuid).await?.ok_or_else(|| LedgerError::not_found("entry", uuid))
    }

    /// Children of `parent_id`, in creation order.
    pub async fn list_children(
        &self,
        reader: &impl Reader,
        owner: &str,
        parent_id: EntryId,
    ) -> Result<Vec<NamespaceEntry>, LedgerError> {
        Ok(reader.select_entries(&EntryQuery::new().owner(owner).parent(parent_id)).await?)
    }

    /// Maps uuids to entry ids. Unknown uuids are left out of the map.
    ///
    /// # Errors
    /// [`LedgerError::NotFound`] if none of the uuids exists.
    pub async fn resolve_ids_by_uuid<S: AsRef<str> + Sync>(
        &self,
        reader: &impl Reader,
        uuids: &[S],
    ) -> Result<FxHashMap<String, EntryId>, LedgerError> {
        let query = EntryQuery::new().uuids(uuids.iter().map(|uuid| uuid.as_ref().to_owned()));
        let ids: FxHashMap<String, EntryId> =
            reader.select_entries(&query).await?.into_iter().map(|entry| (entry.uuid, entry.id)).collect();
        if ids.is_empty() {
            return Err(LedgerError::NotFound {
                message: format!("none of {} entries", uuids.len()).into(),
                context: None,
            });
        }
        Ok(ids)
    }

    /// File entries of `owner` whose blob is stored under `storage_key`.
    pub async fn find_by_storage_key(
        &self,
        reader: &impl Reader,
        owner: &str,
        storage_key: &str,
    ) -> Result<Vec<NamespaceEntry>, LedgerError> {
        Ok(reader.select_entries(&EntryQuery::new().owner(owner).storage_key(storage_key)).await?)
    }

    /// Live references per blob uuid, recomputed from the entry table.
    pub async fn live_links(&self, reader: &impl Reader) -> Result<FxHashMap<String, u64>, LedgerError> {
        Ok(reader.live_links().await?.into_iter().collect())
    }

    #[instrument(skip(self, tx), fields(tx = tx.id()))]
    pub async fn rename(
        &self,
        tx: &mut Transaction,
        uuid: &str,
        name: &str,
        extension: &str,
    ) -> Result<NamespaceEntry, LedgerError> {
        validate_name(name, extension)?;
        let seen = self.get_entry(&*tx, uuid).await?;
        tx.lock_directory(&seen.owner_uuid, seen.parent_id);
        let mut entry = lock_entry(tx, uuid).await?;
        if entry.parent_id != seen.parent_id {
            return Err(moved_concurrently(uuid));
        }

        check_free(&*tx, &entry.owner_uuid, entry.parent_id, name, extension, Some(entry.id)).await?;
        name.clone_into(&mut entry.name);
        extension.clone_into(&mut entry.extension);
        tx.update_entry(entry.clone()).await?;
        Ok(entry)
    }

    /// Re-parents an entry. Link counts are untouched.
    ///
    /// # Errors
    /// [`LedgerError::InvalidArgument`] when a folder would move into itself or one of its
    /// descendants, plus the parent and name errors of [`Self::create_entry`].
    #[instrument(skip(self, tx), fields(tx = tx.id()))]
    pub async fn move_entry(
        &self,
        tx: &mut Transaction,
        entry_id: EntryId,
        new_parent_id: EntryId,
    ) -> Result<NamespaceEntry, LedgerError> {
        let seen =
            tx.entry(entry_id).await?.ok_or_else(|| LedgerError::not_found("entry", &entry_id.to_string()))?;
        if seen.is_folder() {
            tx.lock_namespace(&seen.owner_uuid);
        }
        tx.lock_directory(&seen.owner_uuid, new_parent_id);
        let mut entry = lock_entry(tx, &seen.uuid).await?;
        if entry.parent_id == new_parent_id {
            return Ok(entry);
        }

        check_parent(&*tx, &entry.owner_uuid, new_parent_id).await?;
        if entry.is_folder() && is_within(&*tx, new_parent_id, entry.id).await? {
            return Err(LedgerError::invalid(format!(
                "folder {} cannot move below itself",
                entry.uuid
            )));
        }
        check_free(&*tx, &entry.owner_uuid, new_parent_id, &entry.name, &entry.extension, Some(entry.id))
            .await?;

        entry.parent_id = new_parent_id;
        tx.update_entry(entry.clone()).await?;
        debug!(uuid = %entry.uuid, "Entry moved");
        Ok(entry)
    }

    /// Copies a file entry into `dest_parent_id` and binds one more link to its blob.
    ///
    /// # Errors
    /// [`LedgerError::InvalidArgument`] for folders.
    #[instrument(skip(self, tx), fields(tx = tx.id()))]
    pub async fn copy(
        &self,
        tx: &mut Transaction,
        source_uuid: &str,
        dest_parent_id: EntryId,
    ) -> Result<EntryId, LedgerError> {
        let seen = self.get_entry(&*tx, source_uuid).await?;
        if seen.is_folder() {
            return Err(LedgerError::invalid(format!("folder {source_uuid} cannot be copied")));
        }
        tx.lock_directory(&seen.owner_uuid, dest_parent_id);
        let source = lock_entry(tx, source_uuid).await?;
        let Some(blob_uuid) = source.blob_uuid.clone() else {
            return Err(LedgerError::invalid(format!("folder {source_uuid} cannot be copied")));
        };

        let copy = NewEntry {
            uuid: ids::entry_id(&source.owner_uuid, &format!("{}{COPY_SUFFIX}", source.file_name())),
            parent_id: dest_parent_id,
            name: source.name,
            extension: source.extension,
            owner_uuid: source.owner_uuid,
            blob_uuid: Some(blob_uuid.clone()),
        };
        let created = self.create_entry(tx, copy).await?;
        self.pool.adjust_link(tx, &blob_uuid, 1).await?;
        Ok(created.id)
    }

    /// Removes an entry and releases its blob link in the same transaction.
    ///
    /// # Errors
    /// [`LedgerError::DirectoryNotEmpty`] for a folder with children.
    #[instrument(skip(self, tx), fields(tx = tx.id()))]
    pub async fn delete(&self, tx: &mut Transaction, uuid: &str) -> Result<NamespaceEntry, LedgerError> {
        let seen = self.get_entry(&*tx, uuid).await?;
        if seen.is_folder() {
            tx.lock_directory(&seen.owner_uuid, seen.id);
        }
        let entry = lock_entry(tx, uuid).await?;

        if entry.is_folder() {
            let children = EntryQuery::new().owner(&entry.owner_uuid).parent(entry.id).limit(1);
            if !tx.select_entries(&children).await?.is_empty() {
                return Err(LedgerError::DirectoryNotEmpty {
                    message: format!("folder {uuid}").into(),
                    context: None,
                });
            }
        }

        tx.delete_entry(uuid).await?;
        if let Some(blob_uuid) = &entry.blob_uuid {
            self.pool.adjust_link(tx, blob_uuid, -1).await?;
        }
        debug!(id = entry.id, "Entry deleted");
        Ok(entry)
    }
}

async fn lock_entry(tx: &mut Transaction, uuid: &str) -> Result<NamespaceEntry, LedgerError> {
    tx.lock_entry(uuid).await?.ok_or_else(|| LedgerError::not_found("entry", uuid))
}

fn moved_concurrently(uuid: &str) -> LedgerError {
    LedgerError::Conflict { message: format!("entry {uuid} was moved concurrently").into(), context: None }
}

fn validate_name(name: &str, extension: &str) -> Result<(), LedgerError> {
    if name.trim().is_empty() {
        return Err(LedgerError::invalid("entry name cannot be empty"));
    }
    let forbidden = |c: char| c == '/' || c == '\\' || c.is_control();
    if name.contains(forbidden) || extension.contains(forbidden) || extension.contains('.') {
        return Err(LedgerError::invalid(format!("invalid entry name {name:?}.{extension:?}")));
    }
    Ok(())
}

/// The root, or a folder owned by `owner`.
async fn check_parent(reader: &impl Reader, owner: &str, parent_id: EntryId) -> Result<(), LedgerError> {
    if parent_id == ROOT_PARENT {
        return Ok(());
    }
    match reader.entry(parent_id).await? {
        Some(parent) if parent.owner_uuid == owner && parent.is_folder() => Ok(()),
        Some(parent) if parent.owner_uuid == owner => {
            Err(LedgerError::invalid(format!("entry {} is not a folder", parent.uuid)))
        },
        _ => Err(LedgerError::not_found("parent folder", &parent_id.to_string())),
    }
}

async fn check_free(
    reader: &impl Reader,
    owner: &str,
    parent_id: EntryId,
    name: &str,
    extension: &str,
    except: Option<EntryId>,
) -> Result<(), LedgerError> {
    let query = EntryQuery::new().owner(owner).parent(parent_id).named(name, extension);
    if reader.select_entries(&query).await?.iter().any(|sibling| Some(sibling.id) != except) {
        let taken = if extension.is_empty() { name.to_owned() } else { format!("{name}.{extension}") };
        return Err(LedgerError::NameConflict { message: taken.into(), context: None });
    }
    Ok(())
}

/// Whether `node` is `ancestor` or lies below it.
async fn is_within(reader: &impl Reader, node: EntryId, ancestor: EntryId) -> Result<bool, LedgerError> {
    let mut seen = FxHashSet::default();
    let mut current = node;
    while current != ROOT_PARENT && seen.insert(current) {
        if current == ancestor {
            return Ok(true);
        }
        match reader.entry(current).await? {
            Some(entry) => current = entry.parent_id,
            None => return Ok(false),
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_validated() {
        assert!(validate_name("report", "pdf").is_ok());
        assert!(validate_name("archive.tar", "gz").is_ok());
        assert!(validate_name("folder", "").is_ok());
        assert!(validate_name("  ", "").is_err());
        assert!(validate_name("a/b", "").is_err());
        assert!(validate_name("a", "tar.gz").is_err());
        assert!(validate_name("line\nbreak", "").is_err());
    }
}
