//! Multipart staging for [`FsBlobStore`].
//!
//! Each upload owns a staging directory holding a manifest and one file per part.
//! `complete` first renames the manifest to its sealed name: the rename is atomic, so
//! exactly one caller wins the right to assemble, and late `upload_part` calls see the
//! upload as gone.

use crate::contract::{MAX_PART_POSITION, MultipartOptions, PartDescriptor, UploadId, order_parts};
use crate::engine::FsBlobStore;
use crate::error::{StorageError, StorageErrorExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

const SEALED_SUFFIX: &str = "sealed";

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    key: String,
    options: MultipartOptions,
}

pub(crate) async fn init(
    store: &FsBlobStore,
    key: &str,
    options: &MultipartOptions,
) -> Result<UploadId, StorageError> {
    store.sandbox.object_path(key)?;

    let upload_id = UploadId::new(nanoid::nanoid!());
    let staging = store.sandbox.staging_dir(upload_id.as_str())?;
    fs::create_dir_all(&staging)
        .await
        .context(format!("Failed to create staging for {upload_id}"))?;

    let manifest = Manifest { key: key.to_owned(), options: options.clone() };
    let encoded = serde_json::to_vec(&manifest).context("Encoding manifest")?;
    store.write_file(&store.sandbox.manifest_path(upload_id.as_str())?, &encoded, false).await?;

    debug!(key, %upload_id, "Multipart upload started");
    Ok(upload_id)
}

pub(crate) async fn upload_part(
    store: &FsBlobStore,
    position: u32,
    data: &[u8],
    key: &str,
    upload_id: &UploadId,
) -> Result<PartDescriptor, StorageError> {
    if position == 0 || position > MAX_PART_POSITION {
        return Err(StorageError::invalid_part(format!(
            "position {position} outside 1..={MAX_PART_POSITION}"
        )));
    }
    let manifest_path = store.sandbox.manifest_path(upload_id.as_str())?;
    load_manifest(store, &manifest_path, key, upload_id).await?;

    let tag = part_tag(data);
    let encoded = store.compression.compress(data);
    let part_path = store.sandbox.part_path(upload_id.as_str(), position)?;
    store.write_file(&part_path, &encoded, false).await.map_err(|err| match err {
        StorageError::Io { ref source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
            StorageError::upload_not_found(upload_id.as_str())
        },
        other => other,
    })?;

    debug!(position, size = data.len(), "Part staged");
    Ok(PartDescriptor { position, tag })
}

pub(crate) async fn complete(
    store: &FsBlobStore,
    key: &str,
    upload_id: &UploadId,
    parts: Vec<PartDescriptor>,
) -> Result<(), StorageError> {
    let manifest_path = store.sandbox.manifest_path(upload_id.as_str())?;
    let sealed_path = manifest_path.with_extension(SEALED_SUFFIX);

    match fs::rename(&manifest_path, &sealed_path).await {
        Ok(()) => {},
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(StorageError::upload_not_found(upload_id.as_str()));
        },
        Err(err) => {
            return Err(StorageError::Io { source: err, context: Some("Sealing manifest".into()) });
        },
    }

    match assemble(store, &sealed_path, key, upload_id, parts).await {
        Ok(()) => {
            let staging = store.sandbox.staging_dir(upload_id.as_str())?;
            if let Err(err) = fs::remove_dir_all(&staging).await {
                warn!(%upload_id, error = %err, "Staging cleanup failed, left for purge");
            }
            debug!(key, %upload_id, "Multipart upload completed");
            Ok(())
        },
        Err(err) => {
            // The upload stays open for another attempt or an abort.
            if let Err(unseal) = fs::rename(&sealed_path, &manifest_path).await {
                warn!(%upload_id, error = %unseal, "Failed to reopen upload after rejected completion");
            }
            Err(err)
        },
    }
}

pub(crate) async fn abort(
    store: &FsBlobStore,
    key: &str,
    upload_id: &UploadId,
) -> Result<(), StorageError> {
    let manifest_path = store.sandbox.manifest_path(upload_id.as_str())?;
    load_manifest(store, &manifest_path, key, upload_id).await?;

    let staging = store.sandbox.staging_dir(upload_id.as_str())?;
    match fs::remove_dir_all(&staging).await {
        Ok(()) => {
            debug!(key, %upload_id, "Multipart upload aborted");
            Ok(())
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(StorageError::upload_not_found(upload_id.as_str()))
        },
        Err(err) => Err(StorageError::Io {
            source: err,
            context: Some(format!("Failed to discard upload {upload_id}").into()),
        }),
    }
}

async fn assemble(
    store: &FsBlobStore,
    sealed_path: &Path,
    key: &str,
    upload_id: &UploadId,
    parts: Vec<PartDescriptor>,
) -> Result<(), StorageError> {
    let manifest = load_manifest(store, sealed_path, key, upload_id).await?;
    let ordered = order_parts(parts, manifest.options.expected_parts)?;

    let mut object = Vec::new();
    for part in &ordered {
        let path = store.sandbox.part_path(upload_id.as_str(), part.position)?;
        let stored = store.read_file(&path).await?.ok_or_else(|| {
            StorageError::invalid_part(format!("missing position {}", part.position))
        })?;
        let data = store.compression.decompress(stored)?;
        if part_tag(&data) != part.tag {
            return Err(StorageError::invalid_part(format!("tag mismatch at position {}", part.position)));
        }
        object.extend_from_slice(&data);
    }

    store.write_object(key, &object).await
}

async fn load_manifest(
    store: &FsBlobStore,
    path: &Path,
    key: &str,
    upload_id: &UploadId,
) -> Result<Manifest, StorageError> {
    let raw = store
        .read_file(path)
        .await?
        .ok_or_else(|| StorageError::upload_not_found(upload_id.as_str()))?;
    let manifest: Manifest = serde_json::from_slice(&raw).context("Decoding manifest")?;
    if manifest.key != key {
        return Err(StorageError::InvalidKey {
            message: key.to_owned().into(),
            context: Some(format!("Upload {upload_id} belongs to another key").into()),
        });
    }
    Ok(manifest)
}

fn part_tag(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
