use crate::error::StorageError;
use std::path::{Component, Path, PathBuf};

pub(crate) const OBJECTS_DIR: &str = "objects";
pub(crate) const MULTIPART_DIR: &str = "multipart";
pub(crate) const MANIFEST_FILE: &str = "manifest.json";

const MAX_KEY_LEN: usize = 512;

/// Physical layout of a store root. Every path handed out stays below `root`.
///
/// ```text
/// <root>/objects/<dirs of key>/<ab>/<cd>/<abcd...>     objects, sharded by file name
/// <root>/multipart/<upload id>/manifest.json          staging of one upload
/// <root>/multipart/<upload id>/part.00000001
/// ```
#[derive(Debug, Clone)]
pub(crate) struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// `root` must already be canonical.
    pub(crate) const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Physical path of an object. Directories in the key are kept; the file name is
    /// spread over two shard levels taken from its first four characters.
    pub(crate) fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        let relative = normalize_relative(Path::new(key))?;
        let file_name = relative.file_name().and_then(|s| s.to_str()).ok_or_else(|| {
            StorageError::InvalidKey { message: key.to_owned().into(), context: Some("Key must name a file".into()) }
        })?;

        let mut sharded = PathBuf::from(OBJECTS_DIR);
        if let Some(dirs) = relative.parent() {
            sharded.push(dirs);
        }
        // Keys are ASCII, byte offsets are char offsets.
        if file_name.len() >= 4 {
            sharded.push(&file_name[0..2]);
            sharded.push(&file_name[2..4]);
        }
        sharded.push(file_name);

        self.contain(&sharded)
    }

    pub(crate) fn staging_dir(&self, upload_id: &str) -> Result<PathBuf, StorageError> {
        let legal = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';
        if upload_id.is_empty() || !upload_id.chars().all(legal) {
            return Err(StorageError::upload_not_found(upload_id));
        }
        self.contain(&Path::new(MULTIPART_DIR).join(upload_id))
    }

    pub(crate) fn manifest_path(&self, upload_id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.staging_dir(upload_id)?.join(MANIFEST_FILE))
    }

    pub(crate) fn part_path(&self, upload_id: &str, position: u32) -> Result<PathBuf, StorageError> {
        Ok(self.staging_dir(upload_id)?.join(part_file_name(position)))
    }

    /// Joins `relative` to the root and proves the result cannot leave it, following
    /// symlinks of whatever prefix already exists on disk.
    fn contain(&self, relative: &Path) -> Result<PathBuf, StorageError> {
        let joined = self.root.join(relative);

        let mut cursor = Some(joined.as_path());
        while let Some(path) = cursor {
            if path == self.root {
                return Ok(joined);
            }
            match path.canonicalize() {
                Ok(canonical) if canonical.starts_with(&self.root) => return Ok(joined),
                Ok(canonical) => {
                    return Err(StorageError::PathTraversalAttempt {
                        message: canonical.display().to_string().into(),
                        context: Some("Existing path resolves outside the store root".into()),
                    });
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => cursor = path.parent(),
                Err(e) => {
                    return Err(StorageError::Io {
                        source: e,
                        context: Some(format!("Failed to verify {}", path.display()).into()),
                    });
                },
            }
        }

        Err(StorageError::PathTraversalAttempt {
            message: joined.display().to_string().into(),
            context: Some("No ancestor inside the store root".into()),
        })
    }
}

pub(crate) fn part_file_name(position: u32) -> String {
    format!("part.{position:08}")
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let reason = if key.is_empty() {
        Some("Key cannot be empty")
    } else if key.len() > MAX_KEY_LEN {
        Some("Key is too long")
    } else if !key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')) {
        Some("Key contains illegal characters")
    } else if key.split('/').any(|segment| segment.starts_with('.')) {
        Some("Key segments cannot start with '.'")
    } else {
        None
    };

    reason.map_or(Ok(()), |reason| {
        Err(StorageError::InvalidKey { message: key.to_owned().into(), context: Some(reason.into()) })
    })
}

/// Keeps only plain segments; anything able to climb or anchor the path is rejected.
fn normalize_relative(path: &Path) -> Result<PathBuf, StorageError> {
    let mut out = PathBuf::new();

    for c in path.components() {
        match c {
            Component::CurDir => {},
            Component::Normal(seg) => out.push(seg),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::PathTraversalAttempt {
                    message: path.display().to_string().into(),
                    context: Some("Keys must be plain relative paths".into()),
                });
            },
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> (tempfile::TempDir, Sandbox) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, Sandbox::new(root))
    }

    #[test]
    fn object_keys_are_sharded() {
        let (_dir, sandbox) = sandbox();
        let path = sandbox.object_path("abcdef0123").unwrap();
        assert!(path.ends_with("objects/ab/cd/abcdef0123"));

        let nested = sandbox.object_path("tenant/abcdef").unwrap();
        assert!(nested.ends_with("objects/tenant/ab/cd/abcdef"));

        let short = sandbox.object_path("abc").unwrap();
        assert!(short.ends_with("objects/abc"));
    }

    #[test]
    fn hostile_keys_are_rejected() {
        let (_dir, sandbox) = sandbox();
        for key in ["", "../etc/passwd", "a/../../b", "/abs", ".hidden", "a/.b", "sp ace"] {
            assert!(sandbox.object_path(key).is_err(), "accepted {key:?}");
        }
    }

    #[test]
    fn upload_ids_are_plain_tokens() {
        let (_dir, sandbox) = sandbox();
        assert!(sandbox.staging_dir("Abc123").is_ok());
        assert!(matches!(sandbox.staging_dir("../x"), Err(StorageError::UploadNotFound { .. })));
        assert!(sandbox.part_path("Abc123", 7).unwrap().ends_with("multipart/Abc123/part.00000007"));
    }
}
