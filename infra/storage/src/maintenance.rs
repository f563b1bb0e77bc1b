use crate::security::{MANIFEST_FILE, MULTIPART_DIR};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{error, info, warn};
use walkdir::{DirEntry, WalkDir};

pub(crate) const TMP_MARKER: &str = ".ndtmp.";

const TMP_STALE_AFTER: Duration = Duration::from_secs(300);
const UPLOAD_ABANDONED_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Outcome of one maintenance sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub tmp_removed: usize,
    pub uploads_removed: usize,
    pub failed: usize,
}

pub(crate) async fn purge(root: &Path) -> PurgeReport {
    let root = root.to_path_buf();
    let now = SystemTime::now();

    match tokio::task::spawn_blocking(move || sweep(&root, now)).await {
        Ok(report) => {
            if report != PurgeReport::default() {
                info!(
                    tmp_removed = report.tmp_removed,
                    uploads_removed = report.uploads_removed,
                    failed = report.failed,
                    "Cleaned up blob store leftovers"
                );
            }
            report
        },
        Err(e) => {
            error!(error = %e, "Blob store cleanup task panicked");
            PurgeReport::default()
        },
    }
}

fn sweep(root: &Path, now: SystemTime) -> PurgeReport {
    let mut report = PurgeReport::default();
    remove_abandoned_uploads(&root.join(MULTIPART_DIR), now, &mut report);

    WalkDir::new(root)
        .contents_first(true)
        .into_iter()
        .flatten()
        .filter(|e| e.path() != root)
        .for_each(|entry| {
            if entry.file_type().is_file() {
                if is_tmp(&entry) && age(entry.path(), now).is_none_or(|age| age > TMP_STALE_AFTER) {
                    match std::fs::remove_file(entry.path()) {
                        Ok(()) => report.tmp_removed += 1,
                        Err(e) => {
                            warn!(path = %entry.path().display(), error = %e, "Temp file removal failed");
                            report.failed += 1;
                        },
                    }
                }
            } else if entry.file_type().is_dir() {
                // Only succeeds for empty shard directories.
                let _ = std::fs::remove_dir(entry.path());
            }
        });

    report
}

fn remove_abandoned_uploads(staging_root: &Path, now: SystemTime, report: &mut PurgeReport) {
    let Ok(uploads) = std::fs::read_dir(staging_root) else {
        return;
    };

    for upload in uploads.flatten() {
        let path = upload.path();
        if !path.is_dir() {
            continue;
        }
        let abandoned = age(&path.join(MANIFEST_FILE), now)
            .is_none_or(|age| age > UPLOAD_ABANDONED_AFTER);
        if !abandoned {
            continue;
        }
        match std::fs::remove_dir_all(&path) {
            Ok(()) => report.uploads_removed += 1,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Abandoned upload removal failed");
                report.failed += 1;
            },
        }
    }
}

fn is_tmp(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|name| name.contains(TMP_MARKER))
}

fn age(path: &Path, now: SystemTime) -> Option<Duration> {
    std::fs::metadata(path)
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|modified| now.duration_since(modified).ok())
}
