use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::store::{SweepReport, UploadStore, make_token, validate_token};

const STAGE_SUFFIX: &str = ".tmp";

/// Directory-backed upload store. One file per token, written via a staged
/// temp file and a rename so readers never see a partial upload.
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, token: &str) -> io::Result<PathBuf> {
        validate_token(token)?;
        Ok(self.root.join(token))
    }
}

impl UploadStore for LocalDirStore {
    fn put(&self, bytes: &[u8], original_name: &str) -> io::Result<String> {
        std::fs::create_dir_all(&self.root)?;
        let token = make_token(bytes, original_name);
        let dest = self.path_for(&token)?;
        write_bytes_atomic(&dest, bytes)?;
        tracing::debug!(token = %token, size = bytes.len(), "upload stored");
        Ok(token)
    }

    fn exists(&self, token: &str) -> bool {
        self.path_for(token)
            .ok()
            .and_then(|p| std::fs::metadata(p).ok())
            .is_some_and(|m| m.is_file())
    }

    fn get(&self, token: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.path_for(token)?)
    }

    fn sweep(&self, max_age: Duration) -> io::Result<SweepReport> {
        let mut report = SweepReport::default();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e),
        };
        let now = SystemTime::now();

        for entry in entries {
            let Ok(entry) = entry else {
                report.failed += 1;
                continue;
            };
            let path = entry.path();
            let meta = match std::fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(_) => {
                    report.failed += 1;
                    continue;
                }
            };
            if !meta.is_file() {
                continue;
            }
            report.scanned += 1;

            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age <= max_age {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => report.deleted += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => report.vanished += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(path = %path.display(), error = %e, "sweep could not delete upload");
                }
            }
        }

        tracing::info!(
            root = %self.root.display(),
            scanned = report.scanned,
            deleted = report.deleted,
            vanished = report.vanished,
            failed = report.failed,
            "sweep finished"
        );
        Ok(report)
    }

    fn describe(&self, token: &str) -> String {
        self.root.join(token).display().to_string()
    }
}

fn write_bytes_atomic(dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name"))?;
    let stage = dest.with_file_name(format!(".{file_name}{STAGE_SUFFIX}"));

    let result = write_bytes_sync(&stage, bytes).and_then(|()| std::fs::rename(&stage, dest));
    if result.is_err() {
        let _ = std::fs::remove_file(&stage);
    }
    result
}

fn write_bytes_sync(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut f = File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}
