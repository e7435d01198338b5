//! Artifact writers: persist a named blob under a pre-resolved root.
//!
//! Callers hand over a path relative to the writer's root; the writer owns
//! directory creation and overwrite semantics. Two implementations ship:
//!
//! * [`DiskWriter`] — atomic temp-file + rename under a directory, so a
//!   re-run overwrites instead of duplicating and a crash never leaves a
//!   half-written artifact behind.
//! * [`MemoryWriter`] — keeps blobs in a map; used when publishing is
//!   disabled (dry runs) and in tests.

use crate::error::ArtifactError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Persists named blobs relative to a root.
#[async_trait]
pub trait ArtifactWriter: Send + Sync {
    /// Write `content` at `path` (relative to the root), replacing any
    /// existing content. Intermediate directories are created as needed.
    async fn write(&self, content: &[u8], path: &str) -> Result<(), ArtifactError>;

    /// Write UTF-8 text.
    async fn write_text(&self, content: &str, path: &str) -> Result<(), ArtifactError> {
        self.write(content.as_bytes(), path).await
    }
}

/// Reject absolute paths and anything that could escape the root.
pub fn validate_relative(path: &str) -> Result<&Path, ArtifactError> {
    let p = Path::new(path);
    let ok = !path.is_empty() && p.components().all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(p)
    } else {
        Err(ArtifactError::InvalidPath {
            path: path.to_string(),
        })
    }
}

// ── Disk ─────────────────────────────────────────────────────────────────

/// Writes artifacts under a directory on the local file system.
#[derive(Debug, Clone)]
pub struct DiskWriter {
    root: PathBuf,
}

impl DiskWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory itself (so it exists even if nothing is
    /// ever written into it).
    pub async fn create_root(&self) -> Result<(), ArtifactError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ArtifactError::WriteFailed {
                path: self.root.display().to_string(),
                detail: e.to_string(),
            })
    }
}

#[async_trait]
impl ArtifactWriter for DiskWriter {
    async fn write(&self, content: &[u8], path: &str) -> Result<(), ArtifactError> {
        let rel = validate_relative(path)?;
        let target = self.root.join(rel);
        let failed = |e: std::io::Error| ArtifactError::WriteFailed {
            path: path.to_string(),
            detail: e.to_string(),
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(failed)?;
        }

        // Atomic write: write to temp, then rename
        let mut tmp_name = target.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = target.with_file_name(tmp_name);

        tokio::fs::write(&tmp_path, content).await.map_err(failed)?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &target).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(failed(e));
        }

        debug!("Wrote {} ({} bytes)", target.display(), content.len());
        Ok(())
    }
}

// ── Memory ───────────────────────────────────────────────────────────────

/// Keeps written blobs in memory, keyed by relative path.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content stored at `path`, if any.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    /// Stored paths in lexical order.
    pub fn paths(&self) -> Vec<String> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactWriter for MemoryWriter {
    async fn write(&self, content: &[u8], path: &str) -> Result<(), ArtifactError> {
        validate_relative(path)?;
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string(), content.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_escaping_paths() {
        assert!(validate_relative("a.json").is_ok());
        assert!(validate_relative("sub/a.jpg").is_ok());
        assert!(validate_relative("").is_err());
        assert!(validate_relative("../a.json").is_err());
        assert!(validate_relative("sub/../../a.json").is_err());
        assert!(validate_relative("/etc/passwd").is_err());
        assert!(validate_relative("./a.json").is_err());
    }

    #[tokio::test]
    async fn disk_writer_creates_dirs_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DiskWriter::new(dir.path().join("doc"));

        writer.write_text("first", "nested/a.md").await.unwrap();
        writer.write_text("second", "nested/a.md").await.unwrap();

        let target = dir.path().join("doc/nested/a.md");
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "second");

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("doc/nested"))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1, "temp files must not linger");
    }

    #[tokio::test]
    async fn disk_writer_reports_invalid_path() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DiskWriter::new(dir.path());
        let err = writer.write(b"x", "../escape.txt").await.unwrap_err();
        assert!(matches!(err, ArtifactError::InvalidPath { .. }));
        assert!(!dir.path().parent().unwrap().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn disk_writer_create_root_makes_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DiskWriter::new(dir.path().join("doc/images"));
        writer.create_root().await.unwrap();
        assert!(writer.root().is_dir());
    }

    #[test]
    fn memory_writer_stores_blobs() {
        let writer = MemoryWriter::new();
        tokio_test::block_on(writer.write(b"abc", "0_0.jpg")).unwrap();
        tokio_test::block_on(writer.write_text("md", "doc.md")).unwrap();
        assert_eq!(writer.get("0_0.jpg").as_deref(), Some(&b"abc"[..]));
        assert_eq!(writer.paths(), vec!["0_0.jpg".to_string(), "doc.md".to_string()]);
        assert!(tokio_test::block_on(writer.write(b"", "/abs")).is_err());
        assert_eq!(writer.len(), 2);
    }
}
