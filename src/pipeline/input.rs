//! Input resolution: turn a user-supplied path into a [`SourceDocument`].
//!
//! We validate the PDF magic bytes (`%PDF`) before anything else so callers
//! get a meaningful error rather than a pdfium failure several stages later.
//! Output locations are resolved here too, once, so every later stage sees
//! the same directories and the same image-path prefix.

use crate::error::DocParseError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// One input document, immutable after construction.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    name: String,
    path: PathBuf,
    bytes: Arc<[u8]>,
    output_dir: PathBuf,
    image_dir: PathBuf,
}

impl SourceDocument {
    /// Build a document from bytes already in memory.
    ///
    /// `output_root` is the shared output directory; the document's own
    /// directory is `{output_root}/{name}` and its images live in
    /// `{output_root}/{name}/{image_dir_name}`.
    pub fn from_bytes(
        path: impl Into<PathBuf>,
        bytes: impl Into<Arc<[u8]>>,
        output_root: &Path,
        image_dir_name: &str,
    ) -> Self {
        let path = path.into();
        let name = document_name(&path);
        let output_dir = output_root.join(&name);
        let image_dir = output_dir.join(image_dir_name);
        Self {
            name,
            path,
            bytes: bytes.into(),
            output_dir,
            image_dir,
        }
    }

    /// Base name of the input, without extension. Names every artifact.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the raw bytes, for moving into blocking tasks.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Relative prefix for image references in the content list and
    /// Markdown: the basename of the image directory.
    pub fn image_prefix(&self) -> String {
        self.image_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Document name derived from the input path: file name minus extension.
pub fn document_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

/// Shared output root for `path`: `output_root`, else the input's parent.
pub fn output_root_for(path: &Path, output_root: Option<&Path>) -> PathBuf {
    match output_root {
        Some(dir) => dir.to_path_buf(),
        None => path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

/// The document's own output directory, `{root}/{name}`.
pub fn output_dir_for(path: &Path, output_root: Option<&Path>) -> PathBuf {
    output_root_for(path, output_root).join(document_name(path))
}

/// Read and validate a local PDF, resolving its output directories.
///
/// `output_root` defaults to the input's parent directory.
pub async fn resolve_document(
    path: &Path,
    output_root: Option<&Path>,
    image_dir_name: &str,
) -> Result<SourceDocument, DocParseError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DocParseError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(DocParseError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(DocParseError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    // Verify PDF magic bytes
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(DocParseError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }

    let root = output_root_for(path, output_root);
    let doc = SourceDocument::from_bytes(path, bytes, &root, image_dir_name);
    debug!(
        "Resolved '{}' → {} ({} bytes)",
        doc.name(),
        doc.output_dir().display(),
        doc.bytes().len()
    );
    Ok(doc)
}

/// List the PDFs directly inside `dir` (case-insensitive `.pdf`), sorted.
pub async fn discover_documents(dir: &Path) -> Result<Vec<PathBuf>, DocParseError> {
    let read_failed = |source| DocParseError::ReadFailed {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_failed)?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_failed)? {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    debug!("Discovered {} PDFs in {}", found.len(), dir.display());
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_name_strips_extension() {
        assert_eq!(document_name(Path::new("/in/report.pdf")), "report");
        assert_eq!(document_name(Path::new("scan.v2.PDF")), "scan.v2");
        assert_eq!(document_name(Path::new("noext")), "noext");
    }

    #[test]
    fn layout_is_nested_under_output_root() {
        let doc = SourceDocument::from_bytes(
            "/in/report.pdf",
            b"%PDF-1.7".to_vec(),
            Path::new("/out"),
            "images",
        );
        assert_eq!(doc.name(), "report");
        assert_eq!(doc.output_dir(), Path::new("/out/report"));
        assert_eq!(doc.image_dir(), Path::new("/out/report/images"));
        assert_eq!(doc.image_prefix(), "images");
    }

    #[test]
    fn output_dir_ignores_extension_case() {
        let out = Some(Path::new("/out"));
        assert_eq!(output_dir_for(Path::new("/in/a.pdf"), out), Path::new("/out/a"));
        assert_eq!(
            output_dir_for(Path::new("/in/a.pdf"), out),
            output_dir_for(Path::new("/in/a.PDF"), out)
        );
        assert_eq!(output_dir_for(Path::new("/in/b.pdf"), None), Path::new("/in/b"));
    }

    #[tokio::test]
    async fn resolve_rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"hello world").unwrap();
        let err = resolve_document(&path, None, "images").await.unwrap_err();
        assert!(matches!(err, DocParseError::NotAPdf { magic, .. } if &magic == b"hell"));
    }

    #[tokio::test]
    async fn resolve_defaults_output_to_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"%PDF-1.4\n").unwrap();
        let doc = resolve_document(&path, None, "images").await.unwrap();
        assert_eq!(doc.output_dir(), dir.path().join("report"));

        let missing = resolve_document(&dir.path().join("gone.pdf"), None, "images").await;
        assert!(matches!(missing, Err(DocParseError::FileNotFound { .. })));
    }

    #[tokio::test]
    async fn discover_finds_pdfs_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.PDF", "c.txt"] {
            std::fs::write(dir.path().join(name), b"%PDF").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.pdf")).unwrap();
        let found = discover_documents(dir.path()).await.unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }
}
