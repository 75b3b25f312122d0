//! Document store: the upload directory on disk.

use bocs_core::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Result of listing a directory for PDFs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfListing {
    /// The directory does not exist
    Missing,
    /// File names (not paths), sorted
    Files(Vec<String>),
}

impl PdfListing {
    pub fn files(&self) -> &[String] {
        match self {
            PdfListing::Missing => &[],
            PdfListing::Files(files) => files,
        }
    }
}

/// Whether `name` has a `.pdf` extension, in any case.
pub fn is_pdf(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// List the PDF files directly inside `dir`.
pub fn list_pdfs(dir: &Path) -> AppResult<PdfListing> {
    if !dir.is_dir() {
        return Ok(PdfListing::Missing);
    }

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            AppError::Knowledge(format!("Failed to list {}: {}", dir.display(), e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if is_pdf(name) {
                files.push(name.to_string());
            }
        }
    }

    files.sort();
    tracing::debug!("Found {} PDF(s) in {}", files.len(), dir.display());
    Ok(PdfListing::Files(files))
}

/// Logical document name for a path: the file stem.
pub fn doc_name_for(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// An uploaded file written to a private directory under the upload dir.
/// The directory is removed when the value is dropped.
#[derive(Debug)]
pub struct StagedUpload {
    dir: TempDir,
    path: PathBuf,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the staging directory now, reporting failures.
    pub fn cleanup(self) -> AppResult<()> {
        let dir = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| {
            AppError::Knowledge(format!("Failed to remove {}: {}", dir.display(), e))
        })
    }
}

/// Write `bytes` as `file_name` into a fresh temporary directory under
/// `upload_root`.
pub fn persist_upload(upload_root: &Path, file_name: &str, bytes: &[u8]) -> AppResult<StagedUpload> {
    let file_name = Path::new(file_name)
        .file_name()
        .ok_or_else(|| AppError::Knowledge(format!("Invalid upload name: '{}'", file_name)))?;

    fs::create_dir_all(upload_root)?;
    let dir = tempfile::Builder::new()
        .prefix(".upload-")
        .tempdir_in(upload_root)?;
    let path = dir.path().join(file_name);
    fs::write(&path, bytes)?;

    tracing::debug!("Staged upload at {}", path.display());
    Ok(StagedUpload { dir, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_directory() {
        let temp = TempDir::new().unwrap();
        let listing = list_pdfs(&temp.path().join("absent")).unwrap();
        assert_eq!(listing, PdfListing::Missing);
        assert!(listing.files().is_empty());
    }

    #[test]
    fn test_lists_pdfs_case_insensitively() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.PDF"), b"x").unwrap();
        fs::write(temp.path().join("a.pdf"), b"x").unwrap();
        fs::write(temp.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(temp.path().join("nested.pdf")).unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        fs::write(temp.path().join("sub/deep.pdf"), b"x").unwrap();

        let listing = list_pdfs(temp.path()).unwrap();
        assert_eq!(
            listing,
            PdfListing::Files(vec!["a.pdf".to_string(), "b.PDF".to_string()])
        );
    }

    #[test]
    fn test_empty_directory_is_not_missing() {
        let temp = TempDir::new().unwrap();
        assert_eq!(list_pdfs(temp.path()).unwrap(), PdfListing::Files(vec![]));
    }

    #[test]
    fn test_doc_name_is_stem() {
        assert_eq!(doc_name_for(Path::new("/x/decree_12.pdf")), "decree_12");
        assert_eq!(doc_name_for(Path::new("report.v2.pdf")), "report.v2");
    }

    #[test]
    fn test_staged_upload_is_removed() {
        let temp = TempDir::new().unwrap();
        let staged = persist_upload(temp.path(), "../evil/decree.pdf", b"%PDF").unwrap();

        assert_eq!(staged.path().file_name().unwrap(), "decree.pdf");
        assert!(staged.path().starts_with(temp.path()));
        assert_eq!(fs::read(staged.path()).unwrap(), b"%PDF");
        // Staging dirs are not listed as documents.
        assert_eq!(list_pdfs(temp.path()).unwrap(), PdfListing::Files(vec![]));

        let dir = staged.path().parent().unwrap().to_path_buf();
        staged.cleanup().unwrap();
        assert!(!dir.exists());
    }
}
