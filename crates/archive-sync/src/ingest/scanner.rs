use std::path::{Path, PathBuf};

use log::{debug, info};
use walkdir::WalkDir;

use crate::error::StorageError;

use super::worker::FileDescriptor;

/// Finds PDF files below a folder for bulk import.
pub struct FolderScanner {
    root: PathBuf,
}

impl FolderScanner {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks the folder recursively and returns every file whose guessed
    /// MIME type is `application/pdf`, sorted by file name.
    pub fn scan(&self) -> Result<Vec<FileDescriptor>, StorageError> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.root).min_depth(1).follow_links(false) {
            let entry = entry.map_err(|e| StorageError::Scan {
                path: self.root.clone(),
                source: e,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !is_pdf(path) {
                continue;
            }

            let metadata = entry.metadata().map_err(|e| StorageError::Scan {
                path: path.to_path_buf(),
                source: e,
            })?;
            debug!("Found PDF: {}", path.display());
            files.push(FileDescriptor::from_path(path, metadata.len()));
        }

        files.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.source.cmp(&b.source)));
        info!("Scanned {} PDF files in {}", files.len(), self.root.display());
        Ok(files)
    }
}

/// Shorthand for `FolderScanner::new(dir).scan()`.
pub fn scan_folder<P: AsRef<Path>>(dir: P) -> Result<Vec<FileDescriptor>, StorageError> {
    FolderScanner::new(dir).scan()
}

fn is_pdf(path: &Path) -> bool {
    mime_guess::from_path(path)
        .iter()
        .any(|mime| mime.essence_str() == "application/pdf")
}
