use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Client-side cap, enforced before any network call
pub const MAX_PDF_BYTES: u64 = 10 * 1024 * 1024;

/// Everything that can go wrong loading a PDF. `Display` is the banner text.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("PDF too large, max 10MB allowed")]
    TooLarge,

    #[error("Only .pdf files can be uploaded")]
    NotPdf,

    #[error("Could not read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backend answered with a non-success status
    #[error("Failed to load PDF: {0}")]
    Rejected(String),

    /// Request never got a usable answer
    #[error("Upload failed: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadReceipt {
    pub characters: u64,
    #[serde(default)]
    pub message: Option<String>,
}

impl UploadReceipt {
    pub fn summary(&self) -> String {
        format!("✅ PDF loaded successfully ({} characters).", self.characters)
    }
}

/// A local file that passed validation and may be sent to the backend
#[derive(Debug, Clone)]
pub struct PdfFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

impl PdfFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();

        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return Err(UploadError::NotPdf);
        }

        let metadata = std::fs::metadata(path).map_err(|source| UploadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        check_size(metadata.len())?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
        })
    }
}

pub fn check_size(size: u64) -> Result<(), UploadError> {
    if size > MAX_PDF_BYTES {
        tracing::warn!(size, limit = MAX_PDF_BYTES, "rejecting oversize pdf");
        return Err(UploadError::TooLarge);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_size_limit_is_inclusive() {
        assert!(check_size(MAX_PDF_BYTES).is_ok());
        assert!(matches!(
            check_size(MAX_PDF_BYTES + 1),
            Err(UploadError::TooLarge)
        ));
    }

    #[test]
    fn test_oversize_message_text() {
        let err = check_size(MAX_PDF_BYTES * 3).unwrap_err();
        assert_eq!(err.to_string(), "PDF too large, max 10MB allowed");
    }

    #[test]
    fn test_open_rejects_oversize_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.pdf");
        File::create(&path).unwrap().set_len(MAX_PDF_BYTES + 1).unwrap();

        assert!(matches!(PdfFile::open(&path), Err(UploadError::TooLarge)));
    }

    #[test]
    fn test_open_accepts_uppercase_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Report.PDF");
        File::create(&path).unwrap().set_len(2 * 1024 * 1024).unwrap();

        let file = PdfFile::open(&path).unwrap();
        assert_eq!(file.name, "Report.PDF");
        assert_eq!(file.size, 2 * 1024 * 1024);
    }

    #[test]
    fn test_open_rejects_other_extensions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        File::create(&path).unwrap();

        assert!(matches!(PdfFile::open(&path), Err(UploadError::NotPdf)));
    }

    #[test]
    fn test_open_missing_file() {
        let err = PdfFile::open("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, UploadError::Read { .. }));
        assert!(err.to_string().starts_with("Could not read /definitely/not/here.pdf"));
    }

    #[test]
    fn test_summary_text() {
        let receipt = UploadReceipt { characters: 4200, message: None };
        assert_eq!(receipt.summary(), "✅ PDF loaded successfully (4200 characters).");
    }
}
