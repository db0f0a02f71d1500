//! Page image acquisition.
//!
//! Images pass through unchanged. PDFs have their first page rendered to a
//! 300 DPI PNG with pdftoppm (from poppler-utils).

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

const PDFTOPPM_NOT_FOUND: &str =
    "pdftoppm not found. Install poppler-utils (apt install poppler-utils / brew install poppler)";

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("Empty input")]
    Empty,

    #[error("Unsupported content type: {0}")]
    UnsupportedType(String),

    #[error("PDF rasterizer not available: {0}")]
    RasterizerNotAvailable(String),

    #[error("PDF rasterization failed: {0}")]
    RasterizeFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One page ready for OCR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub bytes: Vec<u8>,
    /// MIME type of `bytes` (always an image type).
    pub mime_type: String,
    /// Whether the page was rendered from a PDF.
    pub from_pdf: bool,
}

/// Read a file and turn it into a page image.
pub fn load_page_image(path: &Path) -> Result<PageImage, AcquireError> {
    let bytes = fs::read(path)?;
    debug!("Loaded {} bytes from {}", bytes.len(), path.display());
    prepare_image_bytes(bytes)
}

/// Sniff raw upload bytes and return a page image.
pub fn prepare_image_bytes(bytes: Vec<u8>) -> Result<PageImage, AcquireError> {
    if bytes.is_empty() {
        return Err(AcquireError::Empty);
    }

    let kind = infer::get(&bytes);
    match kind.map(|k| k.mime_type()) {
        Some("application/pdf") => {
            let png = pdf_first_page_to_png(&bytes)?;
            Ok(PageImage {
                bytes: png,
                mime_type: "image/png".to_string(),
                from_pdf: true,
            })
        }
        Some(mime) if mime.starts_with("image/") => Ok(PageImage {
            mime_type: mime.to_string(),
            bytes,
            from_pdf: false,
        }),
        Some(mime) => Err(AcquireError::UnsupportedType(mime.to_string())),
        None => Err(AcquireError::UnsupportedType("unknown".to_string())),
    }
}

/// Render page 1 of an in-memory PDF to PNG bytes.
pub fn pdf_first_page_to_png(pdf: &[u8]) -> Result<Vec<u8>, AcquireError> {
    let temp = TempDir::new()?;
    let pdf_path = temp.path().join("input.pdf");
    fs::write(&pdf_path, pdf)?;

    let image_path = pdf_page_to_image(&pdf_path, 1, temp.path())?;
    Ok(fs::read(image_path)?)
}

/// Convert a PDF page to a 300 DPI PNG in `output_dir`.
pub fn pdf_page_to_image(
    pdf_path: &Path,
    page: u32,
    output_dir: &Path,
) -> Result<PathBuf, AcquireError> {
    let page_str = page.to_string();
    let output_prefix = output_dir.join("page");

    let status = Command::new("pdftoppm")
        .args(["-png", "-r", "300", "-f", &page_str, "-l", &page_str])
        .arg(pdf_path)
        .arg(&output_prefix)
        .status();

    match status {
        Ok(s) if s.success() => find_page_image(output_dir, page).ok_or_else(|| {
            AcquireError::RasterizeFailed(format!("No image generated for page {}", page))
        }),
        Ok(_) => Err(AcquireError::RasterizeFailed(
            "pdftoppm failed to convert PDF page".to_string(),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
            AcquireError::RasterizerNotAvailable(PDFTOPPM_NOT_FOUND.to_string()),
        ),
        Err(e) => Err(AcquireError::Io(e)),
    }
}

/// Find the image pdftoppm wrote for a page.
///
/// The zero-padding width depends on the document's page count
/// (page-1.png, page-01.png, page-001.png, ...).
pub fn find_page_image(dir: &Path, page: u32) -> Option<PathBuf> {
    for digits in [1, 2, 3, 4] {
        let path = dir.join(format!("page-{:0width$}.png", page, width = digits));
        if path.exists() {
            return Some(path);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(
            prepare_image_bytes(Vec::new()),
            Err(AcquireError::Empty)
        ));
    }

    #[test]
    fn test_png_passes_through() {
        let page = prepare_image_bytes(PNG_HEADER.to_vec()).unwrap();
        assert_eq!(page.mime_type, "image/png");
        assert_eq!(page.bytes, PNG_HEADER);
        assert!(!page.from_pdf);
    }

    #[test]
    fn test_unknown_bytes_rejected() {
        let err = prepare_image_bytes(b"just some text".to_vec()).unwrap_err();
        assert!(matches!(err, AcquireError::UnsupportedType(_)));
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scan.png");
        fs::write(&path, PNG_HEADER).unwrap();
        let page = load_page_image(&path).unwrap();
        assert_eq!(page.mime_type, "image/png");

        let missing = load_page_image(&temp.path().join("missing.png"));
        assert!(matches!(missing, Err(AcquireError::Io(_))));
    }

    #[test]
    fn test_find_page_image_padding() {
        let temp = TempDir::new().unwrap();
        assert!(find_page_image(temp.path(), 1).is_none());

        let path = temp.path().join("page-001.png");
        fs::write(&path, b"fake png").unwrap();
        assert_eq!(find_page_image(temp.path(), 1), Some(path));
    }
}
