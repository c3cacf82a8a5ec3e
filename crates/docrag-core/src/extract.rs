//! Text extraction for the supported source formats.
//!
//! Plain text is decoded as strict UTF-8. PDFs are parsed with `lopdf` and the
//! per-page text is concatenated in page order without a separator.

use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

/// Source formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    PlainText,
    Pdf,
}

impl FileKind {
    /// Resolve from a file name's extension, case-insensitively.
    /// `None` means the type is unsupported and the file should be skipped.
    pub fn from_filename(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("txt") {
            Some(FileKind::PlainText)
        } else if ext.eq_ignore_ascii_case("pdf") {
            Some(FileKind::Pdf)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            FileKind::PlainText => "txt",
            FileKind::Pdf => "pdf",
        }
    }
}

/// Produce the full text content of `bytes` interpreted as `kind`.
pub fn extract_text(kind: FileKind, bytes: &[u8]) -> Result<String> {
    match kind {
        FileKind::PlainText => decode_utf8(bytes),
        FileKind::Pdf => extract_pdf_text(bytes),
    }
}

fn decode_utf8(bytes: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(bytes).map_err(|e| Error::Extraction(format!("invalid UTF-8: {e}")))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string())
}

fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| Error::Extraction(format!("malformed PDF: {e}")))?;
    let pages = doc.get_pages();
    debug!("Extracting {} PDF pages", pages.len());
    let mut text = String::new();
    // BTreeMap keys are page numbers, so iteration is in page order.
    for page_number in pages.keys() {
        let page_text = doc
            .extract_text(&[*page_number])
            .map_err(|e| Error::Extraction(format!("page {page_number}: {e}")))?;
        text.push_str(&page_text);
    }
    Ok(text)
}
