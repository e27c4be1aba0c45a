//! PDF text extraction helpers.
//!
//! Extraction is whole-document: `pdf-extract` renders all text in one pass
//! and separates pages with form feeds, which we split back into a 1-based
//! page list. A page without recoverable text is kept as an empty string so
//! page numbering stays aligned with the source document.

use std::path::Path;

use crate::types::FathomError;

/// Leading bytes identifying the PDF format.
pub const PDF_MAGIC: &[u8; 5] = b"%PDF-";

/// Returns `true` when the file at `path` starts with the PDF magic
/// signature. Unreadable files are reported as non-PDF.
pub async fn looks_like_pdf(path: &Path) -> bool {
    match tokio::fs::read(path).await {
        Ok(bytes) => bytes.starts_with(PDF_MAGIC),
        Err(_) => false,
    }
}

/// Extracts per-page text from a PDF held in memory.
///
/// Errors only when the document itself cannot be parsed; callers on the
/// ingestion path absorb that into "zero records" per the batch contract.
pub fn read_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, FathomError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|err| FathomError::Extraction(err.to_string()))?;
    Ok(split_pages(&text))
}

/// Whole-document text: page texts joined by newlines, trimmed.
pub fn read_pdf_text(bytes: &[u8]) -> Result<String, FathomError> {
    let pages = read_pdf_pages(bytes)?;
    Ok(pages.join("\n").trim().to_string())
}

/// Splits extracted text on form-feed page separators.
///
/// `pdf-extract` emits `\x0C` between pages; extraction output without any
/// separator is treated as a single page.
fn split_pages(text: &str) -> Vec<String> {
    if text.contains('\x0C') {
        text.split('\x0C')
            .map(|page| page.trim().to_string())
            .collect()
    } else {
        vec![text.trim().to_string()]
    }
}
