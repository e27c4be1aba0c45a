//! Chunk assembly: PDF bytes in, indexable chunk records out.
//!
//! Two modes cover the two ingestion paths. Per-page assembly drives the
//! page reader directly and attaches exact page numbers; full-document
//! assembly windows the whole text at once and estimates each window's page
//! afterwards. Either way, all windows of one page/document batch through
//! the embedding service in a single call, and the call order fixes the
//! `chunk_id` ordinals.

use std::sync::Arc;

use crate::embeddings::EmbeddingProvider;
use crate::pdf;
use crate::segmenter::{self, DEFAULT_OVERLAP_WORDS, DEFAULT_WINDOW_WORDS, PageLabels};
use crate::stores::ChunkRecord;
use crate::types::FathomError;

/// Builds chunk records from source documents.
pub struct ChunkAssembler {
    embedder: Arc<dyn EmbeddingProvider>,
    window_words: usize,
    overlap_words: usize,
}

impl ChunkAssembler {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            window_words: DEFAULT_WINDOW_WORDS,
            overlap_words: DEFAULT_OVERLAP_WORDS,
        }
    }

    /// Overrides the window geometry (mostly for tests and tuning runs).
    #[must_use]
    pub fn with_window(mut self, window_words: usize, overlap_words: usize) -> Self {
        self.window_words = window_words;
        self.overlap_words = overlap_words;
        self
    }

    /// Assembles records page by page with exact page numbers.
    ///
    /// A document that fails to parse yields zero records; the caller treats
    /// that as a skipped item, not a fault.
    pub async fn assemble_pages(
        &self,
        bytes: &[u8],
        filename: &str,
        url: &str,
    ) -> Result<Vec<ChunkRecord>, FathomError> {
        let pages = match pdf::read_pdf_pages(bytes) {
            Ok(pages) => pages,
            Err(err) => {
                tracing::warn!(filename, error = %err, "unreadable document, contributing zero records");
                return Ok(Vec::new());
            }
        };
        self.records_from_pages(&pages, filename, url).await
    }

    /// Assembles records from the whole document text at once.
    ///
    /// Page numbers are estimated by prefix search (see [`estimate_page`])
    /// and labels come from the estimated page; both are best-effort.
    pub async fn assemble_document(
        &self,
        bytes: &[u8],
        filename: &str,
        url: &str,
    ) -> Result<Vec<ChunkRecord>, FathomError> {
        let pages = match pdf::read_pdf_pages(bytes) {
            Ok(pages) => pages,
            Err(err) => {
                tracing::warn!(filename, error = %err, "unreadable document, contributing zero records");
                return Ok(Vec::new());
            }
        };
        self.records_from_document_text(&pages, filename, url).await
    }

    async fn records_from_pages(
        &self,
        pages: &[String],
        filename: &str,
        url: &str,
    ) -> Result<Vec<ChunkRecord>, FathomError> {
        let mut records = Vec::new();
        for (index, page_text) in pages.iter().enumerate() {
            let page_number = index as u32 + 1;
            let labels = segmenter::page_labels(page_text);
            let windows =
                segmenter::chunk_text(page_text, self.window_words, self.overlap_words);
            if windows.is_empty() {
                continue;
            }

            let embeddings = self.embedder.embed_batch(&windows).await?;
            for (ordinal, (text, embedding)) in windows.into_iter().zip(embeddings).enumerate() {
                records.push(self.record(
                    text,
                    embedding,
                    filename,
                    url,
                    format!("{filename}__p{page_number:03}_{ordinal:02}"),
                    Some(page_number),
                    &labels,
                ));
            }
        }
        Ok(records)
    }

    async fn records_from_document_text(
        &self,
        pages: &[String],
        filename: &str,
        url: &str,
    ) -> Result<Vec<ChunkRecord>, FathomError> {
        let text = pages.join("\n");
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let windows = segmenter::chunk_text(text, self.window_words, self.overlap_words);
        if windows.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.embedder.embed_batch(&windows).await?;
        let mut records = Vec::new();
        for (ordinal, (window, embedding)) in windows.into_iter().zip(embeddings).enumerate() {
            let page = estimate_page(&window, pages);
            let labels = page
                .and_then(|page| pages.get(page as usize - 1))
                .map(|page_text| segmenter::page_labels(page_text))
                .unwrap_or_default();
            records.push(self.record(
                window,
                embedding,
                filename,
                url,
                format!("{filename}__{ordinal:04}"),
                page,
                &labels,
            ));
        }
        Ok(records)
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        text: String,
        embedding: Vec<f32>,
        filename: &str,
        url: &str,
        chunk_id: String,
        page: Option<u32>,
        labels: &PageLabels,
    ) -> ChunkRecord {
        ChunkRecord {
            text,
            filename: filename.to_string(),
            url: url.to_string(),
            chunk_id,
            embedding,
            page,
            heading: labels.heading.clone(),
            section: labels.section.clone(),
            part_section: labels.part_section.clone(),
        }
    }
}

/// Estimates which page a window came from by searching for its leading
/// prefix (at most 32 characters) across the page texts, returning the
/// first page that contains it.
///
/// Best-effort: a window whose opening phrase also appears on an earlier
/// page is attributed to that earlier page, and a prefix broken across
/// lines in the source will not match at all.
pub fn estimate_page(chunk: &str, pages: &[String]) -> Option<u32> {
    let trimmed = chunk.trim();
    if trimmed.is_empty() {
        return None;
    }
    let prefix: String = trimmed.chars().take(32).collect();
    pages
        .iter()
        .position(|page| page.contains(prefix.as_str()))
        .map(|index| index as u32 + 1)
}
