//! End-to-end ingestion flows.
//!
//! Three entry points feed the same sink: a local folder walk (page-exact
//! assembly), a remote single-file reference, and a remote folder reference
//! (both full-document assembly). Folder members run their whole
//! download/validate/chunk/index sequence as independent concurrent tasks;
//! a member that fails every acquisition tier is skipped and counted, and
//! the run fails only when nothing at all was ingested.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::{StreamExt, TryStreamExt, stream};

use crate::acquisition::{AcquiredFile, DocumentRef, DriveAcquirer, classify_reference};
use crate::assembler::ChunkAssembler;
use crate::stores::ElasticStore;
use crate::types::{FathomError, IngestReport};

pub struct Ingestor {
    store: ElasticStore,
    assembler: Arc<ChunkAssembler>,
    acquirer: Arc<DriveAcquirer>,
    index: String,
    enrichment_pipeline: Option<String>,
    concurrency: usize,
}

impl Ingestor {
    pub fn new(
        store: ElasticStore,
        assembler: ChunkAssembler,
        acquirer: DriveAcquirer,
        index: impl Into<String>,
        enrichment_pipeline: Option<String>,
    ) -> Self {
        Self {
            store,
            assembler: Arc::new(assembler),
            acquirer: Arc::new(acquirer),
            index: index.into(),
            enrichment_pipeline,
            concurrency: 4,
        }
    }

    /// Caps the number of folder members ingested concurrently.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Walks `folder` recursively and ingests every PDF with exact
    /// per-page metadata. Unreadable documents contribute zero records.
    /// Returns the number of chunk records written.
    pub async fn ingest_local_folder(&self, folder: &Path) -> Result<usize, FathomError> {
        self.store.ensure_index(&self.index).await?;

        let mut total = 0;
        for path in collect_pdfs(folder).await? {
            let bytes = tokio::fs::read(&path).await?;
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let url = format!("file://{}", path.to_string_lossy().replace('\\', "/"));

            let records = self.assembler.assemble_pages(&bytes, &filename, &url).await?;
            total += self
                .store
                .bulk_index(&self.index, &records, self.enrichment_pipeline.as_deref())
                .await?;
        }
        Ok(total)
    }

    /// Ingests a remote document reference, file or folder.
    ///
    /// `limit`, when given, truncates a folder listing to its first N
    /// members. Classification failures surface immediately; folder member
    /// failures are skipped and counted in the report.
    pub async fn ingest_reference(
        &self,
        reference: &str,
        limit: Option<usize>,
    ) -> Result<IngestReport, FathomError> {
        self.store.ensure_index(&self.index).await?;

        match classify_reference(reference)? {
            DocumentRef::File(file_id) => {
                let acquired = self.acquirer.acquire_file(&file_id, reference).await?;
                let indexed = self.ingest_acquired(&acquired).await?;
                Ok(IngestReport { indexed, skipped: 0 })
            }
            DocumentRef::Folder(folder_id) => {
                self.ingest_folder(&folder_id, reference, limit).await
            }
        }
    }

    async fn ingest_folder(
        &self,
        folder_id: &str,
        folder_url: &str,
        limit: Option<usize>,
    ) -> Result<IngestReport, FathomError> {
        let mut entries = self.acquirer.list_folder_pdfs(folder_id).await?;
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        tracing::info!(folder_id, files = entries.len(), "listed folder members");

        let report = stream::iter(entries.into_iter().map(|entry| {
            async move {
                // Acquisition failures downgrade to a skip; anything past a
                // successful download (embedding, storage) stays fatal.
                match self.acquirer.acquire_folder_member(&entry, folder_url).await {
                    Ok(acquired) => {
                        let indexed = self.ingest_acquired(&acquired).await?;
                        Ok::<_, FathomError>(IngestReport { indexed, skipped: 0 })
                    }
                    Err(err) => {
                        tracing::warn!(name = %entry.name, error = %err, "skipping folder member");
                        Ok(IngestReport { indexed: 0, skipped: 1 })
                    }
                }
            }
        }))
        .buffer_unordered(self.concurrency)
        .try_fold(IngestReport::default(), |mut report, outcome| async move {
            report.merge(outcome);
            Ok(report)
        })
        .await?;

        if report.indexed == 0 {
            return Err(FathomError::Acquisition(format!(
                "no valid PDFs ingested from folder (skipped={})",
                report.skipped
            )));
        }
        Ok(report)
    }

    async fn ingest_acquired(&self, acquired: &AcquiredFile) -> Result<usize, FathomError> {
        let bytes = tokio::fs::read(&acquired.path).await?;
        let records = self
            .assembler
            .assemble_document(&bytes, &acquired.filename, &acquired.source_url)
            .await?;
        self.store
            .bulk_index(&self.index, &records, self.enrichment_pipeline.as_deref())
            .await
    }
}

async fn collect_pdfs(root: &Path) -> Result<Vec<PathBuf>, FathomError> {
    let mut stack = vec![root.to_path_buf()];
    let mut pdfs = Vec::new();
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                stack.push(path);
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
            {
                pdfs.push(path);
            }
        }
    }
    pdfs.sort();
    Ok(pdfs)
}
