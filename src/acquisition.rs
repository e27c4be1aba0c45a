//! Remote document acquisition with a layered retry/fallback strategy.
//!
//! A document reference is classified as a file or folder link, then
//! resolved to local PDF files. Single files go through two tiers: an
//! unauthenticated streaming download (which may require answering the
//! host's interstitial "confirm download" cookie), then an authenticated
//! API stream when a service credential is configured. Folder references
//! require the credential up front for listing; each member then runs the
//! same two-tier download and failing members are skipped by the caller.
//!
//! Every saved file is validated against the PDF magic signature; a file
//! that fails validation is deleted before the error propagates, so no
//! partial downloads survive.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use futures_util::StreamExt;
use regex::Regex;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderName};
use reqwest::{Client, Response};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::pdf;
use crate::types::FathomError;

static FILE_LINK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"drive\.google\.com/file/d/([A-Za-z0-9_-]{20,})",
        r"drive\.google\.com/open\?id=([A-Za-z0-9_-]{20,})",
        r"drive\.google\.com/uc\?export=download&id=([A-Za-z0-9_-]{20,})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("file link pattern"))
    .collect()
});

static FOLDER_LINK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"drive\.google\.com/drive/folders/([A-Za-z0-9_-]{20,})"]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("folder link pattern"))
        .collect()
});

static DISPOSITION_FILENAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r#"filename="([^"]+)""#, r"filename\*=UTF-8''([^;]+)"]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("disposition pattern"))
        .collect()
});

/// A classified document reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentRef {
    File(String),
    Folder(String),
}

/// Classifies `reference` as a file or folder link.
///
/// Anything else is a classification failure: reported immediately, never
/// retried.
pub fn classify_reference(reference: &str) -> Result<DocumentRef, FathomError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(FathomError::Classification("empty reference".into()));
    }
    if let Some(id) = capture_id(reference, &FILE_LINK_PATTERNS) {
        return Ok(DocumentRef::File(id));
    }
    if let Some(id) = capture_id(reference, &FOLDER_LINK_PATTERNS) {
        return Ok(DocumentRef::Folder(id));
    }
    Err(FathomError::Classification(format!(
        "'{reference}' is neither a recognized file nor folder link"
    )))
}

fn capture_id(reference: &str, patterns: &[Regex]) -> Option<String> {
    patterns
        .iter()
        .find_map(|pattern| pattern.captures(reference))
        .map(|captures| captures[1].to_string())
}

/// Acquisition tuning knobs.
///
/// Base URLs and backoff units are parameters so the retry/escalation chain
/// can run against a mock host in tests; the defaults match the real
/// service.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    pub public_base: Url,
    pub api_base: Url,
    pub download_dir: PathBuf,
    pub public_attempts: u32,
    pub authenticated_attempts: u32,
    pub public_backoff: Duration,
    pub authenticated_backoff: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            public_base: Url::parse("https://drive.google.com").expect("public base url"),
            api_base: Url::parse("https://www.googleapis.com").expect("api base url"),
            download_dir: PathBuf::from("data/tmp"),
            public_attempts: 3,
            authenticated_attempts: 4,
            public_backoff: Duration::from_millis(1200),
            authenticated_backoff: Duration::from_millis(1500),
        }
    }
}

/// A resolved document: where it landed on disk, its display name, and the
/// reference it originated from.
#[derive(Debug, Clone)]
pub struct AcquiredFile {
    pub path: PathBuf,
    pub filename: String,
    pub source_url: String,
}

/// One child of a listed folder.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub web_view_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListPage {
    #[serde(default)]
    files: Vec<DriveEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Resolves remote document references into local PDF files.
pub struct DriveAcquirer {
    client: Client,
    config: AcquisitionConfig,
    credential: Option<String>,
}

impl DriveAcquirer {
    pub fn new(client: Client, config: AcquisitionConfig, credential: Option<String>) -> Self {
        Self {
            client,
            config,
            credential,
        }
    }

    /// Resolves a single file id through the two-tier download chain.
    ///
    /// The public tier is exhausted first; on total failure the
    /// authenticated tier takes over, which requires a configured
    /// credential and otherwise fails hard.
    pub async fn acquire_file(
        &self,
        file_id: &str,
        origin_url: &str,
    ) -> Result<AcquiredFile, FathomError> {
        match self.download_public(file_id, None).await {
            Ok((path, filename)) => Ok(AcquiredFile {
                path,
                filename,
                source_url: origin_url.to_string(),
            }),
            Err(public_err) => {
                tracing::warn!(
                    file_id,
                    error = %public_err,
                    "public tier exhausted, escalating to authenticated download"
                );
                let filename = format!("{file_id}.pdf");
                let dest = self.config.download_dir.join(&filename);
                self.download_authenticated(file_id, &dest).await?;
                Ok(AcquiredFile {
                    path: dest,
                    filename,
                    source_url: origin_url.to_string(),
                })
            }
        }
    }

    /// Resolves one listed folder member through the same two-tier chain,
    /// downloading to a destination keyed by the member's stable display
    /// name so concurrent members never share a path.
    pub async fn acquire_folder_member(
        &self,
        entry: &DriveEntry,
        folder_url: &str,
    ) -> Result<AcquiredFile, FathomError> {
        let filename = sanitize_filename(&entry.name);
        let dest = self.config.download_dir.join(&filename);
        let source_url = entry
            .web_view_link
            .clone()
            .unwrap_or_else(|| folder_url.to_string());

        if let Err(public_err) = self.download_public(&entry.id, Some(&dest)).await {
            tracing::warn!(
                file_id = %entry.id,
                name = %entry.name,
                error = %public_err,
                "public tier exhausted for folder member, escalating"
            );
            self.download_authenticated(&entry.id, &dest).await?;
        }

        Ok(AcquiredFile {
            path: dest,
            filename,
            source_url,
        })
    }

    /// Lists every PDF-typed, non-trashed child of `folder_id`, following
    /// continuation tokens until the listing is exhausted. Requires a
    /// configured credential; there is no unauthenticated listing tier.
    pub async fn list_folder_pdfs(&self, folder_id: &str) -> Result<Vec<DriveEntry>, FathomError> {
        let Some(token) = &self.credential else {
            return Err(FathomError::Acquisition(
                "no service credential configured; cannot list a folder".into(),
            ));
        };

        let url = self.api_endpoint("drive/v3/files")?;
        let query = format!(
            "'{folder_id}' in parents and mimeType='application/pdf' and trashed=false"
        );

        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.client.get(url.clone()).bearer_auth(token).query(&[
                ("q", query.as_str()),
                ("fields", "nextPageToken, files(id,name,webViewLink)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ]);
            if let Some(page_token) = &page_token {
                request = request.query(&[("pageToken", page_token.as_str())]);
            }

            let page: FileListPage = request
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            entries.extend(page.files);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(entries)
    }

    async fn download_public(
        &self,
        file_id: &str,
        dest_override: Option<&Path>,
    ) -> Result<(PathBuf, String), FathomError> {
        tokio::fs::create_dir_all(&self.config.download_dir).await?;
        let url = self.public_download_url(file_id)?;

        let mut last_err = None;
        for attempt in 1..=self.config.public_attempts {
            match self.public_attempt(file_id, &url, dest_override).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    tracing::debug!(file_id, attempt, error = %err, "public download attempt failed");
                    last_err = Some(err);
                    if attempt < self.config.public_attempts {
                        tokio::time::sleep(self.config.public_backoff * attempt).await;
                    }
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| FathomError::Acquisition("public download failed".into())))
    }

    async fn public_attempt(
        &self,
        file_id: &str,
        url: &Url,
        dest_override: Option<&Path>,
    ) -> Result<(PathBuf, String), FathomError> {
        let mut response = self.client.get(url.clone()).send().await?.error_for_status()?;
        let mut disposition = header_string(&response, CONTENT_DISPOSITION);

        // No advertised filename means the host served its interstitial
        // page; answer it with the warning cookie's token.
        if !disposition.to_ascii_lowercase().contains("filename") {
            let confirm_token = response
                .cookies()
                .find(|cookie| cookie.name().starts_with("download_warning"))
                .map(|cookie| cookie.value().to_string());
            if let Some(confirm_token) = confirm_token {
                let mut confirm_url = url.clone();
                confirm_url
                    .query_pairs_mut()
                    .append_pair("confirm", &confirm_token);
                response = self
                    .client
                    .get(confirm_url)
                    .send()
                    .await?
                    .error_for_status()?;
                disposition = header_string(&response, CONTENT_DISPOSITION);
            }
        }

        let (dest, filename) = match dest_override {
            Some(path) => (
                path.to_path_buf(),
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| format!("{file_id}.pdf")),
            ),
            None => {
                let name = ensure_pdf_suffix(
                    disposition_filename(&disposition)
                        .unwrap_or_else(|| format!("{file_id}.pdf")),
                );
                (self.config.download_dir.join(&name), name)
            }
        };

        let content_type = header_string(&response, CONTENT_TYPE).to_ascii_lowercase();
        stream_to_file(response, &dest).await?;

        if !content_type.contains("pdf") && !pdf::looks_like_pdf(&dest).await {
            remove_partial(&dest).await;
            return Err(FathomError::Acquisition(format!(
                "public download returned non-PDF content-type: {content_type}"
            )));
        }
        if !pdf::looks_like_pdf(&dest).await {
            remove_partial(&dest).await;
            return Err(FathomError::Acquisition(
                "public download saved a file without the PDF signature".into(),
            ));
        }

        Ok((dest, filename))
    }

    async fn download_authenticated(
        &self,
        file_id: &str,
        dest: &Path,
    ) -> Result<(), FathomError> {
        let Some(token) = &self.credential else {
            return Err(FathomError::Acquisition(
                "no service credential configured for authenticated download".into(),
            ));
        };

        tokio::fs::create_dir_all(&self.config.download_dir).await?;
        let mut url = self.api_endpoint(&format!("drive/v3/files/{file_id}"))?;
        url.query_pairs_mut().append_pair("alt", "media");

        let mut last_err = None;
        for attempt in 1..=self.config.authenticated_attempts {
            let result = self.authenticated_attempt(&url, token, dest).await;
            match result {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::debug!(file_id, attempt, error = %err, "authenticated download attempt failed");
                    last_err = Some(err);
                    if attempt < self.config.authenticated_attempts {
                        tokio::time::sleep(self.config.authenticated_backoff * attempt).await;
                    }
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| FathomError::Acquisition("authenticated download failed".into())))
    }

    async fn authenticated_attempt(
        &self,
        url: &Url,
        token: &str,
        dest: &Path,
    ) -> Result<(), FathomError> {
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;
        stream_to_file(response, dest).await?;

        if !pdf::looks_like_pdf(dest).await {
            remove_partial(dest).await;
            return Err(FathomError::Acquisition(
                "authenticated download returned non-PDF content".into(),
            ));
        }
        Ok(())
    }

    fn public_download_url(&self, file_id: &str) -> Result<Url, FathomError> {
        let mut url = self
            .config
            .public_base
            .join("uc")
            .map_err(|err| FathomError::Acquisition(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("export", "download")
            .append_pair("id", file_id);
        Ok(url)
    }

    fn api_endpoint(&self, path: &str) -> Result<Url, FathomError> {
        self.config
            .api_base
            .join(path)
            .map_err(|err| FathomError::Acquisition(err.to_string()))
    }
}

async fn stream_to_file(response: Response, dest: &Path) -> Result<(), FathomError> {
    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

async fn remove_partial(dest: &Path) {
    if let Err(err) = tokio::fs::remove_file(dest).await {
        tracing::debug!(path = %dest.display(), error = %err, "could not remove partial download");
    }
}

fn header_string(response: &Response, name: HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn disposition_filename(disposition: &str) -> Option<String> {
    DISPOSITION_FILENAME_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(disposition))
        .map(|captures| captures[1].to_string())
}

fn ensure_pdf_suffix(mut name: String) -> String {
    if !name.to_ascii_lowercase().ends_with(".pdf") {
        name.push_str(".pdf");
    }
    name
}

fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    ensure_pdf_suffix(sanitized)
}
