//! Folder-ingestion integration tests: listing, concurrent two-tier
//! downloads, skip accounting, and the zero-success failure rule.

use std::time::Duration;

use httpmock::prelude::*;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use url::Url;

use fathom::acquisition::{AcquisitionConfig, DriveAcquirer};
use fathom::assembler::ChunkAssembler;
use fathom::embeddings::MockEmbeddingProvider;
use fathom::ingest::Ingestor;
use fathom::stores::ElasticStore;
use fathom::types::FathomError;

const FOLDER_ID: &str = "9zY8xW7vU6tS5rQ4pO3nM2lK";
const FOLDER_URL: &str = "https://drive.google.com/drive/folders/9zY8xW7vU6tS5rQ4pO3nM2lK";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Builds a small but structurally valid single-page PDF whose page shows
/// `text`, xref offsets included.
fn minimal_pdf(text: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::new();
    for (index, object) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{}\nendobj\n", index + 1, object));
    }
    let xref_start = out.len();
    out.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
    out.push_str("0000000000 65535 f \n");
    for offset in &offsets {
        out.push_str(&format!("{offset:010} 00000 n \n"));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_start
    ));
    out.into_bytes()
}

fn acquisition_config(server: &MockServer, download_dir: &std::path::Path) -> AcquisitionConfig {
    AcquisitionConfig {
        public_base: Url::parse(&server.base_url()).unwrap(),
        api_base: Url::parse(&server.base_url()).unwrap(),
        download_dir: download_dir.to_path_buf(),
        public_backoff: Duration::from_millis(1),
        authenticated_backoff: Duration::from_millis(1),
        ..AcquisitionConfig::default()
    }
}

fn ingestor(server: &MockServer, download_dir: &std::path::Path) -> Ingestor {
    let store = ElasticStore::from_url(Client::new(), &server.base_url()).unwrap();
    let assembler = ChunkAssembler::new(Arc::new(MockEmbeddingProvider::new()));
    let acquirer = DriveAcquirer::new(
        Client::new(),
        acquisition_config(server, download_dir),
        Some("token-abc".into()),
    );
    Ingestor::new(store, assembler, acquirer, "docs", None)
}

fn listing_entry(id: &str, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "webViewLink": format!("https://drive.google.com/file/d/{id}/view"),
    })
}

async fn mock_store_endpoints(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(httpmock::Method::HEAD).path("/docs");
            then.status(200);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/_bulk");
            then.status(200).json_body(json!({"errors": false, "items": []}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/docs/_refresh");
            then.status(200).json_body(json!({}));
        })
        .await;
}

#[tokio::test]
async fn partial_folder_success_reports_counts_without_failing() {
    init_tracing();
    let server = MockServer::start_async().await;
    let dir = tempfile::tempdir().unwrap();

    let good = [
        ("okfileAAAAAAAAAAAAAAAA01", "alpha.pdf", "Alpha rules of the road"),
        ("okfileAAAAAAAAAAAAAAAA02", "bravo.pdf", "Bravo steering and sailing"),
        ("okfileAAAAAAAAAAAAAAAA03", "charlie.pdf", "Charlie lights and shapes"),
    ];
    let bad = ["badfileAAAAAAAAAAAAAAA04", "badfileAAAAAAAAAAAAAAA05"];

    let mut files = Vec::new();
    for (id, name, _) in &good {
        files.push(listing_entry(id, name));
    }
    for (id, index) in bad.iter().zip(4..) {
        files.push(listing_entry(id, &format!("broken{index}.pdf")));
    }

    server
        .mock_async(|when, then| {
            when.method(GET).path("/drive/v3/files").query_param(
                "q",
                format!(
                    "'{FOLDER_ID}' in parents and mimeType='application/pdf' and trashed=false"
                ),
            );
            then.status(200).json_body(json!({"files": files}));
        })
        .await;

    for (id, _, text) in &good {
        let body = minimal_pdf(text);
        server
            .mock_async(move |when, then| {
                when.method(GET).path("/uc").query_param("id", *id);
                then.status(200)
                    .header("content-type", "application/pdf")
                    .body(body);
            })
            .await;
    }
    for id in &bad {
        server
            .mock_async(|when, then| {
                when.method(GET).path("/uc").query_param("id", *id);
                then.status(200)
                    .header("content-type", "text/html")
                    .body("<html>permission denied</html>");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/drive/v3/files/{id}"));
                then.status(404);
            })
            .await;
    }
    mock_store_endpoints(&server).await;

    let report = ingestor(&server, dir.path())
        .ingest_reference(FOLDER_URL, None)
        .await
        .unwrap();

    // One chunk per successful single-page document; both failures skipped.
    assert_eq!(report.indexed, 3);
    assert_eq!(report.skipped, 2);

    // Each success landed under its stable display name.
    for (_, name, _) in &good {
        let saved = tokio::fs::read(dir.path().join(name)).await.unwrap();
        assert!(saved.starts_with(b"%PDF-"));
    }
}

#[tokio::test]
async fn folder_with_zero_successes_fails_with_the_skip_count() {
    let server = MockServer::start_async().await;
    let dir = tempfile::tempdir().unwrap();

    let ids = ["badfileAAAAAAAAAAAAAAA11", "badfileAAAAAAAAAAAAAAA12"];
    let files: Vec<_> = ids
        .iter()
        .enumerate()
        .map(|(index, id)| listing_entry(id, &format!("broken{index}.pdf")))
        .collect();

    server
        .mock_async(|when, then| {
            when.method(GET).path("/drive/v3/files").query_param_exists("q");
            then.status(200).json_body(json!({"files": files}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/uc");
            then.status(200)
                .header("content-type", "text/html")
                .body("<html>nope</html>");
        })
        .await;
    for id in &ids {
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/drive/v3/files/{id}"));
                then.status(404);
            })
            .await;
    }
    mock_store_endpoints(&server).await;

    let err = ingestor(&server, dir.path())
        .ingest_reference(FOLDER_URL, None)
        .await
        .unwrap_err();

    match err {
        FathomError::Acquisition(message) => {
            assert!(message.contains("skipped=2"), "got: {message}")
        }
        other => panic!("expected acquisition error, got {other}"),
    }
}

#[tokio::test]
async fn listing_follows_continuation_tokens() {
    let server = MockServer::start_async().await;
    let dir = tempfile::tempdir().unwrap();

    let first_page = server
        .mock_async(|when, then| {
            when.method(GET).path("/drive/v3/files").matches(|req| {
                req.query_params
                    .as_ref()
                    .is_none_or(|params| !params.iter().any(|(key, _)| key == "pageToken"))
            });
            then.status(200).json_body(json!({
                "files": [listing_entry("okfileAAAAAAAAAAAAAAAA21", "one.pdf")],
                "nextPageToken": "page-two",
            }));
        })
        .await;
    let second_page = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/drive/v3/files")
                .query_param("pageToken", "page-two");
            then.status(200).json_body(json!({
                "files": [listing_entry("okfileAAAAAAAAAAAAAAAA22", "two.pdf")],
            }));
        })
        .await;

    let acquirer = DriveAcquirer::new(
        Client::new(),
        acquisition_config(&server, dir.path()),
        Some("token-abc".into()),
    );
    let entries = acquirer.list_folder_pdfs(FOLDER_ID).await.unwrap();

    first_page.assert_hits_async(1).await;
    second_page.assert_hits_async(1).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "one.pdf");
    assert_eq!(entries[1].name, "two.pdf");
}

#[tokio::test]
async fn single_file_reference_ingests_with_document_chunk_ids() {
    let server = MockServer::start_async().await;
    let dir = tempfile::tempdir().unwrap();

    let body = minimal_pdf("Rule 13 basics for the overtaking vessel");
    server
        .mock_async(move |when, then| {
            when.method(GET)
                .path("/uc")
                .query_param("id", "1aB2cD3eF4gH5iJ6kL7mN8oP");
            then.status(200)
                .header("content-type", "application/pdf")
                .header(
                    "content-disposition",
                    r#"attachment; filename="NavRules.pdf""#,
                )
                .body(body);
        })
        .await;
    let bulk = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/_bulk")
                .body_contains("NavRules.pdf__0000");
            then.status(200).json_body(json!({"errors": false, "items": []}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(httpmock::Method::HEAD).path("/docs");
            then.status(200);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/docs/_refresh");
            then.status(200).json_body(json!({}));
        })
        .await;

    let report = ingestor(&server, dir.path())
        .ingest_reference(
            "https://drive.google.com/file/d/1aB2cD3eF4gH5iJ6kL7mN8oP/view",
            None,
        )
        .await
        .unwrap();

    bulk.assert_hits_async(1).await;
    assert_eq!(report.indexed, 1);
    assert_eq!(report.skipped, 0);
}

#[tokio::test]
async fn local_folder_ingest_uses_page_exact_chunk_ids() {
    let server = MockServer::start_async().await;
    let download_dir = tempfile::tempdir().unwrap();
    let corpus = tempfile::tempdir().unwrap();

    tokio::fs::write(
        corpus.path().join("local.pdf"),
        minimal_pdf("Local corpus text for page one"),
    )
    .await
    .unwrap();

    let bulk = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/_bulk")
                .body_contains("local.pdf__p001_00")
                .body_contains("\"url\":\"file://");
            then.status(200).json_body(json!({"errors": false, "items": []}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(httpmock::Method::HEAD).path("/docs");
            then.status(200);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/docs/_refresh");
            then.status(200).json_body(json!({}));
        })
        .await;

    let indexed = ingestor(&server, download_dir.path())
        .ingest_local_folder(corpus.path())
        .await
        .unwrap();

    bulk.assert_hits_async(1).await;
    assert_eq!(indexed, 1);
}

#[tokio::test]
async fn listing_a_folder_without_credential_is_a_hard_precondition_failure() {
    let server = MockServer::start_async().await;
    let dir = tempfile::tempdir().unwrap();

    let acquirer =
        DriveAcquirer::new(Client::new(), acquisition_config(&server, dir.path()), None);
    let err = acquirer.list_folder_pdfs(FOLDER_ID).await.unwrap_err();
    assert!(matches!(err, FathomError::Acquisition(_)));
}
