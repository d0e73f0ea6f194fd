//! Download location fallback and extraction against mock HTTP servers

mod common;

use cnpj_ingest::fetch::Fetcher;
use cnpj_ingest::IngestError;
use common::{init_tracing, mount_archive, mount_download, mount_html_probe, zip_bytes};
use std::time::Duration;
use wiremock::MockServer;

fn fetcher(mirrors: Vec<String>, work_dir: &std::path::Path) -> Fetcher {
    Fetcher::new(
        reqwest::Client::new(),
        mirrors,
        work_dir,
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn test_mirror_selected_when_primary_serves_html() {
    init_tracing();
    let primary = MockServer::start().await;
    let mirror = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_html_probe(&primary, "/CNPJ/K1.ESTABELE.zip").await;
    mount_archive(
        &mirror,
        "/socios-brasil/K1.ESTABELE.zip",
        zip_bytes("K1.ESTABELE", b"\"1\"\n"),
    )
    .await;

    let fetcher = fetcher(vec![format!("{}/socios-brasil/", mirror.uri())], dir.path());
    let file_url = format!("{}/CNPJ/K1.ESTABELE.zip", primary.uri());

    let chosen = fetcher.resolve_download_url(&file_url).await.unwrap();
    assert_eq!(
        chosen.as_str(),
        format!("{}/socios-brasil/K1.ESTABELE.zip", mirror.uri())
    );
}

#[tokio::test]
async fn test_primary_preferred_when_it_serves_zip() {
    let primary = MockServer::start().await;
    let mirror = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_archive(&primary, "/CNPJ/K1.EMPRECSV.zip", zip_bytes("K1.EMPRECSV", b"")).await;
    mount_archive(&mirror, "/K1.EMPRECSV.zip", zip_bytes("K1.EMPRECSV", b"")).await;

    let fetcher = fetcher(vec![mirror.uri()], dir.path());
    let file_url = format!("{}/CNPJ/K1.EMPRECSV.zip", primary.uri());

    let chosen = fetcher.resolve_download_url(&file_url).await.unwrap();
    assert_eq!(chosen.as_str(), file_url);
}

#[tokio::test]
async fn test_no_qualifying_location_is_an_error() {
    let primary = MockServer::start().await;
    let mirror = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_html_probe(&primary, "/CNPJ/K1.EMPRECSV.zip").await;
    // The mirror has no route at all and answers 404

    let fetcher = fetcher(vec![mirror.uri()], dir.path());
    let result = fetcher
        .fetch_and_extract(&format!("{}/CNPJ/K1.EMPRECSV.zip", primary.uri()))
        .await;

    assert!(matches!(result, Err(IngestError::NoArchiveSource { .. })));
}

#[tokio::test]
async fn test_fetch_and_extract_returns_payload_path() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_archive(
        &server,
        "/CNPJ/F.K03200$Z.D10111.MUNICCSV.zip",
        zip_bytes("F.K03200$Z.D10111.MUNICCSV", b"\"8327\";\"SAO JOSE\"\n"),
    )
    .await;

    let fetcher = fetcher(Vec::new(), dir.path());
    let payload = fetcher
        .fetch_and_extract(&format!("{}/CNPJ/F.K03200$Z.D10111.MUNICCSV.zip", server.uri()))
        .await
        .unwrap();

    assert_eq!(payload, dir.path().join("F.K03200$Z.D10111.MUNICCSV"));
    assert!(dir.path().join("F.K03200$Z.D10111.MUNICCSV.zip").exists());
    assert_eq!(
        std::fs::read_to_string(payload).unwrap(),
        "\"8327\";\"SAO JOSE\"\n"
    );
}

#[tokio::test]
async fn test_empty_archive_reported() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        zip.finish().unwrap();
    }
    mount_archive(&server, "/empty.zip", cursor.into_inner()).await;

    let result = fetcher(Vec::new(), dir.path())
        .fetch_and_extract(&format!("{}/empty.zip", server.uri()))
        .await;

    assert!(matches!(result, Err(IngestError::EmptyArchive(_))));
}

#[tokio::test]
async fn test_direct_fetch_skips_content_type_check() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let route = "/CNPJ/F.K03200$Z.D10111.MOTICSV.zip";

    mount_html_probe(&server, route).await;
    mount_download(
        &server,
        route,
        zip_bytes("F.K03200$Z.D10111.MOTICSV", b"\"71\";\"INAPTIDAO\"\n"),
    )
    .await;

    let fetcher = fetcher(Vec::new(), dir.path());
    let file_url = format!("{}{}", server.uri(), route);

    assert!(matches!(
        fetcher.fetch_and_extract(&file_url).await,
        Err(IngestError::NoArchiveSource { .. })
    ));

    let payload = fetcher.fetch_direct(&file_url).await.unwrap();
    assert_eq!(payload, dir.path().join("F.K03200$Z.D10111.MOTICSV"));
    assert_eq!(
        std::fs::read_to_string(payload).unwrap(),
        "\"71\";\"INAPTIDAO\"\n"
    );
}
