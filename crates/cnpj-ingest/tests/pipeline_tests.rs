//! End-to-end pipeline runs against a mocked catalog, file server and store

mod common;

use chrono::NaiveDate;
use async_trait::async_trait;
use cnpj_common::types::{BaseCompany, Checkpoint, City, Establishment, RiskLevel, StatusReason};
use cnpj_ingest::catalog::HtmlCatalogResolver;
use cnpj_ingest::fetch::Fetcher;
use cnpj_ingest::freshness::GateDecision;
use cnpj_ingest::pipeline::{IngestPipeline, RunOptions};
use cnpj_ingest::schema::Schema;
use cnpj_ingest::storage::{
    Document, EntityKind, InMemoryStorage, Lookup, Storage, StorageExt, StoreError, StoreResult,
    Upserted, CHECKPOINT_KEY,
};
use common::{
    csv_row, establishment_row, init_tracing, mount_archive, mount_download, mount_html_probe,
    text_pdf, zip_bytes,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const SCHEMA: &str = include_str!("../../../config/cnpj-schema.json");

/// Catalog page plus the status and city tables it links to.
///
/// The tables answer HEAD with an HTML page; they are downloaded without a HEAD check.
async fn mock_release(server: &MockServer, date: &str, data_files: &[&str]) {
    let mut links: Vec<String> = data_files
        .iter()
        .map(|f| format!(r#"<li><a href="/CNPJ/{f}">{f}</a></li>"#))
        .collect();
    links.push(r#"<li><a href="/CNPJ/F.K03200$Z.D10111.MOTICSV.zip">Motivos</a></li>"#.to_string());
    links.push(r#"<li><a href="/CNPJ/F.K03200$Z.D10111.MUNICCSV.zip">Municipios</a></li>"#.to_string());

    let page = format!(
        "<html><body><p>Data da última extração: {}</p><ul>{}</ul></body></html>",
        date,
        links.join("")
    );

    Mock::given(method("GET"))
        .and(path("/dados-publicos-cnpj"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(page, "text/html"))
        .mount(server)
        .await;

    let status_route = "/CNPJ/F.K03200$Z.D10111.MOTICSV.zip";
    mount_html_probe(server, status_route).await;
    mount_download(
        server,
        status_route,
        zip_bytes(
            "F.K03200$Z.D10111.MOTICSV",
            csv_row(&["71", "INAPTIDAO (LEI 11.941/2009 ART.54)"]).as_bytes(),
        ),
    )
    .await;

    let city_route = "/CNPJ/F.K03200$Z.D10111.MUNICCSV.zip";
    mount_html_probe(server, city_route).await;
    mount_download(
        server,
        city_route,
        zip_bytes("F.K03200$Z.D10111.MUNICCSV", csv_row(&["8327", "SAO JOSE"]).as_bytes()),
    )
    .await;
}

/// NR-04 risk grade table. Without it the risk loader sees a 404.
async fn mock_risk_document(server: &MockServer) {
    let pdf = text_pdf(&[
        "07.10-3 Extracao de minerio de ferro 4",
        "61.20-5 Telecomunicacoes sem fio 2",
    ]);

    Mock::given(method("GET"))
        .and(path("/nr-04.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(pdf, "application/pdf"))
        .mount(server)
        .await;
}

async fn mock_data_files(server: &MockServer) {
    let mut companies = Vec::new();
    companies.extend_from_slice(
        csv_row(&["65747887", "FULANO DA SILVA 123.456.789-00", "2135", "50", "1000,00", "01", ""])
            .as_bytes(),
    );
    companies.extend_from_slice(b"\"11222333\";\"CONSTRU\xC7\xC3O LTDA\";\"2062\";\"49\";\"67000000000,00\";\"05\";\"\"\n");
    mount_archive(
        server,
        "/CNPJ/K1.EMPRECSV.zip",
        zip_bytes("K1.EMPRECSV", &companies),
    )
    .await;

    let establishments = format!(
        "{}{}",
        establishment_row("65747887", "0001", "21", "6120501", "8327", "71"),
        establishment_row("11222333", "0001", "81", "4120400", "9999", "00"),
    );
    mount_archive(
        server,
        "/CNPJ/K1.ESTABELE.zip",
        zip_bytes("K1.ESTABELE", establishments.as_bytes()),
    )
    .await;

    mount_archive(
        server,
        "/CNPJ/K2.ESTABELE.zip",
        zip_bytes(
            "K2.ESTABELE",
            establishment_row("44555666", "0002", "10", "6120501", "8327", "71").as_bytes(),
        ),
    )
    .await;
}

fn pipeline(server: &MockServer, store: Arc<dyn Storage>, work_dir: &Path) -> IngestPipeline {
    let client = reqwest::Client::new();
    let fetcher = Fetcher::new(client.clone(), Vec::new(), work_dir, Duration::from_secs(5));
    let resolver =
        HtmlCatalogResolver::new(client, &format!("{}/dados-publicos-cnpj", server.uri())).unwrap();

    IngestPipeline::new(
        store,
        Arc::new(resolver),
        fetcher,
        Arc::new(Schema::from_json(SCHEMA).unwrap()),
        format!("{}/nr-04.pdf", server.uri()),
    )
    .unwrap()
}

const ALL_FILES: &[&str] = &["K1.EMPRECSV.zip", "K1.ESTABELE.zip", "K2.ESTABELE.zip"];

#[tokio::test]
async fn test_full_run_imports_and_advances_checkpoint() {
    init_tracing();
    let server = MockServer::start().await;
    mock_release(&server, "15/01/2021", ALL_FILES).await;
    mock_risk_document(&server).await;
    mock_data_files(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStorage::new());
    let report = pipeline(&server, store.clone(), dir.path())
        .run(&RunOptions::default())
        .await
        .unwrap();

    assert_eq!(report.decision, Some(GateDecision::FirstRun));
    assert_eq!(report.files.len(), 3);
    assert_eq!(report.failed_files(), 0);
    assert_eq!(report.references.as_ref().unwrap().loaded.len(), 3);
    assert!(report.is_success());
    assert!(report.checkpoint_advanced);

    let risk: RiskLevel = store.find_entity("07103").await.unwrap().unwrap();
    assert_eq!(risk.grade, "4");

    assert_eq!(store.count(EntityKind::BaseCompany).await, 2);
    assert_eq!(store.count(EntityKind::Establishment).await, 3);

    let mei: BaseCompany = store.find_entity("65747887").await.unwrap().unwrap();
    assert_eq!(mei.legal_name.as_deref(), Some("FULANO DA SILVA"));

    let estab: Establishment = store.find_entity("65747887000121").await.unwrap().unwrap();
    assert_eq!(estab.status_reason, "INAPTIDAO (LEI 11.941/2009 ART.54)");
    assert_eq!(estab.city_name, "SAO JOSE");
    assert_eq!(estab.risk_level, "2");
    assert_eq!(estab.secondary_activities, vec!["8599604", "4120400"]);

    let unknown_city: Establishment = store.find_entity("11222333000181").await.unwrap().unwrap();
    assert_eq!(unknown_city.city_name, "");
    assert_eq!(unknown_city.status_reason, "");
    assert_eq!(unknown_city.risk_level, "");

    let checkpoint: Checkpoint = store.find_entity(CHECKPOINT_KEY).await.unwrap().unwrap();
    assert_eq!(checkpoint.value, NaiveDate::from_ymd_opt(2021, 1, 15).unwrap());
}

#[tokio::test]
async fn test_second_run_of_same_release_is_skipped() {
    let server = MockServer::start().await;
    mock_release(&server, "15/01/2021", ALL_FILES).await;
    mock_risk_document(&server).await;
    mock_data_files(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStorage::new());
    let pipeline = pipeline(&server, store.clone(), dir.path());

    pipeline.run(&RunOptions::default()).await.unwrap();
    let second = pipeline.run(&RunOptions::default()).await.unwrap();

    assert!(second.skipped());
    assert!(second.files.is_empty());
    assert!(second.references.is_none());

    let forced = pipeline
        .run(&RunOptions {
            force: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(forced.decision, Some(GateDecision::Forced));
    assert_eq!(forced.totals().created, 0);
    assert_eq!(forced.totals().updated, 5);
    assert_eq!(store.count(EntityKind::Establishment).await, 3);
}

#[tokio::test]
async fn test_limit_files_keeps_checkpoint() {
    let server = MockServer::start().await;
    mock_release(&server, "15/01/2021", ALL_FILES).await;
    mock_risk_document(&server).await;
    mock_data_files(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStorage::new());
    let report = pipeline(&server, store.clone(), dir.path())
        .run(&RunOptions {
            limit_files: 1,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(report.files.len(), 2);
    assert!(!report.checkpoint_advanced);
    assert_eq!(store.count(EntityKind::Establishment).await, 2);
    assert!(store
        .find_entity::<Checkpoint>(CHECKPOINT_KEY)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_failed_file_does_not_stop_siblings() {
    let server = MockServer::start().await;
    let files = ["K1.EMPRECSV.zip", "K1.ESTABELE.zip", "K9.ESTABELE.zip"];
    mock_release(&server, "15/01/2021", &files).await;
    mock_risk_document(&server).await;
    mock_data_files(&server).await;
    // K9.ESTABELE.zip has no route: the probe sees a 404 without a zip content type

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStorage::new());
    let report = pipeline(&server, store.clone(), dir.path())
        .run(&RunOptions::default())
        .await
        .unwrap();

    assert_eq!(report.failed_files(), 1);
    assert!(!report.checkpoint_advanced);
    assert_eq!(store.count(EntityKind::BaseCompany).await, 2);
    assert_eq!(store.count(EntityKind::Establishment).await, 2);
}

#[tokio::test]
async fn test_aux_only_loads_reference_tables() {
    let server = MockServer::start().await;
    mock_release(&server, "15/01/2021", ALL_FILES).await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStorage::new());
    let report = pipeline(&server, store.clone(), dir.path())
        .run(&RunOptions {
            aux_only: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(report.decision.is_none());
    assert!(report.files.is_empty());

    let city: City = store.find_entity("8327").await.unwrap().unwrap();
    assert_eq!(city.name, "SAO JOSE");
    let reason: StatusReason = store.find_entity("71").await.unwrap().unwrap();
    assert_eq!(reason.code, 71);
    assert_eq!(store.count(EntityKind::BaseCompany).await, 0);
}

#[tokio::test]
async fn test_unparseable_catalog_date_is_fatal() {
    let server = MockServer::start().await;
    mock_release(&server, "15/13/2021", ALL_FILES).await;

    let dir = tempfile::tempdir().unwrap();
    let result = pipeline(&server, Arc::new(InMemoryStorage::new()), dir.path())
        .run(&RunOptions::default())
        .await;

    assert!(result.is_err());
}

/// Store whose writes for one entity kind always time out
struct RejectingStorage {
    inner: InMemoryStorage,
    rejected: EntityKind,
}

#[async_trait]
impl Storage for RejectingStorage {
    async fn upsert(&self, kind: EntityKind, key: &str, fields: Document) -> StoreResult<Upserted> {
        if kind == self.rejected {
            return Err(StoreError::Timeout {
                operation: "upsert",
                secs: 30,
            });
        }
        self.inner.upsert(kind, key, fields).await
    }

    async fn find_by_key(&self, kind: EntityKind, key: &str) -> StoreResult<Lookup> {
        self.inner.find_by_key(kind, key).await
    }
}

#[tokio::test]
async fn test_failed_row_upserts_keep_checkpoint() {
    let server = MockServer::start().await;
    mock_release(&server, "15/01/2021", &["K1.EMPRECSV.zip", "K1.ESTABELE.zip"]).await;
    mock_risk_document(&server).await;
    mock_data_files(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RejectingStorage {
        inner: InMemoryStorage::new(),
        rejected: EntityKind::Establishment,
    });
    let report = pipeline(&server, store.clone(), dir.path())
        .run(&RunOptions::default())
        .await
        .unwrap();

    // Every file task finished, but its establishment rows were lost
    assert_eq!(report.failed_files(), 0);
    assert_eq!(report.totals().failed, 2);
    assert!(!report.is_success());
    assert!(!report.checkpoint_advanced);
    assert!(store
        .find_entity::<Checkpoint>(CHECKPOINT_KEY)
        .await
        .unwrap()
        .is_none());

    // Nothing was recorded, so the next run ingests the release again
    let retry = pipeline(&server, store.clone(), dir.path())
        .run(&RunOptions::default())
        .await
        .unwrap();
    assert_eq!(retry.decision, Some(GateDecision::FirstRun));
}

#[tokio::test]
async fn test_failed_reference_table_keeps_checkpoint() {
    let server = MockServer::start().await;
    mock_release(&server, "15/01/2021", ALL_FILES).await;
    mock_data_files(&server).await;
    // No NR-04 document: the risk loader fails while the others load

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStorage::new());
    let report = pipeline(&server, store.clone(), dir.path())
        .run(&RunOptions::default())
        .await
        .unwrap();

    let references = report.references.as_ref().unwrap();
    assert_eq!(references.loaded.len(), 2);
    assert_eq!(references.failed.len(), 1);
    assert_eq!(report.failed_files(), 0);
    assert_eq!(store.count(EntityKind::Establishment).await, 3);

    assert!(!report.is_success());
    assert!(!report.checkpoint_advanced);
    assert!(store
        .find_entity::<Checkpoint>(CHECKPOINT_KEY)
        .await
        .unwrap()
        .is_none());
}
