//! Shared helpers for integration tests

#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::{Cursor, Write};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cnpj_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// In-memory zip archive holding a single file
pub fn zip_bytes(entry: &str, body: &[u8]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut cursor);
        zip.start_file(entry, SimpleFileOptions::default()).unwrap();
        zip.write_all(body).unwrap();
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

/// Serve `archive` at `route`, answering HEAD probes with a zip content type
pub async fn mount_archive(server: &MockServer, route: &str, archive: Vec<u8>) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "application/zip"))
        .mount(server)
        .await;

    mount_download(server, route, archive).await;
}

/// Serve `archive` on GET only
pub async fn mount_download(server: &MockServer, route: &str, archive: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/zip")
                .set_body_bytes(archive),
        )
        .mount(server)
        .await;
}

/// Answer HEAD probes on `route` with an HTML error page
pub async fn mount_html_probe(server: &MockServer, route: &str) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html; charset=utf-8"))
        .mount(server)
        .await;
}

/// Quote and join columns the way the registry publishes them
pub fn csv_row(cols: &[&str]) -> String {
    let quoted: Vec<String> = cols.iter().map(|c| format!("\"{}\"", c)).collect();
    format!("{}\n", quoted.join(";"))
}

/// One establishment row in the registry's 30-column layout
pub fn establishment_row(base: &str, order: &str, dv: &str, cnae: &str, city: &str, reason: &str) -> String {
    csv_row(&[
        base, order, dv, "1", "LOJA", "02", "20171009", reason, "", "", "20171009", cnae,
        "8599604,4120400", "RUA", "DAS FLORES", "100", "", "CENTRO", "88100000", "SC", city,
        "48", "33334444", "", "", "", "", "contato@example.com", "", "",
    ])
}

/// Single-page PDF with one text line per entry of `lines`
pub fn text_pdf(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut operations = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let y = 780 - 40 * i as i64;
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec!["F1".into(), 10.into()]));
        operations.push(Operation::new("Td", vec![40.into(), y.into()]));
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        operations.push(Operation::new("ET", vec![]));
    }
    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![Object::from(0), Object::from(0), Object::from(595), Object::from(842)],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::from(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
