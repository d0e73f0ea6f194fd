//! Semicolon-delimited table reader
//!
//! Source tables have no header row and quote every field. The main data
//! tables are ISO-8859-15; the reference tables are read as UTF-8.

use crate::error::Result;
use csv::{ByteRecord, ReaderBuilder};
use encoding_rs::ISO_8859_15;
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Latin9,
    Utf8,
}

impl SourceEncoding {
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            SourceEncoding::Latin9 => ISO_8859_15.decode_without_bom_handling(bytes).0.into_owned(),
            SourceEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

pub fn decode_record(record: &ByteRecord, encoding: SourceEncoding) -> Vec<String> {
    record.iter().map(|field| encoding.decode(field)).collect()
}

/// Iterate the rows of `path` as decoded columns, in file order
pub fn rows(
    path: &Path,
    encoding: SourceEncoding,
) -> Result<impl Iterator<Item = Result<Vec<String>>>> {
    let reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(File::open(path)?);

    Ok(reader
        .into_byte_records()
        .map(move |record| -> Result<Vec<String>> { Ok(decode_record(&record?, encoding)) }))
}
