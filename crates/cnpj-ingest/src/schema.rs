//! Schema-driven row mapping
//!
//! A schema file lists, per record kind, the target field names with their
//! source column and value type. Rows are converted into a [`MappedRecord`]
//! of typed [`FieldValue`]s and from there, by explicit functions, into the
//! registry entities.
//!
//! Conversion failures never abort a row: a bad integer or date becomes
//! [`FieldValue::Absent`] and a bad decimal becomes `0.0`.

use crate::error::{IngestError, Result};
use chrono::NaiveDate;
use cnpj_common::types::{establishment_key, BaseCompany, Establishment};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Layout of date columns in the source tables
pub const SOURCE_DATE_LAYOUT: &str = "%Y%m%d";

/// CPF embedded in MEI company names, with or without punctuation
const CPF_PATTERN: &str = r"\d{3}\.?\d{3}\.?\d{3}-?\d{2}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    BaseCompany,
    Establishment,
}

impl RecordKind {
    /// Kind of the rows in a source file, from its name
    pub fn from_file_name(name: &str) -> Option<Self> {
        match (name.contains("EMPRECSV"), name.contains("ESTABELE")) {
            (true, false) => Some(RecordKind::BaseCompany),
            (false, true) => Some(RecordKind::Establishment),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::BaseCompany => "base_company",
            RecordKind::Establishment => "establishment",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordSchema {
    pub kind: RecordKind,
    pub fields: BTreeMap<String, FieldSpec>,
}

impl RecordSchema {
    pub fn map_row(&self, row: &[String]) -> MappedRecord {
        let fields = self
            .fields
            .iter()
            .map(|(name, spec)| {
                let value = row
                    .get(spec.position)
                    .map(|raw| convert(raw, spec.field_type))
                    .unwrap_or(FieldValue::Absent);
                (name.clone(), value)
            })
            .collect();

        MappedRecord {
            kind: self.kind,
            fields,
        }
    }
}

/// All record schemas, as loaded from the schema file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    records: Vec<RecordSchema>,
}

impl Schema {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let schema: Self = serde_json::from_str(raw)?;
        if schema.records.is_empty() {
            return Err(IngestError::Schema("schema defines no record kinds".to_string()));
        }
        Ok(schema)
    }

    pub fn for_kind(&self, kind: RecordKind) -> Option<&RecordSchema> {
        self.records.iter().find(|r| r.kind == kind)
    }
}

/// A converted column value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Date(NaiveDate),
    Absent,
}

pub fn convert(raw: &str, field_type: FieldType) -> FieldValue {
    let raw = raw.trim();
    match field_type {
        FieldType::String => FieldValue::Text(raw.to_string()),
        FieldType::Int => raw
            .parse()
            .map(FieldValue::Integer)
            .unwrap_or(FieldValue::Absent),
        FieldType::Float => FieldValue::Decimal(raw.replace(',', ".").parse().unwrap_or(0.0)),
        FieldType::Timestamp => NaiveDate::parse_from_str(raw, SOURCE_DATE_LAYOUT)
            .map(FieldValue::Date)
            .unwrap_or(FieldValue::Absent),
    }
}

static ABSENT: FieldValue = FieldValue::Absent;

/// One source row after conversion
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRecord {
    pub kind: RecordKind,
    pub fields: BTreeMap<String, FieldValue>,
}

impl MappedRecord {
    pub fn get(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&ABSENT)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Text value, with blanks treated as missing
    pub fn non_empty(&self, name: &str) -> Option<String> {
        self.text(name).filter(|s| !s.is_empty()).map(str::to_string)
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn decimal(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            FieldValue::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        match self.get(name) {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    fn required(&self, field: &'static str) -> Result<String> {
        self.non_empty(field).ok_or(IngestError::MissingField {
            kind: self.kind.as_str(),
            field,
        })
    }
}

/// Removes CPF numbers from MEI company names
#[derive(Debug, Clone)]
pub struct CpfPattern(Regex);

impl CpfPattern {
    pub fn new() -> Result<Self> {
        Ok(Self(Regex::new(CPF_PATTERN)?))
    }

    pub fn strip(&self, name: &str) -> String {
        self.0.replace_all(name, "").trim().to_string()
    }
}

/// Ordered activity codes from a comma separated field
pub fn split_activities(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn to_base_company(record: &MappedRecord, cpf: &CpfPattern) -> Result<BaseCompany> {
    let mut company = BaseCompany {
        base_id: record.required("base_id")?,
        legal_name: record.text("legal_name").map(str::to_string),
        legal_nature_code: record.integer("legal_nature_code"),
        responsible_qualification: record.integer("responsible_qualification"),
        capital: record.decimal("capital"),
        size_code: record.integer("size_code"),
        federative_entity: record.non_empty("federative_entity"),
    };

    if company.is_mei() {
        company.legal_name = company.legal_name.map(|name| cpf.strip(&name));
    }

    Ok(company)
}

/// Establishment with its key synthesized; enrichment fields are left empty
pub fn to_establishment(record: &MappedRecord) -> Result<Establishment> {
    let base_id = record.required("base_id")?;
    let branch_order = record.required("branch_order")?;
    let check_digits = record.required("check_digits")?;

    Ok(Establishment {
        cnpj: establishment_key(&base_id, &branch_order, &check_digits),
        base_id,
        branch_order,
        check_digits,
        head_office_flag: record.integer("head_office_flag"),
        trade_name: record.non_empty("trade_name"),
        registration_status: record.integer("registration_status"),
        status_date: record.date("status_date"),
        status_reason_code: record.integer("status_reason_code"),
        status_reason: String::new(),
        foreign_city_name: record.non_empty("foreign_city_name"),
        country_code: record.integer("country_code"),
        activity_start_date: record.date("activity_start_date"),
        primary_activity: record.non_empty("primary_activity"),
        secondary_activities: record
            .text("secondary_activities")
            .map(split_activities)
            .unwrap_or_default(),
        risk_level: String::new(),
        street_type: record.non_empty("street_type"),
        street: record.non_empty("street"),
        street_number: record.non_empty("street_number"),
        complement: record.non_empty("complement"),
        district: record.non_empty("district"),
        postal_code: record.non_empty("postal_code"),
        state: record.non_empty("state"),
        city_code: record.integer("city_code"),
        city_name: String::new(),
        ddd1: record.non_empty("ddd1"),
        phone1: record.non_empty("phone1"),
        ddd2: record.non_empty("ddd2"),
        phone2: record.non_empty("phone2"),
        fax_ddd: record.non_empty("fax_ddd"),
        fax: record.non_empty("fax"),
        email: record.non_empty("email"),
        special_status: record.non_empty("special_status"),
        special_status_date: record.date("special_status_date"),
    })
}
