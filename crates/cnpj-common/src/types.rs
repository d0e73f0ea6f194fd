//! Registry entities
//!
//! Plain data carried from the schema mapper to the store. Fields that the
//! source may leave blank or malformed are `Option`s; enrichment fields are
//! plain strings that default to empty.

use crate::{CnpjError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Layout of the catalog's "last updated" marker
pub const BR_DATE_LAYOUT: &str = "%d/%m/%Y";

/// Legal-nature code for individual micro-entrepreneurs (MEI)
pub const MEI_LEGAL_NATURE: i64 = 2135;

/// Parse a `DD/MM/YYYY` date as published on the catalog page
pub fn parse_br_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), BR_DATE_LAYOUT).map_err(|_| {
        CnpjError::InvalidDate {
            value: value.to_string(),
            layout: "DD/MM/YYYY",
        }
    })
}

/// Build the 14-digit establishment key from its three parts
pub fn establishment_key(base_id: &str, branch_order: &str, check_digits: &str) -> String {
    format!("{}{}{}", base_id.trim(), branch_order.trim(), check_digits.trim())
}

/// Root registrant, keyed by the 8-digit base identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseCompany {
    pub base_id: String,
    pub legal_name: Option<String>,
    pub legal_nature_code: Option<i64>,
    pub responsible_qualification: Option<i64>,
    pub capital: Option<f64>,
    pub size_code: Option<i64>,
    pub federative_entity: Option<String>,
}

impl BaseCompany {
    pub fn is_mei(&self) -> bool {
        self.legal_nature_code == Some(MEI_LEGAL_NATURE)
    }
}

/// Operating location of a registrant, keyed by the full 14-digit CNPJ
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Establishment {
    pub cnpj: String,
    pub base_id: String,
    pub branch_order: String,
    pub check_digits: String,
    pub head_office_flag: Option<i64>,
    pub trade_name: Option<String>,
    pub registration_status: Option<i64>,
    pub status_date: Option<NaiveDate>,
    pub status_reason_code: Option<i64>,
    pub status_reason: String,
    pub foreign_city_name: Option<String>,
    pub country_code: Option<i64>,
    pub activity_start_date: Option<NaiveDate>,
    pub primary_activity: Option<String>,
    pub secondary_activities: Vec<String>,
    pub risk_level: String,
    pub street_type: Option<String>,
    pub street: Option<String>,
    pub street_number: Option<String>,
    pub complement: Option<String>,
    pub district: Option<String>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
    pub city_code: Option<i64>,
    pub city_name: String,
    pub ddd1: Option<String>,
    pub phone1: Option<String>,
    pub ddd2: Option<String>,
    pub phone2: Option<String>,
    pub fax_ddd: Option<String>,
    pub fax: Option<String>,
    pub email: Option<String>,
    pub special_status: Option<String>,
    pub special_status_date: Option<NaiveDate>,
}

impl Establishment {
    /// First five characters of the primary activity code, used to pick a risk grade
    pub fn activity_prefix(&self) -> Option<&str> {
        self.primary_activity
            .as_deref()
            .and_then(|code| code.get(..5))
    }
}

/// Reason attached to a registration status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReason {
    pub code: i64,
    pub reason: String,
}

/// Municipality as coded by the registry (not the IBGE code)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub code: i64,
    pub name: String,
}

/// NR-04 occupational risk grade for a CNAE class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskLevel {
    /// CNAE class without punctuation, e.g. `07103`
    pub activity_prefix: String,
    pub grade: String,
}

/// Last release date that was fully ingested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub value: NaiveDate,
}
