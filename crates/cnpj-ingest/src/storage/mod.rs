//! Keyed document store
//!
//! Every component writes through the [`Storage`] capability: a create-or-merge
//! `upsert` and a `find_by_key` whose "not found" outcome is a regular value,
//! never an error. Adapters:
//!
//! - [`memory::InMemoryStorage`] for tests and dry runs
//! - [`postgres::PgStorage`] for JSONB tables in PostgreSQL

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use cnpj_common::types::{BaseCompany, Checkpoint, City, Establishment, RiskLevel, StatusReason};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use memory::InMemoryStorage;
pub use postgres::{PgConfig, PgStorage};

/// A stored document: field name to JSON value
pub type Document = serde_json::Map<String, Value>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Genuine store faults. A missing record is reported through [`Lookup`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Store operation '{operation}' timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("Document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Entity {0} did not serialize to a JSON object")]
    NotAnObject(&'static str),
}

/// Entity kinds, one collection (table) each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    BaseCompany,
    Establishment,
    StatusReason,
    RiskLevel,
    City,
    Parameter,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::BaseCompany,
        EntityKind::Establishment,
        EntityKind::StatusReason,
        EntityKind::RiskLevel,
        EntityKind::City,
        EntityKind::Parameter,
    ];

    pub fn table(self) -> &'static str {
        match self {
            EntityKind::BaseCompany => "base_companies",
            EntityKind::Establishment => "establishments",
            EntityKind::StatusReason => "status_reasons",
            EntityKind::RiskLevel => "risk_levels",
            EntityKind::City => "cities",
            EntityKind::Parameter => "parameters",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

/// Outcome of an upsert
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    /// The document as stored after the merge
    pub record: Document,
    /// True when no record existed under the key before this call
    pub created: bool,
}

/// Outcome of a keyed lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Document),
    NotFound,
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// Keyed, idempotent create-or-update store
#[async_trait]
pub trait Storage: Send + Sync {
    /// Create the record if absent, otherwise merge `fields` into it.
    async fn upsert(&self, kind: EntityKind, key: &str, fields: Document) -> StoreResult<Upserted>;

    async fn find_by_key(&self, kind: EntityKind, key: &str) -> StoreResult<Lookup>;
}

/// A typed record with a fixed collection and an immutable key
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    const KIND: EntityKind;

    fn key(&self) -> String;
}

impl Entity for BaseCompany {
    const KIND: EntityKind = EntityKind::BaseCompany;

    fn key(&self) -> String {
        self.base_id.clone()
    }
}

impl Entity for Establishment {
    const KIND: EntityKind = EntityKind::Establishment;

    fn key(&self) -> String {
        self.cnpj.clone()
    }
}

impl Entity for StatusReason {
    const KIND: EntityKind = EntityKind::StatusReason;

    fn key(&self) -> String {
        self.code.to_string()
    }
}

impl Entity for City {
    const KIND: EntityKind = EntityKind::City;

    fn key(&self) -> String {
        self.code.to_string()
    }
}

impl Entity for RiskLevel {
    const KIND: EntityKind = EntityKind::RiskLevel;

    fn key(&self) -> String {
        self.activity_prefix.clone()
    }
}

/// Key of the singleton checkpoint parameter
pub const CHECKPOINT_KEY: &str = "last-ingest-date";

impl Entity for Checkpoint {
    const KIND: EntityKind = EntityKind::Parameter;

    fn key(&self) -> String {
        CHECKPOINT_KEY.to_string()
    }
}

/// Serialize an entity into the field map handed to [`Storage::upsert`]
pub fn to_document<E: Entity>(entity: &E) -> StoreResult<Document> {
    match serde_json::to_value(entity)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject(E::KIND.table())),
    }
}

/// Typed helpers over any [`Storage`]
#[async_trait]
pub trait StorageExt: Storage {
    async fn upsert_entity<E: Entity>(&self, entity: &E) -> StoreResult<Upserted> {
        let fields = to_document(entity)?;
        self.upsert(E::KIND, &entity.key(), fields).await
    }

    async fn find_entity<E: Entity>(&self, key: &str) -> StoreResult<Option<E>> {
        match self.find_by_key(E::KIND, key).await? {
            Lookup::Found(doc) => Ok(Some(serde_json::from_value(Value::Object(doc))?)),
            Lookup::NotFound => Ok(None),
        }
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}
