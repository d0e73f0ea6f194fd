//! In-memory store used by tests and dry runs

use super::{Document, EntityKind, Lookup, Storage, StoreResult, Upserted};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    docs: RwLock<HashMap<(EntityKind, String), Document>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored for `kind`
    pub async fn count(&self, kind: EntityKind) -> usize {
        self.docs
            .read()
            .await
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn upsert(&self, kind: EntityKind, key: &str, fields: Document) -> StoreResult<Upserted> {
        let mut docs = self.docs.write().await;
        match docs.get_mut(&(kind, key.to_string())) {
            Some(existing) => {
                existing.extend(fields);
                Ok(Upserted {
                    record: existing.clone(),
                    created: false,
                })
            },
            None => {
                docs.insert((kind, key.to_string()), fields.clone());
                Ok(Upserted {
                    record: fields,
                    created: true,
                })
            },
        }
    }

    async fn find_by_key(&self, kind: EntityKind, key: &str) -> StoreResult<Lookup> {
        let docs = self.docs.read().await;
        Ok(match docs.get(&(kind, key.to_string())) {
            Some(doc) => Lookup::Found(doc.clone()),
            None => Lookup::NotFound,
        })
    }
}
