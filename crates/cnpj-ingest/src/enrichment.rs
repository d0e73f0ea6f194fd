//! Denormalizes reference tables into establishments at import time

use crate::storage::{Entity, Storage, StorageExt};
use cnpj_common::types::{City, Establishment, RiskLevel, StatusReason};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct Enricher {
    store: Arc<dyn Storage>,
}

impl Enricher {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self { store }
    }

    /// Fill status reason, risk level and city name.
    ///
    /// Misses leave the field empty. Store faults are logged and count as misses.
    pub async fn enrich(&self, establishment: &mut Establishment) {
        if let Some(code) = establishment.status_reason_code {
            if let Some(reason) = self.lookup::<StatusReason>(&code.to_string()).await {
                establishment.status_reason = reason.reason;
            }
        }

        if let Some(prefix) = establishment.activity_prefix().map(str::to_string) {
            if let Some(risk) = self.lookup::<RiskLevel>(&prefix).await {
                establishment.risk_level = risk.grade;
            }
        }

        if let Some(code) = establishment.city_code {
            if let Some(city) = self.lookup::<City>(&code.to_string()).await {
                establishment.city_name = city.name;
            }
        }
    }

    async fn lookup<E: Entity>(&self, key: &str) -> Option<E> {
        match self.store.find_entity::<E>(key).await {
            Ok(Some(entity)) => Some(entity),
            Ok(None) => {
                debug!(kind = %E::KIND, key = %key, "Reference lookup miss");
                None
            },
            Err(e) => {
                warn!(kind = %E::KIND, key = %key, error = %e, "Reference lookup failed");
                None
            },
        }
    }
}
