//! Freshness gate
//!
//! Compares the catalog's last-updated date with the stored checkpoint and
//! decides whether the release needs to be ingested.

use crate::error::Result;
use crate::storage::{Storage, StorageExt, CHECKPOINT_KEY};
use chrono::NaiveDate;
use cnpj_common::types::{parse_br_date, Checkpoint};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// No checkpoint stored yet
    FirstRun,
    /// Release is strictly newer than the checkpoint
    Newer { checkpoint: NaiveDate },
    /// Release is not newer than the checkpoint
    UpToDate { checkpoint: NaiveDate },
    /// Caller asked to run regardless of the checkpoint
    Forced,
}

impl GateDecision {
    pub fn should_run(&self) -> bool {
        !matches!(self, GateDecision::UpToDate { .. })
    }
}

/// Pure decision rule
pub fn decide(release: NaiveDate, checkpoint: Option<NaiveDate>, force: bool) -> GateDecision {
    if force {
        return GateDecision::Forced;
    }
    match checkpoint {
        None => GateDecision::FirstRun,
        Some(checkpoint) if release > checkpoint => GateDecision::Newer { checkpoint },
        Some(checkpoint) => GateDecision::UpToDate { checkpoint },
    }
}

/// Outcome of [`FreshnessGate::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateResult {
    pub release_date: NaiveDate,
    pub decision: GateDecision,
}

pub struct FreshnessGate {
    store: Arc<dyn Storage>,
}

impl FreshnessGate {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self { store }
    }

    /// Decide whether the release dated `last_updated` (`DD/MM/YYYY`) must run.
    ///
    /// An unparseable date is an error even when `force` is set, since the
    /// same date becomes the next checkpoint.
    pub async fn check(&self, last_updated: &str, force: bool) -> Result<GateResult> {
        let release_date = parse_br_date(last_updated)?;
        let checkpoint = self
            .store
            .find_entity::<Checkpoint>(CHECKPOINT_KEY)
            .await?
            .map(|c| c.value);

        let decision = decide(release_date, checkpoint, force);

        info!(
            release = %release_date,
            checkpoint = ?checkpoint,
            decision = ?decision,
            "Freshness check"
        );

        Ok(GateResult {
            release_date,
            decision,
        })
    }

    /// Record `date` as the last fully ingested release
    pub async fn advance(&self, date: NaiveDate) -> Result<()> {
        self.store.upsert_entity(&Checkpoint { value: date }).await?;
        info!(checkpoint = %date, "Checkpoint advanced");
        Ok(())
    }
}
