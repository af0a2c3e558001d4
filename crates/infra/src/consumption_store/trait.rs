use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use spoolledger_core::{AccountId, ConsumptionId};
use spoolledger_costing::CostSnapshot;
use spoolledger_inventory::ConsumptionLine;

/// A consuming entity (print job, order) as persisted.
///
/// `revision` starts at 1 and increases by one on every accepted revise, so a
/// writer holding a stale copy is refused instead of restoring stock twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub id: ConsumptionId,
    pub lines: Vec<ConsumptionLine>,
    pub hours: f64,
    pub forced: bool,
    pub snapshot: CostSnapshot,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConsumptionRecord {
    pub fn new(
        id: ConsumptionId,
        lines: Vec<ConsumptionLine>,
        hours: f64,
        forced: bool,
        snapshot: CostSnapshot,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            lines,
            hours,
            forced,
            snapshot,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Next revision of this record, carrying the replacement lines and snapshot.
    pub fn revised(&self, lines: Vec<ConsumptionLine>, hours: f64, forced: bool, snapshot: CostSnapshot) -> Self {
        Self {
            id: self.id,
            lines,
            hours,
            forced,
            snapshot,
            revision: self.revision + 1,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    pub fn account_ids(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.lines.iter().map(|l| l.account_id)
    }

    pub fn draws_on(&self, account_id: AccountId) -> bool {
        self.lines.iter().any(|l| l.account_id == account_id)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("consumption {0} not found")]
    NotFound(ConsumptionId),

    #[error("consumption {0} already exists")]
    AlreadyExists(ConsumptionId),

    #[error("consumption {id} was modified concurrently (expected revision {expected}, found {found})")]
    RevisionConflict { id: ConsumptionId, expected: u64, found: u64 },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Record storage with per-record optimistic concurrency.
pub trait ConsumptionStore: Send + Sync {
    /// Store a new record. Fails if the id is already present.
    fn insert(&self, record: ConsumptionRecord) -> Result<(), StoreError>;

    fn get(&self, id: ConsumptionId) -> Result<Option<ConsumptionRecord>, StoreError>;

    /// Swap in `record` if the stored revision still equals `expected_revision`.
    fn replace(&self, record: ConsumptionRecord, expected_revision: u64) -> Result<(), StoreError>;

    /// Delete the record if the stored revision still equals `expected_revision`.
    fn remove(&self, id: ConsumptionId, expected_revision: u64) -> Result<ConsumptionRecord, StoreError>;

    /// All records, oldest first.
    fn list(&self) -> Result<Vec<ConsumptionRecord>, StoreError>;

    /// Records that drew on `account_id`, newest first.
    fn by_account(&self, account_id: AccountId) -> Result<Vec<ConsumptionRecord>, StoreError> {
        let mut records: Vec<ConsumptionRecord> = self
            .list()?
            .into_iter()
            .filter(|r| r.draws_on(account_id))
            .collect();
        records.reverse();
        Ok(records)
    }
}

impl<S> ConsumptionStore for Arc<S>
where
    S: ConsumptionStore + ?Sized,
{
    fn insert(&self, record: ConsumptionRecord) -> Result<(), StoreError> {
        (**self).insert(record)
    }

    fn get(&self, id: ConsumptionId) -> Result<Option<ConsumptionRecord>, StoreError> {
        (**self).get(id)
    }

    fn replace(&self, record: ConsumptionRecord, expected_revision: u64) -> Result<(), StoreError> {
        (**self).replace(record, expected_revision)
    }

    fn remove(&self, id: ConsumptionId, expected_revision: u64) -> Result<ConsumptionRecord, StoreError> {
        (**self).remove(id, expected_revision)
    }

    fn list(&self) -> Result<Vec<ConsumptionRecord>, StoreError> {
        (**self).list()
    }

    fn by_account(&self, account_id: AccountId) -> Result<Vec<ConsumptionRecord>, StoreError> {
        (**self).by_account(account_id)
    }
}
