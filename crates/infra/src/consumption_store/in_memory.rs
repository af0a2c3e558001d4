use std::collections::HashMap;
use std::sync::RwLock;

use spoolledger_core::ConsumptionId;

use super::r#trait::{ConsumptionRecord, ConsumptionStore, StoreError};

/// In-memory consumption store.
///
/// Intended for tests/dev and single-process use.
#[derive(Debug, Default)]
pub struct InMemoryConsumptionStore {
    records: RwLock<HashMap<ConsumptionId, ConsumptionRecord>>,
}

impl InMemoryConsumptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("lock poisoned".to_string())
    }
}

impl ConsumptionStore for InMemoryConsumptionStore {
    fn insert(&self, record: ConsumptionRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        records.insert(record.id, record);
        Ok(())
    }

    fn get(&self, id: ConsumptionId) -> Result<Option<ConsumptionRecord>, StoreError> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records.get(&id).cloned())
    }

    fn replace(&self, record: ConsumptionRecord, expected_revision: u64) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        let current = records.get_mut(&record.id).ok_or(StoreError::NotFound(record.id))?;
        if current.revision != expected_revision {
            return Err(StoreError::RevisionConflict {
                id: record.id,
                expected: expected_revision,
                found: current.revision,
            });
        }
        *current = record;
        Ok(())
    }

    fn remove(&self, id: ConsumptionId, expected_revision: u64) -> Result<ConsumptionRecord, StoreError> {
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        let found = records.get(&id).ok_or(StoreError::NotFound(id))?.revision;
        if found != expected_revision {
            return Err(StoreError::RevisionConflict {
                id,
                expected: expected_revision,
                found,
            });
        }
        records.remove(&id).ok_or(StoreError::NotFound(id))
    }

    fn list(&self) -> Result<Vec<ConsumptionRecord>, StoreError> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        let mut out: Vec<ConsumptionRecord> = records.values().cloned().collect();
        out.sort_by_key(|r| (r.created_at, r.id));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spoolledger_core::{AccountId, Quantity, Unit};
    use spoolledger_costing::{CostSnapshot, RateCard, SnapshotInput};
    use spoolledger_inventory::ConsumptionLine;

    fn record() -> ConsumptionRecord {
        record_on(AccountId::new())
    }

    fn record_on(account_id: AccountId) -> ConsumptionRecord {
        let line = ConsumptionLine::new(account_id, Quantity::grams(20.0));
        let snapshot = CostSnapshot::capture(
            vec![SnapshotInput {
                account_id,
                label: "PLA".to_string(),
                tracking_id: None,
                unit: Unit::Mass,
                position: 0,
                quantity: line.quantity,
                unit_cost: 20.0,
            }],
            1.0,
            &RateCard::default(),
        )
        .unwrap();
        ConsumptionRecord::new(ConsumptionId::new(), vec![line], 1.0, false, snapshot)
    }

    #[test]
    fn insert_then_get() {
        let store = InMemoryConsumptionStore::new();
        let r = record();
        store.insert(r.clone()).unwrap();
        assert_eq!(store.get(r.id).unwrap(), Some(r.clone()));
        assert_eq!(store.insert(r.clone()), Err(StoreError::AlreadyExists(r.id)));
    }

    #[test]
    fn stale_revisions_are_refused() {
        let store = InMemoryConsumptionStore::new();
        let r = record();
        store.insert(r.clone()).unwrap();

        let next = r.revised(r.lines.clone(), 2.0, false, r.snapshot.clone());
        store.replace(next.clone(), 1).unwrap();

        let stale = r.revised(r.lines.clone(), 3.0, false, r.snapshot.clone());
        assert!(matches!(
            store.replace(stale, 1),
            Err(StoreError::RevisionConflict { expected: 1, found: 2, .. })
        ));
        assert!(matches!(store.remove(r.id, 1), Err(StoreError::RevisionConflict { .. })));

        assert_eq!(store.remove(r.id, 2).unwrap().hours, 2.0);
        assert!(store.is_empty().unwrap());
        assert_eq!(store.remove(r.id, 2), Err(StoreError::NotFound(r.id)));
    }

    #[test]
    fn history_lists_only_records_on_the_account_newest_first() {
        let store = InMemoryConsumptionStore::new();
        let spool = AccountId::new();
        let first = record_on(spool);
        let other = record();
        let mut second = record_on(spool);
        second.created_at = first.created_at + chrono::Duration::seconds(5);
        for r in [first.clone(), other.clone(), second.clone()] {
            store.insert(r).unwrap();
        }

        assert_eq!(store.list().unwrap().len(), 3);
        let history = store.by_account(spool).unwrap();
        assert_eq!(history.iter().map(|r| r.id).collect::<Vec<_>>(), vec![second.id, first.id]);
        assert!(store.by_account(AccountId::new()).unwrap().is_empty());
    }

    #[test]
    fn a_poisoned_lock_makes_every_read_fail() {
        let store = std::sync::Arc::new(InMemoryConsumptionStore::new());
        store.insert(record()).unwrap();
        let clone = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.records.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(matches!(store.len(), Err(StoreError::Unavailable(_))));
        assert!(store.is_empty().is_err());
        assert!(store.list().is_err());
    }
}
