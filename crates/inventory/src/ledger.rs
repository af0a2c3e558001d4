//! Stock ledger: the only mutator of `remaining` quantities.
//!
//! Accounts live in an arena keyed by id, each behind its own mutex. A batch
//! locks every account it touches in ascending id order, so two batches over
//! overlapping accounts serialize instead of deadlocking, and batches over
//! disjoint accounts never wait on each other.
//!
//! ```text
//! transact([a, b], |tx| { tx.commit(a, ..)?; tx.commit(b, ..)?; Ok(()) })
//!   lock a → lock b → closure → Ok  → keep changes, report movements
//!                             → Err → put every remaining back, then unlock
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use serde::Serialize;

use spoolledger_core::error::ensure_non_negative;
use spoolledger_core::{AccountId, DomainError, Entity, Quantity, Unit};

use crate::account::{AccountDefaults, AccountSummary, ConsumptionLine, NewAccount, ResourceAccount};
use crate::error::LedgerError;

/// Read access to account state, either from a copied map or from inside a
/// transaction holding the locks.
pub trait AccountView {
    fn view(&self, id: AccountId) -> Option<&ResourceAccount>;
}

impl AccountView for BTreeMap<AccountId, ResourceAccount> {
    fn view(&self, id: AccountId) -> Option<&ResourceAccount> {
        self.get(&id)
    }
}

/// Net change to one account produced by a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Movement {
    pub account_id: AccountId,
    pub label: String,
    pub tracking_id: Option<String>,
    pub unit: Unit,
    pub previous: Quantity,
    pub current: Quantity,
    pub alert_threshold: Option<Quantity>,
}

impl Movement {
    pub fn is_consumption(&self) -> bool {
        self.current < self.previous
    }

    /// True when this movement took the account from at/above its alert
    /// threshold to below it.
    pub fn crossed_alert_threshold(&self) -> bool {
        match self.alert_threshold {
            Some(threshold) => self.previous >= threshold && self.current < threshold,
            None => false,
        }
    }
}

/// Active accounts that have run out or are running low.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockAlerts {
    pub unit: Unit,
    pub threshold: Quantity,
    pub empty: Vec<AccountSummary>,
    /// Above zero and at or below `threshold`, lowest first.
    pub low: Vec<AccountSummary>,
}

/// Most alternatives offered for one short line.
pub const MAX_ALTERNATIVES: usize = 5;

type Slot = Arc<Mutex<ResourceAccount>>;

/// Arena of resource accounts.
#[derive(Debug, Default)]
pub struct StockLedger {
    accounts: RwLock<HashMap<AccountId, Slot>>,
    defaults: AccountDefaults,
}

impl StockLedger {
    pub fn new(defaults: AccountDefaults) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            defaults,
        }
    }

    pub fn defaults(&self) -> &AccountDefaults {
        &self.defaults
    }

    /// Open a new account without any tracking-id uniqueness check.
    pub fn register(&self, new: NewAccount) -> Result<AccountId, LedgerError> {
        self.register_unique(new, true)
    }

    /// Open a new account. Unless `allow_active_duplicate` is set, a tracking
    /// id already carried by an *active* account is refused; inactive
    /// accounts do not reserve their ids.
    ///
    /// The check and the insert happen under the arena write lock, so two
    /// concurrent registrations cannot both claim the same id.
    pub fn register_unique(
        &self,
        new: NewAccount,
        allow_active_duplicate: bool,
    ) -> Result<AccountId, LedgerError> {
        let id = AccountId::new();
        let account = ResourceAccount::open(id, new, &self.defaults)?;

        let mut map = self.accounts.write().map_err(|_| LedgerError::Poisoned)?;
        if !allow_active_duplicate {
            if let Some(tracking_id) = account.tracking_id() {
                if let Some(existing) = find_active(&map, tracking_id)? {
                    return Err(LedgerError::DuplicateTrackingId { existing });
                }
            }
        }

        tracing::info!(
            account_id = %id,
            label = account.label(),
            tracking_id = account.tracking_id().unwrap_or_default(),
            unit = %account.unit(),
            remaining = account.remaining().base(),
            "account registered"
        );
        map.insert(id, Arc::new(Mutex::new(account)));
        Ok(id)
    }

    fn slot(&self, id: AccountId) -> Result<Slot, LedgerError> {
        let map = self.accounts.read().map_err(|_| LedgerError::Poisoned)?;
        map.get(&id).cloned().ok_or(LedgerError::UnknownAccount(id))
    }

    /// Copy of one account's current state.
    pub fn account(&self, id: AccountId) -> Result<ResourceAccount, LedgerError> {
        let slot = self.slot(id)?;
        let guard = slot.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(guard.clone())
    }

    /// Copies of every account, ordered by id.
    pub fn accounts(&self) -> Result<Vec<ResourceAccount>, LedgerError> {
        let slots: Vec<Slot> = {
            let map = self.accounts.read().map_err(|_| LedgerError::Poisoned)?;
            map.values().cloned().collect()
        };
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            out.push(slot.lock().map_err(|_| LedgerError::Poisoned)?.clone());
        }
        out.sort_by_key(|a| a.id());
        Ok(out)
    }

    /// Every tracking id in use, active and inactive accounts alike.
    pub fn tracking_ids(&self) -> Result<Vec<String>, LedgerError> {
        Ok(self
            .accounts()?
            .into_iter()
            .filter_map(|a| a.tracking_id().map(str::to_string))
            .collect())
    }

    /// Active accounts of `unit` that are empty, or low against a shared
    /// `threshold` (inclusive).
    pub fn low_and_empty(&self, unit: Unit, threshold: Quantity) -> Result<StockAlerts, LedgerError> {
        let mut empty = Vec::new();
        let mut low = Vec::new();
        for account in self.accounts()? {
            if !account.is_active() || account.unit() != unit {
                continue;
            }
            if account.is_empty() {
                empty.push(account.summary());
            } else if account.is_low(threshold) {
                low.push(account.summary());
            }
        }
        low.sort_by_key(|a| (a.remaining, a.id));
        Ok(StockAlerts {
            unit,
            threshold,
            empty,
            low,
        })
    }

    /// Active accounts of the same family that could take `required` on
    /// their own and still keep their reserve floor. Fullest first, at most
    /// [`MAX_ALTERNATIVES`].
    pub fn alternatives(
        &self,
        family: &str,
        required: Quantity,
        exclude: &[AccountId],
    ) -> Result<Vec<AccountSummary>, LedgerError> {
        let family = family.trim().to_ascii_uppercase();
        let mut found: Vec<ResourceAccount> = self
            .accounts()?
            .into_iter()
            .filter(|a| a.is_active() && a.family() == Some(family.as_str()))
            .filter(|a| !exclude.contains(&a.id()))
            .filter(|a| {
                a.remaining()
                    .checked_sub(required)
                    .is_some_and(|left| left >= a.reserve_floor())
            })
            .collect();
        found.sort_by(|a, b| b.remaining().cmp(&a.remaining()).then(a.id().cmp(&b.id())));
        Ok(found.iter().take(MAX_ALTERNATIVES).map(ResourceAccount::summary).collect())
    }

    fn edit(
        &self,
        id: AccountId,
        f: impl FnOnce(&mut ResourceAccount),
    ) -> Result<(), LedgerError> {
        let slot = self.slot(id)?;
        let mut guard = slot.lock().map_err(|_| LedgerError::Poisoned)?;
        f(&mut guard);
        Ok(())
    }

    /// Catalog price change. Existing cost snapshots are unaffected.
    pub fn reprice(&self, id: AccountId, unit_cost: f64) -> Result<(), LedgerError> {
        ensure_non_negative("unit cost", unit_cost)?;
        self.edit(id, |a| a.set_unit_cost(unit_cost))?;
        tracing::info!(account_id = %id, unit_cost, "account repriced");
        Ok(())
    }

    pub fn set_active(&self, id: AccountId, active: bool) -> Result<(), LedgerError> {
        self.edit(id, |a| a.set_active(active))?;
        tracing::info!(account_id = %id, active, "account activity changed");
        Ok(())
    }

    pub fn set_reserve_floor(&self, id: AccountId, reserve_floor: Quantity) -> Result<(), LedgerError> {
        if reserve_floor.is_negative() {
            return Err(DomainError::validation("reserve floor cannot be negative").into());
        }
        self.edit(id, |a| a.set_reserve_floor(reserve_floor))
    }

    /// Consistent copy of several accounts: all of them are locked together,
    /// so no batch can be half-applied in the result.
    pub fn read_many(
        &self,
        ids: impl IntoIterator<Item = AccountId>,
    ) -> Result<BTreeMap<AccountId, ResourceAccount>, LedgerError> {
        let (copy, _) = self.transact(ids, |tx| Ok::<_, LedgerError>(tx.copy_accounts()))?;
        Ok(copy)
    }

    /// Consume `qty` from one account. Without `force` the result must stay at
    /// or above the reserve floor; it may never go below zero.
    pub fn commit(&self, id: AccountId, qty: Quantity, force: bool) -> Result<Quantity, LedgerError> {
        let (remaining, _) = self.transact([id], |tx| tx.commit(id, qty, force))?;
        Ok(remaining)
    }

    /// Put `qty` back into one account (cancelled or edited consumption).
    pub fn restore(&self, id: AccountId, qty: Quantity) -> Result<Quantity, LedgerError> {
        let (remaining, _) = self.transact([id], |tx| tx.restore(id, qty))?;
        Ok(remaining)
    }

    /// Restore `old` lines and consume `new` lines as one atomic step, e.g.
    /// when the grams recorded for a finished print are corrected.
    pub fn replace(
        &self,
        old: &[ConsumptionLine],
        new: &[ConsumptionLine],
        force: bool,
    ) -> Result<Vec<Movement>, LedgerError> {
        let ids: Vec<AccountId> = old.iter().chain(new).map(|l| l.account_id).collect();
        let ((), movements) = self.transact(ids, |tx| {
            for line in old {
                tx.restore(line.account_id, line.quantity)?;
            }
            for line in new {
                tx.commit(line.account_id, line.quantity, force)?;
            }
            Ok::<_, LedgerError>(())
        })?;
        Ok(movements)
    }

    /// Run `f` with exclusive access to every account in `ids`.
    ///
    /// If `f` returns `Err` (or unwinds) every quantity it changed is put back
    /// before the locks are released. On success the net movements are
    /// returned alongside `f`'s value.
    pub fn transact<T, E, F>(
        &self,
        ids: impl IntoIterator<Item = AccountId>,
        f: F,
    ) -> Result<(T, Vec<Movement>), E>
    where
        E: From<LedgerError>,
        F: FnOnce(&mut LedgerTransaction<'_>) -> Result<T, E>,
    {
        self.transact_and_then(ids, f, |_| {})
    }

    /// Like [`transact`](Self::transact), but `on_commit` sees the net
    /// movements of a successful run before the locks are released. Anything
    /// it does per account is therefore ordered the same way as the commits.
    pub fn transact_and_then<T, E, F, G>(
        &self,
        ids: impl IntoIterator<Item = AccountId>,
        f: F,
        on_commit: G,
    ) -> Result<(T, Vec<Movement>), E>
    where
        E: From<LedgerError>,
        F: FnOnce(&mut LedgerTransaction<'_>) -> Result<T, E>,
        G: FnOnce(&[Movement]),
    {
        let mut ids: Vec<AccountId> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();

        let slots: Vec<Slot> = {
            let map = self.accounts.read().map_err(|_| LedgerError::Poisoned)?;
            ids.iter()
                .map(|id| map.get(id).cloned().ok_or(LedgerError::UnknownAccount(*id)))
                .collect::<Result<_, _>>()?
        };

        let mut entries = Vec::with_capacity(slots.len());
        for slot in &slots {
            let guard = slot.lock().map_err(|_| LedgerError::Poisoned)?;
            let original = guard.remaining();
            entries.push(TxEntry { guard, original });
        }

        let mut tx = LedgerTransaction {
            entries,
            finished: false,
        };
        let value = f(&mut tx)?;
        let movements = tx.finish();
        on_commit(&movements);
        drop(tx);
        Ok((value, movements))
    }
}

fn find_active(
    map: &HashMap<AccountId, Slot>,
    tracking_id: &str,
) -> Result<Option<AccountSummary>, LedgerError> {
    for slot in map.values() {
        let account = slot.lock().map_err(|_| LedgerError::Poisoned)?;
        if account.is_active() && account.tracking_id() == Some(tracking_id) {
            return Ok(Some(account.summary()));
        }
    }
    Ok(None)
}

struct TxEntry<'a> {
    guard: MutexGuard<'a, ResourceAccount>,
    original: Quantity,
}

/// Exclusive, all-or-nothing access to a fixed set of accounts.
///
/// Created only by [`StockLedger::transact`]. Dropping it without finishing
/// (error return, panic) restores every touched account.
pub struct LedgerTransaction<'a> {
    entries: Vec<TxEntry<'a>>,
    finished: bool,
}

impl<'a> LedgerTransaction<'a> {
    fn position(&self, id: AccountId) -> Result<usize, LedgerError> {
        self.entries
            .binary_search_by_key(&id, |e| e.guard.id())
            .map_err(|_| LedgerError::UnknownAccount(id))
    }

    /// State of a locked account, including changes made in this transaction.
    pub fn account(&self, id: AccountId) -> Result<&ResourceAccount, LedgerError> {
        let idx = self.position(id)?;
        Ok(&*self.entries[idx].guard)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &ResourceAccount> {
        self.entries.iter().map(|e| &*e.guard)
    }

    pub fn commit(&mut self, id: AccountId, qty: Quantity, force: bool) -> Result<Quantity, LedgerError> {
        let idx = self.position(id)?;
        let account = &mut self.entries[idx].guard;
        let resulting = account.after_commit(qty, force)?;
        account.set_remaining(resulting);
        Ok(resulting)
    }

    pub fn restore(&mut self, id: AccountId, qty: Quantity) -> Result<Quantity, LedgerError> {
        let idx = self.position(id)?;
        let account = &mut self.entries[idx].guard;
        let resulting = account.after_restore(qty)?;
        account.set_remaining(resulting);
        Ok(resulting)
    }

    fn copy_accounts(&self) -> BTreeMap<AccountId, ResourceAccount> {
        self.accounts().map(|a| (a.id(), a.clone())).collect()
    }

    fn finish(&mut self) -> Vec<Movement> {
        self.finished = true;
        self.entries
            .iter()
            .filter(|e| e.guard.remaining() != e.original)
            .map(|e| Movement {
                account_id: e.guard.id(),
                label: e.guard.label().to_string(),
                tracking_id: e.guard.tracking_id().map(str::to_string),
                unit: e.guard.unit(),
                previous: e.original,
                current: e.guard.remaining(),
                alert_threshold: e.guard.alert_threshold(),
            })
            .collect()
    }

    fn rollback(&mut self) {
        let mut restored = 0usize;
        for entry in &mut self.entries {
            if entry.guard.remaining() != entry.original {
                entry.guard.set_remaining(entry.original);
                restored += 1;
            }
        }
        if restored > 0 {
            tracing::debug!(accounts = restored, "ledger transaction rolled back");
        }
    }
}

impl Drop for LedgerTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.rollback();
        }
    }
}

impl AccountView for LedgerTransaction<'_> {
    fn view(&self, id: AccountId) -> Option<&ResourceAccount> {
        self.account(id).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    fn ledger() -> StockLedger {
        StockLedger::new(AccountDefaults::default())
    }

    fn spool(ledger: &StockLedger, remaining: f64) -> AccountId {
        ledger
            .register(
                NewAccount::spool("Matte Black PLA", Quantity::grams(1000.0), 20.0)
                    .with_remaining(Quantity::grams(remaining)),
            )
            .unwrap()
    }

    #[test]
    fn consume_then_restore_returns_exact_value() {
        let ledger = ledger();
        let id = spool(&ledger, 733.3);
        let before = ledger.account(id).unwrap().remaining();

        ledger.commit(id, Quantity::grams(12.345), false).unwrap();
        ledger.restore(id, Quantity::grams(12.345)).unwrap();

        assert_eq!(ledger.account(id).unwrap().remaining(), before);
    }

    #[test]
    fn unknown_account_is_reported() {
        let ledger = ledger();
        let missing = AccountId::new();
        assert_eq!(
            ledger.commit(missing, Quantity::grams(1.0), false),
            Err(LedgerError::UnknownAccount(missing))
        );
    }

    #[test]
    fn inactive_accounts_refuse_consumption_but_accept_restores() {
        let ledger = ledger();
        let id = spool(&ledger, 500.0);
        ledger.set_active(id, false).unwrap();

        assert_eq!(
            ledger.commit(id, Quantity::grams(1.0), true),
            Err(LedgerError::Inactive(id))
        );
        assert_eq!(
            ledger.restore(id, Quantity::grams(10.0)).unwrap(),
            Quantity::grams(510.0)
        );
    }

    #[test]
    fn failed_batch_leaves_every_account_untouched() {
        let ledger = ledger();
        let a = spool(&ledger, 500.0);
        let b = spool(&ledger, 20.0);

        let result = ledger.transact([a, b], |tx| {
            tx.commit(a, Quantity::grams(100.0), false)?;
            tx.commit(b, Quantity::grams(30.0), true)?;
            Ok::<_, LedgerError>(())
        });

        assert!(matches!(result, Err(LedgerError::Insufficient { .. })));
        assert_eq!(ledger.account(a).unwrap().remaining(), Quantity::grams(500.0));
        assert_eq!(ledger.account(b).unwrap().remaining(), Quantity::grams(20.0));
    }

    #[test]
    fn successful_batch_reports_net_movements() {
        let ledger = ledger();
        let a = spool(&ledger, 60.0);
        let b = spool(&ledger, 500.0);

        let ((), movements) = ledger
            .transact([b, a, a], |tx| {
                tx.commit(a, Quantity::grams(15.0), false)?;
                tx.commit(b, Quantity::grams(5.0), false)?;
                tx.restore(b, Quantity::grams(5.0))?;
                Ok::<_, LedgerError>(())
            })
            .unwrap();

        assert_eq!(movements.len(), 1, "b netted out to zero");
        let moved = &movements[0];
        assert_eq!(moved.account_id, a);
        assert_eq!(moved.previous, Quantity::grams(60.0));
        assert_eq!(moved.current, Quantity::grams(45.0));
        assert!(moved.is_consumption());
        assert!(moved.crossed_alert_threshold());
    }

    #[test]
    fn replace_is_atomic() {
        let ledger = ledger();
        let id = spool(&ledger, 100.0);
        ledger.commit(id, Quantity::grams(40.0), false).unwrap();

        let old = [ConsumptionLine::new(id, Quantity::grams(40.0))];
        let too_much = [ConsumptionLine::new(id, Quantity::grams(150.0))];
        assert!(ledger.replace(&old, &too_much, true).is_err());
        assert_eq!(ledger.account(id).unwrap().remaining(), Quantity::grams(60.0));

        let corrected = [ConsumptionLine::new(id, Quantity::grams(55.0))];
        let movements = ledger.replace(&old, &corrected, false).unwrap();
        assert_eq!(ledger.account(id).unwrap().remaining(), Quantity::grams(45.0));
        assert_eq!(movements[0].previous, Quantity::grams(60.0));
        assert_eq!(movements[0].current, Quantity::grams(45.0));
    }

    #[test]
    fn repricing_validates_cost() {
        let ledger = ledger();
        let id = spool(&ledger, 100.0);
        ledger.reprice(id, 31.5).unwrap();
        assert_eq!(ledger.account(id).unwrap().unit_cost(), 31.5);
        assert!(matches!(
            ledger.reprice(id, f64::NAN),
            Err(LedgerError::Domain(DomainError::Validation(_)))
        ));
    }

    #[test]
    fn duplicate_tracking_ids_conflict_only_with_active_accounts() {
        let ledger = ledger();
        let first = ledger
            .register(NewAccount::spool("PLA red", Quantity::grams(1000.0), 20.0).with_tracking_id("PLA01"))
            .unwrap();

        let err = ledger
            .register_unique(
                NewAccount::spool("PLA blue", Quantity::grams(1000.0), 20.0).with_tracking_id("PLA01"),
                false,
            )
            .unwrap_err();
        match err {
            LedgerError::DuplicateTrackingId { existing } => {
                assert_eq!(existing.id, first);
                assert_eq!(existing.label, "PLA red");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        ledger.set_active(first, false).unwrap();
        assert!(
            ledger
                .register_unique(
                    NewAccount::spool("PLA blue", Quantity::grams(1000.0), 20.0).with_tracking_id("PLA01"),
                    false,
                )
                .is_ok()
        );
        assert_eq!(ledger.tracking_ids().unwrap().len(), 2);
    }

    #[test]
    fn low_and_empty_lists_active_accounts_of_one_unit() {
        let ledger = ledger();
        let empty = spool(&ledger, 0.0);
        let at_threshold = spool(&ledger, 50.0);
        let lower = spool(&ledger, 12.5);
        spool(&ledger, 50.5);
        let retired = spool(&ledger, 10.0);
        ledger.set_active(retired, false).unwrap();
        ledger
            .register(NewAccount::hardware("M3 nuts", Quantity::items(100), 0.02).with_remaining(Quantity::items(3)))
            .unwrap();

        let alerts = ledger.low_and_empty(Unit::Mass, Quantity::grams(50.0)).unwrap();
        let ids = |list: &[AccountSummary]| list.iter().map(|a| a.id).collect::<Vec<_>>();
        assert_eq!(ids(&alerts.empty), vec![empty]);
        assert_eq!(ids(&alerts.low), vec![lower, at_threshold]);

        let bins = ledger.low_and_empty(Unit::Count, Quantity::items(5)).unwrap();
        assert_eq!(bins.low.len(), 1);
        assert!(bins.empty.is_empty());
    }

    #[test]
    fn alternatives_need_the_request_plus_reserve() {
        let ledger = ledger();
        let pla = |remaining: f64| {
            ledger
                .register(
                    NewAccount::spool("PLA", Quantity::grams(1000.0), 20.0)
                        .with_family("PLA")
                        .with_remaining(Quantity::grams(remaining)),
                )
                .unwrap()
        };
        let short = pla(40.0);
        let exact = pla(105.0);
        let fuller = pla(600.0);
        pla(104.9);
        let retired = pla(900.0);
        ledger.set_active(retired, false).unwrap();
        ledger
            .register(NewAccount::spool("PETG", Quantity::grams(1000.0), 20.0).with_family("PETG"))
            .unwrap();

        let found = ledger.alternatives("pla", Quantity::grams(100.0), &[short]).unwrap();
        assert_eq!(found.iter().map(|a| a.id).collect::<Vec<_>>(), vec![fuller, exact]);

        let found = ledger.alternatives("PLA", Quantity::grams(100.0), &[fuller]).unwrap();
        assert_eq!(found.iter().map(|a| a.id).collect::<Vec<_>>(), vec![exact]);

        for _ in 0..8 {
            pla(800.0);
        }
        assert_eq!(
            ledger.alternatives("PLA", Quantity::grams(1.0), &[]).unwrap().len(),
            MAX_ALTERNATIVES
        );
    }

    #[test]
    fn commit_hook_runs_only_for_successful_batches() {
        let ledger = ledger();
        let id = spool(&ledger, 100.0);
        let mut seen = Vec::new();

        let result = ledger.transact_and_then(
            [id],
            |tx| tx.commit(id, Quantity::grams(200.0), true),
            |movements| seen.extend_from_slice(movements),
        );
        assert!(result.is_err());
        assert!(seen.is_empty());

        ledger
            .transact_and_then(
                [id],
                |tx| tx.commit(id, Quantity::grams(20.0), false),
                |movements| seen.extend_from_slice(movements),
            )
            .unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].current, Quantity::grams(80.0));
    }

    #[test]
    fn concurrent_consumers_never_lose_updates() {
        let ledger = Arc::new(ledger());
        let id = spool(&ledger, 1000.0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for _ in 0..50 {
                        ledger.commit(id, Quantity::grams(1.0), false).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(ledger.account(id).unwrap().remaining(), Quantity::grams(600.0));
    }

    #[test]
    fn opposite_lock_order_requests_do_not_deadlock() {
        let ledger = Arc::new(ledger());
        let a = spool(&ledger, 1000.0);
        let b = spool(&ledger, 1000.0);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                let ids = if i % 2 == 0 { [a, b] } else { [b, a] };
                thread::spawn(move || {
                    for _ in 0..100 {
                        ledger
                            .transact(ids, |tx| {
                                tx.commit(ids[0], Quantity::grams(0.5), false)?;
                                tx.commit(ids[1], Quantity::grams(0.5), false)?;
                                Ok::<_, LedgerError>(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(ledger.account(a).unwrap().remaining(), Quantity::grams(800.0));
        assert_eq!(ledger.account(b).unwrap().remaining(), Quantity::grams(800.0));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Commit { mg: i64, force: bool },
        Restore { mg: i64 },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0i64..400_000, any::<bool>()).prop_map(|(mg, force)| Op::Commit { mg, force }),
            (0i64..400_000).prop_map(|mg| Op::Restore { mg }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever sequence of movements is attempted, remaining
        /// stays within [0, total] and refused movements change nothing.
        #[test]
        fn remaining_stays_within_bounds(ops in prop::collection::vec(op(), 1..40)) {
            let ledger = ledger();
            let id = spool(&ledger, 1000.0);
            let total = Quantity::grams(1000.0);

            for op in ops {
                let before = ledger.account(id).unwrap().remaining();
                let result = match op {
                    Op::Commit { mg, force } => ledger.commit(id, Quantity::milligrams(mg), force),
                    Op::Restore { mg } => ledger.restore(id, Quantity::milligrams(mg)),
                };
                let after = ledger.account(id).unwrap().remaining();

                prop_assert!(!after.is_negative());
                prop_assert!(after <= total);
                if result.is_err() {
                    prop_assert_eq!(after, before);
                }
            }
        }
    }
}
