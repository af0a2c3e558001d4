//! Consumption pipeline (application-level orchestration).
//!
//! ```text
//! ConsumptionRequest
//!   ↓
//! 1. Check the request shape (lines, quantities, hours)
//!   ↓
//! 2. Pre-flight: copy the involved accounts, classify shortages
//!      not Clean and not forced → Blocked (nothing touched)
//!   ↓
//! 3. Lock every involved account (ascending id order)
//!      re-classify against the locked state, freeze a cost snapshot,
//!      commit every line, persist the record
//!      any failure → the ledger rolls every line back before unlocking
//!   ↓
//! 4. Publish one InventoryChanged per touched account, still under the locks
//! ```
//!
//! The pre-flight read lets most blocked requests fail without taking any
//! lock. The check is repeated under the locks because another request may
//! have drawn the same spool down in between; an account deactivated in that
//! window surfaces as [`ConsumeError::ConcurrentModification`].
//!
//! Events are numbered and sent before the locks are released, so for any one
//! account both `sequence_number` and arrival order follow commit order.
//! Publication is best-effort: a bus failure is logged and the commit stands.

pub mod error;
pub mod request;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde_json::Value as JsonValue;

use spoolledger_core::{AccountId, ConsumptionId, Quantity, Unit};
use spoolledger_costing::{CostSnapshot, RateCard, SnapshotInput};
use spoolledger_events::{EventBus, EventEnvelope};
use spoolledger_inventory::{
    AccountSummary, AccountView, ConsumptionLine, InventoryChanged, LedgerError, Movement, NewAccount,
    ShortageEntry, ShortageReport, ShortageValidator, StockAlerts, StockLedger, suggest_tracking_id,
};

use crate::config::Settings;
use crate::consumption_store::{ConsumptionRecord, ConsumptionStore};

pub use error::ConsumeError;
pub use request::{CancelToken, Committed, ConsumptionRequest, ConsumptionStage, UsageEntry, UsageHistory};

use request::check_lines;

/// Attempts at claiming a generated tracking id before giving up.
const TRACKING_ID_ATTEMPTS: usize = 5;

/// Drives consumptions through validation, snapshotting and commit.
///
/// - `S`: where consumption records are kept (`InMemoryConsumptionStore` in
///   tests, a database adapter in production)
/// - `B`: where inventory-changed events go
pub struct ConsumptionOrchestrator<S, B> {
    ledger: Arc<StockLedger>,
    store: S,
    bus: B,
    validator: ShortageValidator,
    rates: RateCard,
    auto_tracking_ids: bool,
    sequence: AtomicU64,
}

impl<S, B> ConsumptionOrchestrator<S, B> {
    pub fn new(ledger: Arc<StockLedger>, store: S, bus: B, settings: &Settings) -> Self {
        Self {
            ledger,
            store,
            bus,
            validator: ShortageValidator::new(settings.shortage_checks),
            rates: settings.rates.clone(),
            auto_tracking_ids: settings.auto_tracking_ids,
            sequence: AtomicU64::new(0),
        }
    }

    /// Build with a fresh ledger using the settings' reserve and alert defaults.
    pub fn from_settings(settings: &Settings, store: S, bus: B) -> Self {
        let ledger = Arc::new(StockLedger::new(settings.account_defaults()));
        Self::new(ledger, store, bus, settings)
    }

    pub fn ledger(&self) -> &Arc<StockLedger> {
        &self.ledger
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn rates(&self) -> &RateCard {
        &self.rates
    }
}

struct StageTracker {
    consumption_id: ConsumptionId,
    stage: ConsumptionStage,
}

impl StageTracker {
    fn new(consumption_id: ConsumptionId) -> Self {
        tracing::debug!(%consumption_id, stage = %ConsumptionStage::Received, "consumption stage");
        Self {
            consumption_id,
            stage: ConsumptionStage::Received,
        }
    }

    fn advance(&mut self, next: ConsumptionStage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal stage transition {} -> {}",
            self.stage,
            next
        );
        tracing::debug!(
            consumption_id = %self.consumption_id,
            from = %self.stage,
            stage = %next,
            "consumption stage"
        );
        self.stage = next;
    }

    /// Record how a failed run ended.
    fn fail(&mut self, err: &ConsumeError) {
        if self.stage.is_terminal() {
            return;
        }
        let next = match (self.stage, err) {
            (ConsumptionStage::Validated, ConsumeError::ShortageBlocked { .. }) => ConsumptionStage::Blocked,
            _ => ConsumptionStage::Aborted,
        };
        self.advance(next);
    }
}

impl<S, B> ConsumptionOrchestrator<S, B>
where
    S: ConsumptionStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dry run: classify `lines` against current stock. Never mutates.
    pub fn validate(&self, lines: &[ConsumptionLine]) -> Result<ShortageReport, ConsumeError> {
        check_lines(lines)?;
        let view = self
            .ledger
            .read_many(lines.iter().map(|l| l.account_id))
            .map_err(ConsumeError::at_submission)?;
        ensure_active(lines, &view)?;
        self.validator
            .evaluate(lines, &view)
            .map_err(ConsumeError::at_submission)
    }

    pub fn consume(&self, request: ConsumptionRequest) -> Result<Committed, ConsumeError> {
        self.consume_with(request, &CancelToken::default())
    }

    /// Consume all lines of `request` or none of them.
    pub fn consume_with(&self, request: ConsumptionRequest, cancel: &CancelToken) -> Result<Committed, ConsumeError> {
        let consumption_id = ConsumptionId::new();
        let span = tracing::info_span!(
            "consume",
            %consumption_id,
            lines = request.lines.len(),
            force = request.force
        );
        let _entered = span.enter();

        let mut stages = StageTracker::new(consumption_id);
        let result = self.run_consume(consumption_id, &request, cancel, &mut stages);
        match &result {
            Ok(committed) => {
                tracing::info!(
                    movements = committed.movements.len(),
                    total = committed.snapshot.total(),
                    "consumption committed"
                );
            }
            Err(err) => {
                stages.fail(err);
                tracing::info!(error = %err, stage = %stages.stage, "consumption not committed");
            }
        }
        result
    }

    fn run_consume(
        &self,
        consumption_id: ConsumptionId,
        request: &ConsumptionRequest,
        cancel: &CancelToken,
        stages: &mut StageTracker,
    ) -> Result<Committed, ConsumeError> {
        request.check()?;
        cancel.check()?;

        let report = self.validate(&request.lines)?;
        stages.advance(ConsumptionStage::Validated);
        gate(report, request.force)?;

        self.commit_batch(consumption_id, request, cancel, stages)
    }

    /// Lock, re-check, snapshot, commit and persist a validated request.
    fn commit_batch(
        &self,
        consumption_id: ConsumptionId,
        request: &ConsumptionRequest,
        cancel: &CancelToken,
        stages: &mut StageTracker,
    ) -> Result<Committed, ConsumeError> {
        let floor_override = self.floor_override(request);
        let ((snapshot, report), movements) = self.ledger.transact_and_then(
            request.account_ids(),
            |tx| -> Result<_, ConsumeError> {
                ensure_still_active(&request.lines, &*tx)?;
                let report = self
                    .validator
                    .evaluate(&request.lines, &*tx)
                    .map_err(ConsumeError::at_commit)?;
                let report = gate(report, request.force)?;

                let snapshot = self.capture(&request.lines, &*tx, request.hours, None)?;
                stages.advance(ConsumptionStage::Snapshotted);
                cancel.check()?;

                for line in request.ordered_lines() {
                    tx.commit(line.account_id, line.quantity, floor_override)
                        .map_err(ConsumeError::at_commit)?;
                }
                self.store.insert(ConsumptionRecord::new(
                    consumption_id,
                    request.lines.clone(),
                    request.hours,
                    request.force,
                    snapshot.clone(),
                ))?;
                Ok((snapshot, report))
            },
            |movements| self.publish(movements, Some(consumption_id)),
        )?;
        stages.advance(ConsumptionStage::Committed);

        Ok(Committed {
            consumption_id,
            revision: 1,
            snapshot,
            report,
            movements,
        })
    }

    /// Replace the lines of an existing consumption, e.g. after the grams used
    /// by a print were corrected.
    ///
    /// The old lines are restored and the new ones consumed under one set of
    /// locks. Only accounts the edit draws *more* from are checked for
    /// shortages (against stock with the old lines already given back) and
    /// held to their reserve floor; an edit that gives stock back or only
    /// changes machine hours never needs force. The record gets a new snapshot
    /// superseding the previous one.
    pub fn revise(&self, consumption_id: ConsumptionId, request: ConsumptionRequest) -> Result<Committed, ConsumeError> {
        let span = tracing::info_span!("revise", %consumption_id, lines = request.lines.len(), force = request.force);
        let _entered = span.enter();

        request.check()?;
        let record = self
            .store
            .get(consumption_id)?
            .ok_or(ConsumeError::NotFound(consumption_id))?;
        let view = self
            .ledger
            .read_many(request.account_ids())
            .map_err(ConsumeError::at_submission)?;
        ensure_active(&request.lines, &view)?;

        let growing: BTreeSet<AccountId> = request
            .account_ids()
            .into_iter()
            .filter(|id| {
                ConsumptionLine::sum_for(&request.lines, *id) > ConsumptionLine::sum_for(&record.lines, *id)
            })
            .collect();
        let checked: Vec<ConsumptionLine> = request
            .lines
            .iter()
            .filter(|l| growing.contains(&l.account_id))
            .copied()
            .collect();
        let floor_override = self.floor_override(&request);

        let ids: Vec<AccountId> = record.account_ids().chain(request.account_ids()).collect();
        let ((snapshot, report, revision), movements) = self.ledger.transact_and_then(
            ids,
            |tx| -> Result<_, ConsumeError> {
                for line in &record.lines {
                    tx.restore(line.account_id, line.quantity)
                        .map_err(ConsumeError::at_commit)?;
                }
                ensure_still_active(&request.lines, &*tx)?;
                let report = if checked.is_empty() {
                    ShortageReport::Clean
                } else {
                    self.validator
                        .evaluate(&checked, &*tx)
                        .map_err(ConsumeError::at_commit)?
                };
                let report = gate(report, request.force)?;

                let snapshot = self.capture(&request.lines, &*tx, request.hours, Some(&record.snapshot))?;
                for line in request.ordered_lines() {
                    let skip_floor = floor_override || !growing.contains(&line.account_id);
                    tx.commit(line.account_id, line.quantity, skip_floor)
                        .map_err(ConsumeError::at_commit)?;
                }

                let next = record.revised(request.lines.clone(), request.hours, request.force, snapshot.clone());
                let revision = next.revision;
                self.store.replace(next, record.revision)?;
                Ok((snapshot, report, revision))
            },
            |movements| self.publish(movements, Some(consumption_id)),
        )?;

        tracing::info!(revision, total = snapshot.total(), "consumption revised");
        Ok(Committed {
            consumption_id,
            revision,
            snapshot,
            report,
            movements,
        })
    }

    /// Give every line of a consumption back and drop its record.
    pub fn cancel(&self, consumption_id: ConsumptionId) -> Result<Vec<Movement>, ConsumeError> {
        let record = self
            .store
            .get(consumption_id)?
            .ok_or(ConsumeError::NotFound(consumption_id))?;

        let ((), movements) = self.ledger.transact_and_then(
            record.account_ids().collect::<Vec<_>>(),
            |tx| {
                for line in &record.lines {
                    tx.restore(line.account_id, line.quantity)
                        .map_err(ConsumeError::at_commit)?;
                }
                self.store.remove(consumption_id, record.revision)?;
                Ok::<_, ConsumeError>(())
            },
            |movements| self.publish(movements, Some(consumption_id)),
        )?;

        tracing::info!(%consumption_id, movements = movements.len(), "consumption cancelled");
        Ok(movements)
    }

    /// Every consumption that drew on `account_id`, newest first, with the
    /// account's current stock.
    pub fn usage_history(&self, account_id: AccountId) -> Result<UsageHistory, ConsumeError> {
        let account = self.ledger.account(account_id).map_err(ConsumeError::at_submission)?;
        let entries: Vec<UsageEntry> = self
            .store
            .by_account(account_id)?
            .into_iter()
            .map(|record| UsageEntry {
                consumption_id: record.id,
                quantity: ConsumptionLine::sum_for(&record.lines, account_id),
                revision: record.revision,
                created_at: record.created_at,
                updated_at: record.updated_at,
            })
            .collect();
        let consumed = Quantity::from_base(
            entries
                .iter()
                .map(|e| e.quantity.base())
                .fold(0i64, i64::saturating_add),
        );
        Ok(UsageHistory {
            account_id,
            unit: account.unit(),
            total: account.total(),
            remaining: account.remaining(),
            consumed,
            entries,
        })
    }

    /// Empty and low active accounts of `unit`, judged against the install's
    /// alert threshold for that unit. With no threshold configured only empty
    /// accounts are listed.
    pub fn stock_alerts(&self, unit: Unit) -> Result<StockAlerts, ConsumeError> {
        let threshold = self
            .ledger
            .defaults()
            .alert_threshold(unit)
            .unwrap_or(Quantity::ZERO);
        Ok(self.ledger.low_and_empty(unit, threshold)?)
    }

    /// Same-family accounts that could take a short line on their own.
    /// Accounts without a family have no alternatives.
    pub fn alternatives(&self, entry: &ShortageEntry) -> Result<Vec<AccountSummary>, ConsumeError> {
        let account = self
            .ledger
            .account(entry.account_id)
            .map_err(ConsumeError::at_submission)?;
        let Some(family) = account.family() else {
            return Ok(Vec::new());
        };
        Ok(self
            .ledger
            .alternatives(family, entry.requested, &[entry.account_id])?)
    }

    /// Next free tracking id for `family`, counting inactive accounts too.
    pub fn suggest_id(&self, family: &str) -> Result<String, ConsumeError> {
        let existing = self.ledger.tracking_ids()?;
        Ok(suggest_tracking_id(family, existing.iter().map(String::as_str))?)
    }

    /// Open a new account.
    ///
    /// A supplied tracking id must not be held by another *active* account
    /// unless `allow_duplicate` is set; the conflict carries the existing
    /// account. Without one, and with auto-generation enabled, an id is
    /// generated from `family`.
    pub fn register_account(
        &self,
        new: NewAccount,
        family: Option<&str>,
        allow_duplicate: bool,
    ) -> Result<AccountId, ConsumeError> {
        let new = match (&new.family, family) {
            (None, Some(family)) => new.with_family(family),
            _ => new,
        };
        let has_tracking_id = new.tracking_id.as_deref().is_some_and(|t| !t.trim().is_empty());
        if has_tracking_id {
            return Ok(self.ledger.register_unique(new, allow_duplicate)?);
        }

        let Some(family) = family.filter(|_| self.auto_tracking_ids) else {
            return Ok(self.ledger.register(new)?);
        };

        for attempt in 1..=TRACKING_ID_ATTEMPTS {
            let candidate = self.suggest_id(family)?;
            match self
                .ledger
                .register_unique(new.clone().with_tracking_id(candidate.as_str()), false)
            {
                Ok(id) => return Ok(id),
                Err(LedgerError::DuplicateTrackingId { .. }) => {
                    tracing::debug!(attempt, candidate = %candidate, "generated tracking id taken, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ConsumeError::Validation(format!(
            "could not allocate a tracking id for family '{family}'"
        )))
    }

    fn floor_override(&self, request: &ConsumptionRequest) -> bool {
        request.force || !self.validator.is_enabled()
    }

    fn capture<V>(
        &self,
        lines: &[ConsumptionLine],
        accounts: &V,
        hours: f64,
        previous: Option<&CostSnapshot>,
    ) -> Result<CostSnapshot, ConsumeError>
    where
        V: AccountView + ?Sized,
    {
        let inputs = lines
            .iter()
            .map(|line| {
                accounts
                    .view(line.account_id)
                    .map(|account| SnapshotInput::from_account(account, line))
                    .ok_or(ConsumeError::ConcurrentModification {
                        account_id: line.account_id,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let snapshot = match previous {
            Some(previous) => previous.revise(inputs, hours, &self.rates)?,
            None => CostSnapshot::capture(inputs, hours, &self.rates)?,
        };
        Ok(snapshot)
    }

    fn publish(&self, movements: &[Movement], consumption_id: Option<ConsumptionId>) {
        let occurred_at = Utc::now();
        for movement in movements {
            let event = InventoryChanged::from_movement(movement, consumption_id, occurred_at);
            if event.threshold_crossed {
                tracing::info!(
                    account_id = %event.account_id,
                    tracking_id = event.tracking_id.as_deref().unwrap_or_default(),
                    remaining = event.remaining.base(),
                    "low stock threshold crossed"
                );
            }

            let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
            let envelope = match EventEnvelope::from_typed(sequence, &event) {
                Ok(envelope) => envelope,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to encode inventory event");
                    continue;
                }
            };
            if let Err(err) = self.bus.publish(envelope) {
                tracing::warn!(error = ?err, account_id = %event.account_id, "failed to publish inventory event");
            }
        }
    }
}

/// Only `Clean` passes unforced. A hard shortage never passes: the ledger
/// would refuse the negative remainder anyway, and the report names every
/// short line where the ledger would only name the first.
fn gate(report: ShortageReport, force: bool) -> Result<ShortageReport, ConsumeError> {
    if report.is_blocking() || (report.requires_force() && !force) {
        return Err(ConsumeError::ShortageBlocked { report });
    }
    Ok(report)
}

fn ensure_active<V>(lines: &[ConsumptionLine], accounts: &V) -> Result<(), ConsumeError>
where
    V: AccountView + ?Sized,
{
    for line in lines {
        match accounts.view(line.account_id) {
            Some(account) if account.is_active() => {}
            Some(account) => {
                return Err(ConsumeError::Validation(format!(
                    "account '{}' is inactive",
                    account.label()
                )));
            }
            None => {
                return Err(ConsumeError::Validation(format!(
                    "account {} does not exist",
                    line.account_id
                )));
            }
        }
    }
    Ok(())
}

fn ensure_still_active<V>(lines: &[ConsumptionLine], accounts: &V) -> Result<(), ConsumeError>
where
    V: AccountView + ?Sized,
{
    for line in lines {
        match accounts.view(line.account_id) {
            Some(account) if account.is_active() => {}
            _ => {
                return Err(ConsumeError::ConcurrentModification {
                    account_id: line.account_id,
                });
            }
        }
    }
    Ok(())
}
