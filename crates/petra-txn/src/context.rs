//! The per-transaction context.
//!
//! One [`TransactionContext`] exists per live transaction. It records what
//! the transaction has read, written, inserted, or deleted, accumulates
//! the garbage to recycle when the transaction resolves, and queues the
//! side effects to run if it commits.
//!
//! The context is single-writer: exactly one worker thread mutates it
//! between begin and commit/abort. Other threads resolve tuple-version
//! visibility against its published identifiers, so `txn_id`, `commit_id`,
//! and `result` live in atomic cells written with release ordering and
//! read with acquire ordering. Everything else is plain data.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use petra_types::{CommitId, EpochId, IsolationLevel, ReadId, SlotLocation, TxnId, TxnResult};

use crate::gc::{GcObjectSet, GcSet};
use crate::rw_set::{AccessMode, ReadWriteSet};
use crate::trigger::{TriggerData, TriggerSet};

/// Bookkeeping for one running transaction.
///
/// Deliberately not `Clone`: tuple-version headers embed this
/// transaction's identifiers, and a second copy would desynchronize from
/// them. The manager owns the single live instance and may move it.
pub struct TransactionContext {
    thread_id: u64,
    isolation_level: IsolationLevel,
    read_id: ReadId,
    /// High 32 bits of `read_id`, cached for the collector's benefit.
    epoch_id: EpochId,
    txn_id: AtomicU64,
    commit_id: AtomicU64,
    result: AtomicU8,
    rw_set: ReadWriteSet,
    gc_set: GcSet,
    gc_object_set: GcObjectSet,
    on_commit_triggers: Option<TriggerSet>,
}

impl TransactionContext {
    /// Context for a transaction that has no commit id yet.
    #[must_use]
    pub fn new(thread_id: u64, isolation: IsolationLevel, read_id: ReadId) -> Self {
        Self::init(thread_id, isolation, read_id, CommitId::INVALID)
    }

    /// Context with a pre-assigned commit id.
    #[must_use]
    pub fn new_with_commit_id(
        thread_id: u64,
        isolation: IsolationLevel,
        read_id: ReadId,
        commit_id: CommitId,
    ) -> Self {
        Self::init(thread_id, isolation, read_id, commit_id)
    }

    /// Sole entry point establishing a context's default state. Both
    /// constructors delegate here; no other operation touches these
    /// fields in bulk.
    fn init(
        thread_id: u64,
        isolation: IsolationLevel,
        read_id: ReadId,
        commit_id: CommitId,
    ) -> Self {
        tracing::debug!(
            thread_id,
            %isolation,
            read_id = %read_id,
            commit_id = %commit_id,
            "transaction context initialized"
        );
        Self {
            thread_id,
            isolation_level: isolation,
            read_id,
            epoch_id: read_id.epoch(),
            // Identity mirrors the commit id until the manager assigns one.
            txn_id: AtomicU64::new(commit_id.get()),
            commit_id: AtomicU64::new(commit_id.get()),
            result: AtomicU8::new(TxnResult::Unknown.as_u8()),
            rw_set: ReadWriteSet::new(),
            gc_set: GcSet::new(),
            gc_object_set: GcObjectSet::new(),
            on_commit_triggers: None,
        }
    }

    // -- identifiers ------------------------------------------------------

    /// Worker thread this transaction runs on. Diagnostics only; never
    /// checked at runtime.
    #[must_use]
    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    /// Snapshot timestamp this transaction reads at.
    #[must_use]
    pub fn read_id(&self) -> ReadId {
        self.read_id
    }

    /// Epoch the snapshot was taken in.
    #[must_use]
    pub fn epoch_id(&self) -> EpochId {
        self.epoch_id
    }

    /// Published transaction identity.
    #[must_use]
    pub fn txn_id(&self) -> TxnId {
        TxnId::new(self.txn_id.load(Ordering::Acquire))
    }

    /// Publish a new transaction identity.
    pub fn set_txn_id(&self, txn_id: TxnId) {
        self.txn_id.store(txn_id.get(), Ordering::Release);
    }

    /// Published commit timestamp; [`CommitId::INVALID`] until assigned.
    #[must_use]
    pub fn commit_id(&self) -> CommitId {
        CommitId::new(self.commit_id.load(Ordering::Acquire))
    }

    /// Publish the commit timestamp assigned at commit.
    pub fn set_commit_id(&self, commit_id: CommitId) {
        self.commit_id.store(commit_id.get(), Ordering::Release);
    }

    /// Published transaction outcome.
    #[must_use]
    pub fn result(&self) -> TxnResult {
        let raw = self.result.load(Ordering::Acquire);
        TxnResult::from_u8(raw).expect("result cell holds a TxnResult discriminant")
    }

    /// Publish the transaction outcome. Only the commit protocol calls
    /// this; the context itself never leaves `Unknown`.
    pub fn set_result(&self, result: TxnResult) {
        self.result.store(result.as_u8(), Ordering::Release);
    }

    // -- read/write set ---------------------------------------------------

    /// Record a shared read of `loc`.
    pub fn record_read(&mut self, loc: SlotLocation) {
        self.rw_set.record_read(loc);
    }

    /// Record a read of `loc` with ownership intent.
    pub fn record_read_own(&mut self, loc: SlotLocation) {
        self.rw_set.record_read_own(loc);
    }

    /// Record a payload update of `loc`.
    pub fn record_update(&mut self, loc: SlotLocation) {
        self.rw_set.record_update(loc);
    }

    /// Record that this transaction created `loc`.
    pub fn record_insert(&mut self, loc: SlotLocation) {
        self.rw_set.record_insert(loc);
    }

    /// Record a delete of `loc`; `true` iff this collapses an own-insert.
    pub fn record_delete(&mut self, loc: SlotLocation) -> bool {
        self.rw_set.record_delete(loc)
    }

    /// Current access mode of `loc`, or `None` if untouched.
    #[must_use]
    pub fn access_mode(&self, loc: SlotLocation) -> Option<AccessMode> {
        self.rw_set.mode_of(loc)
    }

    /// The full read/write set, for the commit-time validator.
    #[must_use]
    pub fn rw_set(&self) -> &ReadWriteSet {
        &self.rw_set
    }

    /// Whether any read entry was promoted to a write.
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.rw_set.is_written()
    }

    /// Number of slots currently in `Insert` mode.
    #[must_use]
    pub fn insert_count(&self) -> u64 {
        self.rw_set.insert_count()
    }

    // -- garbage ----------------------------------------------------------

    /// Slot-version garbage, mutable for the executor.
    pub fn gc_set_mut(&mut self) -> &mut GcSet {
        &mut self.gc_set
    }

    /// Schema-object garbage, mutable for the executor.
    pub fn gc_object_set_mut(&mut self) -> &mut GcObjectSet {
        &mut self.gc_object_set
    }

    #[must_use]
    pub fn gc_set(&self) -> &GcSet {
        &self.gc_set
    }

    #[must_use]
    pub fn gc_object_set(&self) -> &GcObjectSet {
        &self.gc_object_set
    }

    /// Surrender the slot-version garbage to the collector, leaving the
    /// context with an empty set.
    #[must_use]
    pub fn take_gc_set(&mut self) -> GcSet {
        std::mem::take(&mut self.gc_set)
    }

    /// Surrender the schema-object garbage to the collector.
    #[must_use]
    pub fn take_gc_object_set(&mut self) -> GcObjectSet {
        std::mem::take(&mut self.gc_object_set)
    }

    // -- on-commit triggers ----------------------------------------------

    /// Queue a trigger to fire after successful commit. The list is
    /// allocated on first registration; most transactions never pay for
    /// one.
    pub fn add_on_commit_trigger(&mut self, trigger: TriggerData) {
        self.on_commit_triggers
            .get_or_insert_with(TriggerSet::new)
            .push(trigger);
    }

    /// Number of queued on-commit triggers.
    #[must_use]
    pub fn on_commit_trigger_count(&self) -> usize {
        self.on_commit_triggers.as_ref().map_or(0, TriggerSet::len)
    }

    /// Fire queued triggers in registration order. No-op when none were
    /// registered. Trigger failures are logged, never propagated.
    pub fn exec_on_commit_triggers(&mut self) {
        if let Some(triggers) = self.on_commit_triggers.take() {
            triggers.exec();
        }
    }

    /// Drop queued triggers unfired; the abort path discards side effects.
    pub fn discard_on_commit_triggers(&mut self) {
        self.on_commit_triggers = None;
    }
}

impl fmt::Display for TransactionContext {
    /// One-line summary for logs. The exact format is not a contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "txn @{:p} id {:>4} rid {:>4} cid {:>4} result {}",
            std::ptr::from_ref(self),
            self.txn_id().get(),
            self.read_id.get(),
            self.commit_id().get(),
            self.result()
        )
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("thread_id", &self.thread_id)
            .field("isolation_level", &self.isolation_level)
            .field("read_id", &self.read_id)
            .field("epoch_id", &self.epoch_id)
            .field("txn_id", &self.txn_id())
            .field("commit_id", &self.commit_id())
            .field("result", &self.result())
            .field("touched_slots", &self.rw_set.len())
            .finish_non_exhaustive()
    }
}
