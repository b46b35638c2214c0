//! Transaction lifecycle: begin, commit, abort.
//!
//! A deliberately thin manager that drives [`TransactionContext`] through
//! its contracts. It owns two clocks and the garbage hand-off:
//!
//! - a composed read-id clock whose high 32 bits are the current epoch and
//!   whose low 32 bits are a per-epoch sequence ticket;
//! - a monotonic commit-id clock;
//! - the [`GarbageQueue`] receiving each finished transaction's payloads.
//!
//! Validation strategy is out of scope here: `commit` trusts its caller
//! and only performs the bookkeeping every protocol shares.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use petra_types::{CommitId, EpochId, IsolationLevel, ReadId, TxnId, TxnResult};

use crate::context::TransactionContext;
use crate::gc::{GarbageQueue, RetiredGarbage};

/// Starting positions for the manager's clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionManagerConfig {
    pub initial_epoch: EpochId,
    pub initial_commit_id: CommitId,
}

impl Default for TransactionManagerConfig {
    fn default() -> Self {
        // Epoch 1 leaves epoch 0 as "before any transaction" for the
        // collector's watermark; commit id 0 is the reserved sentinel.
        Self {
            initial_epoch: EpochId::new(1),
            initial_commit_id: CommitId::new(1),
        }
    }
}

/// Identifier allocation failure. Surfaced instead of ever publishing an
/// identifier outside its domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TxnError {
    #[error("read-id sequence exhausted in {0}; advance the epoch")]
    ReadSequenceExhausted(EpochId),
    #[error("commit id space exhausted")]
    CommitIdExhausted,
}

/// What a successful commit resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Commit timestamp, or `None` for the read-only fast path.
    pub commit_id: Option<CommitId>,
}

impl CommitOutcome {
    /// Whether the read-only fast path was taken.
    #[must_use]
    pub fn is_read_only(self) -> bool {
        self.commit_id.is_none()
    }
}

/// Begins, commits, and aborts transactions.
pub struct TransactionManager {
    /// Next read id to hand out. High 32 bits: current epoch; low 32
    /// bits: next sequence ticket within it.
    read_clock: AtomicU64,
    /// Next commit id to assign.
    commit_clock: AtomicU64,
    garbage: GarbageQueue,
}

impl TransactionManager {
    #[must_use]
    pub fn new(config: TransactionManagerConfig) -> Self {
        Self {
            read_clock: AtomicU64::new(config.initial_epoch.first_read_id().get()),
            commit_clock: AtomicU64::new(config.initial_commit_id.get()),
            garbage: GarbageQueue::new(),
        }
    }

    /// Epoch new transactions currently begin in.
    #[must_use]
    pub fn current_epoch(&self) -> EpochId {
        ReadId::new(self.read_clock.load(Ordering::Acquire)).epoch()
    }

    /// Move the read clock into the next epoch, resetting the sequence.
    ///
    /// Returns the epoch now current. Transactions already running keep
    /// their old read ids; only new begins observe the bump.
    pub fn advance_epoch(&self) -> EpochId {
        let mut observed = self.read_clock.load(Ordering::Acquire);
        loop {
            let next = EpochId::new(ReadId::new(observed).epoch().get() + 1);
            assert!(
                next.get() <= u64::from(u32::MAX),
                "epoch domain exhausted"
            );
            match self.read_clock.compare_exchange_weak(
                observed,
                next.first_read_id().get(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    tracing::info!(epoch = %next, "epoch advanced");
                    return next;
                }
                Err(actual) => observed = actual,
            }
        }
    }

    /// Start a transaction: claim the next read id in the current epoch
    /// and hand back its context.
    pub fn begin(
        &self,
        thread_id: u64,
        isolation: IsolationLevel,
    ) -> Result<TransactionContext, TxnError> {
        let mut observed = self.read_clock.load(Ordering::Acquire);
        loop {
            let read_id = ReadId::new(observed);
            if read_id.sequence() == u32::MAX {
                return Err(TxnError::ReadSequenceExhausted(read_id.epoch()));
            }
            match self.read_clock.compare_exchange_weak(
                observed,
                observed + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    tracing::debug!(thread_id, read_id = %read_id, %isolation, "transaction begun");
                    return Ok(TransactionContext::new(thread_id, isolation, read_id));
                }
                Err(actual) => observed = actual,
            }
        }
    }

    /// Commit a transaction the caller's validator has already admitted.
    ///
    /// Read-only transactions (nothing promoted to a write, nothing
    /// inserted) skip commit-id assignment entirely. Writers get the next
    /// commit id, mirrored into the published transaction identity. In
    /// both cases on-commit triggers fire and the garbage sets transfer
    /// to the collector's queue.
    pub fn commit(&self, mut ctx: TransactionContext) -> Result<CommitOutcome, TxnError> {
        let commit_id = if ctx.is_written() || ctx.insert_count() > 0 {
            let commit_id = self.next_commit_id()?;
            ctx.set_commit_id(commit_id);
            ctx.set_txn_id(TxnId::from(commit_id));
            Some(commit_id)
        } else {
            None
        };
        ctx.set_result(TxnResult::Success);
        ctx.exec_on_commit_triggers();
        self.retire(&mut ctx);
        tracing::debug!(
            commit_id = commit_id.map(CommitId::get),
            read_id = %ctx.read_id(),
            "transaction committed"
        );
        Ok(CommitOutcome { commit_id })
    }

    /// Abort a transaction: discard its queued side effects, record the
    /// outcome, and surrender its garbage (undone inserts and updates
    /// still leave versions to recycle).
    pub fn abort(&self, mut ctx: TransactionContext) {
        ctx.discard_on_commit_triggers();
        ctx.set_result(TxnResult::Aborted);
        self.retire(&mut ctx);
        tracing::debug!(read_id = %ctx.read_id(), "transaction aborted");
    }

    /// The queue the collector drains once epochs retire.
    #[must_use]
    pub fn garbage(&self) -> &GarbageQueue {
        &self.garbage
    }

    fn next_commit_id(&self) -> Result<CommitId, TxnError> {
        self.commit_clock
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                raw.checked_add(1)
            })
            .map(CommitId::new)
            .map_err(|_| TxnError::CommitIdExhausted)
    }

    fn retire(&self, ctx: &mut TransactionContext) {
        let slots = ctx.take_gc_set();
        let objects = ctx.take_gc_object_set();
        if slots.is_empty() && objects.is_empty() {
            return;
        }
        self.garbage.push(RetiredGarbage {
            epoch: ctx.epoch_id(),
            slots,
            objects,
        });
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(TransactionManagerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use petra_types::{BlockId, SlotLocation};

    use super::*;
    use crate::gc::GcVersionKind;
    use crate::trigger::{TriggerData, TriggerEvent};

    fn slot(block: u32, offset: u32) -> SlotLocation {
        SlotLocation::new(BlockId::new(block), offset)
    }

    #[test]
    fn test_begin_composes_epoch_and_sequence() {
        let mgr = TransactionManager::default();
        let a = mgr.begin(0, IsolationLevel::Serializable).unwrap();
        let b = mgr.begin(0, IsolationLevel::Serializable).unwrap();
        assert_eq!(a.epoch_id(), EpochId::new(1));
        assert_eq!(a.read_id().sequence(), 0);
        assert_eq!(b.read_id().sequence(), 1);
        assert!(a.read_id() < b.read_id());
    }

    #[test]
    fn test_advance_epoch_resets_sequence() {
        let mgr = TransactionManager::default();
        let _ = mgr.begin(0, IsolationLevel::Serializable).unwrap();
        let epoch = mgr.advance_epoch();
        assert_eq!(epoch, EpochId::new(2));
        let ctx = mgr.begin(0, IsolationLevel::Serializable).unwrap();
        assert_eq!(ctx.epoch_id(), EpochId::new(2));
        assert_eq!(ctx.read_id().sequence(), 0);
    }

    #[test]
    fn test_read_only_commit_consumes_no_commit_id() {
        let mgr = TransactionManager::default();
        let ro = mgr.begin(0, IsolationLevel::Serializable).unwrap();
        let outcome = mgr.commit(ro).unwrap();
        assert!(outcome.is_read_only());

        let mut writer = mgr.begin(0, IsolationLevel::Serializable).unwrap();
        writer.record_insert(slot(1, 0));
        let outcome = mgr.commit(writer).unwrap();
        // The read-only commit before us must not have burned an id.
        assert_eq!(outcome.commit_id, Some(CommitId::new(1)));
    }

    #[test]
    fn test_pure_reader_takes_fast_path() {
        // Reads alone never promote `is_written`, so a scan-only
        // transaction resolves without touching the commit clock.
        let mgr = TransactionManager::default();
        let mut ctx = mgr.begin(0, IsolationLevel::Serializable).unwrap();
        ctx.record_read(slot(1, 0));
        ctx.record_read_own(slot(1, 1));
        let outcome = mgr.commit(ctx).unwrap();
        assert!(outcome.is_read_only());
    }

    #[test]
    fn test_commit_ids_strictly_increase() {
        let mgr = TransactionManager::default();
        let mut last = CommitId::INVALID;
        for i in 0..5 {
            let mut ctx = mgr.begin(0, IsolationLevel::Serializable).unwrap();
            ctx.record_insert(slot(1, i));
            let outcome = mgr.commit(ctx).unwrap();
            let cid = outcome.commit_id.unwrap();
            assert!(cid > last);
            last = cid;
        }
    }

    #[test]
    fn test_commit_mirrors_id_and_fires_triggers() {
        let mgr = TransactionManager::default();
        let mut ctx = mgr.begin(7, IsolationLevel::SnapshotIsolation).unwrap();
        ctx.record_update(slot(2, 2));

        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        ctx.add_on_commit_trigger(TriggerData::new(
            "audit",
            TriggerEvent::AfterUpdate,
            move || {
                sink.lock().push("audit");
                Ok(())
            },
        ));

        let outcome = mgr.commit(ctx).unwrap();
        assert_eq!(outcome.commit_id, Some(CommitId::new(1)));
        assert_eq!(*fired.lock(), vec!["audit"]);
    }

    #[test]
    fn test_abort_discards_triggers_and_retires_garbage() {
        let mgr = TransactionManager::default();
        let mut ctx = mgr.begin(0, IsolationLevel::Serializable).unwrap();
        ctx.record_insert(slot(3, 0));
        ctx.gc_set_mut().insert(slot(3, 0), GcVersionKind::AbortInsert);

        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        ctx.add_on_commit_trigger(TriggerData::new(
            "never",
            TriggerEvent::AfterInsert,
            move || {
                sink.lock().push("never");
                Ok(())
            },
        ));

        let epoch = ctx.epoch_id();
        mgr.abort(ctx);
        assert!(fired.lock().is_empty(), "aborted triggers must not fire");

        let drained = mgr.garbage().drain_retired(epoch);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].epoch, epoch);
        assert_eq!(
            drained[0].slots.get(slot(3, 0)),
            Some(GcVersionKind::AbortInsert)
        );
    }

    #[test]
    fn test_commit_without_garbage_queues_nothing() {
        let mgr = TransactionManager::default();
        let ctx = mgr.begin(0, IsolationLevel::Serializable).unwrap();
        mgr.commit(ctx).unwrap();
        assert!(mgr.garbage().is_empty());
    }

    #[test]
    fn test_garbage_tagged_with_owning_epoch() {
        let mgr = TransactionManager::default();
        let mut early = mgr.begin(0, IsolationLevel::Serializable).unwrap();
        early
            .gc_set_mut()
            .insert(slot(1, 0), GcVersionKind::CommitUpdate);
        early.record_update(slot(1, 0));

        mgr.advance_epoch();
        let mut late = mgr.begin(0, IsolationLevel::Serializable).unwrap();
        late.gc_set_mut()
            .insert(slot(1, 1), GcVersionKind::CommitUpdate);
        late.record_update(slot(1, 1));

        mgr.commit(early).unwrap();
        mgr.commit(late).unwrap();

        // Only epoch-1 garbage is reclaimable once epoch 1 retires.
        let drained = mgr.garbage().drain_retired(EpochId::new(1));
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].epoch, EpochId::new(1));
        assert_eq!(mgr.garbage().len(), 1);
    }
}
