//! Commit-time garbage bookkeeping.
//!
//! A transaction accumulates two kinds of garbage while it runs: slot
//! versions that become unreachable once it resolves ([`GcSet`]) and schema
//! objects scheduled to be dropped ([`GcObjectSet`]). Both are owned by the
//! transaction context and transferred wholesale to the collector at
//! end-of-transaction; the [`GarbageQueue`] holds them until their epoch
//! retires.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use smallvec::SmallVec;

use petra_types::{
    BlockId, DatabaseId, EpochId, IndexId, SlotLocation, SlotLocationBuildHasher, TableId,
};

// ---------------------------------------------------------------------------
// GcVersionKind
// ---------------------------------------------------------------------------

/// Why a slot version is being handed to the collector.
///
/// The commit variants describe versions superseded by a committed write;
/// the abort variants describe versions a rolled-back transaction created
/// or unlinked and that must be recycled without ever becoming visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GcVersionKind {
    CommitUpdate,
    CommitDelete,
    CommitInsDel,
    AbortUpdate,
    AbortDelete,
    AbortInsert,
    AbortInsDel,
    /// Deleted tuple's placeholder version.
    Tombstone,
}

// ---------------------------------------------------------------------------
// GcSet
// ---------------------------------------------------------------------------

/// Slot versions to recycle, grouped by block.
///
/// Grouping by block keeps the collector's walk cache-friendly: one block
/// is pinned once and all of its retired offsets are processed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcSet {
    blocks: HashMap<BlockId, HashMap<u32, GcVersionKind>, SlotLocationBuildHasher>,
}

impl GcSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the version at `loc` for recycling. A later mark for the same
    /// slot wins.
    pub fn insert(&mut self, loc: SlotLocation, kind: GcVersionKind) {
        self.blocks
            .entry(loc.block)
            .or_default()
            .insert(loc.offset, kind);
    }

    /// Disposition recorded for `loc`, if any.
    #[must_use]
    pub fn get(&self, loc: SlotLocation) -> Option<GcVersionKind> {
        self.blocks.get(&loc.block)?.get(&loc.offset).copied()
    }

    /// Total number of marked versions.
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.blocks.values().map(HashMap::len).sum()
    }

    /// Number of distinct blocks with marked versions.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Whether nothing has been marked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Iterate over all marked versions.
    pub fn iter(&self) -> impl Iterator<Item = (SlotLocation, GcVersionKind)> + '_ {
        self.blocks.iter().flat_map(|(&block, offsets)| {
            offsets
                .iter()
                .map(move |(&offset, &kind)| (SlotLocation::new(block, offset), kind))
        })
    }
}

impl IntoIterator for GcSet {
    type Item = (SlotLocation, GcVersionKind);
    type IntoIter = std::vec::IntoIter<(SlotLocation, GcVersionKind)>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks
            .into_iter()
            .flat_map(|(block, offsets)| {
                offsets
                    .into_iter()
                    .map(move |(offset, kind)| (SlotLocation::new(block, offset), kind))
            })
            .collect::<Vec<_>>()
            .into_iter()
    }
}

// ---------------------------------------------------------------------------
// GcObjectSet
// ---------------------------------------------------------------------------

/// A schema object scheduled to be dropped when its transaction commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaObjectRef {
    pub database: DatabaseId,
    pub table: TableId,
    pub index: IndexId,
}

impl SchemaObjectRef {
    #[inline]
    pub const fn new(database: DatabaseId, table: TableId, index: IndexId) -> Self {
        Self {
            database,
            table,
            index,
        }
    }
}

/// Ordered sequence of schema objects to drop on commit.
///
/// DDL inside a transaction is rare and short, so the common cases stay
/// inline without a heap allocation.
pub type GcObjectSet = SmallVec<[SchemaObjectRef; 4]>;

// ---------------------------------------------------------------------------
// GarbageQueue
// ---------------------------------------------------------------------------

/// Garbage surrendered by one finished transaction, tagged with the epoch
/// whose retirement makes it safe to reclaim.
#[derive(Debug)]
pub struct RetiredGarbage {
    pub epoch: EpochId,
    pub slots: GcSet,
    pub objects: GcObjectSet,
}

/// Hand-off point between the transaction lifecycle and the collector.
///
/// The lifecycle side pushes a [`RetiredGarbage`] record per finished
/// transaction; the collector drains every record whose epoch has retired.
#[derive(Debug, Default)]
pub struct GarbageQueue {
    inner: Mutex<VecDeque<RetiredGarbage>>,
}

impl GarbageQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue one transaction's garbage.
    pub fn push(&self, garbage: RetiredGarbage) {
        tracing::debug!(
            epoch = %garbage.epoch,
            versions = garbage.slots.version_count(),
            objects = garbage.objects.len(),
            "garbage retired"
        );
        self.inner.lock().push_back(garbage);
    }

    /// Number of pending records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether no garbage is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Remove and return every record whose epoch is at or below
    /// `up_to_epoch`. Later records stay queued.
    pub fn drain_retired(&self, up_to_epoch: EpochId) -> Vec<RetiredGarbage> {
        let mut inner = self.inner.lock();
        let mut kept = VecDeque::with_capacity(inner.len());
        let mut drained = Vec::new();
        for garbage in inner.drain(..) {
            if garbage.epoch <= up_to_epoch {
                drained.push(garbage);
            } else {
                kept.push_back(garbage);
            }
        }
        *inner = kept;
        drop(inner);
        tracing::debug!(
            up_to_epoch = %up_to_epoch,
            drained = drained.len(),
            "garbage queue drained"
        );
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(block: u32, offset: u32) -> SlotLocation {
        SlotLocation::new(BlockId::new(block), offset)
    }

    #[test]
    fn test_gc_set_groups_by_block() {
        let mut set = GcSet::new();
        set.insert(slot(1, 0), GcVersionKind::CommitUpdate);
        set.insert(slot(1, 1), GcVersionKind::CommitDelete);
        set.insert(slot(2, 0), GcVersionKind::Tombstone);
        assert_eq!(set.version_count(), 3);
        assert_eq!(set.block_count(), 2);
        assert_eq!(set.get(slot(1, 1)), Some(GcVersionKind::CommitDelete));
        assert_eq!(set.get(slot(3, 0)), None);
    }

    #[test]
    fn test_gc_set_last_mark_wins() {
        let mut set = GcSet::new();
        set.insert(slot(1, 0), GcVersionKind::CommitUpdate);
        set.insert(slot(1, 0), GcVersionKind::AbortUpdate);
        assert_eq!(set.version_count(), 1);
        assert_eq!(set.get(slot(1, 0)), Some(GcVersionKind::AbortUpdate));
    }

    #[test]
    fn test_gc_set_into_iter_yields_all_marks() {
        let mut set = GcSet::new();
        set.insert(slot(1, 0), GcVersionKind::AbortInsert);
        set.insert(slot(2, 5), GcVersionKind::CommitInsDel);
        let mut marks: Vec<_> = set.into_iter().collect();
        marks.sort_by_key(|&(loc, _)| loc.as_u64());
        assert_eq!(
            marks,
            vec![
                (slot(1, 0), GcVersionKind::AbortInsert),
                (slot(2, 5), GcVersionKind::CommitInsDel),
            ]
        );
    }

    #[test]
    fn test_garbage_queue_drains_by_epoch() {
        let queue = GarbageQueue::new();
        for epoch in [1_u64, 2, 3] {
            queue.push(RetiredGarbage {
                epoch: EpochId::new(epoch),
                slots: GcSet::new(),
                objects: GcObjectSet::new(),
            });
        }
        assert_eq!(queue.len(), 3);

        let drained = queue.drain_retired(EpochId::new(2));
        assert_eq!(drained.len(), 2);
        assert!(drained.iter().all(|g| g.epoch <= EpochId::new(2)));
        assert_eq!(queue.len(), 1);

        let rest = queue.drain_retired(EpochId::new(u64::MAX));
        assert_eq!(rest.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_object_set_stays_inline_for_small_ddl() {
        let mut objects = GcObjectSet::new();
        for i in 0..4 {
            objects.push(SchemaObjectRef::new(
                DatabaseId::new(1),
                TableId::new(i),
                IndexId::new(0),
            ));
        }
        assert!(!objects.spilled());
        assert_eq!(objects.len(), 4);
    }
}
