//! Per-slot access tracking for a running transaction.
//!
//! Every slot a transaction touches is driven through a small state
//! machine with two lanes. Slots that pre-exist the transaction climb
//! `Read -> ReadOwn -> Update -> Delete`; each step may also be entered
//! directly, and steps already taken are absorbed as no-ops. Slots the
//! transaction itself creates live in the second lane,
//! `Insert -> InsDel`, where a delete collapses the insert instead of
//! scheduling a version the rest of the system would have to clean up.
//!
//! `Delete` and `InsDel` are terminal: once a slot is scheduled for
//! deletion, any further operation on it is a bug in the executor and
//! aborts the process rather than risking silent corruption.

use std::collections::HashMap;
use std::fmt;

use petra_types::{SlotLocation, SlotLocationBuildHasher};

// ---------------------------------------------------------------------------
// AccessMode / RecordOp
// ---------------------------------------------------------------------------

/// How a transaction has accessed a slot so far.
///
/// Lookup in a [`ReadWriteSet`] yields `Option<AccessMode>`; `None` means
/// the slot has not been touched. No sentinel value is ever stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Read without intent to write.
    Read,
    /// Read with ownership intent (shared-to-exclusive upgrade requested).
    ReadOwn,
    /// Existing slot whose payload was modified.
    Update,
    /// Slot created by this transaction.
    Insert,
    /// Pre-existing slot marked deleted.
    Delete,
    /// Inserted and then deleted within the same transaction.
    InsDel,
}

impl AccessMode {
    /// Whether this mode contributes a write for commit purposes.
    #[inline]
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Update | Self::Insert | Self::Delete | Self::InsDel)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::ReadOwn => f.write_str("read_own"),
            Self::Update => f.write_str("update"),
            Self::Insert => f.write_str("insert"),
            Self::Delete => f.write_str("delete"),
            Self::InsDel => f.write_str("ins_del"),
        }
    }
}

/// The five mutating record operations, named for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordOp {
    Read,
    ReadOwn,
    Update,
    Insert,
    Delete,
}

impl fmt::Display for RecordOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("record_read"),
            Self::ReadOwn => f.write_str("record_read_own"),
            Self::Update => f.write_str("record_update"),
            Self::Insert => f.write_str("record_insert"),
            Self::Delete => f.write_str("record_delete"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// Effect of applying one record operation to a slot's current mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    /// No change.
    Keep,
    /// Store the new mode.
    Set(AccessMode),
    /// Store the new mode and raise the written flag.
    SetWritten(AccessMode),
    /// Store `Insert` and count it.
    BeginInsert,
    /// `Insert` collapses to `InsDel`; the insert is uncounted and the
    /// delete reports the slot as purely vanishing.
    CollapseInsert,
    /// Corrupt executor; fatal.
    Illegal,
}

/// The full transition table as one total function.
///
/// Exhaustiveness is compiler-checked: every (mode, operation) cell is
/// spelled out here and nowhere else.
const fn transition(current: Option<AccessMode>, op: RecordOp) -> Transition {
    use AccessMode::{Delete, InsDel, Insert, Read, ReadOwn, Update};

    match (current, op) {
        // Untouched slot: any operation is admissible.
        (None, RecordOp::Read) => Transition::Set(Read),
        (None, RecordOp::ReadOwn) => Transition::Set(ReadOwn),
        (None, RecordOp::Update) => Transition::Set(Update),
        (None, RecordOp::Insert) => Transition::BeginInsert,
        (None, RecordOp::Delete) => Transition::Set(Delete),

        // Shared read: upgrades to ownership, update, or delete.
        (Some(Read), RecordOp::Read) => Transition::Keep,
        (Some(Read), RecordOp::ReadOwn) => Transition::Set(ReadOwn),
        (Some(Read), RecordOp::Update) => Transition::SetWritten(Update),
        (Some(Read), RecordOp::Delete) => Transition::SetWritten(Delete),

        // Owned read: same upgrades minus the redundant ownership request.
        (Some(ReadOwn), RecordOp::Read | RecordOp::ReadOwn) => Transition::Keep,
        (Some(ReadOwn), RecordOp::Update) => Transition::SetWritten(Update),
        (Some(ReadOwn), RecordOp::Delete) => Transition::SetWritten(Delete),

        // Updated: rereads and reupdates are absorbed; delete supersedes.
        (Some(Update), RecordOp::Read | RecordOp::ReadOwn | RecordOp::Update) => Transition::Keep,
        (Some(Update), RecordOp::Delete) => Transition::Set(Delete),

        // Own insert: all accesses are absorbed; delete collapses the pair.
        (
            Some(Insert),
            RecordOp::Read | RecordOp::ReadOwn | RecordOp::Update | RecordOp::Insert,
        ) => Transition::Keep,
        (Some(Insert), RecordOp::Delete) => Transition::CollapseInsert,

        // Inserting over a slot the transaction already sees as live.
        (Some(Read | ReadOwn | Update), RecordOp::Insert) => Transition::Illegal,

        // Terminal states: nothing may follow a delete.
        (Some(Delete | InsDel), _) => Transition::Illegal,
    }
}

// ---------------------------------------------------------------------------
// ReadWriteSet
// ---------------------------------------------------------------------------

/// The set of slots a transaction has touched, with derived counters.
///
/// `insert_count` always equals the number of entries currently in
/// `Insert` mode. `is_written` is sticky: it is raised when a `Read` or
/// `ReadOwn` entry is promoted to `Update` or `Delete` and never cleared.
#[derive(Debug, Default)]
pub struct ReadWriteSet {
    entries: HashMap<SlotLocation, AccessMode, SlotLocationBuildHasher>,
    insert_count: u64,
    is_written: bool,
}

impl ReadWriteSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current mode of `loc`, or `None` if untouched.
    #[inline]
    #[must_use]
    pub fn mode_of(&self, loc: SlotLocation) -> Option<AccessMode> {
        self.entries.get(&loc).copied()
    }

    /// Record a shared read of `loc`.
    pub fn record_read(&mut self, loc: SlotLocation) {
        self.apply(loc, RecordOp::Read);
    }

    /// Record a read of `loc` with ownership intent.
    pub fn record_read_own(&mut self, loc: SlotLocation) {
        self.apply(loc, RecordOp::ReadOwn);
    }

    /// Record a payload update of `loc`.
    pub fn record_update(&mut self, loc: SlotLocation) {
        self.apply(loc, RecordOp::Update);
    }

    /// Record that this transaction created `loc`.
    pub fn record_insert(&mut self, loc: SlotLocation) {
        self.apply(loc, RecordOp::Insert);
    }

    /// Record a delete of `loc`.
    ///
    /// Returns `true` iff the slot was inserted by this same transaction
    /// and is now purely vanishing; the caller uses this to suppress
    /// version-chain insertion for the undone insert.
    pub fn record_delete(&mut self, loc: SlotLocation) -> bool {
        self.apply(loc, RecordOp::Delete)
    }

    /// Number of entries currently in `Insert` mode.
    #[inline]
    #[must_use]
    pub fn insert_count(&self) -> u64 {
        self.insert_count
    }

    /// Whether any read entry was promoted to a write.
    #[inline]
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.is_written
    }

    /// Number of touched slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no slot has been touched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all touched slots and their modes.
    pub fn iter(&self) -> impl Iterator<Item = (SlotLocation, AccessMode)> + '_ {
        self.entries.iter().map(|(&loc, &mode)| (loc, mode))
    }

    /// Drive one operation through the transition table.
    ///
    /// Returns `true` only for the `Insert -> InsDel` collapse.
    ///
    /// # Panics
    ///
    /// Aborts on any illegal cell of the transition table; such a call
    /// means the executor itself is corrupt.
    fn apply(&mut self, loc: SlotLocation, op: RecordOp) -> bool {
        let current = self.mode_of(loc);
        match transition(current, op) {
            Transition::Keep => false,
            Transition::Set(mode) => {
                self.entries.insert(loc, mode);
                false
            }
            Transition::SetWritten(mode) => {
                self.entries.insert(loc, mode);
                self.is_written = true;
                false
            }
            Transition::BeginInsert => {
                self.entries.insert(loc, AccessMode::Insert);
                self.insert_count += 1;
                false
            }
            Transition::CollapseInsert => {
                assert!(
                    self.insert_count > 0,
                    "ins_del collapse without a counted insert at {loc}"
                );
                self.entries.insert(loc, AccessMode::InsDel);
                self.insert_count -= 1;
                true
            }
            Transition::Illegal => {
                let mode = match current {
                    Some(mode) => mode,
                    None => unreachable!("every untouched-slot cell is legal"),
                };
                panic!("illegal {op} on slot {loc} in mode {mode}");
            }
        }
    }
}
