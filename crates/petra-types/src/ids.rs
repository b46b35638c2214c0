//! Identifier algebra for transaction timestamps.
//!
//! Three 64-bit identifiers drive concurrency control: [`ReadId`] (the
//! snapshot timestamp), [`CommitId`] (the commit timestamp), and [`TxnId`]
//! (the identity written into tuple version headers, which mirrors the
//! commit id once one is assigned). An [`EpochId`] is not allocated on its
//! own: it is the high 32 bits of a read id, and the garbage collector uses
//! it to decide when retired versions are safe to reclaim.

use std::fmt;

/// Commit timestamp assigned at successful commit; defines serialization
/// order across transactions.
///
/// The value `0` is reserved: no live transaction ever receives it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct CommitId(u64);

impl CommitId {
    /// Reserved sentinel for "no commit id assigned yet".
    pub const INVALID: Self = Self(0);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this is a real commit id rather than the reserved sentinel.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }

    /// Return the next commit id if it does not wrap back to the sentinel.
    #[inline]
    #[must_use]
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cid#{}", self.0)
    }
}

/// Transaction identity written into tuple version headers to record
/// ownership.
///
/// During execution this mirrors the commit id, which may still be
/// [`CommitId::INVALID`]; the manager overwrites both at commit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct TxnId(u64);

impl TxnId {
    /// Identity of a transaction that has not been assigned a commit id.
    pub const INVALID: Self = Self(0);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl From<CommitId> for TxnId {
    /// A committed transaction's identity is its commit id.
    #[inline]
    fn from(cid: CommitId) -> Self {
        Self(cid.get())
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Snapshot timestamp at which a transaction sees the database.
///
/// A read id composes two halves: the high 32 bits are the [`EpochId`] the
/// transaction entered, the low 32 bits are a per-epoch sequence ticket.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct ReadId(u64);

impl ReadId {
    /// Number of low bits carrying the per-epoch sequence ticket.
    pub const SEQUENCE_BITS: u32 = 32;

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Rebuild a read id from its epoch and sequence halves.
    #[inline]
    #[must_use]
    pub const fn compose(epoch: EpochId, sequence: u32) -> Self {
        Self((epoch.get() << Self::SEQUENCE_BITS) | sequence as u64)
    }

    /// The epoch this snapshot was taken in (high 32 bits).
    #[inline]
    #[must_use]
    pub const fn epoch(self) -> EpochId {
        EpochId::new(self.0 >> Self::SEQUENCE_BITS)
    }

    /// The per-epoch sequence ticket (low 32 bits).
    #[inline]
    #[must_use]
    pub const fn sequence(self) -> u32 {
        (self.0 & u32::MAX as u64) as u32
    }
}

impl fmt::Display for ReadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rid#{}", self.0)
    }
}

/// Coarse-grained time window used by the garbage collector.
///
/// Epochs only ever come from the high half of a [`ReadId`]; the domain is
/// therefore 32 bits even though the value is carried as a u64.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct EpochId(u64);

impl EpochId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The first read id belonging to this epoch (sequence 0).
    #[inline]
    #[must_use]
    pub const fn first_read_id(self) -> ReadId {
        ReadId::compose(self, 0)
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch#{}", self.0)
    }
}

/// Isolation level a transaction runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum IsolationLevel {
    Serializable,
    SnapshotIsolation,
    RepeatableReads,
    ReadCommitted,
}

impl IsolationLevel {
    /// Parse from a settings string (case-insensitive).
    #[must_use]
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serializable" => Some(Self::Serializable),
            "snapshot" | "snapshot_isolation" => Some(Self::SnapshotIsolation),
            "repeatable_reads" => Some(Self::RepeatableReads),
            "read_committed" => Some(Self::ReadCommitted),
            _ => None,
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serializable => f.write_str("serializable"),
            Self::SnapshotIsolation => f.write_str("snapshot_isolation"),
            Self::RepeatableReads => f.write_str("repeatable_reads"),
            Self::ReadCommitted => f.write_str("read_committed"),
        }
    }
}

/// Outcome of a transaction as recorded by the commit protocol.
///
/// Round-trips through a `u8` discriminant so it can be published through
/// an atomic cell alongside the transaction's identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum TxnResult {
    Success = 0,
    Failure = 1,
    Aborted = 2,
    Unknown = 3,
}

impl TxnResult {
    /// Discriminant for atomic storage.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of [`as_u8`](Self::as_u8). Returns `None` for out-of-domain
    /// discriminants.
    #[inline]
    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Success),
            1 => Some(Self::Failure),
            2 => Some(Self::Aborted),
            3 => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for TxnResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failure => f.write_str("failure"),
            Self::Aborted => f.write_str("aborted"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}
