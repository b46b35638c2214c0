//! Foundation value types for the Petra storage engine.
//!
//! Everything here is a plain value: structural equality, cheap to copy,
//! owned by no subsystem. The concurrency crate builds its runtime
//! machinery on top of these.

pub mod ids;

pub use ids::{CommitId, EpochId, IsolationLevel, ReadId, TxnId, TxnResult};

use std::fmt;
use std::hash::{BuildHasher, Hasher};

/// Identifier of a tuple block handed out by the storage layer.
///
/// Opaque to the transaction core; blocks are only ever compared and
/// hashed, never dereferenced here.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw u32 value.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Physical address of a tuple slot: a block and an offset within it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct SlotLocation {
    pub block: BlockId,
    pub offset: u32,
}

impl SlotLocation {
    #[inline]
    pub const fn new(block: BlockId, offset: u32) -> Self {
        Self { block, offset }
    }

    /// Pack block and offset into one word, for hashing and logging.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        ((self.block.get() as u64) << 32) | self.offset as u64
    }
}

impl fmt::Display for SlotLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.block, self.offset)
    }
}

/// Schema object identifiers, as assigned by the catalog.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct DatabaseId(u32);

impl DatabaseId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct TableId(u32);

impl TableId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct IndexId(u32);

impl IndexId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Build-hasher for maps keyed by [`SlotLocation`] or [`BlockId`].
///
/// Slot addresses are dense small integers under the caller's control, so
/// a SipHash-strength hasher buys nothing on this hot path. This is a
/// fixed-key FNV-1a over the written words.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotLocationBuildHasher;

impl BuildHasher for SlotLocationBuildHasher {
    type Hasher = SlotLocationHasher;

    #[inline]
    fn build_hasher(&self) -> SlotLocationHasher {
        SlotLocationHasher(0xcbf2_9ce4_8422_2325)
    }
}

/// Hasher state for [`SlotLocationBuildHasher`].
#[derive(Debug)]
pub struct SlotLocationHasher(u64);

impl Hasher for SlotLocationHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 = (self.0 ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3);
        }
    }

    #[inline]
    fn write_u32(&mut self, n: u32) {
        self.0 = (self.0 ^ u64::from(n)).wrapping_mul(0x0000_0100_0000_01b3);
    }

    #[inline]
    fn write_u64(&mut self, n: u64) {
        self.0 = (self.0 ^ n).wrapping_mul(0x0000_0100_0000_01b3);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_slot_location_structural_equality() {
        let a = SlotLocation::new(BlockId::new(1), 7);
        let b = SlotLocation::new(BlockId::new(1), 7);
        let c = SlotLocation::new(BlockId::new(2), 7);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_slot_location_packs_block_high() {
        let loc = SlotLocation::new(BlockId::new(3), 9);
        assert_eq!(loc.as_u64(), (3 << 32) | 9);
        assert_eq!(loc.to_string(), "(3,9)");
    }

    #[test]
    fn test_slot_map_with_custom_hasher() {
        let mut map: HashMap<SlotLocation, u32, SlotLocationBuildHasher> =
            HashMap::with_hasher(SlotLocationBuildHasher);
        for offset in 0..64 {
            map.insert(SlotLocation::new(BlockId::new(1), offset), offset);
        }
        assert_eq!(map.len(), 64);
        assert_eq!(map.get(&SlotLocation::new(BlockId::new(1), 17)), Some(&17));
    }

    #[test]
    fn test_hasher_is_deterministic() {
        let build = SlotLocationBuildHasher;
        let loc = SlotLocation::new(BlockId::new(42), 4242);
        let h1 = build.hash_one(loc);
        let h2 = build.hash_one(loc);
        assert_eq!(h1, h2);
    }
}
