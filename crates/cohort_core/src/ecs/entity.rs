//! # Record Identity
//!
//! Records are addressed by an [`Egid`]: a caller-chosen local id plus the
//! [`PartitionId`] the record lives in. The same local id may exist in many
//! partitions at once; within one partition it is unique.

use std::fmt;
use std::ops::{Add, BitOr};
use std::sync::atomic::{AtomicU32, Ordering};

/// Flag bits carried in the upper byte of a [`PartitionId`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PartitionBitmask(u8);

impl PartitionBitmask {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Records in this partition are considered inactive.
    pub const DISABLED: Self = Self(0b0000_0001);

    /// Builds a bitmask from raw bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set in `self`.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Bitwise union.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for PartitionBitmask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Opaque partition identifier.
///
/// The ID is split into two parts:
/// - Lower 24 bits: partition index, unique per process
/// - Upper 8 bits: [`PartitionBitmask`] flags fixed at allocation
///
/// Index 0 is reserved as [`PartitionId::INVALID`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PartitionId(u32);

const INDEX_BITS: u32 = 24;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

static NEXT_PARTITION_INDEX: AtomicU32 = AtomicU32::new(1);

impl PartitionId {
    /// The reserved invalid id.
    pub const INVALID: Self = Self(0);

    /// Largest partition index the id can encode.
    pub const MAX_INDEX: u32 = INDEX_MASK;

    /// Creates an id from an index and flags.
    ///
    /// # Arguments
    ///
    /// * `index` - Partition index (truncated to 24 bits)
    /// * `bitmask` - Flags stored in the upper byte
    #[inline]
    #[must_use]
    pub const fn new(index: u32, bitmask: PartitionBitmask) -> Self {
        Self((index & INDEX_MASK) | ((bitmask.0 as u32) << INDEX_BITS))
    }

    /// Reserves `count` consecutive indices from the process-wide counter and
    /// returns the first.
    ///
    /// # Panics
    ///
    /// Panics if the 24-bit index space is exhausted.
    #[must_use]
    pub(crate) fn allocate(count: u32, bitmask: PartitionBitmask) -> Self {
        let count = count.max(1);
        let start = NEXT_PARTITION_INDEX.fetch_add(count, Ordering::Relaxed);
        assert!(
            start.checked_add(count - 1).is_some_and(|end| end <= INDEX_MASK),
            "partition index space exhausted"
        );
        Self::new(start, bitmask)
    }

    /// Partition index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    /// Flags.
    #[inline]
    #[must_use]
    pub const fn bitmask(self) -> PartitionBitmask {
        PartitionBitmask((self.0 >> INDEX_BITS) as u8)
    }

    /// Returns `false` for [`PartitionId::INVALID`].
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.index() != 0
    }

    /// Returns `true` if the partition carries [`PartitionBitmask::DISABLED`].
    #[inline]
    #[must_use]
    pub const fn is_disabled(self) -> bool {
        self.bitmask().contains(PartitionBitmask::DISABLED)
    }

    /// Raw packed value.
    #[inline]
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    /// Rebuilds an id from its packed value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

/// Addresses the `n`-th partition of a range reserved together.
impl Add<u32> for PartitionId {
    type Output = Self;

    fn add(self, rhs: u32) -> Self {
        let index = self.index() + rhs;
        debug_assert!(
            index <= Self::MAX_INDEX,
            "partition offset {rhs} past {self} leaves the index range"
        );
        Self::new(index, self.bitmask())
    }
}

impl Default for PartitionId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartitionId({self})")
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_disabled() {
            write!(f, "#{}!disabled", self.index())
        } else {
            write!(f, "#{}", self.index())
        }
    }
}

/// Record address: local id plus partition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Egid {
    /// Caller-chosen id, unique within the partition.
    pub entity_id: u32,
    /// Partition the record lives in.
    pub partition: PartitionId,
}

impl Egid {
    /// Creates a record address.
    #[inline]
    #[must_use]
    pub const fn new(entity_id: u32, partition: PartitionId) -> Self {
        Self {
            entity_id,
            partition,
        }
    }

    /// Same local id in another partition.
    #[inline]
    #[must_use]
    pub const fn with_partition(self, partition: PartitionId) -> Self {
        Self::new(self.entity_id, partition)
    }
}

impl fmt::Display for Egid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entity_id, self.partition)
    }
}
