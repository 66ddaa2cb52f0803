//! # Group Tags
//!
//! A tag is a zero-sized marker type. Sets of tags name compounds; tags also
//! qualify schema-bound partitions.
//!
//! ```rust,ignore
//! struct Red;
//! impl GroupTag for Red {}
//!
//! struct Dead;
//! impl GroupTag for Dead {
//!     const BITMASK: PartitionBitmask = PartitionBitmask::DISABLED;
//! }
//!
//! struct Lane;
//! impl GroupTag for Lane {
//!     const RANGE: u16 = 4;
//! }
//! ```

use super::type_set::TypeToken;
use crate::ecs::PartitionBitmask;
use std::any::{type_name, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Marker trait for tag types.
pub trait GroupTag: 'static {
    /// Flags given to every partition a compound containing this tag
    /// allocates.
    const BITMASK: PartitionBitmask = PartitionBitmask::NONE;

    /// Number of consecutive partitions a compound containing this tag
    /// reserves. `0` and `1` both mean a single partition.
    const RANGE: u16 = 0;
}

/// Runtime token for a [`GroupTag`] type.
#[derive(Clone, Copy)]
pub struct TagType {
    id: TypeId,
    name: &'static str,
    bitmask: PartitionBitmask,
    range: u16,
}

impl TagType {
    /// Token for `T`.
    #[inline]
    #[must_use]
    pub fn of<T: GroupTag>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            bitmask: T::BITMASK,
            range: T::RANGE,
        }
    }

    /// Type id of the tag.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Partition flags requested by the tag.
    #[inline]
    #[must_use]
    pub fn bitmask(&self) -> PartitionBitmask {
        self.bitmask
    }

    /// Partition count requested by the tag, at least 1.
    #[inline]
    #[must_use]
    pub fn range(&self) -> u16 {
        self.range.max(1)
    }
}

impl TypeToken for TagType {
    fn token_id(&self) -> TypeId {
        self.id
    }

    fn token_name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TagType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TagType {}

impl Hash for TagType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for TagType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TagType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(other.name).then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Debug for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A statically known set of tags, implemented for tuples of up to four
/// [`GroupTag`] types and for `()`.
pub trait TagSet {
    /// The tag tokens of the set, in declaration order.
    fn tag_types() -> Vec<TagType>;
}

impl TagSet for () {
    fn tag_types() -> Vec<TagType> {
        Vec::new()
    }
}

macro_rules! impl_tag_set {
    ($($tag:ident),+) => {
        impl<$($tag: GroupTag),+> TagSet for ($($tag,)+) {
            fn tag_types() -> Vec<TagType> {
                vec![$(TagType::of::<$tag>()),+]
            }
        }
    };
}

impl_tag_set!(A);
impl_tag_set!(A, B);
impl_tag_set!(A, B, C);
impl_tag_set!(A, B, C, D);
