//! # Groups
//!
//! Partition identity: tags, tag compounds, schema-bound partitions, and the
//! lattice that keeps compound memberships consistent.

mod lattice;
mod tag;
mod type_set;

pub use lattice::{Compound, CompoundId, GroupLattice, LatticeHandle, PartitionInfo};
pub use tag::{GroupTag, TagSet, TagType};
pub use type_set::{sort_and_hash, type_hash, TypeSet, TypeSetHash, TypeToken};
