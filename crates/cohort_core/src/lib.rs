//! # Cohort Core
//!
//! Partitioned entity store with deferred structural changes:
//! - Records live in partitions, each stored as dense component columns
//! - Partitions are identified by tag compounds and schemas
//! - Builds, moves, and removes apply only at a submission
//!
//! ## Architecture Rules
//!
//! 1. **Stable iteration** - Nothing changes which records exist while engines iterate
//! 2. **Batched notification** - Observers see contiguous ranges, never single records
//! 3. **Order-free identity** - A tag set names the same partitions whatever order it is declared in
//!
//! ## Example
//!
//! ```rust,ignore
//! use cohort_core::{EngineConfig, EnginesRoot, Egid, RecordValues};
//!
//! let mut root = EnginesRoot::new(EngineConfig::default());
//! let partition = root.lattice().resolve_partition_of::<Ship, (Docked,)>()?;
//! root.entity_factory()
//!     .build_entity::<Ship>(Egid::new(7, partition), RecordValues::new().with(Hull(3)))?;
//! root.submit_entities()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod groups;
pub mod query;
pub mod snapshot;
pub mod submission;

pub use config::EngineConfig;
pub use ecs::{
    Column, ColumnVec, Component, ComponentType, Egid, PartitionBitmask, PartitionId,
    PartitionStore, PartitionTable, RecordValues, Schema, SchemaType,
};
pub use error::{EngineError, EngineResult};
pub use groups::{
    Compound, CompoundId, GroupLattice, GroupTag, LatticeHandle, PartitionInfo, TagSet, TagType,
    TypeSet, TypeSetHash,
};
pub use query::{
    EntitiesDb, EntityCollection, EntityCollection2, EntityCollection2Mut, EntityCollectionMut,
};
pub use snapshot::{FieldSnapshot, RecordSnapshot};
pub use submission::{
    EnginesRoot, EntityFactory, EntityFunctions, ReactOnAdd, ReactOnDispose, ReactOnMove,
    ReactOnRemove, SubmissionStats,
};
