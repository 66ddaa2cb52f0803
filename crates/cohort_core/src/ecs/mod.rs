//! # Entity Component System
//!
//! Records grouped into partitions, each partition stored densely.
//!
//! ## Design Philosophy
//!
//! - A record is addressed by its local id plus its partition
//! - Every partition is one table of parallel component columns
//! - Removal is swap-remove, so iteration never sees holes
//! - Only the submission pipeline changes which records exist

mod column;
mod component;
mod entity;
mod record;
mod storage;

pub use column::{Column, ColumnVec};
pub use component::{Component, ComponentType, Schema, SchemaType};
pub use entity::{Egid, PartitionBitmask, PartitionId};
pub use record::RecordValues;
pub use storage::{PartitionStore, PartitionTable};
