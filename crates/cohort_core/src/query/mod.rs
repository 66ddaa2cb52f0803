//! # Query Surface
//!
//! Borrowed views of committed records, per partition, per partition list,
//! or across every partition.

mod collection;
mod db;

pub use collection::{EntityCollection, EntityCollection2, EntityCollection2Mut, EntityCollectionMut};
pub use db::{EntitiesDb, Groups2Iter, GroupsIter};
