//! # Structural Submission
//!
//! Builds, moves, and removes are staged through [`EntityFactory`] and
//! [`EntityFunctions`], stay invisible to queries, and take effect together
//! when [`EnginesRoot::submit_entities`] runs. Observers hear about each
//! phase as contiguous slot ranges.

mod factory;
mod queue;
mod reactive;
mod root;

pub use factory::{EntityFactory, EntityFunctions};
pub use reactive::{ReactOnAdd, ReactOnDispose, ReactOnMove, ReactOnRemove};
pub use root::{EnginesRoot, SubmissionStats};
