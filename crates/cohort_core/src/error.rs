//! # Engine Error Types
//!
//! All errors that can occur while staging, submitting, or querying records.

use crate::ecs::{Egid, PartitionId};
use thiserror::Error;

/// Errors that can occur in the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A build or move targets an id that is already live in the partition.
    #[error("duplicate record: {0} is already live")]
    DuplicateRecord(Egid),

    /// The record does not exist in the named partition.
    #[error("record not found: {0}")]
    RecordNotFound(Egid),

    /// The partition is unknown, or its layout cannot accept the operation.
    #[error("invalid partition {partition}: {reason}")]
    InvalidPartition {
        /// The offending partition.
        partition: PartitionId,
        /// What was wrong with it.
        reason: String,
    },

    /// Preallocation was requested on a partition that already holds records.
    #[error("cannot preallocate partition {partition}: it already holds {count} records")]
    PreallocationConflict {
        /// The partition.
        partition: PartitionId,
        /// Records currently live in it.
        count: usize,
    },

    /// A build supplied a component the schema does not declare.
    #[error("component `{component}` is not part of schema `{schema}`")]
    ComponentNotInSchema {
        /// Component type name.
        component: &'static str,
        /// Schema type name.
        schema: &'static str,
    },

    /// The same record was moved twice within one submission.
    #[error("record {0} is moved more than once in the same submission")]
    ConflictingMove(Egid),

    /// A canonical partition name is already held by another partition.
    #[error("partition name `{name}` is already held by {existing}")]
    PartitionNameTaken {
        /// The name being registered.
        name: String,
        /// The partition holding it.
        existing: PartitionId,
    },

    /// Two distinct partition names hash to the same stable value.
    #[error("stable hash {hash:#010x} of `{name}` collides with `{existing}`")]
    StableHashCollision {
        /// The colliding hash.
        hash: u32,
        /// The name being registered.
        name: String,
        /// The name already holding the hash.
        existing: String,
    },

    /// The root has been disposed and accepts no further work.
    #[error("engines root has been disposed")]
    RootDisposed,

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    pub(crate) fn invalid_partition(partition: PartitionId, reason: impl Into<String>) -> Self {
        Self::InvalidPartition {
            partition,
            reason: reason.into(),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
