//! # Staging Handles
//!
//! [`EntityFactory`] stages builds; [`EntityFunctions`] stages removes and
//! moves. Both are cheap clones sharing the root's queue, so engines and
//! observers can hold their own copies.
//!
//! Checks that need no other staged operation run here and fail at the
//! staging call. Everything else waits for the submission.

use super::queue::{SharedQueue, StagedBuild, StagedMove};
use crate::ecs::{Egid, PartitionId, RecordValues, Schema, SchemaType};
use crate::error::{EngineError, EngineResult};
use crate::groups::LatticeHandle;
use crate::snapshot::RecordSnapshot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// State every staging handle shares with its root.
#[derive(Clone)]
pub(crate) struct StagingHandle {
    pub(crate) queue: SharedQueue,
    pub(crate) lattice: LatticeHandle,
    pub(crate) disposed: Arc<AtomicBool>,
}

impl StagingHandle {
    pub(crate) fn ensure_live(&self) -> EngineResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(EngineError::RootDisposed)
        } else {
            Ok(())
        }
    }

    /// Schema bound to `partition`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidPartition`] if the lattice never issued
    /// `partition`.
    pub(crate) fn bound_schema(&self, partition: PartitionId) -> EngineResult<Option<SchemaType>> {
        let lattice = self.lattice.read();
        if !partition.is_valid() || !lattice.knows(partition) {
            return Err(EngineError::invalid_partition(
                partition,
                "partition was not issued by this lattice",
            ));
        }
        Ok(lattice.schema_of(partition))
    }

    /// Checks that records of `schema` may live in `partition`.
    pub(crate) fn check_schema(&self, partition: PartitionId, schema: SchemaType) -> EngineResult<()> {
        match self.bound_schema(partition)? {
            Some(bound) if bound != schema => Err(EngineError::invalid_partition(
                partition,
                format!(
                    "partition holds `{}` records, not `{}`",
                    bound.name(),
                    schema.name()
                ),
            )),
            _ => Ok(()),
        }
    }

    fn check_transfer(&self, from: PartitionId, to: PartitionId) -> EngineResult<()> {
        if from == to {
            return Err(EngineError::invalid_partition(
                to,
                "source and destination of a move are the same partition",
            ));
        }
        let source = self.bound_schema(from)?;
        let dest = self.bound_schema(to)?;
        match (source, dest) {
            (Some(a), Some(b)) if a != b => Err(EngineError::invalid_partition(
                to,
                format!(
                    "cannot move `{}` records into a `{}` partition",
                    a.name(),
                    b.name()
                ),
            )),
            _ => Ok(()),
        }
    }

    fn push_build(&self, egid: Egid, values: RecordValues) {
        tracing::trace!(%egid, components = values.len(), "build staged");
        self.queue.lock().builds.push(StagedBuild { egid, values });
    }
}

/// Stages record builds.
#[derive(Clone)]
pub struct EntityFactory {
    shared: StagingHandle,
}

impl EntityFactory {
    pub(crate) fn new(shared: StagingHandle) -> Self {
        Self { shared }
    }

    /// The lattice partitions are resolved against.
    #[must_use]
    pub fn lattice(&self) -> &LatticeHandle {
        &self.shared.lattice
    }

    /// Stages a build of a schema `S` record.
    ///
    /// Components `S` declares but `values` omits are default-initialized.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RootDisposed`] after disposal
    /// - [`EngineError::InvalidPartition`] if `egid.partition` is unknown or
    ///   bound to another schema
    /// - [`EngineError::ComponentNotInSchema`] if `values` holds a component
    ///   `S` does not declare
    pub fn build_entity<S: Schema>(&self, egid: Egid, mut values: RecordValues) -> EngineResult<()> {
        self.shared.ensure_live()?;
        let schema = SchemaType::of::<S>();
        self.shared.check_schema(egid.partition, schema)?;
        let layout = self.shared.lattice.schema_layout(schema);
        values.conform_to(schema, &layout)?;
        self.shared.push_build(egid, values);
        Ok(())
    }

    /// Stages a build whose layout is exactly `values`.
    ///
    /// If the partition is schema-bound the values are conformed to that
    /// schema as in [`Self::build_entity`].
    ///
    /// # Errors
    ///
    /// As [`Self::build_entity`].
    pub fn build_record(&self, egid: Egid, mut values: RecordValues) -> EngineResult<()> {
        self.shared.ensure_live()?;
        if let Some(schema) = self.shared.bound_schema(egid.partition)? {
            let layout = self.shared.lattice.schema_layout(schema);
            values.conform_to(schema, &layout)?;
        }
        self.shared.push_build(egid, values);
        Ok(())
    }

    /// Stages a build of a schema `S` record from a snapshot.
    ///
    /// Snapshot fields `S` no longer declares are ignored; fields `S`
    /// declares but the snapshot lacks take their default.
    ///
    /// # Errors
    ///
    /// As [`Self::build_entity`].
    pub fn restore_record<S: Schema>(&self, egid: Egid, snapshot: &RecordSnapshot) -> EngineResult<()> {
        let layout = self.shared.lattice.schema_layout(SchemaType::of::<S>());
        self.build_entity::<S>(egid, snapshot.to_values(&layout))
    }
}

/// Stages removes and moves.
#[derive(Clone)]
pub struct EntityFunctions {
    shared: StagingHandle,
}

impl EntityFunctions {
    pub(crate) fn new(shared: StagingHandle) -> Self {
        Self { shared }
    }

    /// Stages removal of one record.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RootDisposed`] after disposal
    /// - [`EngineError::InvalidPartition`] if the partition is unknown
    pub fn remove_entity(&self, egid: Egid) -> EngineResult<()> {
        self.shared.ensure_live()?;
        self.shared.bound_schema(egid.partition)?;
        self.shared.queue.lock().removes.push(egid);
        Ok(())
    }

    /// Stages a move of one record to `to`, keeping its local id.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RootDisposed`] after disposal
    /// - [`EngineError::InvalidPartition`] if either partition is unknown,
    ///   they are the same, or they are bound to different schemas
    pub fn move_entity(&self, egid: Egid, to: PartitionId) -> EngineResult<()> {
        self.shared.ensure_live()?;
        self.shared.check_transfer(egid.partition, to)?;
        self.shared.queue.lock().moves.push(StagedMove { egid, to });
        Ok(())
    }

    /// Stages removal of every record in `partition`.
    ///
    /// # Errors
    ///
    /// As [`Self::remove_entity`].
    pub fn remove_entities_from_group(&self, partition: PartitionId) -> EngineResult<()> {
        self.shared.ensure_live()?;
        self.shared.bound_schema(partition)?;
        self.shared.queue.lock().group_removes.push(partition);
        Ok(())
    }

    /// Stages a move of every record in `from` to `to`.
    ///
    /// # Errors
    ///
    /// As [`Self::move_entity`].
    pub fn swap_entities_in_group(&self, from: PartitionId, to: PartitionId) -> EngineResult<()> {
        self.shared.ensure_live()?;
        self.shared.check_transfer(from, to)?;
        self.shared.queue.lock().group_moves.push((from, to));
        Ok(())
    }
}
