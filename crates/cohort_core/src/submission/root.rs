//! # Engines Root
//!
//! Owner of one partition store, its staging queue, and its observers.
//!
//! ## Submission
//!
//! ```text
//! stage ──► queue ──take──► plan (validate whole batch) ──► apply phases
//!                                       │                        │
//!                                  error: batch              observers per
//!                                  discarded                 phase and range
//! ```
//!
//! A failed plan leaves the store untouched. Operations staged while a
//! submission is applying land in the fresh queue and wait for the next one.

use super::factory::{EntityFactory, EntityFunctions, StagingHandle};
use super::queue::{self, StagingQueue, SubmissionPlan};
use super::reactive::{
    ReactOnAdd, ReactOnDispose, ReactOnMove, ReactOnRemove, Reaction, Reactors,
};
use crate::config::EngineConfig;
use crate::ecs::{Component, Egid, PartitionId, PartitionStore, Schema, SchemaType};
use crate::error::{EngineError, EngineResult};
use crate::groups::LatticeHandle;
use crate::query::EntitiesDb;
use crate::snapshot::RecordSnapshot;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What one submission applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubmissionStats {
    /// Records built.
    pub built: usize,
    /// Records moved, single and whole-partition.
    pub moved: usize,
    /// Records removed, single and whole-partition.
    pub removed: usize,
    /// Staged moves dropped because a remove of the same record won.
    pub cancelled_moves: usize,
    /// Whole-partition moves applied.
    pub partitions_moved: usize,
    /// Whole-partition removes applied.
    pub partitions_removed: usize,
    /// Observer calls made.
    pub observer_calls: usize,
}

impl SubmissionStats {
    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.built == 0 && self.moved == 0 && self.removed == 0
    }

    /// Records whose placement changed.
    #[must_use]
    pub fn records_touched(&self) -> usize {
        self.built + self.moved + self.removed
    }
}

/// Owner of one store and the only place structural changes take effect.
pub struct EnginesRoot {
    config: EngineConfig,
    staging: StagingHandle,
    db: EntitiesDb,
    reactors: Reactors,
    submissions: u64,
}

impl EnginesRoot {
    /// Creates a root bound to the process-wide lattice.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::with_lattice(config, LatticeHandle::global())
    }

    /// Creates a root bound to `lattice`.
    #[must_use]
    pub fn with_lattice(config: EngineConfig, lattice: LatticeHandle) -> Self {
        let staging = StagingHandle {
            queue: Arc::new(Mutex::new(StagingQueue::with_capacity(
                config.staging_capacity,
            ))),
            lattice,
            disposed: Arc::new(AtomicBool::new(false)),
        };
        Self {
            db: EntitiesDb::new(config.default_partition_capacity),
            config,
            staging,
            reactors: Reactors::default(),
            submissions: 0,
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Lattice partitions are resolved against.
    #[must_use]
    pub fn lattice(&self) -> &LatticeHandle {
        &self.staging.lattice
    }

    /// A handle staging builds into this root.
    #[must_use]
    pub fn entity_factory(&self) -> EntityFactory {
        EntityFactory::new(self.staging.clone())
    }

    /// A handle staging removes and moves in this root.
    #[must_use]
    pub fn entity_functions(&self) -> EntityFunctions {
        EntityFunctions::new(self.staging.clone())
    }

    /// Committed records.
    #[must_use]
    pub fn entities_db(&self) -> &EntitiesDb {
        &self.db
    }

    /// Committed records, writable in place.
    pub fn entities_db_mut(&mut self) -> &mut EntitiesDb {
        &mut self.db
    }

    // =========================================================================
    // OBSERVERS
    // =========================================================================

    /// Registers an observer of builds carrying `C`.
    pub fn on_add<C: Component, R: ReactOnAdd<C>>(&mut self, reactor: R) {
        self.reactors.on_add::<C, R>(reactor);
    }

    /// Registers an observer of moves carrying `C`.
    pub fn on_move<C: Component, R: ReactOnMove<C>>(&mut self, reactor: R) {
        self.reactors.on_move::<C, R>(reactor);
    }

    /// Registers an observer of removes carrying `C`.
    pub fn on_remove<C: Component, R: ReactOnRemove<C>>(&mut self, reactor: R) {
        self.reactors.on_remove::<C, R>(reactor);
    }

    /// Registers an observer of disposal carrying `C`.
    pub fn on_dispose<C: Component, R: ReactOnDispose<C>>(&mut self, reactor: R) {
        self.reactors.on_dispose::<C, R>(reactor);
    }

    /// Registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.reactors.len()
    }

    // =========================================================================
    // SUBMISSION
    // =========================================================================

    /// Operations waiting for the next submission.
    #[must_use]
    pub fn pending_operations(&self) -> usize {
        self.staging.queue.lock().len()
    }

    /// Returns `true` if anything is staged.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.staging.queue.lock().is_empty()
    }

    /// Completed submissions.
    #[must_use]
    pub fn submission_count(&self) -> u64 {
        self.submissions
    }

    /// Applies every staged operation.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RootDisposed`] after disposal
    /// - any batch validation error; the whole batch is discarded and the
    ///   store is left as it was
    pub fn submit_entities(&mut self) -> EngineResult<SubmissionStats> {
        self.staging.ensure_live()?;
        let batch = self.staging.queue.lock().take();
        if batch.is_empty() {
            return Ok(SubmissionStats::default());
        }
        let staged = batch.len();
        let plan = match queue::plan(batch, self.db.store()) {
            Ok(plan) => plan,
            Err(error) => {
                tracing::warn!(%error, discarded = staged, "submission rejected, batch discarded");
                return Err(error);
            }
        };

        let stats = apply(plan, self.db.store_mut(), &mut self.reactors)?;
        self.submissions += 1;
        if self.config.log_submissions && !stats.is_empty() {
            tracing::debug!(
                submission = self.submissions,
                records = stats.records_touched(),
                built = stats.built,
                moved = stats.moved,
                removed = stats.removed,
                cancelled_moves = stats.cancelled_moves,
                observer_calls = stats.observer_calls,
                "entities submitted"
            );
        }
        Ok(stats)
    }

    // =========================================================================
    // STORAGE
    // =========================================================================

    /// Reserves room for `count` schema `S` records in an empty partition.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RootDisposed`] after disposal
    /// - [`EngineError::InvalidPartition`] if the partition is unknown or
    ///   bound to another schema
    /// - [`EngineError::PreallocationConflict`] if it already holds records
    pub fn preallocate<S: Schema>(&mut self, partition: PartitionId, count: usize) -> EngineResult<()> {
        self.staging.ensure_live()?;
        let schema = SchemaType::of::<S>();
        self.staging.check_schema(partition, schema)?;
        let layout = self.staging.lattice.schema_layout(schema);
        self.db.store_mut().preallocate(partition, &layout, count)
    }

    /// Captures every field of a committed record.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RecordNotFound`] if `egid` is not live.
    pub fn snapshot_record(&self, egid: Egid) -> EngineResult<RecordSnapshot> {
        let table = self
            .db
            .store()
            .table(egid.partition)
            .ok_or(EngineError::RecordNotFound(egid))?;
        RecordSnapshot::capture(table, egid, self.staging.lattice.stable_hash_of(egid.partition))
    }

    // =========================================================================
    // DISPOSAL
    // =========================================================================

    /// Returns `true` once [`Self::dispose`] has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.staging.disposed.load(Ordering::Acquire)
    }

    /// Hands every live record to the dispose observers once, then drops the
    /// store. Staged operations are discarded. Later calls do nothing.
    pub fn dispose(&mut self) {
        if self.staging.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let discarded = self.staging.queue.lock().take().len();
        if discarded > 0 {
            tracing::warn!(discarded, "root disposed with staged operations");
        }
        let mut records = 0;
        for table in self.db.store().tables() {
            records += table.len();
            self.reactors
                .notify(Reaction::Disposed, 0..table.len(), table);
        }
        self.db.store_mut().clear();
        tracing::info!(records, submissions = self.submissions, "engines root disposed");
    }
}

impl Drop for EnginesRoot {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Applies a validated plan phase by phase.
fn apply(
    plan: SubmissionPlan,
    store: &mut PartitionStore,
    reactors: &mut Reactors,
) -> EngineResult<SubmissionStats> {
    let mut stats = SubmissionStats {
        cancelled_moves: plan.cancelled_moves,
        ..SubmissionStats::default()
    };

    for group in plan.builds {
        let table = store.table_or_create(group.partition, &group.layout)?;
        let start = table.len();
        for (entity_id, values) in group.records {
            table.insert(entity_id, values)?;
        }
        let range = start..table.len();
        stats.built += range.len();
        stats.observer_calls += reactors.notify(Reaction::Added, range, table);
    }

    for group in plan.moves {
        let range = store.move_records(group.from, group.to, &group.ids)?;
        stats.moved += range.len();
        if let Some(table) = store.table(group.to) {
            stats.observer_calls +=
                reactors.notify(Reaction::Moved { from: group.from }, range, table);
        }
    }

    for group in plan.removes {
        let table = store.table_mut(group.partition).ok_or_else(|| {
            EngineError::RecordNotFound(Egid::new(
                group.ids.first().copied().unwrap_or_default(),
                group.partition,
            ))
        })?;
        let range = table.gather_tail(&group.ids)?;
        stats.observer_calls += reactors.notify(Reaction::Removed, range.clone(), table);
        table.truncate(range.start);
        stats.removed += range.len();
    }

    for (from, to) in plan.group_moves {
        let ids = store
            .table(from)
            .map(|t| t.ids().to_vec())
            .unwrap_or_default();
        stats.partitions_moved += 1;
        if ids.is_empty() {
            continue;
        }
        let range = store.move_records(from, to, &ids)?;
        stats.moved += range.len();
        if let Some(table) = store.table(to) {
            stats.observer_calls += reactors.notify(Reaction::Moved { from }, range, table);
        }
    }

    for partition in plan.group_removes {
        stats.partitions_removed += 1;
        if let Some(table) = store.table_mut(partition) {
            let range = 0..table.len();
            stats.observer_calls += reactors.notify(Reaction::Removed, range.clone(), table);
            table.clear();
            stats.removed += range.len();
        }
    }

    Ok(stats)
}
