//! # Staging Queue
//!
//! Structural operations recorded between two submissions, and the planner
//! that validates a whole batch before any of it is applied.
//!
//! ## Batch rules
//!
//! - builds apply first, grouped per partition in first-appearance order
//! - moves apply next, grouped per `(from, to)` pair in first-appearance order
//! - removes apply after moves, so a move followed by a remove of the moved
//!   record ends with the record gone
//! - a remove of `(id, from)` cancels a same-batch move of `(id, from)`
//! - whole-partition moves, then whole-partition removes, apply last
//!
//! Anything that would leave the store inconsistent fails the whole batch.

use crate::ecs::{ComponentType, Egid, PartitionId, PartitionStore, RecordValues};
use crate::error::{EngineError, EngineResult};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Arc;

/// A staged build.
#[derive(Debug)]
pub(crate) struct StagedBuild {
    pub(crate) egid: Egid,
    pub(crate) values: RecordValues,
}

/// A staged move.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StagedMove {
    pub(crate) egid: Egid,
    pub(crate) to: PartitionId,
}

/// Operations waiting for the next submission.
#[derive(Debug, Default)]
pub(crate) struct StagingQueue {
    pub(crate) builds: Vec<StagedBuild>,
    pub(crate) moves: Vec<StagedMove>,
    pub(crate) removes: Vec<Egid>,
    pub(crate) group_moves: Vec<(PartitionId, PartitionId)>,
    pub(crate) group_removes: Vec<PartitionId>,
    capacity: usize,
}

/// Queue shared by a root and the handles it issues.
pub(crate) type SharedQueue = Arc<Mutex<StagingQueue>>;

impl StagingQueue {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            builds: Vec::with_capacity(capacity),
            moves: Vec::with_capacity(capacity),
            removes: Vec::with_capacity(capacity),
            group_moves: Vec::new(),
            group_removes: Vec::new(),
            capacity,
        }
    }

    /// Total staged operations.
    pub(crate) fn len(&self) -> usize {
        self.builds.len()
            + self.moves.len()
            + self.removes.len()
            + self.group_moves.len()
            + self.group_removes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes every staged operation, leaving a fresh queue behind.
    pub(crate) fn take(&mut self) -> Self {
        let fresh = Self::with_capacity(self.capacity);
        mem::replace(self, fresh)
    }
}

/// Records built into one partition.
pub(crate) struct BuildGroup {
    pub(crate) partition: PartitionId,
    pub(crate) layout: Vec<ComponentType>,
    pub(crate) records: Vec<(u32, RecordValues)>,
}

/// Records moved between one pair of partitions.
pub(crate) struct MoveGroup {
    pub(crate) from: PartitionId,
    pub(crate) to: PartitionId,
    pub(crate) ids: Vec<u32>,
}

/// Records removed from one partition.
pub(crate) struct RemoveGroup {
    pub(crate) partition: PartitionId,
    pub(crate) ids: Vec<u32>,
}

/// A validated batch, ready to apply.
#[derive(Default)]
pub(crate) struct SubmissionPlan {
    pub(crate) builds: Vec<BuildGroup>,
    pub(crate) moves: Vec<MoveGroup>,
    pub(crate) removes: Vec<RemoveGroup>,
    pub(crate) group_moves: Vec<(PartitionId, PartitionId)>,
    pub(crate) group_removes: Vec<PartitionId>,
    pub(crate) cancelled_moves: usize,
}

/// Simulated end-of-batch state used while validating.
struct Simulation<'s> {
    store: &'s PartitionStore,
    layouts: HashMap<PartitionId, Vec<ComponentType>>,
    built: HashSet<Egid>,
    moved_out: HashSet<Egid>,
    moved_in: HashSet<Egid>,
    removed: HashSet<Egid>,
}

impl<'s> Simulation<'s> {
    fn new(store: &'s PartitionStore) -> Self {
        Self {
            store,
            layouts: HashMap::new(),
            built: HashSet::new(),
            moved_out: HashSet::new(),
            moved_in: HashSet::new(),
            removed: HashSet::new(),
        }
    }

    fn layout(&self, partition: PartitionId) -> Option<&[ComponentType]> {
        self.layouts
            .get(&partition)
            .map(Vec::as_slice)
            .or_else(|| self.store.table(partition).map(|t| t.layout()))
    }

    /// Checks `layout` against the partition, claiming the partition for it
    /// if it has none yet.
    fn claim_layout(&mut self, partition: PartitionId, layout: &[ComponentType]) -> EngineResult<()> {
        match self.layout(partition) {
            Some(existing) if existing != layout => Err(EngineError::invalid_partition(
                partition,
                format!("layout {layout:?} does not match partition layout {existing:?}"),
            )),
            Some(_) => Ok(()),
            None => {
                self.layouts.insert(partition, layout.to_vec());
                Ok(())
            }
        }
    }

    /// Live at the point removes run: committed and not moved away, or
    /// built or moved in during this batch.
    fn live_before_removes(&self, egid: Egid) -> bool {
        (self.store.contains(egid) && !self.moved_out.contains(&egid))
            || self.built.contains(&egid)
            || self.moved_in.contains(&egid)
    }

    /// Ids of `partition` once single-record operations have run.
    fn ids_after_records(&self, partition: PartitionId) -> HashSet<u32> {
        let committed = self
            .store
            .table(partition)
            .map(|t| t.ids().iter().copied())
            .into_iter()
            .flatten();
        let added = self
            .built
            .iter()
            .chain(&self.moved_in)
            .filter(|e| e.partition == partition)
            .map(|e| e.entity_id);
        committed
            .chain(added)
            .filter(|&id| {
                let egid = Egid::new(id, partition);
                !self.moved_out.contains(&egid) && !self.removed.contains(&egid)
            })
            .collect()
    }
}

/// Validates a batch against the committed store and groups it for
/// application.
///
/// # Errors
///
/// - [`EngineError::DuplicateRecord`] for a build or move onto a live id
/// - [`EngineError::RecordNotFound`] for a move or remove of a missing record
/// - [`EngineError::ConflictingMove`] for a record moved twice
/// - [`EngineError::InvalidPartition`] for incompatible layouts
pub(crate) fn plan(batch: StagingQueue, store: &PartitionStore) -> EngineResult<SubmissionPlan> {
    let mut sim = Simulation::new(store);
    let mut plan = SubmissionPlan::default();

    let mut build_slots: HashMap<PartitionId, usize> = HashMap::new();
    for build in batch.builds {
        let egid = build.egid;
        if store.contains(egid) || !sim.built.insert(egid) {
            return Err(EngineError::DuplicateRecord(egid));
        }
        let layout = build.values.layout();
        sim.claim_layout(egid.partition, &layout)?;
        let slot = *build_slots.entry(egid.partition).or_insert_with(|| {
            plan.builds.push(BuildGroup {
                partition: egid.partition,
                layout,
                records: Vec::new(),
            });
            plan.builds.len() - 1
        });
        plan.builds[slot].records.push((egid.entity_id, build.values));
    }

    let cancelling: HashSet<Egid> = batch.removes.iter().copied().collect();
    let mut move_slots: HashMap<(PartitionId, PartitionId), usize> = HashMap::new();
    for staged in batch.moves {
        let source = staged.egid;
        if cancelling.contains(&source) {
            plan.cancelled_moves += 1;
            continue;
        }
        if !store.contains(source) && !sim.built.contains(&source) {
            return Err(EngineError::RecordNotFound(source));
        }
        if !sim.moved_out.insert(source) {
            return Err(EngineError::ConflictingMove(source));
        }
        let dest = source.with_partition(staged.to);
        if store.contains(dest) || sim.built.contains(&dest) || !sim.moved_in.insert(dest) {
            return Err(EngineError::DuplicateRecord(dest));
        }
        let layout = sim
            .layout(source.partition)
            .map(<[ComponentType]>::to_vec)
            .unwrap_or_default();
        sim.claim_layout(staged.to, &layout)?;

        let slot = *move_slots
            .entry((source.partition, staged.to))
            .or_insert_with(|| {
                plan.moves.push(MoveGroup {
                    from: source.partition,
                    to: staged.to,
                    ids: Vec::new(),
                });
                plan.moves.len() - 1
            });
        plan.moves[slot].ids.push(source.entity_id);
    }

    let mut remove_slots: HashMap<PartitionId, usize> = HashMap::new();
    for egid in batch.removes {
        if sim.removed.contains(&egid) || !sim.live_before_removes(egid) {
            return Err(EngineError::RecordNotFound(egid));
        }
        sim.removed.insert(egid);
        let slot = *remove_slots.entry(egid.partition).or_insert_with(|| {
            plan.removes.push(RemoveGroup {
                partition: egid.partition,
                ids: Vec::new(),
            });
            plan.removes.len() - 1
        });
        plan.removes[slot].ids.push(egid.entity_id);
    }

    let mut pending: HashMap<PartitionId, HashSet<u32>> = HashMap::new();
    for (from, to) in batch.group_moves {
        if from == to {
            return Err(EngineError::invalid_partition(
                to,
                "source and destination of a move are the same partition",
            ));
        }
        if let Some(layout) = sim.layout(from).map(<[ComponentType]>::to_vec) {
            sim.claim_layout(to, &layout)?;
        }
        let moving = pending
            .remove(&from)
            .unwrap_or_else(|| sim.ids_after_records(from));
        let target = pending
            .entry(to)
            .or_insert_with(|| sim.ids_after_records(to));
        if let Some(&clash) = moving.iter().find(|&&id| target.contains(&id)) {
            return Err(EngineError::DuplicateRecord(Egid::new(clash, to)));
        }
        target.extend(moving);
        pending.insert(from, HashSet::new());
        plan.group_moves.push((from, to));
    }

    plan.group_removes = batch.group_removes;
    Ok(plan)
}
