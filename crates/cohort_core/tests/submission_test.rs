//! # Submission Pipeline Tests
//!
//! Staged builds, moves, and removes against a real root:
//!
//! 1. **Round trip**: build, move, remove one record across three submissions
//! 2. **Batch rules**: remove beats move, failed batches apply nothing
//! 3. **Observers**: batched ranges, counts, deferred staging
//!
//! Run with: cargo test --package cohort_core --test submission_test

use bytemuck::{Pod, Zeroable};
use cohort_core::{
    Component, ComponentType, Egid, EngineConfig, EngineError, EnginesRoot, EntityCollection,
    EntityFunctions, GroupTag, LatticeHandle, PartitionId, ReactOnAdd, ReactOnDispose, ReactOnMove,
    ReactOnRemove, RecordValues, Schema,
};
use parking_lot::Mutex;
use std::ops::Range;
use std::sync::Arc;

// ============================================================================
// FIXTURES
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Value(u32);
impl Component for Value {}

#[allow(dead_code)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Label(u32);
impl Component for Label {}

struct Unit;
impl Schema for Unit {
    fn components() -> Vec<ComponentType> {
        vec![ComponentType::of::<Value>()]
    }
}

struct Marker;
impl Schema for Marker {
    fn components() -> Vec<ComponentType> {
        vec![ComponentType::of::<Label>()]
    }
}

struct Alive;
impl GroupTag for Alive {}
struct Dead;
impl GroupTag for Dead {}
struct Archived;
impl GroupTag for Archived {}

struct Fixture {
    root: EnginesRoot,
    alive: PartitionId,
    dead: PartitionId,
    archived: PartitionId,
}

fn fixture() -> Fixture {
    let lattice = LatticeHandle::new();
    let alive = lattice.resolve_partition_of::<Unit, (Alive,)>().unwrap();
    let dead = lattice.resolve_partition_of::<Unit, (Dead,)>().unwrap();
    let archived = lattice.resolve_partition_of::<Unit, (Archived,)>().unwrap();
    Fixture {
        root: EnginesRoot::with_lattice(EngineConfig::default(), lattice),
        alive,
        dead,
        archived,
    }
}

fn build(root: &EnginesRoot, id: u32, partition: PartitionId, value: u32) {
    root.entity_factory()
        .build_entity::<Unit>(Egid::new(id, partition), RecordValues::new().with(Value(value)))
        .unwrap();
}

// ============================================================================
// ROUND TRIP
// ============================================================================

#[test]
fn test_build_move_remove_round_trip() {
    let Fixture {
        mut root,
        alive,
        dead,
        ..
    } = fixture();
    let functions = root.entity_functions();

    build(&root, 7, alive, 3);
    root.submit_entities().unwrap();
    assert_eq!(
        root.entities_db().query_entity::<Value>(Egid::new(7, alive)),
        Ok(&Value(3))
    );

    functions.move_entity(Egid::new(7, alive), dead).unwrap();
    root.submit_entities().unwrap();
    assert!(!root.entities_db().exists(Egid::new(7, alive)));
    assert_eq!(
        root.entities_db().query_entity::<Value>(Egid::new(7, dead)),
        Ok(&Value(3))
    );

    functions.remove_entity(Egid::new(7, dead)).unwrap();
    root.submit_entities().unwrap();
    assert_eq!(root.entities_db().total(), 0);

    functions.remove_entity(Egid::new(7, dead)).unwrap();
    assert_eq!(
        root.submit_entities(),
        Err(EngineError::RecordNotFound(Egid::new(7, dead)))
    );
}

#[test]
fn test_staged_work_is_invisible_until_submission() {
    let Fixture { mut root, alive, .. } = fixture();
    build(&root, 1, alive, 10);
    assert!(root.has_pending());
    assert_eq!(root.entities_db().count(alive), 0);
    assert!(root.entities_db().query_entities::<Value>(alive).is_empty());

    let stats = root.submit_entities().unwrap();
    assert_eq!(stats.built, 1);
    assert!(!root.has_pending());
    assert_eq!(root.entities_db().count(alive), 1);
}

#[test]
fn test_duplicate_id_across_submissions() {
    let Fixture { mut root, alive, .. } = fixture();
    build(&root, 7, alive, 1);
    root.submit_entities().unwrap();

    build(&root, 7, alive, 2);
    assert_eq!(
        root.submit_entities(),
        Err(EngineError::DuplicateRecord(Egid::new(7, alive)))
    );
    assert_eq!(
        root.entities_db().query_entity::<Value>(Egid::new(7, alive)),
        Ok(&Value(1))
    );
}

#[test]
fn test_duplicate_id_in_one_batch_applies_nothing() {
    let Fixture { mut root, alive, .. } = fixture();
    build(&root, 1, alive, 1);
    build(&root, 2, alive, 2);
    build(&root, 1, alive, 3);
    assert!(matches!(
        root.submit_entities(),
        Err(EngineError::DuplicateRecord(_))
    ));
    assert_eq!(root.entities_db().total(), 0);
    assert!(!root.has_pending());
}

#[test]
fn test_same_id_in_different_partitions() {
    let Fixture {
        mut root,
        alive,
        dead,
        ..
    } = fixture();
    build(&root, 4, alive, 1);
    build(&root, 4, dead, 2);
    root.submit_entities().unwrap();
    assert_eq!(root.entities_db().total(), 2);
}

// ============================================================================
// BATCH RULES
// ============================================================================

#[test]
fn test_remove_supersedes_move_from_same_partition() {
    let Fixture {
        mut root,
        alive,
        dead,
        ..
    } = fixture();
    build(&root, 7, alive, 3);
    root.submit_entities().unwrap();

    let functions = root.entity_functions();
    functions.move_entity(Egid::new(7, alive), dead).unwrap();
    functions.remove_entity(Egid::new(7, alive)).unwrap();
    let stats = root.submit_entities().unwrap();

    assert_eq!(stats.cancelled_moves, 1);
    assert_eq!(stats.moved, 0);
    assert_eq!(stats.removed, 1);
    assert_eq!(root.entities_db().total(), 0);
}

#[test]
fn test_move_then_remove_of_destination() {
    let Fixture {
        mut root,
        alive,
        dead,
        ..
    } = fixture();
    let counter = Counter::default();
    root.on_move::<Value, _>(counter.clone());
    root.on_remove::<Value, _>(counter.clone());
    build(&root, 7, alive, 3);
    root.submit_entities().unwrap();

    let functions = root.entity_functions();
    functions.move_entity(Egid::new(7, alive), dead).unwrap();
    functions.remove_entity(Egid::new(7, dead)).unwrap();
    let stats = root.submit_entities().unwrap();

    assert_eq!(stats.moved, 1);
    assert_eq!(stats.removed, 1);
    assert_eq!(root.entities_db().total(), 0);

    let log = counter.0.lock();
    assert_eq!(log.move_ranges, vec![(0..1, alive, dead)]);
    assert_eq!(log.removed_from, vec![dead]);
    assert_eq!(log.removed_ids, vec![7]);
}

#[test]
fn test_build_then_remove_in_one_batch() {
    let Fixture { mut root, alive, .. } = fixture();
    build(&root, 1, alive, 1);
    root.entity_functions()
        .remove_entity(Egid::new(1, alive))
        .unwrap();
    let stats = root.submit_entities().unwrap();
    assert_eq!(stats.built, 1);
    assert_eq!(stats.removed, 1);
    assert_eq!(root.entities_db().total(), 0);
}

#[test]
fn test_remove_from_wrong_partition() {
    let Fixture {
        mut root,
        alive,
        dead,
        ..
    } = fixture();
    build(&root, 1, alive, 1);
    root.submit_entities().unwrap();

    root.entity_functions()
        .remove_entity(Egid::new(1, dead))
        .unwrap();
    assert_eq!(
        root.submit_entities(),
        Err(EngineError::RecordNotFound(Egid::new(1, dead)))
    );
    assert!(root.entities_db().exists(Egid::new(1, alive)));
}

#[test]
fn test_remove_twice_in_one_batch() {
    let Fixture { mut root, alive, .. } = fixture();
    build(&root, 1, alive, 1);
    root.submit_entities().unwrap();

    let functions = root.entity_functions();
    functions.remove_entity(Egid::new(1, alive)).unwrap();
    functions.remove_entity(Egid::new(1, alive)).unwrap();
    assert_eq!(
        root.submit_entities(),
        Err(EngineError::RecordNotFound(Egid::new(1, alive)))
    );
    assert!(root.entities_db().exists(Egid::new(1, alive)));
}

#[test]
fn test_move_twice_in_one_batch() {
    let Fixture {
        mut root,
        alive,
        dead,
        archived,
    } = fixture();
    build(&root, 1, alive, 1);
    root.submit_entities().unwrap();

    let functions = root.entity_functions();
    functions.move_entity(Egid::new(1, alive), dead).unwrap();
    functions.move_entity(Egid::new(1, alive), archived).unwrap();
    assert_eq!(
        root.submit_entities(),
        Err(EngineError::ConflictingMove(Egid::new(1, alive)))
    );
}

#[test]
fn test_swap_remove_keeps_values_aligned() {
    let Fixture {
        mut root,
        alive,
        ..
    } = fixture();
    for id in 0..6 {
        build(&root, id, alive, id * 10);
    }
    root.submit_entities().unwrap();

    let functions = root.entity_functions();
    functions.remove_entity(Egid::new(1, alive)).unwrap();
    functions.remove_entity(Egid::new(4, alive)).unwrap();
    root.submit_entities().unwrap();

    let collection = root.entities_db().query_entities::<Value>(alive);
    assert_eq!(collection.count(), 4);
    let mut ids: Vec<u32> = collection.ids().to_vec();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 2, 3, 5]);
    for (id, value) in collection.iter() {
        assert_eq!(value.0, id * 10);
    }
}

// ============================================================================
// STAGING CHECKS
// ============================================================================

#[test]
fn test_build_into_partition_of_another_schema() {
    let Fixture { root, alive, .. } = fixture();
    let result = root
        .entity_factory()
        .build_entity::<Marker>(Egid::new(1, alive), RecordValues::new());
    assert!(matches!(result, Err(EngineError::InvalidPartition { .. })));
    assert!(!root.has_pending());
}

#[test]
fn test_build_with_component_outside_schema() {
    let Fixture { root, alive, .. } = fixture();
    let result = root.entity_factory().build_entity::<Unit>(
        Egid::new(1, alive),
        RecordValues::new().with(Value(1)).with(Label(2)),
    );
    assert!(matches!(
        result,
        Err(EngineError::ComponentNotInSchema { .. })
    ));
}

#[test]
fn test_missing_components_take_defaults() {
    let Fixture { mut root, alive, .. } = fixture();
    root.entity_factory()
        .build_entity::<Unit>(Egid::new(1, alive), RecordValues::new())
        .unwrap();
    root.submit_entities().unwrap();
    assert_eq!(
        root.entities_db().query_entity::<Value>(Egid::new(1, alive)),
        Ok(&Value(0))
    );
}

#[test]
fn test_move_across_schemas_rejected() {
    let Fixture { root, alive, .. } = fixture();
    let markers = root
        .lattice()
        .resolve_partition_of::<Marker, (Alive,)>()
        .unwrap();
    assert!(matches!(
        root.entity_functions()
            .move_entity(Egid::new(1, alive), markers),
        Err(EngineError::InvalidPartition { .. })
    ));
}

#[test]
fn test_preallocation_conflict() {
    let Fixture { mut root, alive, .. } = fixture();
    root.preallocate::<Unit>(alive, 128).unwrap();
    build(&root, 1, alive, 1);
    root.submit_entities().unwrap();
    assert_eq!(
        root.preallocate::<Unit>(alive, 128),
        Err(EngineError::PreallocationConflict {
            partition: alive,
            count: 1
        })
    );
}

// ============================================================================
// WHOLE-PARTITION OPERATIONS
// ============================================================================

#[test]
fn test_swap_and_remove_whole_partitions() {
    let Fixture {
        mut root,
        alive,
        dead,
        ..
    } = fixture();
    for id in 0..5 {
        build(&root, id, alive, id);
    }
    root.submit_entities().unwrap();

    let functions = root.entity_functions();
    functions.swap_entities_in_group(alive, dead).unwrap();
    let stats = root.submit_entities().unwrap();
    assert_eq!(stats.partitions_moved, 1);
    assert_eq!(stats.moved, 5);
    assert_eq!(root.entities_db().count(alive), 0);
    assert_eq!(root.entities_db().count(dead), 5);

    functions.remove_entities_from_group(dead).unwrap();
    let stats = root.submit_entities().unwrap();
    assert_eq!(stats.partitions_removed, 1);
    assert_eq!(stats.removed, 5);
    assert_eq!(root.entities_db().total(), 0);
}

#[test]
fn test_swap_into_partition_with_clashing_ids() {
    let Fixture {
        mut root,
        alive,
        dead,
        ..
    } = fixture();
    build(&root, 1, alive, 1);
    build(&root, 1, dead, 2);
    root.submit_entities().unwrap();

    root.entity_functions()
        .swap_entities_in_group(alive, dead)
        .unwrap();
    assert_eq!(
        root.submit_entities(),
        Err(EngineError::DuplicateRecord(Egid::new(1, dead)))
    );
    assert_eq!(root.entities_db().count(alive), 1);
}

// ============================================================================
// OBSERVERS
// ============================================================================

#[derive(Default)]
struct Log {
    added: usize,
    moved: usize,
    removed: usize,
    disposed: usize,
    removed_ids: Vec<u32>,
    removed_from: Vec<PartitionId>,
    move_ranges: Vec<(Range<usize>, PartitionId, PartitionId)>,
}

#[derive(Clone, Default)]
struct Counter(Arc<Mutex<Log>>);

impl ReactOnAdd<Value> for Counter {
    fn add(&mut self, range: Range<usize>, _: &EntityCollection<'_, Value>, _: PartitionId) {
        self.0.lock().added += range.len();
    }
}

impl ReactOnMove<Value> for Counter {
    fn moved_to(
        &mut self,
        range: Range<usize>,
        _: &EntityCollection<'_, Value>,
        from: PartitionId,
        to: PartitionId,
    ) {
        let mut log = self.0.lock();
        log.moved += range.len();
        log.move_ranges.push((range, from, to));
    }
}

impl ReactOnRemove<Value> for Counter {
    fn remove(
        &mut self,
        range: Range<usize>,
        entities: &EntityCollection<'_, Value>,
        partition: PartitionId,
    ) {
        let mut log = self.0.lock();
        log.removed += range.len();
        log.removed_ids.extend_from_slice(&entities.ids()[range]);
        log.removed_from.push(partition);
    }
}

impl ReactOnDispose<Value> for Counter {
    fn dispose(&mut self, range: Range<usize>, _: &EntityCollection<'_, Value>, _: PartitionId) {
        self.0.lock().disposed += range.len();
    }
}

#[test]
fn test_observer_counts_through_lifecycle() {
    let Fixture {
        mut root,
        alive,
        dead,
        ..
    } = fixture();
    let counter = Counter::default();
    root.on_add::<Value, _>(counter.clone());
    root.on_move::<Value, _>(counter.clone());
    root.on_remove::<Value, _>(counter.clone());
    root.on_dispose::<Value, _>(counter.clone());
    assert_eq!(root.observer_count(), 4);

    for id in 0..20 {
        build(&root, id, alive, id);
    }
    let stats = root.submit_entities().unwrap();
    assert_eq!(stats.observer_calls, 1);

    let functions = root.entity_functions();
    for id in 0..7 {
        functions.move_entity(Egid::new(id, alive), dead).unwrap();
    }
    root.submit_entities().unwrap();

    for id in 7..14 {
        functions.remove_entity(Egid::new(id, alive)).unwrap();
    }
    root.submit_entities().unwrap();

    root.dispose();

    let log = counter.0.lock();
    assert_eq!(log.added, 20);
    assert_eq!(log.moved, 7);
    assert_eq!(log.move_ranges, vec![(0..7, alive, dead)]);
    assert_eq!(log.removed, 7);
    let mut removed = log.removed_ids.clone();
    removed.sort_unstable();
    assert_eq!(removed, (7..14).collect::<Vec<_>>());
    assert_eq!(log.disposed, 13);
}

#[test]
fn test_dispose_discards_pending_work() {
    let Fixture { mut root, alive, .. } = fixture();
    let counter = Counter::default();
    root.on_dispose::<Value, _>(counter.clone());
    build(&root, 1, alive, 1);
    root.submit_entities().unwrap();
    build(&root, 2, alive, 2);

    root.dispose();
    drop(root);
    assert_eq!(counter.0.lock().disposed, 1);
}

/// Moves every record added to `from` on to `to`.
struct Forwarder {
    functions: EntityFunctions,
    from: PartitionId,
    to: PartitionId,
}

impl ReactOnAdd<Value> for Forwarder {
    fn add(&mut self, range: Range<usize>, entities: &EntityCollection<'_, Value>, partition: PartitionId) {
        if partition != self.from {
            return;
        }
        for &id in &entities.ids()[range] {
            self.functions
                .move_entity(Egid::new(id, self.from), self.to)
                .unwrap();
        }
    }
}

#[test]
fn test_staging_from_observer_waits_for_next_submission() {
    let Fixture {
        mut root,
        alive,
        dead,
        ..
    } = fixture();
    let forwarder = Forwarder {
        functions: root.entity_functions(),
        from: alive,
        to: dead,
    };
    root.on_add::<Value, _>(forwarder);

    for id in 0..3 {
        build(&root, id, alive, id);
    }
    root.submit_entities().unwrap();
    assert_eq!(root.entities_db().count(alive), 3);
    assert_eq!(root.pending_operations(), 3);

    let stats = root.submit_entities().unwrap();
    assert_eq!(stats.moved, 3);
    assert_eq!(root.entities_db().count(alive), 0);
    assert_eq!(root.entities_db().count(dead), 3);
}
