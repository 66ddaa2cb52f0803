//! # Reactive Observers
//!
//! Observers are told about structural changes once per batch and per
//! partition, never once per record. Each call receives the contiguous slot
//! range the batch touched and a read-only view of the component column it
//! was registered for.
//!
//! | Trait | Fired | Range refers to |
//! |-------|-------|-----------------|
//! | [`ReactOnAdd`] | after builds land | new slots |
//! | [`ReactOnMove`] | after records land in the destination | new slots in the destination |
//! | [`ReactOnRemove`] | before the slots are vacated | slots about to be dropped |
//! | [`ReactOnDispose`] | once per partition on root disposal | every slot |
//!
//! Staging from inside an observer is allowed; the operation joins the next
//! submission.

use crate::ecs::{Component, ComponentType, PartitionId, PartitionTable};
use crate::query::EntityCollection;
use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::Range;

/// Observes records of component `C` being built.
pub trait ReactOnAdd<C: Component>: Send + 'static {
    /// `range` holds the records just added to `partition`.
    fn add(&mut self, range: Range<usize>, entities: &EntityCollection<'_, C>, partition: PartitionId);
}

/// Observes records of component `C` moving between partitions.
pub trait ReactOnMove<C: Component>: Send + 'static {
    /// `range` holds the records just moved from `from` into `to`.
    fn moved_to(
        &mut self,
        range: Range<usize>,
        entities: &EntityCollection<'_, C>,
        from: PartitionId,
        to: PartitionId,
    );
}

/// Observes records of component `C` being removed.
pub trait ReactOnRemove<C: Component>: Send + 'static {
    /// `range` holds the records about to leave `partition`; their values
    /// are still readable.
    fn remove(&mut self, range: Range<usize>, entities: &EntityCollection<'_, C>, partition: PartitionId);
}

/// Observes records of component `C` being dropped by root disposal.
pub trait ReactOnDispose<C: Component>: Send + 'static {
    /// `range` covers every record of `partition`.
    fn dispose(&mut self, range: Range<usize>, entities: &EntityCollection<'_, C>, partition: PartitionId);
}

/// Kind of structural change being reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reaction {
    Added,
    Moved { from: PartitionId },
    Removed,
    Disposed,
}

trait Dispatch: Send {
    fn dispatch(&mut self, reaction: Reaction, range: Range<usize>, table: &PartitionTable);
}

fn view<C: Component>(table: &PartitionTable) -> Option<EntityCollection<'_, C>> {
    table
        .column::<C>()
        .map(|buffer| EntityCollection::new(buffer, table.ids()))
}

struct OnAdd<C, R>(R, PhantomData<fn() -> C>);
struct OnMove<C, R>(R, PhantomData<fn() -> C>);
struct OnRemove<C, R>(R, PhantomData<fn() -> C>);
struct OnDispose<C, R>(R, PhantomData<fn() -> C>);

impl<C: Component, R: ReactOnAdd<C>> Dispatch for OnAdd<C, R> {
    fn dispatch(&mut self, _: Reaction, range: Range<usize>, table: &PartitionTable) {
        if let Some(entities) = view::<C>(table) {
            self.0.add(range, &entities, table.partition());
        }
    }
}

impl<C: Component, R: ReactOnMove<C>> Dispatch for OnMove<C, R> {
    fn dispatch(&mut self, reaction: Reaction, range: Range<usize>, table: &PartitionTable) {
        let Reaction::Moved { from } = reaction else {
            return;
        };
        if let Some(entities) = view::<C>(table) {
            self.0.moved_to(range, &entities, from, table.partition());
        }
    }
}

impl<C: Component, R: ReactOnRemove<C>> Dispatch for OnRemove<C, R> {
    fn dispatch(&mut self, _: Reaction, range: Range<usize>, table: &PartitionTable) {
        if let Some(entities) = view::<C>(table) {
            self.0.remove(range, &entities, table.partition());
        }
    }
}

impl<C: Component, R: ReactOnDispose<C>> Dispatch for OnDispose<C, R> {
    fn dispatch(&mut self, _: Reaction, range: Range<usize>, table: &PartitionTable) {
        if let Some(entities) = view::<C>(table) {
            self.0.dispose(range, &entities, table.partition());
        }
    }
}

type Registry = HashMap<TypeId, Vec<Box<dyn Dispatch>>>;

/// Every observer registered on a root, keyed by component type.
#[derive(Default)]
pub(crate) struct Reactors {
    added: Registry,
    moved: Registry,
    removed: Registry,
    disposed: Registry,
}

impl Reactors {
    pub(crate) fn on_add<C: Component, R: ReactOnAdd<C>>(&mut self, reactor: R) {
        register::<C>(&mut self.added, Box::new(OnAdd(reactor, PhantomData)));
    }

    pub(crate) fn on_move<C: Component, R: ReactOnMove<C>>(&mut self, reactor: R) {
        register::<C>(&mut self.moved, Box::new(OnMove(reactor, PhantomData)));
    }

    pub(crate) fn on_remove<C: Component, R: ReactOnRemove<C>>(&mut self, reactor: R) {
        register::<C>(&mut self.removed, Box::new(OnRemove(reactor, PhantomData)));
    }

    pub(crate) fn on_dispose<C: Component, R: ReactOnDispose<C>>(&mut self, reactor: R) {
        register::<C>(&mut self.disposed, Box::new(OnDispose(reactor, PhantomData)));
    }

    /// Total registered observers.
    pub(crate) fn len(&self) -> usize {
        [&self.added, &self.moved, &self.removed, &self.disposed]
            .iter()
            .flat_map(|registry| registry.values())
            .map(Vec::len)
            .sum()
    }

    /// Notifies every observer of every column of `table`, in column order
    /// and then registration order.
    ///
    /// # Returns
    ///
    /// The number of observer calls made.
    pub(crate) fn notify(&mut self, reaction: Reaction, range: Range<usize>, table: &PartitionTable) -> usize {
        if range.is_empty() {
            return 0;
        }
        let registry = match reaction {
            Reaction::Added => &mut self.added,
            Reaction::Moved { .. } => &mut self.moved,
            Reaction::Removed => &mut self.removed,
            Reaction::Disposed => &mut self.disposed,
        };
        let mut calls = 0;
        for component in table.layout() {
            if let Some(observers) = registry.get_mut(&component.id()) {
                for observer in observers {
                    observer.dispatch(reaction, range.clone(), table);
                    calls += 1;
                }
            }
        }
        calls
    }
}

fn register<C: Component>(registry: &mut Registry, dispatch: Box<dyn Dispatch>) {
    registry
        .entry(ComponentType::of::<C>().id())
        .or_default()
        .push(dispatch);
}
