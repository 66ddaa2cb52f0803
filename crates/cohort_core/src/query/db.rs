//! # Entities Database
//!
//! Read and in-place write access to committed records. Structural changes
//! never go through here: they are staged and applied by
//! [`EnginesRoot::submit_entities`](crate::EnginesRoot::submit_entities).
//!
//! Querying a partition that does not exist, or that has no column for the
//! requested component, yields an empty collection rather than an error.

use super::collection::{
    EntityCollection, EntityCollection2, EntityCollection2Mut, EntityCollectionMut,
};
use crate::ecs::{Component, Egid, PartitionId, PartitionStore, PartitionTable};
use crate::error::{EngineError, EngineResult};
use std::any::type_name;
use std::marker::PhantomData;

/// Query surface over every partition of one engines root.
pub struct EntitiesDb {
    store: PartitionStore,
}

impl EntitiesDb {
    pub(crate) fn new(default_capacity: usize) -> Self {
        Self {
            store: PartitionStore::new(default_capacity),
        }
    }

    pub(crate) fn store(&self) -> &PartitionStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut PartitionStore {
        &mut self.store
    }

    /// Live records in `partition`.
    #[inline]
    #[must_use]
    pub fn count(&self, partition: PartitionId) -> usize {
        self.store.count(partition)
    }

    /// Live records across every partition.
    #[must_use]
    pub fn total(&self) -> usize {
        self.store.total()
    }

    /// Returns `true` if `egid` is live.
    #[inline]
    #[must_use]
    pub fn exists(&self, egid: Egid) -> bool {
        self.store.contains(egid)
    }

    /// Returns `true` if `egid` is live and carries `C`.
    #[must_use]
    pub fn exists_with<C: Component>(&self, egid: Egid) -> bool {
        self.store
            .table(egid.partition)
            .is_some_and(|t| t.has::<C>() && t.contains(egid.entity_id))
    }

    /// Partitions that currently have a table, in id order.
    pub fn partitions(&self) -> impl Iterator<Item = PartitionId> + '_ {
        self.store.tables().map(PartitionTable::partition)
    }

    // =========================================================================
    // SINGLE PARTITION
    // =========================================================================

    /// Column `C` of `partition`.
    #[must_use]
    pub fn query_entities<C: Component>(&self, partition: PartitionId) -> EntityCollection<'_, C> {
        self.store
            .table(partition)
            .and_then(collection_of::<C>)
            .unwrap_or_else(EntityCollection::empty)
    }

    /// Mutable column `C` of `partition`.
    pub fn query_entities_mut<C: Component>(
        &mut self,
        partition: PartitionId,
    ) -> EntityCollectionMut<'_, C> {
        self.store
            .table_mut(partition)
            .and_then(PartitionTable::column_and_ids_mut::<C>)
            .map_or_else(EntityCollectionMut::empty, |(buffer, ids)| {
                EntityCollectionMut::new(buffer, ids)
            })
    }

    /// Columns `A` and `B` of `partition`.
    #[must_use]
    pub fn query_entities2<A: Component, B: Component>(
        &self,
        partition: PartitionId,
    ) -> EntityCollection2<'_, A, B> {
        self.store
            .table(partition)
            .and_then(collection2_of::<A, B>)
            .unwrap_or_else(EntityCollection2::empty)
    }

    /// Mutable columns `A` and `B` of `partition`. Empty if `A` and `B` are
    /// the same type.
    pub fn query_entities2_mut<A: Component, B: Component>(
        &mut self,
        partition: PartitionId,
    ) -> EntityCollection2Mut<'_, A, B> {
        self.store
            .table_mut(partition)
            .and_then(PartitionTable::column_pair_mut::<A, B>)
            .map_or_else(EntityCollection2Mut::empty, |(first, second, ids)| {
                EntityCollection2Mut::new(first, second, ids)
            })
    }

    // =========================================================================
    // MANY PARTITIONS
    // =========================================================================

    /// Lazily yields column `C` of each listed partition, in list order,
    /// skipping partitions that are empty or lack `C`. The iterator is
    /// `Clone`, so a sweep can be restarted.
    #[must_use]
    pub fn query_groups<'a, C: Component>(&'a self, groups: &'a [PartitionId]) -> GroupsIter<'a, C> {
        GroupsIter {
            store: &self.store,
            groups: groups.iter(),
            _component: PhantomData,
        }
    }

    /// Two-column form of [`EntitiesDb::query_groups`].
    #[must_use]
    pub fn query_groups2<'a, A: Component, B: Component>(
        &'a self,
        groups: &'a [PartitionId],
    ) -> Groups2Iter<'a, A, B> {
        Groups2Iter {
            store: &self.store,
            groups: groups.iter(),
            _components: PhantomData,
        }
    }

    /// Calls `f` with mutable column `C` of each listed partition, in list
    /// order, skipping partitions that are empty or lack `C`.
    pub fn for_each_group_mut<C, F>(&mut self, groups: &[PartitionId], mut f: F)
    where
        C: Component,
        F: FnMut(EntityCollectionMut<'_, C>, PartitionId),
    {
        for &partition in groups {
            let collection = self.query_entities_mut::<C>(partition);
            if !collection.is_empty() {
                f(collection, partition);
            }
        }
    }

    /// Column `C` of every non-empty partition that has it, in partition-id
    /// order.
    pub fn query_all<C: Component>(
        &self,
    ) -> impl Iterator<Item = (EntityCollection<'_, C>, PartitionId)> + '_ {
        self.store
            .tables()
            .filter(|t| !t.is_empty())
            .filter_map(|t| collection_of::<C>(t).map(|c| (c, t.partition())))
    }

    /// Mutable form of [`EntitiesDb::query_all`].
    pub fn query_all_mut<C: Component>(
        &mut self,
    ) -> impl Iterator<Item = (EntityCollectionMut<'_, C>, PartitionId)> + '_ {
        self.store
            .tables_mut()
            .filter(|t| !t.is_empty())
            .filter_map(|t| {
                let partition = t.partition();
                t.column_and_ids_mut::<C>()
                    .map(|(buffer, ids)| (EntityCollectionMut::new(buffer, ids), partition))
            })
    }

    // =========================================================================
    // SINGLE RECORD
    // =========================================================================

    /// Component `C` of one record.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RecordNotFound`] if `egid` is not live
    /// - [`EngineError::InvalidPartition`] if its partition has no `C`
    pub fn query_entity<C: Component>(&self, egid: Egid) -> EngineResult<&C> {
        let (buffer, slot) = self.query_entities_and_index::<C>(egid)?;
        Ok(&buffer[slot])
    }

    /// Mutable component `C` of one record.
    ///
    /// # Errors
    ///
    /// See [`EntitiesDb::query_entity`].
    pub fn query_entity_mut<C: Component>(&mut self, egid: Egid) -> EngineResult<&mut C> {
        let table = self
            .store
            .table_mut(egid.partition)
            .ok_or(EngineError::RecordNotFound(egid))?;
        let slot = table
            .slot_of(egid.entity_id)
            .ok_or(EngineError::RecordNotFound(egid))?;
        let column = table
            .column_mut::<C>()
            .ok_or_else(|| missing_column::<C>(egid.partition))?;
        Ok(&mut column[slot])
    }

    /// The whole column `C` of a record's partition plus the record's slot.
    ///
    /// # Errors
    ///
    /// See [`EntitiesDb::query_entity`].
    pub fn query_entities_and_index<C: Component>(
        &self,
        egid: Egid,
    ) -> EngineResult<(&[C], usize)> {
        let table = self
            .store
            .table(egid.partition)
            .ok_or(EngineError::RecordNotFound(egid))?;
        let slot = table
            .slot_of(egid.entity_id)
            .ok_or(EngineError::RecordNotFound(egid))?;
        let column = table
            .column::<C>()
            .ok_or_else(|| missing_column::<C>(egid.partition))?;
        Ok((column, slot))
    }

    /// Component `C` of one record, if it is live and has `C`.
    #[must_use]
    pub fn try_query_entity<C: Component>(&self, egid: Egid) -> Option<&C> {
        self.query_entity::<C>(egid).ok()
    }
}

fn collection_of<C: Component>(table: &PartitionTable) -> Option<EntityCollection<'_, C>> {
    table
        .column::<C>()
        .map(|buffer| EntityCollection::new(buffer, table.ids()))
}

fn collection2_of<A: Component, B: Component>(
    table: &PartitionTable,
) -> Option<EntityCollection2<'_, A, B>> {
    Some(EntityCollection2::new(
        table.column::<A>()?,
        table.column::<B>()?,
        table.ids(),
    ))
}

fn missing_column<C: Component>(partition: PartitionId) -> EngineError {
    EngineError::invalid_partition(
        partition,
        format!("partition has no `{}` column", type_name::<C>()),
    )
}

/// Iterator returned by [`EntitiesDb::query_groups`].
pub struct GroupsIter<'a, C> {
    store: &'a PartitionStore,
    groups: std::slice::Iter<'a, PartitionId>,
    _component: PhantomData<fn() -> C>,
}

impl<C> Clone for GroupsIter<'_, C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            groups: self.groups.clone(),
            _component: PhantomData,
        }
    }
}

impl<'a, C: Component> Iterator for GroupsIter<'a, C> {
    type Item = (EntityCollection<'a, C>, PartitionId);

    fn next(&mut self) -> Option<Self::Item> {
        for &partition in self.groups.by_ref() {
            let Some(table) = self.store.table(partition) else {
                continue;
            };
            if table.is_empty() {
                continue;
            }
            if let Some(collection) = collection_of::<C>(table) {
                return Some((collection, partition));
            }
        }
        None
    }
}

/// Iterator returned by [`EntitiesDb::query_groups2`].
pub struct Groups2Iter<'a, A, B> {
    store: &'a PartitionStore,
    groups: std::slice::Iter<'a, PartitionId>,
    _components: PhantomData<fn() -> (A, B)>,
}

impl<A, B> Clone for Groups2Iter<'_, A, B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            groups: self.groups.clone(),
            _components: PhantomData,
        }
    }
}

impl<'a, A: Component, B: Component> Iterator for Groups2Iter<'a, A, B> {
    type Item = (EntityCollection2<'a, A, B>, PartitionId);

    fn next(&mut self) -> Option<Self::Item> {
        for &partition in self.groups.by_ref() {
            let Some(table) = self.store.table(partition) else {
                continue;
            };
            if table.is_empty() {
                continue;
            }
            if let Some(collection) = collection2_of::<A, B>(table) {
                return Some((collection, partition));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{PartitionBitmask, RecordValues};
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Pos(f32);
    impl Component for Pos {}

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Vel(f32);
    impl Component for Vel {}

    fn partition(index: u32) -> PartitionId {
        PartitionId::new(index, PartitionBitmask::NONE)
    }

    fn populated() -> EntitiesDb {
        let mut db = EntitiesDb::new(8);
        let store = db.store_mut();
        for id in 0..3 {
            store
                .insert(
                    Egid::new(id, partition(1)),
                    RecordValues::new().with(Pos(id as f32)).with(Vel(1.0)),
                )
                .unwrap();
        }
        store
            .insert(Egid::new(9, partition(2)), RecordValues::new().with(Pos(9.0)))
            .unwrap();
        db
    }

    #[test]
    fn test_query_missing_partition_is_empty() {
        let db = populated();
        assert!(db.query_entities::<Pos>(partition(77)).is_empty());
        assert!(db.query_entities::<Vel>(partition(2)).is_empty());
        assert_eq!(db.count(partition(77)), 0);
    }

    #[test]
    fn test_query_entities_mut_writes_in_place() {
        let mut db = populated();
        for (_, pos) in db.query_entities_mut::<Pos>(partition(1)).iter_mut() {
            pos.0 += 10.0;
        }
        assert_eq!(
            db.query_entities::<Pos>(partition(1)).buffer(),
            &[Pos(10.0), Pos(11.0), Pos(12.0)]
        );
    }

    #[test]
    fn test_joint_query() {
        let mut db = populated();
        {
            let (pos, vel, _) = db.query_entities2_mut::<Pos, Vel>(partition(1)).into_parts();
            for (p, v) in pos.iter_mut().zip(vel.iter()) {
                p.0 += v.0;
            }
        }
        let both = db.query_entities2::<Pos, Vel>(partition(1));
        assert_eq!(both.count(), 3);
        assert_eq!(both.first()[2], Pos(3.0));
        assert!(db.query_entities2::<Pos, Vel>(partition(2)).is_empty());
    }

    #[test]
    fn test_query_groups_skips_and_restarts() {
        let db = populated();
        let groups = [partition(2), partition(77), partition(1)];
        let iter = db.query_groups::<Pos>(&groups);
        let seen: Vec<PartitionId> = iter.clone().map(|(_, p)| p).collect();
        assert_eq!(seen, vec![partition(2), partition(1)]);
        let total: usize = iter.map(|(c, _)| c.count()).sum();
        assert_eq!(total, 4);

        let joint: Vec<PartitionId> = db
            .query_groups2::<Pos, Vel>(&groups)
            .map(|(_, p)| p)
            .collect();
        assert_eq!(joint, vec![partition(1)]);
    }

    #[test]
    fn test_query_all_in_partition_order() {
        let db = populated();
        let seen: Vec<(PartitionId, usize)> =
            db.query_all::<Pos>().map(|(c, p)| (p, c.count())).collect();
        assert_eq!(seen, vec![(partition(1), 3), (partition(2), 1)]);
    }

    #[test]
    fn test_single_record_access() {
        let mut db = populated();
        let egid = Egid::new(1, partition(1));
        assert_eq!(db.query_entity::<Pos>(egid).unwrap(), &Pos(1.0));
        db.query_entity_mut::<Pos>(egid).unwrap().0 = 5.0;
        let (buffer, slot) = db.query_entities_and_index::<Pos>(egid).unwrap();
        assert_eq!(buffer[slot], Pos(5.0));

        let missing = Egid::new(42, partition(1));
        assert_eq!(
            db.query_entity::<Pos>(missing),
            Err(EngineError::RecordNotFound(missing))
        );
        assert!(matches!(
            db.query_entity::<Vel>(Egid::new(9, partition(2))),
            Err(EngineError::InvalidPartition { .. })
        ));
        assert!(db.exists_with::<Vel>(egid));
        assert!(!db.exists_with::<Vel>(Egid::new(9, partition(2))));
    }

    #[test]
    fn test_for_each_group_mut() {
        let mut db = populated();
        let mut visited = Vec::new();
        db.for_each_group_mut::<Pos, _>(&[partition(2), partition(1)], |mut c, p| {
            c[0].0 = -1.0;
            visited.push(p);
        });
        assert_eq!(visited, vec![partition(2), partition(1)]);
        assert_eq!(db.query_entity::<Pos>(Egid::new(9, partition(2))).unwrap(), &Pos(-1.0));
    }
}
