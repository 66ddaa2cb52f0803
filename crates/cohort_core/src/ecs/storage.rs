//! # Partition Storage
//!
//! Dense, per-partition component storage.
//!
//! Each partition owns one [`PartitionTable`]: an id vector, a sparse
//! id-to-slot index, and one [`Column`] per component type. All three are
//! mutated in lockstep:
//! - slot `i` of every column belongs to `ids[i]`
//! - `index[ids[i]] == i` for every live slot
//! - removal fills the hole with the last record (swap-remove)
//!
//! The column layout of a table is fixed when the table is created, either
//! by preallocation or by the first record inserted.

use super::column::{Column, ColumnVec};
use super::component::{Component, ComponentType};
use super::entity::{Egid, PartitionId};
use super::record::RecordValues;
use crate::error::{EngineError, EngineResult};
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

/// Dense storage of one partition.
pub struct PartitionTable {
    partition: PartitionId,
    layout: Vec<ComponentType>,
    columns: Vec<Box<dyn Column>>,
    lookup: HashMap<TypeId, usize>,
    ids: Vec<u32>,
    index: HashMap<u32, usize>,
}

impl PartitionTable {
    /// Creates an empty table with the given column layout.
    ///
    /// # Arguments
    ///
    /// * `partition` - The partition this table stores
    /// * `layout` - Component types; sorted and deduplicated here
    /// * `capacity` - Initial row capacity
    #[must_use]
    pub fn new(partition: PartitionId, layout: &[ComponentType], capacity: usize) -> Self {
        let mut layout = layout.to_vec();
        layout.sort();
        layout.dedup();
        let columns = layout.iter().map(|ty| ty.new_column(capacity)).collect();
        let lookup = layout
            .iter()
            .enumerate()
            .map(|(slot, ty)| (ty.id(), slot))
            .collect();
        Self {
            partition,
            layout,
            columns,
            lookup,
            ids: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// The partition this table stores.
    #[inline]
    #[must_use]
    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    /// Number of live records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if no record is live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Row capacity currently allocated.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ids.capacity()
    }

    /// Column layout, sorted.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> &[ComponentType] {
        &self.layout
    }

    /// Local ids in slot order.
    #[inline]
    #[must_use]
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Slot of `entity_id`, if live.
    #[inline]
    #[must_use]
    pub fn slot_of(&self, entity_id: u32) -> Option<usize> {
        self.index.get(&entity_id).copied()
    }

    /// Returns `true` if `entity_id` is live in this table.
    #[inline]
    #[must_use]
    pub fn contains(&self, entity_id: u32) -> bool {
        self.index.contains_key(&entity_id)
    }

    /// Returns `true` if the table has a column for `C`.
    #[inline]
    #[must_use]
    pub fn has<C: Component>(&self) -> bool {
        self.lookup.contains_key(&TypeId::of::<C>())
    }

    /// Typed view of the column for `C`.
    #[must_use]
    pub fn column<C: Component>(&self) -> Option<&[C]> {
        let slot = *self.lookup.get(&TypeId::of::<C>())?;
        self.columns[slot]
            .downcast_ref::<ColumnVec<C>>()
            .map(ColumnVec::as_slice)
    }

    /// Mutable typed view of the column for `C`.
    pub fn column_mut<C: Component>(&mut self) -> Option<&mut [C]> {
        let slot = *self.lookup.get(&TypeId::of::<C>())?;
        self.columns[slot]
            .downcast_mut::<ColumnVec<C>>()
            .map(ColumnVec::as_mut_slice)
    }

    /// Mutable column for `C` together with the id vector.
    pub(crate) fn column_and_ids_mut<C: Component>(&mut self) -> Option<(&mut [C], &[u32])> {
        let slot = *self.lookup.get(&TypeId::of::<C>())?;
        let column = self.columns[slot]
            .downcast_mut::<ColumnVec<C>>()?
            .as_mut_slice();
        Some((column, &self.ids))
    }

    /// Two distinct mutable columns together with the id vector.
    ///
    /// Returns `None` if either column is missing or `A` and `B` are the
    /// same type.
    pub(crate) fn column_pair_mut<A: Component, B: Component>(
        &mut self,
    ) -> Option<(&mut [A], &mut [B], &[u32])> {
        let a = *self.lookup.get(&TypeId::of::<A>())?;
        let b = *self.lookup.get(&TypeId::of::<B>())?;
        if a == b {
            return None;
        }
        let (low, high) = (a.min(b), a.max(b));
        let (head, tail) = self.columns.split_at_mut(high);
        let (low_column, high_column) = (&mut head[low], &mut tail[0]);
        let (column_a, column_b) = if a < b {
            (low_column, high_column)
        } else {
            (high_column, low_column)
        };
        let first = column_a.downcast_mut::<ColumnVec<A>>()?.as_mut_slice();
        let second = column_b.downcast_mut::<ColumnVec<B>>()?.as_mut_slice();
        Some((first, second, &self.ids))
    }

    /// Raw bytes of every field of `entity_id`, in layout order.
    #[must_use]
    pub(crate) fn field_bytes(&self, entity_id: u32) -> Option<Vec<(ComponentType, Vec<u8>)>> {
        let slot = self.slot_of(entity_id)?;
        self.columns
            .iter()
            .map(|column| Some((column.component_type(), column.bytes_at(slot)?)))
            .collect()
    }

    /// Returns `true` if `layout` (sorted) equals this table's layout.
    #[inline]
    #[must_use]
    pub(crate) fn accepts(&self, layout: &[ComponentType]) -> bool {
        self.layout == layout
    }

    /// Appends a record.
    ///
    /// # Returns
    ///
    /// The slot of the new record.
    ///
    /// # Errors
    ///
    /// - [`EngineError::DuplicateRecord`] if `entity_id` is already live
    /// - [`EngineError::InvalidPartition`] if the value layout differs from
    ///   the table layout
    pub fn insert(&mut self, entity_id: u32, mut values: RecordValues) -> EngineResult<usize> {
        if self.contains(entity_id) {
            return Err(EngineError::DuplicateRecord(Egid::new(
                entity_id,
                self.partition,
            )));
        }
        if !values.component_types().eq(self.layout.iter().copied()) {
            return Err(self.layout_mismatch(&values.layout()));
        }
        for (column, value) in self.columns.iter_mut().zip(values.columns_mut()) {
            column.append(value.as_mut());
        }
        Ok(self.attach(entity_id))
    }

    /// Removes a record by swap-remove and returns its values.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RecordNotFound`] if `entity_id` is not live.
    pub fn remove(&mut self, entity_id: u32) -> EngineResult<RecordValues> {
        let slot = self.require(entity_id)?;
        let mut taken: Vec<Box<dyn Column>> =
            self.columns.iter().map(|c| c.empty_like(1)).collect();
        for (column, target) in self.columns.iter_mut().zip(taken.iter_mut()) {
            column.swap_remove_into(slot, target.as_mut());
        }
        self.detach(entity_id, slot);
        Ok(RecordValues::from_columns(taken))
    }

    /// Relocates a record into `dest`, the source half of a move.
    ///
    /// The source slot is filled by swap-remove; the record lands in the
    /// last slot of `dest` via [`PartitionTable::move_in`].
    ///
    /// # Returns
    ///
    /// The record's slot in `dest`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RecordNotFound`] if `entity_id` is not live here
    /// - [`EngineError::DuplicateRecord`] if `dest` already holds it
    /// - [`EngineError::InvalidPartition`] if the layouts differ
    pub fn move_out(&mut self, entity_id: u32, dest: &mut PartitionTable) -> EngineResult<usize> {
        if dest.layout != self.layout {
            return Err(dest.layout_mismatch(&self.layout));
        }
        if dest.contains(entity_id) {
            return Err(EngineError::DuplicateRecord(Egid::new(
                entity_id,
                dest.partition,
            )));
        }
        let slot = self.require(entity_id)?;
        for (column, target) in self.columns.iter_mut().zip(dest.columns.iter_mut()) {
            column.swap_remove_into(slot, target.as_mut());
        }
        self.detach(entity_id, slot);
        Ok(dest.move_in(entity_id))
    }

    /// Registers `entity_id` for values already appended to every column.
    /// The destination half of a move.
    fn move_in(&mut self, entity_id: u32) -> usize {
        self.attach(entity_id)
    }

    /// Swaps the given records to the tail so they occupy one contiguous
    /// range, without removing them.
    ///
    /// `entity_ids` must be live and free of duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RecordNotFound`] for the first id that is not
    /// live; the table may then be partially reordered but loses nothing.
    pub(crate) fn gather_tail(&mut self, entity_ids: &[u32]) -> EngineResult<Range<usize>> {
        let len = self.len();
        let count = entity_ids.len();
        if count > len {
            return Err(EngineError::RecordNotFound(Egid::new(
                entity_ids[len],
                self.partition,
            )));
        }
        for (offset, &entity_id) in entity_ids.iter().enumerate() {
            let target = len - 1 - offset;
            let slot = self.require(entity_id)?;
            self.swap_slots(slot, target);
        }
        Ok(len - count..len)
    }

    /// Drops every record at or past `len`.
    pub(crate) fn truncate(&mut self, len: usize) {
        for id in self.ids.drain(len.min(self.ids.len())..) {
            self.index.remove(&id);
        }
        for column in &mut self.columns {
            column.truncate(len);
        }
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Reserves room for `additional` more records in every column.
    pub fn reserve(&mut self, additional: usize) {
        self.ids.reserve(additional);
        self.index.reserve(additional);
        for column in &mut self.columns {
            column.reserve(additional);
        }
    }

    fn swap_slots(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for column in &mut self.columns {
            column.swap(a, b);
        }
        self.ids.swap(a, b);
        self.index.insert(self.ids[a], a);
        self.index.insert(self.ids[b], b);
    }

    fn attach(&mut self, entity_id: u32) -> usize {
        let slot = self.ids.len();
        self.ids.push(entity_id);
        self.index.insert(entity_id, slot);
        slot
    }

    /// Mirrors a column swap-remove of `slot` on the id vector and index.
    fn detach(&mut self, entity_id: u32, slot: usize) {
        self.ids.swap_remove(slot);
        self.index.remove(&entity_id);
        if let Some(&moved) = self.ids.get(slot) {
            self.index.insert(moved, slot);
        }
    }

    fn require(&self, entity_id: u32) -> EngineResult<usize> {
        self.slot_of(entity_id)
            .ok_or(EngineError::RecordNotFound(Egid::new(
                entity_id,
                self.partition,
            )))
    }

    fn layout_mismatch(&self, offered: &[ComponentType]) -> EngineError {
        EngineError::invalid_partition(
            self.partition,
            format!(
                "layout {offered:?} does not match partition layout {:?}",
                self.layout
            ),
        )
    }
}

/// All partition tables of one engines root, ordered by partition id.
pub struct PartitionStore {
    tables: BTreeMap<PartitionId, PartitionTable>,
    default_capacity: usize,
}

impl PartitionStore {
    /// Creates an empty store.
    ///
    /// # Arguments
    ///
    /// * `default_capacity` - Row capacity of tables created on first insert
    #[must_use]
    pub fn new(default_capacity: usize) -> Self {
        Self {
            tables: BTreeMap::new(),
            default_capacity,
        }
    }

    /// Table of `partition`, if one exists.
    #[inline]
    #[must_use]
    pub fn table(&self, partition: PartitionId) -> Option<&PartitionTable> {
        self.tables.get(&partition)
    }

    /// Mutable table of `partition`, if one exists.
    #[inline]
    pub fn table_mut(&mut self, partition: PartitionId) -> Option<&mut PartitionTable> {
        self.tables.get_mut(&partition)
    }

    /// Table of `partition`, created with `layout` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidPartition`] if the table exists with a
    /// different layout.
    pub fn table_or_create(
        &mut self,
        partition: PartitionId,
        layout: &[ComponentType],
    ) -> EngineResult<&mut PartitionTable> {
        let capacity = self.default_capacity;
        let table = self
            .tables
            .entry(partition)
            .or_insert_with(|| PartitionTable::new(partition, layout, capacity));
        let mut sorted = layout.to_vec();
        sorted.sort();
        sorted.dedup();
        if table.accepts(&sorted) {
            Ok(table)
        } else {
            Err(table.layout_mismatch(&sorted))
        }
    }

    /// Returns `true` if `egid` is live.
    #[inline]
    #[must_use]
    pub fn contains(&self, egid: Egid) -> bool {
        self.table(egid.partition)
            .is_some_and(|t| t.contains(egid.entity_id))
    }

    /// Live records in `partition`.
    #[inline]
    #[must_use]
    pub fn count(&self, partition: PartitionId) -> usize {
        self.table(partition).map_or(0, PartitionTable::len)
    }

    /// Total live records.
    #[must_use]
    pub fn total(&self) -> usize {
        self.tables.values().map(PartitionTable::len).sum()
    }

    /// Appends a record, creating the table from the value layout if needed.
    ///
    /// # Errors
    ///
    /// See [`PartitionTable::insert`].
    pub fn insert(&mut self, egid: Egid, values: RecordValues) -> EngineResult<usize> {
        let layout = values.layout();
        self.table_or_create(egid.partition, &layout)?
            .insert(egid.entity_id, values)
    }

    /// Removes a single record.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RecordNotFound`] if `egid` is not live.
    pub fn remove(&mut self, egid: Egid) -> EngineResult<RecordValues> {
        self.table_mut(egid.partition)
            .ok_or(EngineError::RecordNotFound(egid))?
            .remove(egid.entity_id)
    }

    /// Moves a batch of records from `from` to `to`, creating the
    /// destination table with the source layout if needed.
    ///
    /// # Returns
    ///
    /// The contiguous slot range the records occupy in `to`.
    ///
    /// # Errors
    ///
    /// See [`PartitionTable::move_out`]. Records moved before the failing
    /// one stay moved.
    pub fn move_records(
        &mut self,
        from: PartitionId,
        to: PartitionId,
        entity_ids: &[u32],
    ) -> EngineResult<Range<usize>> {
        if from == to {
            return Err(EngineError::invalid_partition(
                to,
                "source and destination of a move are the same partition",
            ));
        }
        let Some(mut source) = self.tables.remove(&from) else {
            return match entity_ids.first() {
                Some(&id) => Err(EngineError::RecordNotFound(Egid::new(id, from))),
                None => Ok(0..0),
            };
        };
        let result = self
            .table_or_create(to, &source.layout)
            .and_then(|dest| {
                let start = dest.len();
                for &entity_id in entity_ids {
                    source.move_out(entity_id, dest)?;
                }
                Ok(start..dest.len())
            });
        self.tables.insert(from, source);
        result
    }

    /// Ensures a table for `partition` with room for `additional` records.
    ///
    /// # Errors
    ///
    /// - [`EngineError::PreallocationConflict`] if the partition holds records
    /// - [`EngineError::InvalidPartition`] if an empty table exists with a
    ///   different layout
    pub fn preallocate(
        &mut self,
        partition: PartitionId,
        layout: &[ComponentType],
        additional: usize,
    ) -> EngineResult<()> {
        let count = self.count(partition);
        if count > 0 {
            return Err(EngineError::PreallocationConflict { partition, count });
        }
        self.table_or_create(partition, layout)?.reserve(additional);
        Ok(())
    }

    /// Tables in partition-id order.
    pub fn tables(&self) -> impl Iterator<Item = &PartitionTable> {
        self.tables.values()
    }

    /// Mutable tables in partition-id order.
    pub fn tables_mut(&mut self) -> impl Iterator<Item = &mut PartitionTable> {
        self.tables.values_mut()
    }

    /// Drops every table.
    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::PartitionBitmask;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Tick(u32);
    impl Component for Tick {}

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Weight(f32);
    impl Component for Weight {}

    fn partition(index: u32) -> PartitionId {
        PartitionId::new(index, PartitionBitmask::NONE)
    }

    fn tick(v: u32) -> RecordValues {
        RecordValues::new().with(Tick(v))
    }

    fn assert_consistent(table: &PartitionTable) {
        let ticks = table.column::<Tick>().unwrap();
        assert_eq!(ticks.len(), table.len());
        for (slot, &id) in table.ids().iter().enumerate() {
            assert_eq!(table.slot_of(id), Some(slot));
            assert_eq!(ticks[slot], Tick(id * 10));
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut table = PartitionTable::new(partition(1), &[ComponentType::of::<Tick>()], 4);
        assert_eq!(table.insert(5, tick(50)).unwrap(), 0);
        assert_eq!(table.insert(6, tick(60)).unwrap(), 1);
        assert_eq!(table.slot_of(6), Some(1));
        assert_consistent(&table);
    }

    #[test]
    fn test_insert_duplicate_fails() {
        let mut table = PartitionTable::new(partition(1), &[ComponentType::of::<Tick>()], 4);
        table.insert(5, tick(50)).unwrap();
        let err = table.insert(5, tick(51)).unwrap_err();
        assert_eq!(err, EngineError::DuplicateRecord(Egid::new(5, partition(1))));
    }

    #[test]
    fn test_insert_wrong_layout_fails() {
        let mut table = PartitionTable::new(partition(1), &[ComponentType::of::<Tick>()], 4);
        let values = RecordValues::new().with(Weight(1.0));
        assert!(matches!(
            table.insert(1, values),
            Err(EngineError::InvalidPartition { .. })
        ));
    }

    #[test]
    fn test_swap_remove_keeps_index_dense() {
        let mut table = PartitionTable::new(partition(1), &[ComponentType::of::<Tick>()], 4);
        for id in 0..5 {
            table.insert(id, tick(id * 10)).unwrap();
        }
        let removed = table.remove(1).unwrap();
        assert_eq!(removed.get::<Tick>(), Some(&Tick(10)));
        assert_eq!(table.ids(), &[0, 4, 2, 3]);
        assert_consistent(&table);
        assert!(table.remove(1).is_err());
    }

    #[test]
    fn test_gather_tail_and_truncate() {
        let mut table = PartitionTable::new(partition(1), &[ComponentType::of::<Tick>()], 8);
        for id in 0..6 {
            table.insert(id, tick(id * 10)).unwrap();
        }
        let range = table.gather_tail(&[0, 5, 2]).unwrap();
        assert_eq!(range, 3..6);
        let mut tail: Vec<u32> = table.ids()[range.clone()].to_vec();
        tail.sort_unstable();
        assert_eq!(tail, vec![0, 2, 5]);
        assert_consistent(&table);

        table.truncate(range.start);
        let mut rest = table.ids().to_vec();
        rest.sort_unstable();
        assert_eq!(rest, vec![1, 3, 4]);
        assert_consistent(&table);
    }

    #[test]
    fn test_move_out() {
        let layout = [ComponentType::of::<Tick>()];
        let mut source = PartitionTable::new(partition(1), &layout, 4);
        let mut dest = PartitionTable::new(partition(2), &layout, 4);
        source.insert(1, tick(10)).unwrap();
        source.insert(2, tick(20)).unwrap();

        assert_eq!(source.move_out(1, &mut dest).unwrap(), 0);
        assert!(!source.contains(1));
        assert_eq!(dest.column::<Tick>().unwrap(), &[Tick(10)]);
        assert_consistent(&source);
        assert_consistent(&dest);
    }

    #[test]
    fn test_move_out_layout_mismatch() {
        let mut source = PartitionTable::new(partition(1), &[ComponentType::of::<Tick>()], 4);
        let mut dest = PartitionTable::new(partition(2), &[ComponentType::of::<Weight>()], 4);
        source.insert(1, tick(10)).unwrap();
        assert!(matches!(
            source.move_out(1, &mut dest),
            Err(EngineError::InvalidPartition { .. })
        ));
        assert!(source.contains(1));
    }

    #[test]
    fn test_column_pair_mut() {
        let layout = [ComponentType::of::<Tick>(), ComponentType::of::<Weight>()];
        let mut table = PartitionTable::new(partition(1), &layout, 4);
        table
            .insert(3, RecordValues::new().with(Tick(1)).with(Weight(2.0)))
            .unwrap();
        {
            let (weights, ticks, ids) = table.column_pair_mut::<Weight, Tick>().unwrap();
            weights[0].0 += ticks[0].0 as f32;
            ticks[0].0 = 7;
            assert_eq!(ids, &[3]);
        }
        assert_eq!(table.column::<Weight>().unwrap(), &[Weight(3.0)]);
        assert_eq!(table.column::<Tick>().unwrap(), &[Tick(7)]);
        assert!(table.column_pair_mut::<Tick, Tick>().is_none());
    }

    #[test]
    fn test_store_move_records_creates_destination() {
        let mut store = PartitionStore::new(4);
        for id in 0..4 {
            store.insert(Egid::new(id, partition(1)), tick(id * 10)).unwrap();
        }
        let range = store.move_records(partition(1), partition(2), &[1, 3]).unwrap();
        assert_eq!(range, 0..2);
        assert_eq!(store.count(partition(1)), 2);
        assert_eq!(store.table(partition(2)).unwrap().ids(), &[1, 3]);
        assert_consistent(store.table(partition(1)).unwrap());
        assert_consistent(store.table(partition(2)).unwrap());
    }

    #[test]
    fn test_store_preallocate_conflict() {
        let mut store = PartitionStore::new(4);
        let layout = [ComponentType::of::<Tick>()];
        store.preallocate(partition(1), &layout, 100).unwrap();
        assert!(store.table(partition(1)).unwrap().capacity() >= 100);
        store.insert(Egid::new(1, partition(1)), tick(10)).unwrap();
        assert_eq!(
            store.preallocate(partition(1), &layout, 100),
            Err(EngineError::PreallocationConflict {
                partition: partition(1),
                count: 1
            })
        );
    }

    #[test]
    fn test_swap_remove_matches_model() {
        // xorshift-driven insert/remove sequence checked against a plain map
        let mut table = PartitionTable::new(partition(1), &[ComponentType::of::<Tick>()], 16);
        let mut model = std::collections::BTreeSet::new();
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        for _ in 0..2_000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let id = (state % 64) as u32;
            if model.contains(&id) {
                table.remove(id).unwrap();
                model.remove(&id);
                assert_consistent(&table);
            } else {
                table.insert(id, tick(id * 10)).unwrap();
                model.insert(id);
            }
            assert_eq!(table.len(), model.len());
        }
        let mut live = table.ids().to_vec();
        live.sort_unstable();
        assert_eq!(live, model.into_iter().collect::<Vec<_>>());
    }
}
