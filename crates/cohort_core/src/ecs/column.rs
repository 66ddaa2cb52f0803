//! # Component Columns
//!
//! A column is the dense array of one component type inside a partition
//! table. Tables hold their columns type-erased behind [`Column`] and
//! downcast to [`ColumnVec<C>`] when a typed view is requested.
//!
//! Every column of a table is mutated in lockstep, so slot `i` of every
//! column belongs to the same record.

use super::component::{Component, ComponentType};
use downcast_rs::{impl_downcast, Downcast};
use std::any::type_name;
use std::mem::size_of;

/// Type-erased dense column.
pub trait Column: Downcast + Send + Sync {
    /// Token of the stored component type.
    fn component_type(&self) -> ComponentType;

    /// Number of values.
    fn len(&self) -> usize;

    /// Returns `true` if the column holds no values.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserves room for `additional` more values.
    fn reserve(&mut self, additional: usize);

    /// Appends a default value.
    fn push_default(&mut self);

    /// Appends every value of `other` and leaves it empty.
    ///
    /// # Panics
    ///
    /// Panics if `other` stores a different component type.
    fn append(&mut self, other: &mut dyn Column);

    /// Swap-removes `slot` and pushes the removed value onto `dest`.
    ///
    /// # Panics
    ///
    /// Panics if `dest` stores a different component type.
    fn swap_remove_into(&mut self, slot: usize, dest: &mut dyn Column);

    /// Exchanges two slots.
    fn swap(&mut self, a: usize, b: usize);

    /// Drops every value at or past `len`.
    fn truncate(&mut self, len: usize);

    /// Creates an empty column of the same type.
    fn empty_like(&self, capacity: usize) -> Box<dyn Column>;

    /// Raw bytes of the value at `slot`.
    fn bytes_at(&self, slot: usize) -> Option<Vec<u8>>;

    /// Appends a value decoded from raw bytes. Returns `false` if the byte
    /// length does not match the component size.
    fn push_bytes(&mut self, bytes: &[u8]) -> bool;
}

impl_downcast!(Column);

/// Concrete column for component `C`.
#[derive(Clone, Debug, Default)]
pub struct ColumnVec<C: Component> {
    data: Vec<C>,
}

impl<C: Component> ColumnVec<C> {
    /// Creates an empty column.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Appends a value.
    #[inline]
    pub fn push(&mut self, value: C) {
        self.data.push(value);
    }

    /// All values.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[C] {
        &self.data
    }

    /// All values, mutable.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [C] {
        &mut self.data
    }
}

/// Downcasts a peer column that must share `C`.
fn peer_mut<C: Component>(column: &mut dyn Column) -> &mut ColumnVec<C> {
    assert!(
        column.is::<ColumnVec<C>>(),
        "column type mismatch: expected {}, found {:?}",
        type_name::<C>(),
        column.component_type()
    );
    match column.downcast_mut::<ColumnVec<C>>() {
        Some(peer) => peer,
        None => unreachable!(),
    }
}

impl<C: Component> Column for ColumnVec<C> {
    fn component_type(&self) -> ComponentType {
        ComponentType::of::<C>()
    }

    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    fn push_default(&mut self) {
        self.data.push(C::default());
    }

    fn append(&mut self, other: &mut dyn Column) {
        self.data.append(&mut peer_mut::<C>(other).data);
    }

    #[inline]
    fn swap_remove_into(&mut self, slot: usize, dest: &mut dyn Column) {
        let value = self.data.swap_remove(slot);
        peer_mut::<C>(dest).data.push(value);
    }

    #[inline]
    fn swap(&mut self, a: usize, b: usize) {
        self.data.swap(a, b);
    }

    fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    fn empty_like(&self, capacity: usize) -> Box<dyn Column> {
        Box::new(Self::with_capacity(capacity))
    }

    fn bytes_at(&self, slot: usize) -> Option<Vec<u8>> {
        self.data
            .get(slot)
            .map(|value| bytemuck::bytes_of(value).to_vec())
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() != size_of::<C>() {
            return false;
        }
        self.data.push(bytemuck::pod_read_unaligned(bytes));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[allow(dead_code)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Level(u32);

    impl Component for Level {}

    fn column_of(values: &[u32]) -> ColumnVec<Level> {
        let mut column = ColumnVec::with_capacity(values.len());
        for &v in values {
            column.push(Level(v));
        }
        column
    }

    #[test]
    fn test_swap_remove_into_moves_last() {
        let mut source = column_of(&[1, 2, 3, 4]);
        let mut dest: Box<dyn Column> = source.empty_like(4);

        source.swap_remove_into(1, dest.as_mut());

        assert_eq!(source.as_slice(), &[Level(1), Level(4), Level(3)]);
        let dest = dest.downcast_ref::<ColumnVec<Level>>().unwrap();
        assert_eq!(dest.as_slice(), &[Level(2)]);
    }

    #[test]
    fn test_append_drains_other() {
        let mut a = column_of(&[1]);
        let mut b: Box<dyn Column> = Box::new(column_of(&[2, 3]));
        a.append(b.as_mut());
        assert_eq!(a.len(), 3);
        assert!(b.is_empty());
    }

    #[test]
    fn test_bytes_round_trip() {
        let source = column_of(&[0xDEAD_BEEF]);
        let bytes = source.bytes_at(0).unwrap();
        let mut target = ColumnVec::<Level>::default();
        assert!(target.push_bytes(&bytes));
        assert!(!target.push_bytes(&bytes[..2]));
        assert_eq!(target.as_slice(), &[Level(0xDEAD_BEEF)]);
    }

    #[test]
    #[should_panic(expected = "column type mismatch")]
    fn test_append_rejects_other_type() {
        #[allow(dead_code)]
        #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
        #[repr(C)]
        struct Other(u64);
        impl Component for Other {}

        let mut a = column_of(&[1]);
        let mut b: Box<dyn Column> = Box::new(ColumnVec::<Other>::default());
        a.append(b.as_mut());
    }
}
