//! # Entity Collections
//!
//! Borrowed views of one or two component columns of a single partition,
//! paired with the local ids in slot order. Slot `i` of every buffer belongs
//! to `ids()[i]`.

use crate::ecs::Component;
use std::ops::{Index, IndexMut};

/// Read-only view of one column.
#[derive(Clone, Copy, Debug)]
pub struct EntityCollection<'a, C> {
    buffer: &'a [C],
    ids: &'a [u32],
}

impl<'a, C: Component> EntityCollection<'a, C> {
    pub(crate) fn new(buffer: &'a [C], ids: &'a [u32]) -> Self {
        debug_assert_eq!(buffer.len(), ids.len());
        Self { buffer, ids }
    }

    /// A view with no records.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            buffer: &[],
            ids: &[],
        }
    }

    /// Number of records.
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if there are no records.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Component values in slot order.
    #[inline]
    #[must_use]
    pub fn buffer(&self) -> &'a [C] {
        self.buffer
    }

    /// Local ids in slot order.
    #[inline]
    #[must_use]
    pub fn ids(&self) -> &'a [u32] {
        self.ids
    }

    /// Value at `slot`.
    #[inline]
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&'a C> {
        self.buffer.get(slot)
    }

    /// `(id, value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &'a C)> + 'a {
        self.ids.iter().copied().zip(self.buffer.iter())
    }
}

impl<C> Index<usize> for EntityCollection<'_, C> {
    type Output = C;

    fn index(&self, slot: usize) -> &C {
        &self.buffer[slot]
    }
}

/// Mutable view of one column.
#[derive(Debug)]
pub struct EntityCollectionMut<'a, C> {
    buffer: &'a mut [C],
    ids: &'a [u32],
}

impl<'a, C: Component> EntityCollectionMut<'a, C> {
    pub(crate) fn new(buffer: &'a mut [C], ids: &'a [u32]) -> Self {
        debug_assert_eq!(buffer.len(), ids.len());
        Self { buffer, ids }
    }

    /// A view with no records.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            buffer: &mut [],
            ids: &[],
        }
    }

    /// Number of records.
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if there are no records.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Component values in slot order.
    #[inline]
    #[must_use]
    pub fn buffer(&self) -> &[C] {
        &*self.buffer
    }

    /// Mutable component values in slot order.
    #[inline]
    pub fn buffer_mut(&mut self) -> &mut [C] {
        &mut *self.buffer
    }

    /// Local ids in slot order.
    #[inline]
    #[must_use]
    pub fn ids(&self) -> &'a [u32] {
        self.ids
    }

    /// `(id, value)` pairs in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut C)> + '_ {
        self.ids.iter().copied().zip(self.buffer.iter_mut())
    }

    /// Splits the view into its buffer and ids.
    #[must_use]
    pub fn into_parts(self) -> (&'a mut [C], &'a [u32]) {
        (self.buffer, self.ids)
    }
}

impl<C> Index<usize> for EntityCollectionMut<'_, C> {
    type Output = C;

    fn index(&self, slot: usize) -> &C {
        &self.buffer[slot]
    }
}

impl<C> IndexMut<usize> for EntityCollectionMut<'_, C> {
    fn index_mut(&mut self, slot: usize) -> &mut C {
        &mut self.buffer[slot]
    }
}

/// Read-only view of two columns of the same partition.
#[derive(Clone, Copy, Debug)]
pub struct EntityCollection2<'a, A, B> {
    first: &'a [A],
    second: &'a [B],
    ids: &'a [u32],
}

impl<'a, A: Component, B: Component> EntityCollection2<'a, A, B> {
    pub(crate) fn new(first: &'a [A], second: &'a [B], ids: &'a [u32]) -> Self {
        debug_assert_eq!(first.len(), ids.len());
        debug_assert_eq!(second.len(), ids.len());
        Self { first, second, ids }
    }

    /// A view with no records.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            first: &[],
            second: &[],
            ids: &[],
        }
    }

    /// Number of records.
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if there are no records.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// First column.
    #[inline]
    #[must_use]
    pub fn first(&self) -> &'a [A] {
        self.first
    }

    /// Second column.
    #[inline]
    #[must_use]
    pub fn second(&self) -> &'a [B] {
        self.second
    }

    /// Local ids in slot order.
    #[inline]
    #[must_use]
    pub fn ids(&self) -> &'a [u32] {
        self.ids
    }

    /// `(id, first, second)` triples in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &'a A, &'a B)> + 'a {
        let (first, second) = (self.first, self.second);
        self.ids
            .iter()
            .copied()
            .zip(first.iter().zip(second.iter()))
            .map(|(id, (a, b))| (id, a, b))
    }
}

/// Mutable view of two distinct columns of the same partition.
#[derive(Debug)]
pub struct EntityCollection2Mut<'a, A, B> {
    first: &'a mut [A],
    second: &'a mut [B],
    ids: &'a [u32],
}

impl<'a, A: Component, B: Component> EntityCollection2Mut<'a, A, B> {
    pub(crate) fn new(first: &'a mut [A], second: &'a mut [B], ids: &'a [u32]) -> Self {
        Self { first, second, ids }
    }

    /// A view with no records.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            first: &mut [],
            second: &mut [],
            ids: &[],
        }
    }

    /// Number of records.
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if there are no records.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Local ids in slot order.
    #[inline]
    #[must_use]
    pub fn ids(&self) -> &'a [u32] {
        self.ids
    }

    /// `(id, first, second)` triples in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut A, &mut B)> + '_ {
        self.ids
            .iter()
            .copied()
            .zip(self.first.iter_mut().zip(self.second.iter_mut()))
            .map(|(id, (a, b))| (id, a, b))
    }

    /// Splits the view into both buffers and the ids.
    #[must_use]
    pub fn into_parts(self) -> (&'a mut [A], &'a mut [B], &'a [u32]) {
        (self.first, self.second, self.ids)
    }
}
