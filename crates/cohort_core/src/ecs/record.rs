//! # Record Values
//!
//! The initial field values of one record, carried from a build call through
//! the staging queue into a partition table.

use super::column::{Column, ColumnVec};
use super::component::{Component, ComponentType, SchemaType};
use crate::error::{EngineError, EngineResult};
use std::fmt;

/// Type-erased field values of a single record.
///
/// Holds at most one value per component type, kept sorted by
/// [`ComponentType`] so the layout matches a partition table's column order.
///
/// # Example
///
/// ```rust,ignore
/// let values = RecordValues::new()
///     .with(Health { current: 10, max: 10 })
///     .with(Position::default());
/// ```
#[derive(Default)]
pub struct RecordValues {
    columns: Vec<Box<dyn Column>>,
}

impl RecordValues {
    /// Creates an empty set of values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the value of `C`.
    #[must_use]
    pub fn with<C: Component>(mut self, value: C) -> Self {
        self.set(value);
        self
    }

    /// Adds or replaces the value of `C`.
    pub fn set<C: Component>(&mut self, value: C) {
        match self.position(ComponentType::of::<C>()) {
            Ok(slot) => {
                if let Some(column) = self.columns[slot].downcast_mut::<ColumnVec<C>>() {
                    column.as_mut_slice()[0] = value;
                }
            }
            Err(slot) => {
                let mut column = ColumnVec::<C>::with_capacity(1);
                column.push(value);
                self.columns.insert(slot, Box::new(column));
            }
        }
    }

    /// The value of `C`, if present.
    #[must_use]
    pub fn get<C: Component>(&self) -> Option<&C> {
        let slot = self.position(ComponentType::of::<C>()).ok()?;
        self.columns[slot]
            .downcast_ref::<ColumnVec<C>>()?
            .as_slice()
            .first()
    }

    /// Number of component values.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if no component value is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Component types present, in layout order.
    pub fn component_types(&self) -> impl Iterator<Item = ComponentType> + '_ {
        self.columns.iter().map(|c| c.component_type())
    }

    /// Component types present, collected.
    #[must_use]
    pub fn layout(&self) -> Vec<ComponentType> {
        self.component_types().collect()
    }

    /// Inserts a raw-bytes value for `component_type`. Used by snapshot
    /// restore; returns `false` if the bytes do not fit the type.
    pub(crate) fn set_bytes(&mut self, component_type: ComponentType, bytes: &[u8]) -> bool {
        let mut column = component_type.new_column(1);
        if !column.push_bytes(bytes) {
            return false;
        }
        match self.position(component_type) {
            Ok(slot) => self.columns[slot] = column,
            Err(slot) => self.columns.insert(slot, column),
        }
        true
    }

    /// Checks the values against a schema layout and fills missing fields
    /// with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ComponentNotInSchema`] for the first value whose
    /// type the layout does not declare.
    pub(crate) fn conform_to(
        &mut self,
        schema: SchemaType,
        layout: &[ComponentType],
    ) -> EngineResult<()> {
        if let Some(stray) = self.component_types().find(|ty| !layout.contains(ty)) {
            return Err(EngineError::ComponentNotInSchema {
                component: stray.name(),
                schema: schema.name(),
            });
        }
        for &ty in layout {
            if let Err(slot) = self.position(ty) {
                let mut column = ty.new_column(1);
                column.push_default();
                self.columns.insert(slot, column);
            }
        }
        Ok(())
    }

    /// Wraps single-value columns already sorted in layout order.
    pub(crate) fn from_columns(columns: Vec<Box<dyn Column>>) -> Self {
        Self { columns }
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Box<dyn Column>] {
        &mut self.columns
    }

    fn position(&self, ty: ComponentType) -> Result<usize, usize> {
        self.columns.binary_search_by(|c| c.component_type().cmp(&ty))
    }
}

impl fmt::Debug for RecordValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.component_types()).finish()
    }
}
