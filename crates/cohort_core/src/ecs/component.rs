//! # Component System
//!
//! Components are pure data containers with no behavior.
//! They must be Copy and have a fixed size so that whole columns can be
//! moved, snapshotted, and restored as bytes.
//!
//! A [`Schema`] names the ordered set of component types that every record in
//! a schema-bound partition carries.

use super::column::{Column, ColumnVec};
use bytemuck::{Pod, Zeroable};
use std::any::{type_name, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem::size_of;

/// Marker trait for ECS components.
///
/// Components must be:
/// - `Copy`: No heap allocations, bitwise copyable
/// - `Pod`: Plain old data, safe to view as bytes
/// - `Zeroable`: Can be safely zeroed
/// - `Default`: Fills fields a build or restore leaves out
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Health {
///     current: u32,
///     max: u32,
/// }
///
/// impl Component for Health {}
/// ```
pub trait Component: Copy + Pod + Zeroable + Default + Send + Sync + 'static {}

/// Runtime token for a component type.
///
/// Ordered by type name, then by [`TypeId`], so that sorted sets of tokens
/// are deterministic within a process.
#[derive(Clone, Copy)]
pub struct ComponentType {
    id: TypeId,
    name: &'static str,
    size: usize,
    new_column: fn(usize) -> Box<dyn Column>,
}

fn new_column<C: Component>(capacity: usize) -> Box<dyn Column> {
    Box::new(ColumnVec::<C>::with_capacity(capacity))
}

impl ComponentType {
    /// Token for `C`.
    #[inline]
    #[must_use]
    pub fn of<C: Component>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: type_name::<C>(),
            size: size_of::<C>(),
            new_column: new_column::<C>,
        }
    }

    /// Type id of the component.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Size of one value in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Creates an empty column for this component type.
    #[must_use]
    pub(crate) fn new_column(&self, capacity: usize) -> Box<dyn Column> {
        (self.new_column)(capacity)
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentType {}

impl Hash for ComponentType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for ComponentType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ComponentType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(other.name).then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A fixed list of component types shared by every record of a partition.
///
/// Implemented by hand; the list is read once per lattice and cached.
///
/// ```rust,ignore
/// struct PlayerSchema;
///
/// impl Schema for PlayerSchema {
///     fn components() -> Vec<ComponentType> {
///         vec![ComponentType::of::<Health>(), ComponentType::of::<Position>()]
///     }
/// }
/// ```
pub trait Schema: 'static {
    /// The component types of this schema.
    fn components() -> Vec<ComponentType>;
}

/// Runtime token for a [`Schema`] type.
#[derive(Clone, Copy)]
pub struct SchemaType {
    id: TypeId,
    name: &'static str,
    components: fn() -> Vec<ComponentType>,
}

impl SchemaType {
    /// Token for `S`.
    #[inline]
    #[must_use]
    pub fn of<S: Schema>() -> Self {
        Self {
            id: TypeId::of::<S>(),
            name: type_name::<S>(),
            components: S::components,
        }
    }

    /// Type id of the schema.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Reads the declared component list. Prefer the lattice cache.
    #[must_use]
    pub fn declared_components(&self) -> Vec<ComponentType> {
        (self.components)()
    }
}

impl PartialEq for SchemaType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SchemaType {}

impl Hash for SchemaType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
