//! # Group Lattice
//!
//! Registry of every partition a process declares, plus the compounds that
//! index them by tag.
//!
//! ## Compounds
//!
//! A compound is identified by a set of tags. Declaring one reserves its own
//! build partition(s) and then links it with every compound that already
//! exists:
//! - if `tags(existing) ⊆ tags(new)`, the new partitions join `existing`
//! - if `tags(new) ⊆ tags(existing)`, the existing partitions join `new`
//!
//! so `members(C)` is always the union of the build partitions of every
//! compound whose tag set contains `tags(C)`, regardless of declaration
//! order.
//!
//! ## Schema-bound partitions
//!
//! A `(schema, components, tags)` triple names exactly one partition. When
//! it carries tags it also joins every compound whose tag set it contains.
//!
//! ## Stable hashes
//!
//! Every named partition gets a CRC-32 of its canonical name. The value is
//! identical across processes running the same build and is what a
//! persistence layer should store instead of a [`PartitionId`].

use super::tag::{TagSet, TagType};
use super::type_set::{type_hash, TypeSet, TypeSetHash};
use crate::ecs::{ComponentType, PartitionBitmask, PartitionId, Schema, SchemaType};
use crate::error::{EngineError, EngineResult};
use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard, RwLockWriteGuard};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Index of a compound inside its lattice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompoundId(u32);

impl CompoundId {
    /// Position in declaration order.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A tag set and the partitions it indexes.
pub struct Compound {
    id: CompoundId,
    tags: TypeSet<TagType>,
    name: String,
    build_partition: PartitionId,
    range: u32,
    members: Vec<PartitionId>,
    member_set: HashSet<PartitionId>,
}

impl Compound {
    /// Identifier inside the lattice.
    #[inline]
    #[must_use]
    pub fn id(&self) -> CompoundId {
        self.id
    }

    /// Tags in canonical order.
    #[inline]
    #[must_use]
    pub fn tags(&self) -> &[TagType] {
        self.tags.as_slice()
    }

    /// Canonical name: full tag names in canonical order, joined by `-`.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First partition the compound owns. Records are built here.
    #[inline]
    #[must_use]
    pub fn build_partition(&self) -> PartitionId {
        self.build_partition
    }

    /// Number of consecutive partitions the compound owns.
    #[inline]
    #[must_use]
    pub fn range(&self) -> u32 {
        self.range
    }

    /// The `offset`-th owned partition, if within range.
    #[must_use]
    pub fn partition(&self, offset: u32) -> Option<PartitionId> {
        (offset < self.range).then(|| self.build_partition + offset)
    }

    /// Owned partitions.
    pub fn owned_partitions(&self) -> impl Iterator<Item = PartitionId> + '_ {
        (0..self.range).map(move |offset| self.build_partition + offset)
    }

    /// Every partition indexed by this compound, own partitions first.
    #[inline]
    #[must_use]
    pub fn members(&self) -> &[PartitionId] {
        &self.members
    }

    /// Returns `true` if `partition` is a member.
    #[inline]
    #[must_use]
    pub fn includes(&self, partition: PartitionId) -> bool {
        self.member_set.contains(&partition)
    }

    fn add_member(&mut self, partition: PartitionId) {
        if self.member_set.insert(partition) {
            self.members.push(partition);
        }
    }
}

impl fmt::Debug for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compound")
            .field("name", &self.tags.joined_names("-"))
            .field("build_partition", &self.build_partition)
            .field("members", &self.members.len())
            .finish()
    }
}

/// What the lattice knows about one partition.
#[derive(Clone, Debug)]
pub struct PartitionInfo {
    name: String,
    schema: Option<SchemaType>,
    components: TypeSet<ComponentType>,
    tags: TypeSet<TagType>,
    identity: TypeSetHash,
    stable_hash: Option<u32>,
    compound: Option<CompoundId>,
}

impl PartitionInfo {
    /// Canonical name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema bound to the partition, if any.
    #[must_use]
    pub fn schema(&self) -> Option<SchemaType> {
        self.schema
    }

    /// Declared component types. Empty for schema-less partitions.
    #[must_use]
    pub fn components(&self) -> &[ComponentType] {
        self.components.as_slice()
    }

    /// Tags qualifying the partition.
    #[must_use]
    pub fn tags(&self) -> &[TagType] {
        self.tags.as_slice()
    }

    /// Combined hash of schema, components, and tags.
    #[must_use]
    pub fn identity_hash(&self) -> TypeSetHash {
        self.identity
    }

    /// Cross-process stable hash, for named partitions.
    #[must_use]
    pub fn stable_hash(&self) -> Option<u32> {
        self.stable_hash
    }

    /// Compound owning the partition, if it is a compound build partition.
    #[must_use]
    pub fn compound(&self) -> Option<CompoundId> {
        self.compound
    }
}

#[derive(PartialEq, Eq, Hash)]
struct DeclarationKey {
    schema: TypeId,
    components: TypeSet<ComponentType>,
    tags: TypeSet<TagType>,
}

/// The group lattice.
#[derive(Default)]
pub struct GroupLattice {
    compounds: Vec<Compound>,
    compound_index: HashMap<TypeSet<TagType>, CompoundId>,
    declarations: HashMap<DeclarationKey, PartitionId>,
    partitions: HashMap<PartitionId, PartitionInfo>,
    stable_names: HashMap<u32, (PartitionId, String)>,
    named: HashMap<String, PartitionId>,
    schema_layouts: HashMap<TypeId, Arc<[ComponentType]>>,
}

impl GroupLattice {
    /// Creates an empty lattice.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // PLAIN PARTITIONS
    // =========================================================================

    /// Reserves one anonymous partition.
    pub fn allocate_partition(&mut self) -> PartitionId {
        self.allocate_partition_range(1, PartitionBitmask::NONE)
    }

    /// Reserves `count` consecutive anonymous partitions and returns the
    /// first; the others are addressed as `base + i`.
    pub fn allocate_partition_range(
        &mut self,
        count: u32,
        bitmask: PartitionBitmask,
    ) -> PartitionId {
        let base = PartitionId::allocate(count, bitmask);
        for offset in 0..count.max(1) {
            let partition = base + offset;
            self.partitions.insert(
                partition,
                PartitionInfo {
                    name: format!("partition#{}", partition.index()),
                    schema: None,
                    components: TypeSet::empty(),
                    tags: TypeSet::empty(),
                    identity: TypeSetHash::EMPTY,
                    stable_hash: None,
                    compound: None,
                },
            );
        }
        tracing::trace!(base = %base, count, "allocated partitions");
        base
    }

    /// Partition registered under `name`, reserved on first use.
    ///
    /// # Errors
    ///
    /// - [`EngineError::PartitionNameTaken`] if a compound or schema
    ///   partition already uses `name` as its canonical name
    /// - [`EngineError::StableHashCollision`] if another name already holds
    ///   the same stable hash
    pub fn named_partition(&mut self, name: &str) -> EngineResult<PartitionId> {
        if let Some(&partition) = self.named.get(name) {
            return Ok(partition);
        }
        let hash = self.check_stable_name(name)?;
        let partition = PartitionId::allocate(1, PartitionBitmask::NONE);
        self.register(
            partition,
            PartitionInfo {
                name: name.to_owned(),
                schema: None,
                components: TypeSet::empty(),
                tags: TypeSet::empty(),
                identity: TypeSetHash::EMPTY,
                stable_hash: Some(hash),
                compound: None,
            },
        );
        self.named.insert(name.to_owned(), partition);
        Ok(partition)
    }

    // =========================================================================
    // COMPOUNDS
    // =========================================================================

    /// Compound for the given tags, if already declared. Tag order is
    /// irrelevant.
    #[must_use]
    pub fn find_compound(&self, tags: &[TagType]) -> Option<CompoundId> {
        self.compound_index
            .get(&TypeSet::new(tags.iter().copied()))
            .copied()
    }

    /// Declares (or finds) the compound for `tags` and updates every
    /// related compound's membership.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidPartition`] if `tags` is empty
    /// - [`EngineError::PartitionNameTaken`] if a named partition already
    ///   holds the compound's canonical name
    /// - [`EngineError::StableHashCollision`] if a compound name collides
    pub fn resolve_compound(&mut self, tags: &[TagType]) -> EngineResult<CompoundId> {
        let set = TypeSet::new(tags.iter().copied());
        if let Some(&id) = self.compound_index.get(&set) {
            return Ok(id);
        }
        if set.is_empty() {
            return Err(EngineError::invalid_partition(
                PartitionId::INVALID,
                "a compound needs at least one tag",
            ));
        }

        let range = set
            .as_slice()
            .iter()
            .map(|t| u32::from(t.range()))
            .max()
            .unwrap_or(1);
        let bitmask = set
            .as_slice()
            .iter()
            .fold(PartitionBitmask::NONE, |acc, t| acc | t.bitmask());
        let name = canonical_tag_name(&set);
        let names: Vec<String> = if range == 1 {
            vec![name.clone()]
        } else {
            (0..range).map(|offset| format!("{name}#{offset}")).collect()
        };
        let hashes = names
            .iter()
            .map(|n| self.check_stable_name(n))
            .collect::<EngineResult<Vec<u32>>>()?;

        let id = CompoundId(u32::try_from(self.compounds.len()).unwrap_or(u32::MAX));
        let base = PartitionId::allocate(range, bitmask);
        for (offset, (partition_name, hash)) in (0..range).zip(names.into_iter().zip(hashes)) {
            self.register(
                base + offset,
                PartitionInfo {
                    name: partition_name,
                    schema: None,
                    components: TypeSet::empty(),
                    tags: set.clone(),
                    identity: set.set_hash(),
                    stable_hash: Some(hash),
                    compound: Some(id),
                },
            );
        }

        let mut compound = Compound {
            id,
            tags: set.clone(),
            name,
            build_partition: base,
            range,
            members: Vec::new(),
            member_set: HashSet::new(),
        };
        for partition in compound.owned_partitions().collect::<Vec<_>>() {
            compound.add_member(partition);
        }

        for existing in &mut self.compounds {
            if existing.tags.is_subset(&set) {
                for partition in compound.owned_partitions() {
                    existing.add_member(partition);
                }
            }
            if set.is_subset(&existing.tags) {
                for partition in existing.owned_partitions() {
                    compound.add_member(partition);
                }
            }
        }

        let mut tagged: Vec<PartitionId> = self
            .partitions
            .iter()
            .filter(|(_, info)| info.schema.is_some() && set.is_subset(&info.tags))
            .map(|(&partition, _)| partition)
            .collect();
        tagged.sort_unstable();
        for partition in tagged {
            compound.add_member(partition);
        }

        tracing::trace!(
            compound = %set.joined_names("-"),
            build_partition = %base,
            members = compound.members.len(),
            "declared compound"
        );
        self.compound_index.insert(set, id);
        self.compounds.push(compound);
        Ok(id)
    }

    /// Typed form of [`GroupLattice::resolve_compound`].
    ///
    /// # Errors
    ///
    /// See [`GroupLattice::resolve_compound`].
    pub fn resolve_compound_of<T: TagSet>(&mut self) -> EngineResult<CompoundId> {
        self.resolve_compound(&T::tag_types())
    }

    /// A declared compound.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by another lattice.
    #[must_use]
    pub fn compound(&self, id: CompoundId) -> &Compound {
        &self.compounds[id.index()]
    }

    /// All compounds in declaration order.
    #[must_use]
    pub fn compounds(&self) -> &[Compound] {
        &self.compounds
    }

    // =========================================================================
    // SCHEMA-BOUND PARTITIONS
    // =========================================================================

    /// Sorted component layout of `schema`, read once and cached.
    pub fn schema_layout(&mut self, schema: SchemaType) -> Arc<[ComponentType]> {
        Arc::clone(self.schema_layouts.entry(schema.id()).or_insert_with(|| {
            let mut layout = schema.declared_components();
            layout.sort();
            layout.dedup();
            layout.into()
        }))
    }

    /// Cached layout of `schema`, if it has been read before.
    #[must_use]
    pub fn cached_schema_layout(&self, schema: SchemaType) -> Option<Arc<[ComponentType]>> {
        self.schema_layouts.get(&schema.id()).cloned()
    }

    /// Declares (or finds) the partition for a schema, its component types,
    /// and a tag set.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidPartition`] if `components` is not the
    ///   schema's component set
    /// - [`EngineError::StableHashCollision`] if the canonical name collides
    pub fn resolve_partition(
        &mut self,
        schema: SchemaType,
        components: &[ComponentType],
        tags: &[TagType],
    ) -> EngineResult<PartitionId> {
        let layout = self.schema_layout(schema);
        let components = TypeSet::new(components.iter().copied());
        if components.as_slice() != &layout[..] {
            return Err(EngineError::invalid_partition(
                PartitionId::INVALID,
                format!(
                    "components {components:?} do not match schema `{}`",
                    schema.name()
                ),
            ));
        }
        let key = DeclarationKey {
            schema: schema.id(),
            components,
            tags: TypeSet::new(tags.iter().copied()),
        };
        if let Some(&partition) = self.declarations.get(&key) {
            return Ok(partition);
        }

        let name = format!(
            "{}({})[{}]",
            schema.name(),
            key.components
                .as_slice()
                .iter()
                .map(|c| c.name())
                .collect::<Vec<_>>()
                .join(","),
            canonical_tag_name(&key.tags)
        );
        let hash = self.check_stable_name(&name)?;
        let bitmask = key
            .tags
            .as_slice()
            .iter()
            .fold(PartitionBitmask::NONE, |acc, t| acc | t.bitmask());
        let identity = key
            .components
            .set_hash()
            .combine(key.tags.set_hash().value())
            .combine(type_hash(schema.id()));

        let partition = PartitionId::allocate(1, bitmask);
        self.register(
            partition,
            PartitionInfo {
                name,
                schema: Some(schema),
                components: key.components.clone(),
                tags: key.tags.clone(),
                identity,
                stable_hash: Some(hash),
                compound: None,
            },
        );
        if !key.tags.is_empty() {
            for compound in &mut self.compounds {
                if compound.tags.is_subset(&key.tags) {
                    compound.add_member(partition);
                }
            }
        }
        tracing::debug!(
            partition = %partition,
            schema = schema.name(),
            tags = %key.tags.joined_names("-"),
            "declared schema partition"
        );
        self.declarations.insert(key, partition);
        Ok(partition)
    }

    /// Typed form of [`GroupLattice::resolve_partition`].
    ///
    /// # Errors
    ///
    /// See [`GroupLattice::resolve_partition`].
    pub fn resolve_partition_of<S: Schema, T: TagSet>(&mut self) -> EngineResult<PartitionId> {
        self.resolve_partition(SchemaType::of::<S>(), &S::components(), &T::tag_types())
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// Returns `true` if the partition was declared through this lattice.
    #[inline]
    #[must_use]
    pub fn knows(&self, partition: PartitionId) -> bool {
        self.partitions.contains_key(&partition)
    }

    /// What the lattice knows about `partition`.
    #[must_use]
    pub fn partition_info(&self, partition: PartitionId) -> Option<&PartitionInfo> {
        self.partitions.get(&partition)
    }

    /// Schema bound to `partition`, if any.
    #[must_use]
    pub fn schema_of(&self, partition: PartitionId) -> Option<SchemaType> {
        self.partitions.get(&partition).and_then(|info| info.schema)
    }

    /// Number of declared partitions.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Partition holding `hash`, if any.
    #[must_use]
    pub fn partition_by_stable_hash(&self, hash: u32) -> Option<PartitionId> {
        self.stable_names.get(&hash).map(|(partition, _)| *partition)
    }

    /// Stable hash of `partition`, if it is named.
    #[must_use]
    pub fn stable_hash_of(&self, partition: PartitionId) -> Option<u32> {
        self.partitions.get(&partition).and_then(|info| info.stable_hash)
    }

    /// Partitions, in id order, whose tags include every tag of `tags` and
    /// whose declared components include every type of `components`.
    ///
    /// Schema-less partitions declare no components, so they only match
    /// when `components` is empty.
    #[must_use]
    pub fn query_partitions(
        &self,
        tags: &[TagType],
        components: &[ComponentType],
    ) -> Vec<PartitionId> {
        let tags = TypeSet::new(tags.iter().copied());
        let components = TypeSet::new(components.iter().copied());
        let mut found: Vec<PartitionId> = self
            .partitions
            .iter()
            .filter(|(_, info)| tags.is_subset(&info.tags) && components.is_subset(&info.components))
            .map(|(&partition, _)| partition)
            .collect();
        found.sort_unstable();
        found
    }

    /// Stable hash of `name` for a partition about to be registered.
    fn check_stable_name(&self, name: &str) -> EngineResult<u32> {
        let hash = crc32fast::hash(name.as_bytes());
        match self.stable_names.get(&hash) {
            None => Ok(hash),
            Some((existing, held)) if held == name => Err(EngineError::PartitionNameTaken {
                name: name.to_owned(),
                existing: *existing,
            }),
            Some((_, held)) => Err(EngineError::StableHashCollision {
                hash,
                name: name.to_owned(),
                existing: held.clone(),
            }),
        }
    }

    fn register(&mut self, partition: PartitionId, info: PartitionInfo) {
        if let Some(hash) = info.stable_hash {
            debug_assert!(!self.stable_names.contains_key(&hash), "stable hash rebound");
            self.stable_names
                .insert(hash, (partition, info.name.clone()));
        }
        self.partitions.insert(partition, info);
    }
}

fn canonical_tag_name(tags: &TypeSet<TagType>) -> String {
    tags.as_slice()
        .iter()
        .map(|t| t.name())
        .collect::<Vec<_>>()
        .join("-")
}

// =============================================================================
// SHARED HANDLE
// =============================================================================

static GLOBAL: OnceLock<LatticeHandle> = OnceLock::new();

/// Shared, lock-protected lattice.
///
/// Lookups of already-declared compounds and partitions take an upgradable
/// read lock and only upgrade to a write lock when something new must be
/// declared.
#[derive(Clone, Default)]
pub struct LatticeHandle(Arc<RwLock<GroupLattice>>);

impl LatticeHandle {
    /// Creates a handle to a fresh lattice.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide lattice.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL.get_or_init(Self::new).clone()
    }

    /// Read access.
    pub fn read(&self) -> RwLockReadGuard<'_, GroupLattice> {
        self.0.read()
    }

    /// Write access.
    pub fn write(&self) -> RwLockWriteGuard<'_, GroupLattice> {
        self.0.write()
    }

    /// Returns `true` if both handles share one lattice.
    #[must_use]
    pub fn same_lattice(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// See [`GroupLattice::resolve_compound`].
    ///
    /// # Errors
    ///
    /// See [`GroupLattice::resolve_compound`].
    pub fn resolve_compound(&self, tags: &[TagType]) -> EngineResult<CompoundId> {
        let guard = self.0.upgradable_read();
        if let Some(id) = guard.find_compound(tags) {
            return Ok(id);
        }
        RwLockUpgradableReadGuard::upgrade(guard).resolve_compound(tags)
    }

    /// See [`GroupLattice::resolve_compound_of`].
    ///
    /// # Errors
    ///
    /// See [`GroupLattice::resolve_compound`].
    pub fn resolve_compound_of<T: TagSet>(&self) -> EngineResult<CompoundId> {
        self.resolve_compound(&T::tag_types())
    }

    /// See [`GroupLattice::resolve_partition`].
    ///
    /// # Errors
    ///
    /// See [`GroupLattice::resolve_partition`].
    pub fn resolve_partition(
        &self,
        schema: SchemaType,
        components: &[ComponentType],
        tags: &[TagType],
    ) -> EngineResult<PartitionId> {
        self.0.write().resolve_partition(schema, components, tags)
    }

    /// See [`GroupLattice::resolve_partition_of`].
    ///
    /// # Errors
    ///
    /// See [`GroupLattice::resolve_partition`].
    pub fn resolve_partition_of<S: Schema, T: TagSet>(&self) -> EngineResult<PartitionId> {
        self.0.write().resolve_partition_of::<S, T>()
    }

    /// Cached schema layout, reading the schema on first use.
    pub fn schema_layout(&self, schema: SchemaType) -> Arc<[ComponentType]> {
        let guard = self.0.upgradable_read();
        if let Some(layout) = guard.cached_schema_layout(schema) {
            return layout;
        }
        RwLockUpgradableReadGuard::upgrade(guard).schema_layout(schema)
    }

    /// Members of a compound, copied out of the lock.
    #[must_use]
    pub fn members(&self, id: CompoundId) -> Vec<PartitionId> {
        self.0.read().compound(id).members().to_vec()
    }

    /// Build partition of a compound.
    #[must_use]
    pub fn build_partition(&self, id: CompoundId) -> PartitionId {
        self.0.read().compound(id).build_partition()
    }

    /// Returns `true` if `partition` is a member of the compound.
    #[must_use]
    pub fn includes(&self, id: CompoundId, partition: PartitionId) -> bool {
        self.0.read().compound(id).includes(partition)
    }

    /// See [`GroupLattice::allocate_partition`].
    #[must_use]
    pub fn allocate_partition(&self) -> PartitionId {
        self.0.write().allocate_partition()
    }

    /// See [`GroupLattice::allocate_partition_range`].
    #[must_use]
    pub fn allocate_partition_range(&self, count: u32, bitmask: PartitionBitmask) -> PartitionId {
        self.0.write().allocate_partition_range(count, bitmask)
    }

    /// See [`GroupLattice::named_partition`].
    ///
    /// # Errors
    ///
    /// See [`GroupLattice::named_partition`].
    pub fn named_partition(&self, name: &str) -> EngineResult<PartitionId> {
        self.0.write().named_partition(name)
    }

    /// See [`GroupLattice::partition_by_stable_hash`].
    #[must_use]
    pub fn partition_by_stable_hash(&self, hash: u32) -> Option<PartitionId> {
        self.0.read().partition_by_stable_hash(hash)
    }

    /// See [`GroupLattice::stable_hash_of`].
    #[must_use]
    pub fn stable_hash_of(&self, partition: PartitionId) -> Option<u32> {
        self.0.read().stable_hash_of(partition)
    }

    /// See [`GroupLattice::query_partitions`].
    #[must_use]
    pub fn query_partitions(
        &self,
        tags: &[TagType],
        components: &[ComponentType],
    ) -> Vec<PartitionId> {
        self.0.read().query_partitions(tags, components)
    }
}

impl fmt::Debug for LatticeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lattice = self.0.read();
        f.debug_struct("LatticeHandle")
            .field("compounds", &lattice.compounds.len())
            .field("partitions", &lattice.partitions.len())
            .finish()
    }
}
