//! # Type-Set Hashing
//!
//! Order-independent identity for a set of types.
//!
//! A set is sorted by type name, then by [`TypeId`] as a tiebreak, and
//! deduplicated. Its hash folds a combine step over the per-type hashes in
//! that order, so any permutation of the same types yields the same
//! [`TypeSetHash`]. The empty set hashes to [`TypeSetHash::EMPTY`].

use crate::ecs::ComponentType;
use siphasher::sip::SipHasher13;
use std::any::TypeId;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

const KEY_0: u64 = 0x636f_686f_7274_2d74;
const KEY_1: u64 = 0x7970_652d_7365_7421;

/// Runtime type token that can be placed in a [`TypeSet`].
pub trait TypeToken: Copy + Ord + Hash + fmt::Debug {
    /// Type id of the token.
    fn token_id(&self) -> TypeId;
    /// Fully qualified type name.
    fn token_name(&self) -> &'static str;
}

impl TypeToken for ComponentType {
    fn token_id(&self) -> TypeId {
        self.id()
    }

    fn token_name(&self) -> &'static str {
        self.name()
    }
}

/// Order-independent hash of a set of types.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeSetHash(u64);

impl TypeSetHash {
    /// Hash of the empty set.
    pub const EMPTY: Self = Self(0);

    /// Raw value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Folds one more value into the hash.
    #[inline]
    #[must_use]
    pub fn combine(self, value: u64) -> Self {
        Self(combine(value, self.0))
    }
}

/// Hash of a single type.
#[must_use]
pub fn type_hash(id: TypeId) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(KEY_0, KEY_1);
    id.hash(&mut hasher);
    hasher.finish()
}

fn combine(value: u64, seed: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(KEY_0, KEY_1);
    hasher.write_u64(value);
    hasher.write_u64(seed);
    hasher.finish()
}

/// Sorts and deduplicates `items` in place and returns their set hash.
pub fn sort_and_hash<T: TypeToken>(items: &mut Vec<T>) -> TypeSetHash {
    items.sort();
    items.dedup();
    items
        .iter()
        .fold(TypeSetHash::EMPTY, |acc, item| acc.combine(type_hash(item.token_id())))
}

/// A sorted, deduplicated set of type tokens with a precomputed hash.
#[derive(Clone)]
pub struct TypeSet<T> {
    items: Vec<T>,
    hash: TypeSetHash,
}

impl<T: TypeToken> TypeSet<T> {
    /// Builds a set from tokens in any order.
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        let mut items: Vec<T> = items.into_iter().collect();
        let hash = sort_and_hash(&mut items);
        Self { items, hash }
    }

    /// The empty set.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            hash: TypeSetHash::EMPTY,
        }
    }

    /// Order-independent hash of the set.
    #[inline]
    #[must_use]
    pub fn set_hash(&self) -> TypeSetHash {
        self.hash
    }

    /// Tokens in canonical order.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Number of tokens.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` for the empty set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` if `item` is in the set.
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.items.binary_search(item).is_ok()
    }

    /// Returns `true` if every token of `self` is in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        if self.items.len() > other.items.len() {
            return false;
        }
        let mut candidates = other.items.iter();
        'next: for item in &self.items {
            for candidate in candidates.by_ref() {
                match candidate.cmp(item) {
                    Ordering::Less => {}
                    Ordering::Equal => continue 'next,
                    Ordering::Greater => return false,
                }
            }
            return false;
        }
        true
    }

    /// Tokens joined by `separator`, using the short type name.
    #[must_use]
    pub fn joined_names(&self, separator: &str) -> String {
        self.items
            .iter()
            .map(|t| short_name(t.token_name()))
            .collect::<Vec<_>>()
            .join(separator)
    }
}

/// Last path segment of a type name, keeping generic arguments intact.
#[must_use]
pub(crate) fn short_name(full: &'static str) -> &'static str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}

impl<T: TypeToken> PartialEq for TypeSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.items == other.items
    }
}

impl<T: TypeToken> Eq for TypeSet<T> {}

impl<T: TypeToken> Hash for TypeSet<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash.0);
    }
}

impl<T: TypeToken> fmt::Debug for TypeSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(&self.items).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::Component;
    use bytemuck::{Pod, Zeroable};

    #[allow(dead_code)]
    #[derive(Clone, Copy, Default, Pod, Zeroable)]
    #[repr(C)]
    struct Alpha(u8);
    impl Component for Alpha {}

    #[allow(dead_code)]
    #[derive(Clone, Copy, Default, Pod, Zeroable)]
    #[repr(C)]
    struct Beta(u8);
    impl Component for Beta {}

    #[allow(dead_code)]
    #[derive(Clone, Copy, Default, Pod, Zeroable)]
    #[repr(C)]
    struct Gamma(u8);
    impl Component for Gamma {}

    fn a() -> ComponentType {
        ComponentType::of::<Alpha>()
    }
    fn b() -> ComponentType {
        ComponentType::of::<Beta>()
    }
    fn g() -> ComponentType {
        ComponentType::of::<Gamma>()
    }

    #[test]
    fn test_permutations_hash_equal() {
        let orders = [
            vec![a(), b(), g()],
            vec![a(), g(), b()],
            vec![b(), a(), g()],
            vec![b(), g(), a()],
            vec![g(), a(), b()],
            vec![g(), b(), a()],
        ];
        let expected = TypeSet::new(orders[0].clone());
        for order in orders {
            let set = TypeSet::new(order);
            assert_eq!(set.set_hash(), expected.set_hash());
            assert_eq!(set, expected);
        }
    }

    #[test]
    fn test_distinct_sets_differ() {
        let ab = TypeSet::new([a(), b()]);
        let ag = TypeSet::new([a(), g()]);
        assert_ne!(ab.set_hash(), ag.set_hash());
        assert_ne!(ab, ag);
    }

    #[test]
    fn test_empty_sentinel() {
        let mut none: Vec<ComponentType> = Vec::new();
        assert_eq!(sort_and_hash(&mut none), TypeSetHash::EMPTY);
        assert!(TypeSet::<ComponentType>::empty().is_empty());
        assert_eq!(
            TypeSet::<ComponentType>::new([]).set_hash(),
            TypeSetHash::EMPTY
        );
    }

    #[test]
    fn test_duplicates_collapse() {
        let set = TypeSet::new([a(), a(), b()]);
        assert_eq!(set.len(), 2);
        assert_eq!(set, TypeSet::new([b(), a()]));
    }

    #[test]
    fn test_subset() {
        let ab = TypeSet::new([a(), b()]);
        let abg = TypeSet::new([g(), b(), a()]);
        let bg = TypeSet::new([b(), g()]);
        assert!(ab.is_subset(&abg));
        assert!(bg.is_subset(&abg));
        assert!(!abg.is_subset(&ab));
        assert!(!ab.is_subset(&bg));
        assert!(TypeSet::<ComponentType>::empty().is_subset(&ab));
        assert!(ab.is_subset(&ab));
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("a::b::Red"), "Red");
        assert_eq!(short_name("Red"), "Red");
        assert_eq!(short_name("a::Wrap<b::Inner>"), "Wrap<b::Inner>");
    }
}
