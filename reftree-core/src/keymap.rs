//! Translation between two trees' key spaces
//!
//! A [`KeyMap`] relates a "front" key space to a "back" key space. Both
//! directions are partial: `None` means the key does not map, which is not
//! an error.

use crate::key::PosKey;
use std::collections::HashMap;
use std::hash::Hash;

/// Bidirectional partial mapping between front keys `F` and back keys `B`
pub trait KeyMap<F, B> {
    fn back_key(&self, front: &F) -> Option<B>;

    fn front_key(&self, back: &B) -> Option<F>;
}

impl<F, B, M: KeyMap<F, B> + ?Sized> KeyMap<F, B> for &M {
    fn back_key(&self, front: &F) -> Option<B> {
        (**self).back_key(front)
    }

    fn front_key(&self, back: &B) -> Option<F> {
        (**self).front_key(back)
    }
}

/// Both trees use the same ids
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMap;

impl<K: Clone> KeyMap<K, K> for IdentityMap {
    fn back_key(&self, front: &K) -> Option<K> {
        Some(front.clone())
    }

    fn front_key(&self, back: &K) -> Option<K> {
        Some(back.clone())
    }
}

/// Explicit one-to-one table
#[derive(Debug, Clone)]
pub struct TableMap<F, B> {
    forward: HashMap<F, B>,
    backward: HashMap<B, F>,
}

impl<F, B> TableMap<F, B>
where
    F: Clone + Eq + Hash,
    B: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            forward: HashMap::new(),
            backward: HashMap::new(),
        }
    }

    /// Add a pair, replacing any pair that used either key
    pub fn insert(&mut self, front: F, back: B) {
        if let Some(old_back) = self.forward.remove(&front) {
            self.backward.remove(&old_back);
        }
        if let Some(old_front) = self.backward.remove(&back) {
            self.forward.remove(&old_front);
        }
        self.forward.insert(front.clone(), back.clone());
        self.backward.insert(back, front);
    }

    pub fn remove_front(&mut self, front: &F) -> Option<B> {
        let back = self.forward.remove(front)?;
        self.backward.remove(&back);
        Some(back)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

impl<F, B> Default for TableMap<F, B>
where
    F: Clone + Eq + Hash,
    B: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<F, B> FromIterator<(F, B)> for TableMap<F, B>
where
    F: Clone + Eq + Hash,
    B: Clone + Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = (F, B)>>(iter: I) -> Self {
        let mut map = TableMap::new();
        for (f, b) in iter {
            map.insert(f, b);
        }
        map
    }
}

impl<F, B> KeyMap<F, B> for TableMap<F, B>
where
    F: Clone + Eq + Hash,
    B: Clone + Eq + Hash,
{
    fn back_key(&self, front: &F) -> Option<B> {
        self.forward.get(front).cloned()
    }

    fn front_key(&self, back: &B) -> Option<F> {
        self.backward.get(back).cloned()
    }
}

/// Positional map defined by anchor pairs.
///
/// A key maps if it or one of its ancestors is an anchor; the path below the
/// nearest anchor is appended to the anchor's counterpart.
#[derive(Debug, Clone, Default)]
pub struct PrefixMap {
    anchors: TableMap<PosKey, PosKey>,
}

impl PrefixMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, front: PosKey, back: PosKey) {
        self.anchors.insert(front, back);
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

impl KeyMap<PosKey, PosKey> for PrefixMap {
    fn back_key(&self, front: &PosKey) -> Option<PosKey> {
        front.self_and_ancestors().find_map(|anchor| {
            let mapped = self.anchors.back_key(&anchor)?;
            let suffix = front.suffix_after(&anchor)?;
            Some(mapped.join(suffix))
        })
    }

    fn front_key(&self, back: &PosKey) -> Option<PosKey> {
        back.self_and_ancestors().find_map(|anchor| {
            let mapped = self.anchors.front_key(&anchor)?;
            let suffix = back.suffix_after(&anchor)?;
            Some(mapped.join(suffix))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{LongKey, StringKey};

    fn pk(s: &str) -> PosKey {
        s.parse().unwrap()
    }

    #[test]
    fn test_table_map_is_partial() {
        let mut map = TableMap::new();
        map.insert(StringKey::new("a"), LongKey(1));
        assert_eq!(map.back_key(&StringKey::new("a")), Some(LongKey(1)));
        assert_eq!(map.front_key(&LongKey(1)), Some(StringKey::new("a")));
        assert_eq!(map.back_key(&StringKey::new("b")), None);
        assert_eq!(map.front_key(&LongKey(2)), None);
    }

    #[test]
    fn test_table_map_replaces_pairs() {
        let mut map = TableMap::new();
        map.insert(StringKey::new("a"), LongKey(1));
        map.insert(StringKey::new("a"), LongKey(2));
        assert_eq!(map.front_key(&LongKey(1)), None);
        assert_eq!(map.back_key(&StringKey::new("a")), Some(LongKey(2)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_prefix_map_appends_suffix() {
        let mut map = PrefixMap::new();
        map.insert(pk("/0"), pk("/3/1"));
        assert_eq!(map.back_key(&pk("/0")), Some(pk("/3/1")));
        assert_eq!(map.back_key(&pk("/0/4/2")), Some(pk("/3/1/4/2")));
        assert_eq!(map.front_key(&pk("/3/1/9")), Some(pk("/0/9")));
        assert_eq!(map.back_key(&pk("/1")), None);
        assert_eq!(map.front_key(&pk("/3")), None);
    }

    #[test]
    fn test_prefix_map_prefers_nearest_anchor() {
        let mut map = PrefixMap::new();
        map.insert(pk("/"), pk("/"));
        map.insert(pk("/2"), pk("/7"));
        assert_eq!(map.back_key(&pk("/2/1")), Some(pk("/7/1")));
        assert_eq!(map.back_key(&pk("/5/1")), Some(pk("/5/1")));
    }
}
