//! Node identifiers
//!
//! A key is an opaque, totally ordered, serializable node id. Three concrete
//! forms are provided: small integers ([`LongKey`]), strings ([`StringKey`])
//! and path-structured positional keys ([`PosKey`]).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

/// Identity of a node within one tree's key space
pub trait Key:
    Clone + Eq + Hash + Ord + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + 'static
{
    /// Auto keys depend only on parent and position, never on tree history
    const POSITIONAL: bool = false;

    /// Candidate id for a node inserted without an explicit id at child
    /// index `position`.
    ///
    /// Trees call this with increasing `nonce` until the candidate is free.
    /// `None` means the key space has no candidate left.
    fn auto_key(parent: &Self, position: usize, nonce: u64) -> Option<Self>;

    /// Rename `self`, a descendant of `from`, into the subtree at `to`.
    ///
    /// Only positional keys encode their ancestry; others return `None`.
    fn rebase(&self, _from: &Self, _to: &Self) -> Option<Self> {
        None
    }
}

/// First integer of the range reserved for auto-assigned [`LongKey`]s
pub const AUTO_LONG_BASE: u64 = 1 << 62;

/// Prefix reserved for auto-assigned [`StringKey`]s
pub const AUTO_STRING_PREFIX: &str = "@auto-";

/// Integer node id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LongKey(pub u64);

impl LongKey {
    /// Whether the id lies in the auto-assign range
    pub fn is_auto(&self) -> bool {
        self.0 >= AUTO_LONG_BASE
    }
}

impl Key for LongKey {
    fn auto_key(_parent: &Self, _position: usize, nonce: u64) -> Option<Self> {
        AUTO_LONG_BASE.checked_add(nonce).map(LongKey)
    }
}

impl fmt::Display for LongKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LongKey {
    fn from(v: u64) -> Self {
        LongKey(v)
    }
}

/// String node id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StringKey(pub String);

impl StringKey {
    pub fn new(s: impl Into<String>) -> Self {
        StringKey(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id lies in the auto-assign range
    pub fn is_auto(&self) -> bool {
        self.0.starts_with(AUTO_STRING_PREFIX)
    }
}

impl Key for StringKey {
    fn auto_key(_parent: &Self, _position: usize, nonce: u64) -> Option<Self> {
        Some(StringKey(format!("{}{}", AUTO_STRING_PREFIX, nonce)))
    }
}

impl fmt::Display for StringKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StringKey {
    fn from(s: &str) -> Self {
        StringKey(s.to_string())
    }
}

impl From<String> for StringKey {
    fn from(s: String) -> Self {
        StringKey(s)
    }
}

/// Path-structured positional id.
///
/// The root is the empty path. Ordering is by depth first, then
/// lexicographically by component, so an ancestor always sorts before its
/// descendants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PosKey(Vec<u32>);

impl PosKey {
    pub fn root() -> Self {
        PosKey(Vec::new())
    }

    pub fn from_components(components: Vec<u32>) -> Self {
        PosKey(components)
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn child(&self, index: u32) -> Self {
        let mut components = self.0.clone();
        components.push(index);
        PosKey(components)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, head) = self.0.split_last()?;
        Some(PosKey(head.to_vec()))
    }

    /// Strict ancestor test
    pub fn is_ancestor_of(&self, other: &PosKey) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }

    /// Path below `ancestor`, if `ancestor` is this key or one of its ancestors
    pub fn suffix_after(&self, ancestor: &PosKey) -> Option<&[u32]> {
        self.0.strip_prefix(ancestor.0.as_slice())
    }

    pub fn join(&self, suffix: &[u32]) -> Self {
        let mut components = self.0.clone();
        components.extend_from_slice(suffix);
        PosKey(components)
    }

    /// This key followed by each of its ancestors up to the root
    pub fn self_and_ancestors(&self) -> impl Iterator<Item = PosKey> + '_ {
        (0..=self.0.len()).rev().map(|n| PosKey(self.0[..n].to_vec()))
    }
}

impl Ord for PosKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for PosKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Key for PosKey {
    const POSITIONAL: bool = true;

    fn auto_key(parent: &Self, position: usize, nonce: u64) -> Option<Self> {
        let index = u64::try_from(position).ok()?.checked_add(nonce)?;
        Some(parent.child(u32::try_from(index).ok()?))
    }

    fn rebase(&self, from: &Self, to: &Self) -> Option<Self> {
        Some(to.join(self.suffix_after(from)?))
    }
}

impl fmt::Display for PosKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for c in &self.0 {
            write!(f, "/{}", c)?;
        }
        Ok(())
    }
}

impl FromStr for PosKey {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let components = s
            .split('/')
            .filter(|p| !p.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<u32>, _>>()?;
        Ok(PosKey(components))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pk(s: &str) -> PosKey {
        s.parse().unwrap()
    }

    #[test]
    fn test_pos_key_order_depth_first() {
        let mut keys = vec![pk("/1/0"), pk("/2"), pk("/"), pk("/0/5"), pk("/1")];
        keys.sort();
        assert_eq!(keys, vec![pk("/"), pk("/1"), pk("/2"), pk("/0/5"), pk("/1/0")]);
    }

    #[test]
    fn test_pos_key_ancestry() {
        let a = pk("/1/2");
        let d = pk("/1/2/7/3");
        assert!(a.is_ancestor_of(&d));
        assert!(!d.is_ancestor_of(&a));
        assert!(!a.is_ancestor_of(&a));
        assert_eq!(d.suffix_after(&a), Some(&[7u32, 3][..]));
        assert_eq!(pk("/9").join(&[7, 3]), pk("/9/7/3"));
        assert_eq!(d.parent(), Some(pk("/1/2/7")));
        assert_eq!(PosKey::root().parent(), None);
    }

    #[test]
    fn test_pos_key_display_roundtrip() {
        let k = pk("/3/0/12");
        assert_eq!(k.to_string(), "/3/0/12");
        assert_eq!(PosKey::root().to_string(), "/");
        assert_eq!(pk(&k.to_string()), k);
    }

    #[test]
    fn test_self_and_ancestors() {
        let all: Vec<_> = pk("/4/2").self_and_ancestors().collect();
        assert_eq!(all, vec![pk("/4/2"), pk("/4"), pk("/")]);
    }

    #[test]
    fn test_auto_keys() {
        assert!(LongKey::auto_key(&LongKey(1), 0, 5).unwrap().is_auto());
        assert!(!LongKey(42).is_auto());
        assert!(StringKey::auto_key(&"root".into(), 3, 0).unwrap().is_auto());
        assert_eq!(PosKey::auto_key(&pk("/1"), 2, 0), Some(pk("/1/2")));
        assert_eq!(PosKey::auto_key(&pk("/1"), 2, 3), Some(pk("/1/5")));
    }

    #[test]
    fn test_auto_keys_run_out_instead_of_repeating() {
        let last = u32::MAX as usize;
        assert_eq!(PosKey::auto_key(&pk("/1"), last, 0), Some(pk("/1").child(u32::MAX)));
        assert_eq!(PosKey::auto_key(&pk("/1"), last, 1), None);
        assert_eq!(PosKey::auto_key(&pk("/1"), usize::MAX, 0), None);
        assert_eq!(LongKey::auto_key(&LongKey(0), 0, u64::MAX), None);
    }

    #[test]
    fn test_pos_key_rebase() {
        assert_eq!(pk("/0/3/1").rebase(&pk("/0"), &pk("/7/2")), Some(pk("/7/2/3/1")));
        assert_eq!(pk("/0").rebase(&pk("/0"), &pk("/5")), Some(pk("/5")));
        assert_eq!(pk("/1/3").rebase(&pk("/0"), &pk("/5")), None);
        assert_eq!(LongKey(3).rebase(&LongKey(1), &LongKey(2)), None);
    }
}
