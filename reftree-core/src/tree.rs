//! Reference tree model
//!
//! A reference tree is an ordered, id-addressed tree whose nodes carry either
//! content or a reference:
//! - a *node reference* marks a relocated node whose whole subtree is the
//!   referenced node's subtree
//! - a *tree reference* marks an unchanged subtree that stays in place
//!
//! Reference nodes are leaves ("sealed"): their subtree lives in another tree.
//! All traversals here use explicit stacks so deep trees cannot exhaust the
//! call stack.

use crate::content::Content;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::keymap::{IdentityMap, KeyMap};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// What a node carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind<K, C> {
    Content(C),
    NodeRef(K),
    TreeRef(K),
}

impl<K, C> NodeKind<K, C> {
    pub fn content(&self) -> Option<&C> {
        match self {
            NodeKind::Content(c) => Some(c),
            _ => None,
        }
    }

    /// Target of a node or tree reference
    pub fn ref_target(&self) -> Option<&K> {
        match self {
            NodeKind::Content(_) => None,
            NodeKind::NodeRef(k) | NodeKind::TreeRef(k) => Some(k),
        }
    }

    pub fn is_ref(&self) -> bool {
        !matches!(self, NodeKind::Content(_))
    }
}

/// A tree node
#[derive(Debug, Clone, PartialEq)]
pub struct Node<K, C> {
    pub id: K,
    /// Absent only for the root
    pub parent: Option<K>,
    pub children: Vec<K>,
    pub kind: NodeKind<K, C>,
}

impl<K, C> Node<K, C> {
    pub fn new(id: K, parent: Option<K>, kind: NodeKind<K, C>) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            kind,
        }
    }

    pub fn content(&self) -> Option<&C> {
        self.kind.content()
    }

    /// Reference nodes cannot take children
    pub fn is_sealed(&self) -> bool {
        self.kind.is_ref()
    }
}

pub(crate) fn assert_unsealed<K: Key, C>(node: &Node<K, C>) {
    assert!(
        !node.is_sealed(),
        "invariant violation: node {} is a reference and cannot be modified or take children",
        node.id
    );
}

/// Read-only access to a reference tree
pub trait RefTree<K: Key, C: Content> {
    fn root_id(&self) -> K;

    fn node(&self, id: &K) -> Option<Cow<'_, Node<K, C>>>;

    fn contains(&self, id: &K) -> bool {
        self.node(id).is_some()
    }
}

impl<K: Key, C: Content, T: RefTree<K, C> + ?Sized> RefTree<K, C> for &T {
    fn root_id(&self) -> K {
        (**self).root_id()
    }

    fn node(&self, id: &K) -> Option<Cow<'_, Node<K, C>>> {
        (**self).node(id)
    }

    fn contains(&self, id: &K) -> bool {
        (**self).contains(id)
    }
}

impl<K: Key, C: Content, T: RefTree<K, C> + ?Sized> RefTree<K, C> for Arc<T> {
    fn root_id(&self) -> K {
        (**self).root_id()
    }

    fn node(&self, id: &K) -> Option<Cow<'_, Node<K, C>>> {
        (**self).node(id)
    }

    fn contains(&self, id: &K) -> bool {
        (**self).contains(id)
    }
}

/// Structural edits shared by the overlay and the materialized tree
pub trait MutableRefTree<K: Key, C: Content>: RefTree<K, C> {
    /// Insert a content leaf under `parent` at `position` (clamped to append).
    /// With `id == None` the tree assigns an id. Returns the realized id.
    fn insert(&mut self, parent: &K, position: usize, id: Option<K>, content: C) -> Result<K>;

    /// Remove a node and all of its descendants
    fn delete(&mut self, id: &K) -> Result<()>;

    /// Relocate a subtree under `new_parent` at `position`
    fn move_node(&mut self, id: &K, new_parent: &K, position: usize) -> Result<()>;

    /// Replace content. Returns false when the content was already equal.
    fn update(&mut self, id: &K, content: C) -> Result<bool>;
}

/// Ids of the subtree rooted at `id`, in preorder. Empty if `id` is absent.
pub fn subtree_ids<K, C, T>(tree: &T, id: &K) -> Vec<K>
where
    K: Key,
    C: Content,
    T: RefTree<K, C> + ?Sized,
{
    let mut out = Vec::new();
    let mut stack = vec![id.clone()];
    while let Some(id) = stack.pop() {
        let Some(node) = tree.node(&id) else {
            continue;
        };
        stack.extend(node.children.iter().rev().cloned());
        out.push(id);
    }
    out
}

/// All ids of the tree in preorder
pub fn preorder<K, C, T>(tree: &T) -> Vec<K>
where
    K: Key,
    C: Content,
    T: RefTree<K, C> + ?Sized,
{
    subtree_ids(tree, &tree.root_id())
}

/// True if `node` is `ancestor` or lies below it
pub fn is_in_subtree<K, C, T>(tree: &T, ancestor: &K, node: &K) -> bool
where
    K: Key,
    C: Content,
    T: RefTree<K, C> + ?Sized,
{
    let mut cursor = Some(node.clone());
    while let Some(id) = cursor {
        if &id == ancestor {
            return true;
        }
        cursor = tree.node(&id).and_then(|n| n.parent.clone());
    }
    false
}

/// Copy of the subtree at `target`, top node first. The top node is renamed
/// to `id` and attached to `parent`. Positional descendants are rebased
/// under `id`; other descendants keep their ids.
pub(crate) fn copy_subtree<K, C, T>(
    tree: &T,
    target: &K,
    id: &K,
    parent: Option<&K>,
) -> Option<Vec<Node<K, C>>>
where
    K: Key,
    C: Content,
    T: RefTree<K, C> + ?Sized,
{
    let rename = |k: &K| -> K {
        if k == target {
            id.clone()
        } else if K::POSITIONAL {
            k.rebase(target, id).unwrap_or_else(|| k.clone())
        } else {
            k.clone()
        }
    };
    let top = tree.node(target)?;
    let mut stack: Vec<K> = top.children.iter().rev().cloned().collect();
    let mut out = vec![Node {
        id: id.clone(),
        parent: parent.cloned(),
        children: top.children.iter().map(&rename).collect(),
        kind: top.kind.clone(),
    }];
    drop(top);
    while let Some(next) = stack.pop() {
        let Some(node) = tree.node(&next) else {
            continue;
        };
        stack.extend(node.children.iter().rev().cloned());
        out.push(Node {
            id: rename(&node.id),
            parent: node.parent.as_ref().map(&rename),
            children: node.children.iter().map(&rename).collect(),
            kind: node.kind.clone(),
        });
    }
    Some(out)
}

/// First free auto key for a node inserted at child index `index`
pub(crate) fn next_auto_key<K, C, T>(tree: &T, parent: &K, index: usize, hint: &mut u64) -> Result<K>
where
    K: Key,
    C: Content,
    T: RefTree<K, C> + ?Sized,
{
    let exhausted = || Error::AutoKeyExhausted(parent.to_string());
    let mut nonce = if K::POSITIONAL { 0 } else { *hint };
    loop {
        let candidate = K::auto_key(parent, index, nonce).ok_or_else(exhausted)?;
        if !tree.contains(&candidate) {
            if !K::POSITIONAL {
                *hint = nonce.saturating_add(1);
            }
            return Ok(candidate);
        }
        nonce = nonce.checked_add(1).ok_or_else(exhausted)?;
    }
}

/// A structural mismatch found by [`differences`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Difference<F> {
    /// The roots do not correspond
    Root(F),
    /// Node reachable on the left has no counterpart on the right
    Missing(F),
    /// Content or reference target differs
    Content(F),
    /// Child sequences differ
    Children(F),
}

/// Compare two trees in possibly different key spaces.
///
/// Walks both trees from their roots in lockstep, translating left ids with
/// `map`. Subtrees below a child-sequence mismatch are not visited.
pub fn differences<F, B, C, L, R, M>(left: &L, right: &R, map: &M) -> Vec<Difference<F>>
where
    F: Key,
    B: Key,
    C: Content,
    L: RefTree<F, C> + ?Sized,
    R: RefTree<B, C> + ?Sized,
    M: KeyMap<F, B> + ?Sized,
{
    let mut diffs = Vec::new();
    let left_root = left.root_id();
    let right_root = right.root_id();
    if map.back_key(&left_root).as_ref() != Some(&right_root) {
        diffs.push(Difference::Root(left_root));
        return diffs;
    }

    let mut stack = vec![(left_root, right_root)];
    while let Some((l, r)) = stack.pop() {
        let (Some(ln), Some(rn)) = (left.node(&l), right.node(&r)) else {
            diffs.push(Difference::Missing(l));
            continue;
        };
        let kind_matches = match (&ln.kind, &rn.kind) {
            (NodeKind::Content(a), NodeKind::Content(b)) => a == b,
            (NodeKind::NodeRef(a), NodeKind::NodeRef(b))
            | (NodeKind::TreeRef(a), NodeKind::TreeRef(b)) => map.back_key(a).as_ref() == Some(b),
            _ => false,
        };
        if !kind_matches {
            diffs.push(Difference::Content(l.clone()));
        }
        let mapped: Option<Vec<B>> = ln.children.iter().map(|c| map.back_key(c)).collect();
        match mapped {
            Some(children) if children == rn.children => {
                for (lc, rc) in ln.children.iter().cloned().zip(children).rev() {
                    stack.push((lc, rc));
                }
            }
            _ => diffs.push(Difference::Children(l)),
        }
    }
    diffs
}

/// Structural and content equality of two trees in the same key space
pub fn tree_eq<K, C, A, B>(a: &A, b: &B) -> bool
where
    K: Key,
    C: Content,
    A: RefTree<K, C> + ?Sized,
    B: RefTree<K, C> + ?Sized,
{
    differences(a, b, &IdentityMap).is_empty()
}

/// Fully materialized in-memory tree
#[derive(Debug, Clone)]
pub struct MemTree<K, C> {
    root: K,
    nodes: HashMap<K, Node<K, C>>,
    auto_hint: u64,
}

impl<K: Key, C: Content> MemTree<K, C> {
    /// Root-only tree
    pub fn new(root: K, content: C) -> Self {
        Self::with_root_kind(root, NodeKind::Content(content))
    }

    pub fn with_root_kind(root: K, kind: NodeKind<K, C>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(root.clone(), Node::new(root.clone(), None, kind));
        Self {
            root,
            nodes,
            auto_hint: 0,
        }
    }

    /// A tree that is nothing but a reference to `root` in some other tree
    pub fn reference_to(root: K) -> Self {
        Self::with_root_kind(root.clone(), NodeKind::TreeRef(root))
    }

    /// Materialize any reference tree
    pub fn from_tree<T: RefTree<K, C> + ?Sized>(tree: &T) -> Self {
        let root = tree.root_id();
        let mut nodes = HashMap::new();
        let mut stack = vec![root.clone()];
        while let Some(id) = stack.pop() {
            let Some(node) = tree.node(&id) else {
                continue;
            };
            let mut node = node.into_owned();
            node.children.retain(|c| tree.contains(c));
            stack.extend(node.children.iter().rev().cloned());
            nodes.insert(id, node);
        }
        Self {
            root,
            nodes,
            auto_hint: 0,
        }
    }

    /// Assemble from nodes already linked to each other
    pub(crate) fn from_parts(root: K, nodes: HashMap<K, Node<K, C>>) -> Self {
        Self {
            root,
            nodes,
            auto_hint: 0,
        }
    }

    pub fn root(&self) -> &K {
        &self.root
    }

    pub fn get(&self, id: &K) -> Option<&Node<K, C>> {
        self.nodes.get(id)
    }

    pub fn children(&self, id: &K) -> Option<&[K]> {
        self.nodes.get(id).map(|n| n.children.as_slice())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in no particular order
    pub fn nodes(&self) -> impl Iterator<Item = &Node<K, C>> {
        self.nodes.values()
    }

    /// Number of reference nodes
    pub fn ref_count(&self) -> usize {
        self.nodes.values().filter(|n| n.kind.is_ref()).count()
    }

    /// Link a new node below an existing, unsealed parent. Callers check
    /// that the parent exists and the id is free.
    pub(crate) fn attach(&mut self, parent: &K, position: usize, node: Node<K, C>) {
        if let Some(p) = self.nodes.get_mut(parent) {
            let position = position.min(p.children.len());
            p.children.insert(position, node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
    }

    fn node_mut(&mut self, id: &K) -> Result<&mut Node<K, C>> {
        self.nodes.get_mut(id).ok_or_else(|| Error::not_found(id))
    }
}

impl<K: Key, C: Content> RefTree<K, C> for MemTree<K, C> {
    fn root_id(&self) -> K {
        self.root.clone()
    }

    fn node(&self, id: &K) -> Option<Cow<'_, Node<K, C>>> {
        self.nodes.get(id).map(Cow::Borrowed)
    }

    fn contains(&self, id: &K) -> bool {
        self.nodes.contains_key(id)
    }
}

impl<K: Key, C: Content> MutableRefTree<K, C> for MemTree<K, C> {
    fn insert(&mut self, parent: &K, position: usize, id: Option<K>, content: C) -> Result<K> {
        let parent_node = self.nodes.get(parent).ok_or_else(|| Error::not_found(parent))?;
        assert_unsealed(parent_node);
        let position = position.min(parent_node.children.len());
        let id = match id {
            Some(id) if self.nodes.contains_key(&id) => return Err(Error::NodeExists(id.to_string())),
            Some(id) => id,
            None => {
                let mut hint = self.auto_hint;
                let id = next_auto_key::<K, C, _>(&*self, parent, position, &mut hint)?;
                self.auto_hint = hint;
                id
            }
        };
        let node = Node::new(id.clone(), Some(parent.clone()), NodeKind::Content(content));
        self.attach(parent, position, node);
        Ok(id)
    }

    fn delete(&mut self, id: &K) -> Result<()> {
        if id == &self.root {
            return Err(Error::IllegalMove(id.to_string()));
        }
        let parent = self
            .nodes
            .get(id)
            .ok_or_else(|| Error::not_found(id))?
            .parent
            .clone();
        for gone in subtree_ids(&*self, id) {
            self.nodes.remove(&gone);
        }
        if let Some(parent) = parent {
            self.node_mut(&parent)?.children.retain(|c| c != id);
        }
        Ok(())
    }

    fn move_node(&mut self, id: &K, new_parent: &K, position: usize) -> Result<()> {
        if id == &self.root {
            return Err(Error::IllegalMove(id.to_string()));
        }
        let old_parent = self
            .nodes
            .get(id)
            .ok_or_else(|| Error::not_found(id))?
            .parent
            .clone();
        let target = self.nodes.get(new_parent).ok_or_else(|| Error::not_found(new_parent))?;
        assert_unsealed(target);
        if is_in_subtree(&*self, id, new_parent) {
            return Err(Error::IllegalMove(id.to_string()));
        }
        if let Some(old_parent) = old_parent {
            self.node_mut(&old_parent)?.children.retain(|c| c != id);
        }
        let target = self.node_mut(new_parent)?;
        let position = position.min(target.children.len());
        target.children.insert(position, id.clone());
        self.node_mut(id)?.parent = Some(new_parent.clone());
        Ok(())
    }

    fn update(&mut self, id: &K, content: C) -> Result<bool> {
        let node = self.node_mut(id)?;
        assert_unsealed(node);
        if node.content() == Some(&content) {
            return Ok(false);
        }
        node.kind = NodeKind::Content(content);
        Ok(true)
    }
}

impl<K: Key, C: Content> PartialEq for MemTree<K, C> {
    fn eq(&self, other: &Self) -> bool {
        tree_eq(self, other)
    }
}

/// A tree in back key space `B` presented in front key space `F`.
///
/// Nodes whose id, parent or reference target has no front key are not
/// visible; unmapped children are dropped from child lists.
pub struct MappedTree<T, M, F, B> {
    inner: T,
    map: M,
    root: F,
    _back: PhantomData<fn() -> B>,
}

impl<T, M, F: Key, B: Key> MappedTree<T, M, F, B>
where
    M: KeyMap<F, B>,
{
    /// Fails with `NodeNotFound` if the inner root has no front key
    pub fn new<C: Content>(inner: T, map: M) -> Result<Self>
    where
        T: RefTree<B, C>,
    {
        let inner_root = inner.root_id();
        let root = map.front_key(&inner_root).ok_or_else(|| Error::not_found(&inner_root))?;
        Ok(Self {
            inner,
            map,
            root,
            _back: PhantomData,
        })
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn map(&self) -> &M {
        &self.map
    }
}

impl<F, B, C, T, M> RefTree<F, C> for MappedTree<T, M, F, B>
where
    F: Key,
    B: Key,
    C: Content,
    T: RefTree<B, C>,
    M: KeyMap<F, B>,
{
    fn root_id(&self) -> F {
        self.root.clone()
    }

    fn node(&self, id: &F) -> Option<Cow<'_, Node<F, C>>> {
        let back = self.map.back_key(id)?;
        let node = self.inner.node(&back)?;
        let kind = match &node.kind {
            NodeKind::Content(c) => NodeKind::Content(c.clone()),
            NodeKind::NodeRef(t) => NodeKind::NodeRef(self.map.front_key(t)?),
            NodeKind::TreeRef(t) => NodeKind::TreeRef(self.map.front_key(t)?),
        };
        let parent = match &node.parent {
            Some(p) => Some(self.map.front_key(p)?),
            None => None,
        };
        let children = node
            .children
            .iter()
            .filter_map(|c| self.map.front_key(c))
            .collect();
        Some(Cow::Owned(Node {
            id: id.clone(),
            parent,
            children,
            kind,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{LongKey, PosKey, StringKey};
    use crate::keymap::TableMap;

    fn s(id: &str) -> StringKey {
        StringKey::new(id)
    }

    fn sample() -> MemTree<StringKey, String> {
        let mut t = MemTree::new(s("root"), "r".to_string());
        t.insert(&s("root"), 0, Some(s("a")), "1".into()).unwrap();
        t.insert(&s("root"), 1, Some(s("b")), "2".into()).unwrap();
        t.insert(&s("a"), 0, Some(s("a1")), "11".into()).unwrap();
        t
    }

    #[test]
    fn test_mem_tree_insert_order_and_lookup() {
        let mut t = sample();
        t.insert(&s("root"), 1, Some(s("x")), "x".into()).unwrap();
        t.insert(&s("root"), 99, Some(s("z")), "z".into()).unwrap();
        assert_eq!(t.children(&s("root")).unwrap(), &[s("a"), s("x"), s("b"), s("z")]);
        assert_eq!(t.get(&s("x")).unwrap().parent, Some(s("root")));
        assert_eq!(preorder(&t), vec![s("root"), s("a"), s("a1"), s("x"), s("b"), s("z")]);
    }

    #[test]
    fn test_mem_tree_errors() {
        let mut t = sample();
        assert!(matches!(
            t.insert(&s("nope"), 0, None, "v".into()),
            Err(Error::NodeNotFound(id)) if id == "nope"
        ));
        assert!(matches!(
            t.insert(&s("root"), 0, Some(s("a")), "v".into()),
            Err(Error::NodeExists(_))
        ));
        assert!(matches!(t.delete(&s("root")), Err(Error::IllegalMove(_))));
        assert!(matches!(t.move_node(&s("a"), &s("a1"), 0), Err(Error::IllegalMove(_))));
        assert!(matches!(t.update(&s("gone"), "v".into()), Err(Error::NodeNotFound(_))));
    }

    #[test]
    fn test_mem_tree_delete_removes_descendants() {
        let mut t = sample();
        t.delete(&s("a")).unwrap();
        assert!(!t.contains(&s("a")));
        assert!(!t.contains(&s("a1")));
        assert_eq!(t.children(&s("root")).unwrap(), &[s("b")]);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_mem_tree_move_within_same_parent() {
        let mut t = sample();
        t.move_node(&s("a"), &s("root"), 5).unwrap();
        assert_eq!(t.children(&s("root")).unwrap(), &[s("b"), s("a")]);
        t.move_node(&s("b"), &s("a"), 0).unwrap();
        assert_eq!(t.children(&s("a")).unwrap(), &[s("b"), s("a1")]);
        assert_eq!(t.get(&s("b")).unwrap().parent, Some(s("a")));
    }

    #[test]
    fn test_mem_tree_update_equal_is_noop() {
        let mut t = sample();
        assert!(!t.update(&s("a"), "1".into()).unwrap());
        assert!(t.update(&s("a"), "one".into()).unwrap());
        assert_eq!(t.get(&s("a")).unwrap().content(), Some(&"one".to_string()));
    }

    #[test]
    fn test_auto_keys_are_fresh() {
        let mut t = sample();
        let k1 = t.insert(&s("root"), 0, None, "n".into()).unwrap();
        let k2 = t.insert(&s("root"), 0, None, "n".into()).unwrap();
        assert_ne!(k1, k2);
        assert!(k1.is_auto() && k2.is_auto());
    }

    #[test]
    fn test_positional_auto_append_takes_next_index() {
        let root = PosKey::root();
        let mut t = MemTree::new(root.clone(), "r".to_string());
        let first = t.insert(&root, usize::MAX, None, "a".into()).unwrap();
        let second = t.insert(&root, usize::MAX, None, "b".into()).unwrap();
        let third = t.insert(&root, usize::MAX, None, "c".into()).unwrap();
        assert_eq!(first, root.child(0));
        assert_eq!(second, root.child(1));
        assert_eq!(third, root.child(2));
        assert_eq!(t.children(&root).unwrap(), &[first.clone(), second, third]);

        // A taken slot moves the candidate up, never loops
        let front = t.insert(&root, 0, None, "d".into()).unwrap();
        assert_eq!(front, root.child(3));
        let nested = t.insert(&first, usize::MAX, None, "e".into()).unwrap();
        assert_eq!(nested, first.child(0));
    }

    #[test]
    fn test_positional_auto_key_starts_at_clamped_index() {
        let parent = PosKey::from_components(vec![0]);
        let mut t = MemTree::new(PosKey::root(), "r".to_string());
        t.insert(&PosKey::root(), 0, Some(parent.clone()), "p".into()).unwrap();
        t.insert(&parent, 0, Some(parent.child(u32::MAX)), "x".into()).unwrap();
        assert_eq!(t.insert(&parent, 5, None, "y".into()).unwrap(), parent.child(1));
    }

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn test_insert_under_reference_panics() {
        let mut t: MemTree<StringKey, String> = MemTree::reference_to(s("root"));
        let _ = t.insert(&s("root"), 0, Some(s("a")), "1".into());
    }

    #[test]
    fn test_differences_detects_mismatches() {
        let a = sample();
        let mut b = sample();
        assert!(tree_eq(&a, &b));
        b.update(&s("a1"), "changed".into()).unwrap();
        b.insert(&s("root"), 2, Some(s("c")), "3".into()).unwrap();
        let diffs = differences(&a, &b, &IdentityMap);
        assert!(diffs.contains(&Difference::Children(s("root"))));
        assert_eq!(diffs.len(), 1, "children mismatch stops descent: {diffs:?}");

        let mut c = sample();
        c.update(&s("a1"), "changed".into()).unwrap();
        assert_eq!(differences(&a, &c, &IdentityMap), vec![Difference::Content(s("a1"))]);
    }

    #[test]
    fn test_mapped_tree_translates_keys() {
        let mut back: MemTree<LongKey, String> = MemTree::new(LongKey(0), "r".into());
        back.insert(&LongKey(0), 0, Some(LongKey(1)), "1".into()).unwrap();
        back.insert(&LongKey(0), 1, Some(LongKey(2)), "2".into()).unwrap();
        let map: TableMap<StringKey, LongKey> =
            [(s("root"), LongKey(0)), (s("one"), LongKey(1)), (s("two"), LongKey(2))]
                .into_iter()
                .collect();

        let front = MappedTree::new(&back, map.clone()).unwrap();
        assert_eq!(front.root_id(), s("root"));
        let root = front.node(&s("root")).unwrap();
        assert_eq!(root.children, vec![s("one"), s("two")]);
        assert_eq!(front.node(&s("two")).unwrap().parent, Some(s("root")));
        assert!(front.node(&s("three")).is_none());
        assert!(differences(&front, &back, &map).is_empty());
    }

    #[test]
    fn test_from_tree_materializes_view() {
        let back = sample();
        let copy: MemTree<StringKey, String> = MemTree::from_tree(&&back);
        assert_eq!(copy, back);
        assert_eq!(copy.len(), 4);
    }
}
