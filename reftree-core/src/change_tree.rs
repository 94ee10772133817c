//! Copy-on-write overlay over an immutable base tree
//!
//! A [`ChangeTree`] records only what differs from its base: overridden nodes
//! (inserted, updated, moved, or whose child list changed) and tombstoned ids
//! (deleted). Lookups consult overrides, then tombstones, then the base.
//!
//! Deleting a node tombstones its whole subtree and drops any overlay state
//! below it. Re-inserting a deleted id creates a fresh node; nothing of the
//! deleted node survives.
//!
//! The overlay also acts as a [`KeyMap`] from its own ids to base ids. Ids
//! placed through reference nodes by [`ChangeTree::apply`] map to their
//! reference targets, and positional descendants copied under a renamed
//! reference map to the base nodes they were copied from. Freshly inserted
//! ids do not map.

use crate::content::Content;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::keymap::KeyMap;
use crate::tree::{
    assert_unsealed, copy_subtree, is_in_subtree, next_auto_key, subtree_ids, MappedTree, MemTree,
    MutableRefTree, Node, NodeKind, RefTree,
};
use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// Reference lookup tables, rebuilt wholesale on apply
#[derive(Debug, Clone)]
struct RefTables<K> {
    node_refs: HashMap<K, K>,
    tree_refs: HashMap<K, K>,
    /// Descendants copied under a renamed reference, to their base ids
    copies: HashMap<K, K>,
    reverse: HashMap<K, K>,
}

impl<K: Key> RefTables<K> {
    fn new() -> Self {
        Self {
            node_refs: HashMap::new(),
            tree_refs: HashMap::new(),
            copies: HashMap::new(),
            reverse: HashMap::new(),
        }
    }

    fn record<C>(&mut self, id: &K, kind: &NodeKind<K, C>) {
        match kind {
            NodeKind::NodeRef(target) => {
                self.node_refs.insert(id.clone(), target.clone());
            }
            NodeKind::TreeRef(target) => {
                self.tree_refs.insert(id.clone(), target.clone());
            }
            NodeKind::Content(_) => return,
        }
        if let Some(target) = kind.ref_target() {
            self.reverse.insert(target.clone(), id.clone());
        }
    }

    fn record_copy(&mut self, id: &K, origin: &K) {
        self.copies.insert(id.clone(), origin.clone());
        self.reverse.insert(origin.clone(), id.clone());
    }

    fn target(&self, id: &K) -> Option<&K> {
        self.node_refs
            .get(id)
            .or_else(|| self.tree_refs.get(id))
            .or_else(|| self.copies.get(id))
    }

    fn forget(&mut self, id: &K) {
        let node = self.node_refs.remove(id);
        let tree = self.tree_refs.remove(id);
        let copy = self.copies.remove(id);
        for target in node.into_iter().chain(tree).chain(copy) {
            self.reverse.remove(&target);
        }
    }

    fn clear(&mut self) {
        self.node_refs.clear();
        self.tree_refs.clear();
        self.copies.clear();
        self.reverse.clear();
    }
}

/// Mutable overlay over base tree `B`
#[derive(Debug, Clone)]
pub struct ChangeTree<K, C, B> {
    base: B,
    overrides: HashMap<K, Node<K, C>>,
    tombstones: HashSet<K>,
    fresh: HashSet<K>,
    refs: RefTables<K>,
    auto_hint: u64,
}

impl<K: Key, C: Content, B: RefTree<K, C>> ChangeTree<K, C, B> {
    pub fn new(base: B) -> Self {
        Self {
            base,
            overrides: HashMap::new(),
            tombstones: HashSet::new(),
            fresh: HashSet::new(),
            refs: RefTables::new(),
            auto_hint: 0,
        }
    }

    pub fn base(&self) -> &B {
        &self.base
    }

    pub fn into_base(self) -> B {
        self.base
    }

    /// True iff any override or tombstone is recorded
    pub fn has_changes(&self) -> bool {
        !self.overrides.is_empty() || !self.tombstones.is_empty()
    }

    /// Discard all overlay state, reverting to exactly the base tree
    pub fn reset(&mut self) {
        self.overrides.clear();
        self.tombstones.clear();
        self.fresh.clear();
        self.refs.clear();
    }

    /// Ids whose node differs from the base, sorted
    pub fn modified_ids(&self) -> Vec<K> {
        let mut ids: Vec<K> = self.overrides.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Base ids hidden by the overlay, sorted
    pub fn deleted_ids(&self) -> Vec<K> {
        let mut ids: Vec<K> = self.tombstones.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Target of the node reference that placed `id` during the last apply
    pub fn node_ref_target(&self, id: &K) -> Option<&K> {
        self.refs.node_refs.get(id)
    }

    /// Target of the tree reference that placed `id` during the last apply
    pub fn tree_ref_target(&self, id: &K) -> Option<&K> {
        self.refs.tree_refs.get(id)
    }

    /// Copy of the effective tree
    pub fn materialize(&self) -> MemTree<K, C> {
        MemTree::from_tree(self)
    }

    /// Overridable copy of an effective node
    fn writable(&mut self, id: &K) -> Result<&mut Node<K, C>> {
        match self.overrides.entry(id.clone()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(v) => {
                if self.tombstones.contains(id) {
                    return Err(Error::not_found(id));
                }
                let node = self.base.node(id).ok_or_else(|| Error::not_found(id))?;
                Ok(v.insert(node.into_owned()))
            }
        }
    }

    /// Replace the effective state with a structural copy of `source`.
    ///
    /// Reference nodes in `source` are resolved against this overlay's base:
    /// a reference whose id equals its target reuses the base subtree in
    /// place, any other reference copies the target's subtree under the
    /// reference's id. The reference tables are rebuilt from `source`.
    ///
    /// Nothing is modified unless the whole source resolves. Fails with
    /// `BrokenDelta` on a dangling reference, a duplicate id, or a root that
    /// differs from the base root.
    pub fn apply<T: RefTree<K, C> + ?Sized>(&mut self, source: &T) -> Result<()> {
        let root = self.base.root_id();
        let source_root = source.root_id();
        if source_root != root {
            return Err(Error::BrokenDelta(format!(
                "source root {} does not match base root {}",
                source_root, root
            )));
        }

        let mut overrides: HashMap<K, Node<K, C>> = HashMap::new();
        let mut tables = RefTables::new();
        let mut reused: HashSet<K> = HashSet::new();
        let mut stack = vec![source_root];

        while let Some(id) = stack.pop() {
            let node = source
                .node(&id)
                .ok_or_else(|| Error::BrokenDelta(format!("source node {} is missing", id)))?;
            let placed = match node.kind.ref_target().cloned() {
                None => {
                    let copy = node.into_owned();
                    stack.extend(copy.children.iter().rev().cloned());
                    vec![copy]
                }
                Some(target) => {
                    tables.record(&id, &node.kind);
                    let broken = || {
                        Error::BrokenDelta(format!("reference {} -> missing node {}", id, target))
                    };
                    if target == id {
                        let mut top = self.base.node(&target).ok_or_else(broken)?.into_owned();
                        top.parent = node.parent.clone();
                        reused.insert(id.clone());
                        vec![top]
                    } else {
                        let copied = copy_subtree(&self.base, &target, &id, node.parent.as_ref())
                            .ok_or_else(broken)?;
                        if K::POSITIONAL {
                            // Both walks are preorder, so copies line up with
                            // their origins.
                            let origins = subtree_ids(&self.base, &target);
                            for (copy, origin) in copied.iter().zip(&origins).skip(1) {
                                tables.record_copy(&copy.id, origin);
                            }
                        }
                        copied
                    }
                }
            };
            for n in placed {
                let nid = n.id.clone();
                if overrides.insert(nid.clone(), n).is_some() {
                    return Err(Error::BrokenDelta(format!("node {} appears twice", nid)));
                }
            }
        }

        // Every base node that is neither placed nor inside a reused subtree
        // is gone.
        let mut tombstones = HashSet::new();
        let mut walk = vec![(root, false)];
        while let Some((id, inside)) = walk.pop() {
            let Some(node) = self.base.node(&id) else {
                continue;
            };
            let reuse_root = reused.contains(&id);
            if inside && overrides.contains_key(&id) {
                return Err(Error::BrokenDelta(format!("node {} appears twice", id)));
            }
            if !inside && !reuse_root && !overrides.contains_key(&id) {
                tombstones.insert(id.clone());
            }
            for child in &node.children {
                walk.push((child.clone(), inside || reuse_root));
            }
        }

        let base = &self.base;
        overrides.retain(|id, n| base.node(id).is_none_or(|b| *b != *n));

        tracing::debug!(
            overrides = overrides.len(),
            tombstones = tombstones.len(),
            node_refs = tables.node_refs.len(),
            tree_refs = tables.tree_refs.len(),
            "applied tree onto overlay"
        );
        self.overrides = overrides;
        self.tombstones = tombstones;
        self.fresh.clear();
        self.refs = tables;
        Ok(())
    }
}

impl<K, C, T, M, BK> ChangeTree<K, C, MappedTree<T, M, K, BK>>
where
    K: Key,
    C: Content,
    BK: Key,
    T: RefTree<BK, C>,
    M: KeyMap<K, BK>,
{
    /// Overlay in key space `K` over a base tree keyed by `BK`
    pub fn over_mapped(base: T, map: M) -> Result<Self> {
        Ok(Self::new(MappedTree::new(base, map)?))
    }
}

impl<K: Key, C: Content, B: RefTree<K, C>> RefTree<K, C> for ChangeTree<K, C, B> {
    fn root_id(&self) -> K {
        self.base.root_id()
    }

    fn node(&self, id: &K) -> Option<Cow<'_, Node<K, C>>> {
        if let Some(node) = self.overrides.get(id) {
            return Some(Cow::Borrowed(node));
        }
        if self.tombstones.contains(id) {
            return None;
        }
        self.base.node(id)
    }

    fn contains(&self, id: &K) -> bool {
        self.overrides.contains_key(id) || (!self.tombstones.contains(id) && self.base.contains(id))
    }
}

impl<K: Key, C: Content, B: RefTree<K, C>> MutableRefTree<K, C> for ChangeTree<K, C, B> {
    fn insert(&mut self, parent: &K, position: usize, id: Option<K>, content: C) -> Result<K> {
        let position = {
            let parent_node = self.node(parent).ok_or_else(|| Error::not_found(parent))?;
            assert_unsealed(&parent_node);
            position.min(parent_node.children.len())
        };
        let id = match id {
            Some(id) if self.contains(&id) => return Err(Error::NodeExists(id.to_string())),
            Some(id) => id,
            None => {
                let mut hint = self.auto_hint;
                let id = next_auto_key::<K, C, _>(&*self, parent, position, &mut hint)?;
                self.auto_hint = hint;
                id
            }
        };

        let parent_node = self.writable(parent)?;
        let position = position.min(parent_node.children.len());
        parent_node.children.insert(position, id.clone());

        // A previously deleted id comes back only as a brand new node.
        self.tombstones.remove(&id);
        self.refs.forget(&id);
        self.fresh.insert(id.clone());
        self.overrides.insert(
            id.clone(),
            Node::new(id.clone(), Some(parent.clone()), NodeKind::Content(content)),
        );
        Ok(id)
    }

    fn delete(&mut self, id: &K) -> Result<()> {
        if *id == self.base.root_id() {
            return Err(Error::IllegalMove(id.to_string()));
        }
        let parent = self.node(id).ok_or_else(|| Error::not_found(id))?.parent.clone();
        let doomed = subtree_ids(&*self, id);
        if let Some(parent) = parent {
            self.writable(&parent)?.children.retain(|c| c != id);
        }
        for gone in doomed {
            self.overrides.remove(&gone);
            self.fresh.remove(&gone);
            self.refs.forget(&gone);
            if self.base.contains(&gone) {
                self.tombstones.insert(gone);
            }
        }
        Ok(())
    }

    fn move_node(&mut self, id: &K, new_parent: &K, position: usize) -> Result<()> {
        if *id == self.base.root_id() {
            return Err(Error::IllegalMove(id.to_string()));
        }
        let old_parent = self.node(id).ok_or_else(|| Error::not_found(id))?.parent.clone();
        assert_unsealed(&*self.node(new_parent).ok_or_else(|| Error::not_found(new_parent))?);
        if is_in_subtree(&*self, id, new_parent) {
            return Err(Error::IllegalMove(id.to_string()));
        }

        if let Some(old_parent) = old_parent {
            self.writable(&old_parent)?.children.retain(|c| c != id);
        }
        let target = self.writable(new_parent)?;
        let position = position.min(target.children.len());
        target.children.insert(position, id.clone());
        self.writable(id)?.parent = Some(new_parent.clone());
        Ok(())
    }

    fn update(&mut self, id: &K, content: C) -> Result<bool> {
        {
            let node = self.node(id).ok_or_else(|| Error::not_found(id))?;
            assert_unsealed(&node);
            if node.content() == Some(&content) {
                return Ok(false);
            }
        }
        self.writable(id)?.kind = NodeKind::Content(content);
        Ok(true)
    }
}

impl<K: Key, C: Content, B: RefTree<K, C>> KeyMap<K, K> for ChangeTree<K, C, B> {
    fn back_key(&self, front: &K) -> Option<K> {
        if let Some(target) = self.refs.target(front) {
            return Some(target.clone());
        }
        if self.fresh.contains(front) {
            return None;
        }
        (self.contains(front) && self.base.contains(front)).then(|| front.clone())
    }

    fn front_key(&self, back: &K) -> Option<K> {
        if let Some(front) = self.refs.reverse.get(back) {
            return Some(front.clone());
        }
        if self.fresh.contains(back) || self.refs.target(back).is_some_and(|t| t != back) {
            return None;
        }
        (self.base.contains(back) && self.contains(back)).then(|| back.clone())
    }
}
