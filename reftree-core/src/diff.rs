//! Base-relative tree deltas
//!
//! A [`Diff`] is a target tree flattened in preorder, where every subtree the
//! target shares unchanged with a base tree is collapsed into a single
//! reference node:
//! - a tree reference when the subtree sits at the same parent and sibling
//!   index as in the base
//! - a node reference when the subtree moved
//!
//! Matching is by id. Two structurally identical subtrees with different ids
//! are not compressed.
//!
//! [`normalize`] and [`expand_refs`] build reverse deltas: given the refs a
//! forward delta takes from the old tree, they decide which parts of the old
//! tree the reverse delta may keep as references into the new tree and which
//! it must inline.

use crate::content::{CodecContext, Content};
use crate::error::{Error, Result};
use crate::key::Key;
use crate::tree::{copy_subtree, preorder, subtree_ids, MemTree, Node, NodeKind, RefTree};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// One node of a flattened delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffNode<K, C> {
    pub id: K,
    /// Index of the parent in the node list, absent for the root
    pub parent: Option<u32>,
    pub kind: NodeKind<K, C>,
}

/// Serializable encoding of a tree relative to a base tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff<K, C> {
    base_version: Option<u64>,
    nodes: Vec<DiffNode<K, C>>,
}

impl<K: Key, C: Content> Diff<K, C> {
    /// Flatten a tree as is, keeping any reference nodes it carries
    pub fn from_tree<T: RefTree<K, C> + ?Sized>(tree: &T) -> Self {
        let mut nodes = Vec::new();
        let mut stack: Vec<(K, Option<u32>)> = vec![(tree.root_id(), None)];
        while let Some((id, parent)) = stack.pop() {
            let Some(node) = tree.node(&id) else {
                continue;
            };
            let index = nodes.len() as u32;
            stack.extend(node.children.iter().rev().map(|c| (c.clone(), Some(index))));
            nodes.push(DiffNode {
                id,
                parent,
                kind: node.kind.clone(),
            });
        }
        Self {
            base_version: None,
            nodes,
        }
    }

    /// Rebuild the delta's own shape, references left unresolved
    pub fn to_tree(&self) -> Result<MemTree<K, C>> {
        self.assemble(|dn, parent| {
            Ok(vec![Node::new(dn.id.clone(), parent.cloned(), dn.kind.clone())])
        })
    }

    /// Record which version of the base this delta was computed against
    pub fn with_base(mut self, version: u64) -> Self {
        self.base_version = Some(version);
        self
    }

    pub fn base_version(&self) -> Option<u64> {
        self.base_version
    }

    pub fn root_id(&self) -> Option<&K> {
        self.nodes.first().map(|n| &n.id)
    }

    pub fn nodes(&self) -> &[DiffNode<K, C>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of reference nodes
    pub fn ref_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.kind.is_ref()).count()
    }

    /// True for the delta of a tree equal to its base
    pub fn is_unchanged(&self) -> bool {
        matches!(self.nodes.as_slice(), [only] if only.kind == NodeKind::TreeRef(only.id.clone()))
    }

    /// Convert every content payload, keeping shape and references
    pub fn map_content<D, F>(&self, mut f: F) -> Result<Diff<K, D>>
    where
        F: FnMut(&CodecContext<'_, K>, &C) -> Result<D>,
    {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for dn in &self.nodes {
            let parent = dn
                .parent
                .and_then(|p| self.nodes.get(p as usize))
                .map(|p| &p.id);
            let kind = match &dn.kind {
                NodeKind::Content(c) => {
                    let ctx = CodecContext { id: &dn.id, parent };
                    NodeKind::Content(f(&ctx, c)?)
                }
                NodeKind::NodeRef(t) => NodeKind::NodeRef(t.clone()),
                NodeKind::TreeRef(t) => NodeKind::TreeRef(t.clone()),
            };
            nodes.push(DiffNode {
                id: dn.id.clone(),
                parent: dn.parent,
                kind,
            });
        }
        Ok(Diff {
            base_version: self.base_version,
            nodes,
        })
    }

    /// Link the flattened nodes into a tree, letting `place` produce the
    /// node(s) each entry stands for. Checks ordering, sealing and id
    /// uniqueness.
    fn assemble<F>(&self, mut place: F) -> Result<MemTree<K, C>>
    where
        F: FnMut(&DiffNode<K, C>, Option<&K>) -> Result<Vec<Node<K, C>>>,
    {
        let root = self
            .root_id()
            .ok_or_else(|| Error::BrokenDelta("empty delta".into()))?
            .clone();
        let mut out: HashMap<K, Node<K, C>> = HashMap::with_capacity(self.nodes.len());
        for (index, dn) in self.nodes.iter().enumerate() {
            let parent = match dn.parent {
                None if index == 0 => None,
                Some(p) if (p as usize) < index => {
                    let parent = &self.nodes[p as usize];
                    if parent.kind.is_ref() {
                        return Err(Error::BrokenDelta(format!(
                            "node {} is attached below reference {}",
                            dn.id, parent.id
                        )));
                    }
                    Some(&parent.id)
                }
                _ => {
                    return Err(Error::BrokenDelta(format!("node {} is out of order", dn.id)));
                }
            };
            for node in place(dn, parent)? {
                if out.contains_key(&node.id) {
                    return Err(Error::BrokenDelta(format!("node {} appears twice", node.id)));
                }
                out.insert(node.id.clone(), node);
            }
            if let Some(p) = parent.and_then(|p| out.get_mut(p)) {
                p.children.push(dn.id.clone());
            }
        }
        Ok(MemTree::from_parts(root, out))
    }
}

/// Ids of `target` whose whole subtree equals the same-id subtree of `source`
fn unchanged_subtrees<K, C, S, T>(source: &S, target: &T) -> HashSet<K>
where
    K: Key,
    C: Content,
    S: RefTree<K, C> + ?Sized,
    T: RefTree<K, C> + ?Sized,
{
    let mut same = HashSet::new();
    // Reverse preorder visits children before their parent
    for id in preorder(target).into_iter().rev() {
        let (Some(t), Some(s)) = (target.node(&id), source.node(&id)) else {
            continue;
        };
        if t.kind == s.kind
            && t.children == s.children
            && t.children.iter().all(|c| same.contains(c))
        {
            same.insert(id);
        }
    }
    same
}

/// Encode `target` relative to `source`.
///
/// An unchanged tree encodes as a single tree reference to its root.
pub fn encode<K, C, S, T>(source: &S, target: &T) -> Diff<K, C>
where
    K: Key,
    C: Content,
    S: RefTree<K, C> + ?Sized,
    T: RefTree<K, C> + ?Sized,
{
    let unchanged = unchanged_subtrees(source, target);
    let mut nodes = Vec::new();
    let root = target.root_id();
    let root_in_place = source.root_id() == root;
    // (id, parent index, same parent and sibling index as in source)
    let mut stack: Vec<(K, Option<u32>, bool)> = vec![(root, None, root_in_place)];
    while let Some((id, parent, in_place)) = stack.pop() {
        let Some(node) = target.node(&id) else {
            continue;
        };
        let index = nodes.len() as u32;
        let kind = if unchanged.contains(&id) {
            if in_place {
                NodeKind::TreeRef(id.clone())
            } else {
                NodeKind::NodeRef(id.clone())
            }
        } else {
            let source_node = source.node(&id);
            let source_children = source_node.as_ref().map_or(&[][..], |n| n.children.as_slice());
            for (pos, child) in node.children.iter().enumerate().rev() {
                let child_in_place = source_children.get(pos) == Some(child);
                stack.push((child.clone(), Some(index), child_in_place));
            }
            node.kind.clone()
        };
        nodes.push(DiffNode {
            id,
            parent,
            kind,
        });
    }

    let diff = Diff {
        base_version: None,
        nodes,
    };
    tracing::debug!(nodes = diff.len(), refs = diff.ref_count(), "encoded delta");
    diff
}

/// Rebuild the full tree a delta encodes, resolving every reference against
/// `base`.
///
/// Fails with `BrokenDelta` if a reference target is missing from `base` or
/// the delta is malformed. Nothing partial is ever returned.
pub fn decode<K, C, B>(diff: &Diff<K, C>, base: &B) -> Result<MemTree<K, C>>
where
    K: Key,
    C: Content,
    B: RefTree<K, C> + ?Sized,
{
    let tree = diff.assemble(|dn, parent| match dn.kind.ref_target() {
        None => Ok(vec![Node::new(dn.id.clone(), parent.cloned(), dn.kind.clone())]),
        Some(target) => copy_subtree(base, target, &dn.id, parent).ok_or_else(|| {
            Error::BrokenDelta(format!("reference {} -> {} is not in the base", dn.id, target))
        }),
    })?;
    tracing::debug!(delta = diff.len(), nodes = tree.len(), "decoded delta");
    Ok(tree)
}

/// Base subtrees referenced by one candidate tree
#[derive(Debug, Clone)]
pub struct UsedRefs<K> {
    /// Referenced base ids, true when some reference kept it in place
    targets: BTreeMap<K, bool>,
    /// Base ids the candidate holds unchanged under their own id
    covered: HashSet<K>,
}

impl<K: Key> UsedRefs<K> {
    fn new() -> Self {
        Self {
            targets: BTreeMap::new(),
            covered: HashSet::new(),
        }
    }

    /// Referenced base ids, sorted
    pub fn targets(&self) -> impl Iterator<Item = &K> {
        self.targets.keys()
    }

    pub fn is_covered(&self, id: &K) -> bool {
        self.covered.contains(id)
    }

    pub fn in_place(&self, id: &K) -> bool {
        self.targets.get(id).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// For each candidate, which subtrees of `base` it references.
///
/// A reference from id `i` to base node `t` covers every descendant of `t`,
/// and `t` itself when `i == t`. With positional keys a renamed reference
/// covers nothing, since its descendants are rebased under `i`. References whose target is not in `base`
/// are ignored.
pub fn normalize<K, C, B>(base: &B, candidates: &[&dyn RefTree<K, C>]) -> Vec<UsedRefs<K>>
where
    K: Key,
    C: Content,
    B: RefTree<K, C> + ?Sized,
{
    candidates
        .iter()
        .map(|candidate| {
            let mut used = UsedRefs::new();
            for id in preorder(*candidate) {
                let Some(node) = candidate.node(&id) else {
                    continue;
                };
                let Some(target) = node.kind.ref_target() else {
                    continue;
                };
                if !base.contains(target) {
                    continue;
                }
                let same_id = id == *target;
                let in_place = same_id && matches!(node.kind, NodeKind::TreeRef(_));
                *used.targets.entry(target.clone()).or_insert(false) |= in_place;
                // Positional descendants of a renamed reference are rebased,
                // so their base ids do not survive.
                if same_id || !K::POSITIONAL {
                    used.covered.extend(subtree_ids(base, target).into_iter().skip(1));
                }
                if same_id {
                    used.covered.insert(target.clone());
                }
            }
            used
        })
        .collect()
}

enum Pending<K> {
    Node(K),
    Ref { id: K, target: K, parent: Option<K> },
}

/// Inline every reference of `tree` that `allowed` does not cover.
///
/// A reference `i -> t` is kept only when `i == t` and `allowed` covers `t`;
/// otherwise it becomes `t`'s node from `content_source`, renamed to `i`,
/// whose children are processed as references to themselves.
pub fn expand_refs<K, C, T, S>(
    tree: &T,
    allowed: &UsedRefs<K>,
    content_source: &S,
) -> Result<MemTree<K, C>>
where
    K: Key,
    C: Content,
    T: RefTree<K, C> + ?Sized,
    S: RefTree<K, C> + ?Sized,
{
    let root = tree.root_id();
    let mut out: HashMap<K, Node<K, C>> = HashMap::new();
    let mut place = |node: Node<K, C>| -> Result<()> {
        if out.contains_key(&node.id) {
            return Err(Error::BrokenDelta(format!("node {} appears twice", node.id)));
        }
        out.insert(node.id.clone(), node);
        Ok(())
    };
    let mut kept = 0usize;
    let mut inlined = 0usize;
    let mut stack = vec![Pending::Node(root.clone())];

    while let Some(pending) = stack.pop() {
        let (id, target, parent) = match pending {
            Pending::Ref { id, target, parent } => (id, target, parent),
            Pending::Node(id) => {
                let node = tree
                    .node(&id)
                    .ok_or_else(|| Error::BrokenDelta(format!("node {} is missing", id)))?;
                if let Some(target) = node.kind.ref_target().cloned() {
                    let parent = node.parent.clone();
                    (id, target, parent)
                } else {
                    let node = node.into_owned();
                    stack.extend(node.children.iter().rev().cloned().map(Pending::Node));
                    place(node)?;
                    continue;
                }
            }
        };

        if id == target && allowed.is_covered(&target) {
            let kind = if allowed.in_place(&target) {
                NodeKind::TreeRef(target)
            } else {
                NodeKind::NodeRef(target)
            };
            place(Node::new(id, parent, kind))?;
            kept += 1;
            continue;
        }

        let source = content_source
            .node(&target)
            .ok_or_else(|| Error::BrokenDelta(format!("no content for node {}", target)))?;
        for child in source.children.iter().rev() {
            stack.push(Pending::Ref {
                id: child.clone(),
                target: child.clone(),
                parent: Some(id.clone()),
            });
        }
        place(Node {
            id,
            parent,
            children: source.children.clone(),
            kind: source.kind.clone(),
        })?;
        inlined += 1;
    }

    tracing::debug!(kept, inlined, "expanded references");
    Ok(MemTree::from_parts(root, out))
}
