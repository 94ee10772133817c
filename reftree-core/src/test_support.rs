//! Random tree and edit generation for unit tests

use crate::error::Result;
use crate::key::{Key, LongKey, PosKey};
use crate::tree::{MemTree, MutableRefTree, RefTree, preorder};
use rand::Rng;
use rand::rngs::StdRng;

const CONTENTS: [&str; 5] = ["alpha", "beta", "gamma", "delta", "epsilon"];

#[derive(Debug, Clone)]
pub(crate) enum Op<K> {
    Insert {
        parent: K,
        position: usize,
        id: Option<K>,
        content: String,
    },
    Delete(K),
    Move {
        id: K,
        parent: K,
        position: usize,
    },
    Update {
        id: K,
        content: String,
    },
}

impl<K> Op<K> {
    pub(crate) fn map_keys<T>(&self, f: impl Fn(&K) -> T) -> Op<T> {
        match self {
            Op::Insert {
                parent,
                position,
                id,
                content,
            } => Op::Insert {
                parent: f(parent),
                position: *position,
                id: id.as_ref().map(&f),
                content: content.clone(),
            },
            Op::Delete(id) => Op::Delete(f(id)),
            Op::Move {
                id,
                parent,
                position,
            } => Op::Move {
                id: f(id),
                parent: f(parent),
                position: *position,
            },
            Op::Update { id, content } => Op::Update {
                id: f(id),
                content: content.clone(),
            },
        }
    }
}

fn pick<R: Rng>(rng: &mut R, ids: &[LongKey], next_id: u64) -> LongKey {
    // Now and then aim at a node that does not exist
    if rng.gen_bool(0.05) {
        return LongKey(next_id + 1_000_000);
    }
    ids[rng.gen_range(0..ids.len())]
}

fn content<R: Rng>(rng: &mut R) -> String {
    CONTENTS[rng.gen_range(0..CONTENTS.len())].to_string()
}

/// Random content tree with `size` nodes, ids `0..size`
pub(crate) fn random_tree(rng: &mut StdRng, size: u64) -> MemTree<LongKey, String> {
    let mut tree = MemTree::new(LongKey(0), content(rng));
    for n in 1..size {
        let parent = LongKey(rng.gen_range(0..n));
        let position = rng.gen_range(0..4);
        let _ = tree.insert(&parent, position, Some(LongKey(n)), content(rng));
    }
    tree
}

/// A random edit against `tree`. Explicit ids come from `next_id`.
pub(crate) fn random_op<T: RefTree<LongKey, String>>(
    rng: &mut StdRng,
    tree: &T,
    next_id: &mut u64,
    allow_auto: bool,
) -> Op<LongKey> {
    let ids = preorder(tree);
    let non_root: Vec<LongKey> = ids[1..].to_vec();
    let roll = rng.gen_range(0..10);
    match roll {
        0..=3 => {
            let id = if allow_auto && rng.gen_bool(0.2) {
                None
            } else {
                *next_id += 1;
                Some(LongKey(*next_id))
            };
            Op::Insert {
                parent: pick(rng, &ids, *next_id),
                position: rng.gen_range(0..5),
                id,
                content: content(rng),
            }
        }
        4..=5 if !non_root.is_empty() => Op::Delete(pick(rng, &non_root, *next_id)),
        6..=7 if !non_root.is_empty() => Op::Move {
            id: pick(rng, &non_root, *next_id),
            parent: pick(rng, &ids, *next_id),
            position: rng.gen_range(0..5),
        },
        _ => Op::Update {
            id: pick(rng, &ids, *next_id),
            content: content(rng),
        },
    }
}

/// Random content tree of `size` nodes under `root`, all ids auto assigned
pub(crate) fn random_pos_tree(rng: &mut StdRng, root: PosKey, size: usize) -> MemTree<PosKey, String> {
    let mut tree = MemTree::new(root, content(rng));
    for _ in 1..size {
        let ids = preorder(&tree);
        let parent = ids[rng.gen_range(0..ids.len())].clone();
        let position = rng.gen_range(0..4);
        let _ = tree.insert(&parent, position, None, content(rng));
    }
    tree
}

fn pick_pos<R: Rng>(rng: &mut R, ids: &[PosKey], root: &PosKey) -> PosKey {
    if rng.gen_bool(0.05) {
        return root.child(u32::MAX);
    }
    ids[rng.gen_range(0..ids.len())].clone()
}

/// A random edit against a positionally keyed `tree`. Inserts take auto
/// keys, some of them appending.
pub(crate) fn random_pos_op<T: RefTree<PosKey, String>>(rng: &mut StdRng, tree: &T) -> Op<PosKey> {
    let ids = preorder(tree);
    let root = ids[0].clone();
    let non_root = &ids[1..];
    match rng.gen_range(0..10) {
        0..=3 => Op::Insert {
            parent: pick_pos(rng, &ids, &root),
            position: if rng.gen_bool(0.3) {
                usize::MAX
            } else {
                rng.gen_range(0..5)
            },
            id: None,
            content: content(rng),
        },
        4 if !non_root.is_empty() => Op::Delete(pick_pos(rng, non_root, &root)),
        5..=7 if !non_root.is_empty() => Op::Move {
            id: pick_pos(rng, non_root, &root),
            parent: pick_pos(rng, &ids, &root),
            position: rng.gen_range(0..5),
        },
        _ => Op::Update {
            id: pick_pos(rng, &ids, &root),
            content: content(rng),
        },
    }
}

/// Run `op`, returning the realized id for inserts
pub(crate) fn apply_op<K, T>(tree: &mut T, op: &Op<K>) -> Result<Option<K>>
where
    K: Key,
    T: MutableRefTree<K, String>,
{
    match op {
        Op::Insert {
            parent,
            position,
            id,
            content,
        } => tree
            .insert(parent, *position, id.clone(), content.clone())
            .map(Some),
        Op::Delete(id) => tree.delete(id).map(|_| None),
        Op::Move {
            id,
            parent,
            position,
        } => tree.move_node(id, parent, *position).map(|_| None),
        Op::Update { id, content } => tree.update(id, content.clone()).map(|_| None),
    }
}
