//! JSON form of a store tree
//!
//! ```json
//! { "id": "root", "content": "", "children": [ { "id": "a", "content": "x" } ] }
//! ```

use anyhow::{Context, Result, bail};
use reftree_core::{MemTree, MutableRefTree, NodeKind, RefTree, StringKey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonNode {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<JsonNode>,
}

impl Drop for JsonNode {
    // Unlink descendants one level at a time so deep trees drop without
    // recursing
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Build a tree; ids must be unique
pub fn to_tree(root: &JsonNode) -> Result<MemTree<StringKey, String>> {
    let mut tree = MemTree::new(StringKey::new(root.id.as_str()), root.content.clone());
    let mut stack: Vec<(&JsonNode, StringKey)> = root
        .children
        .iter()
        .rev()
        .map(|c| (c, StringKey::new(root.id.as_str())))
        .collect();
    while let Some((node, parent)) = stack.pop() {
        let id = StringKey::new(node.id.as_str());
        let position = tree.children(&parent).map_or(0, |c| c.len());
        tree.insert(&parent, position, Some(id.clone()), node.content.clone())
            .with_context(|| format!("Failed to add node '{}' under '{}'", node.id, parent))?;
        stack.extend(node.children.iter().rev().map(|c| (c, id.clone())));
    }
    Ok(tree)
}

/// Render a fully materialized tree
pub fn from_tree<T: RefTree<StringKey, String> + ?Sized>(tree: &T) -> Result<JsonNode> {
    // Preorder list of rendered nodes with their parent's index
    let mut flat: Vec<(JsonNode, Option<usize>)> = Vec::new();
    let mut stack = vec![(tree.root_id(), None)];
    while let Some((id, parent)) = stack.pop() {
        let node = tree
            .node(&id)
            .with_context(|| format!("Node '{}' is missing", id))?;
        let content = match &node.kind {
            NodeKind::Content(c) => c.clone(),
            _ => bail!("Node '{}' is an unresolved reference", id),
        };
        let index = flat.len();
        stack.extend(node.children.iter().rev().map(|c| (c.clone(), Some(index))));
        flat.push((
            JsonNode {
                id: id.to_string(),
                content,
                children: Vec::new(),
            },
            parent,
        ));
    }
    // Children come after their parent, so folding from the back finishes
    // every node before it is attached. Siblings arrive last first.
    while flat.len() > 1 {
        let Some((mut node, parent)) = flat.pop() else {
            break;
        };
        node.children.reverse();
        if let Some(p) = parent {
            flat[p].0.children.push(node);
        }
    }
    let (mut root, _) = flat.pop().context("Tree has no root")?;
    root.children.reverse();
    Ok(root)
}
