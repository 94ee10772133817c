//! Hook for reconciling incoming deltas with local edits
//!
//! The engine never resolves conflicts itself. When an incoming delta meets
//! an overlay that already carries local changes, both sides are handed to a
//! [`Merger`] and whatever tree it returns is applied.

use crate::change_tree::ChangeTree;
use crate::content::Content;
use crate::diff::{decode, Diff};
use crate::error::Result;
use crate::key::Key;
use crate::tree::{MemTree, RefTree};

/// Conflict resolution policy
pub trait Merger<K: Key, C: Content> {
    /// Produce the tree to keep from the local overlay and the decoded
    /// incoming tree
    fn merge(&self, local: &dyn RefTree<K, C>, incoming: &MemTree<K, C>) -> Result<MemTree<K, C>>;
}

impl<K, C, F> Merger<K, C> for F
where
    K: Key,
    C: Content,
    F: Fn(&dyn RefTree<K, C>, &MemTree<K, C>) -> Result<MemTree<K, C>>,
{
    fn merge(&self, local: &dyn RefTree<K, C>, incoming: &MemTree<K, C>) -> Result<MemTree<K, C>> {
        self(local, incoming)
    }
}

/// Incoming changes win
#[derive(Debug, Clone, Copy, Default)]
pub struct TakeIncoming;

impl<K: Key, C: Content> Merger<K, C> for TakeIncoming {
    fn merge(&self, _local: &dyn RefTree<K, C>, incoming: &MemTree<K, C>) -> Result<MemTree<K, C>> {
        Ok(incoming.clone())
    }
}

/// Local changes win
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepLocal;

impl<K: Key, C: Content> Merger<K, C> for KeepLocal {
    fn merge(&self, local: &dyn RefTree<K, C>, _incoming: &MemTree<K, C>) -> Result<MemTree<K, C>> {
        Ok(MemTree::from_tree(local))
    }
}

/// How an incoming delta was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No local changes; the delta was applied as is
    FastForward,
    /// Local changes existed; the merger's result was applied
    Merged,
}

/// Apply a delta computed against the overlay's base.
///
/// Without local changes the delta is applied directly, so its references
/// populate the overlay's reference tables. Otherwise it is decoded against
/// the base and reconciled through `merger`. On error the overlay is
/// unchanged.
pub fn apply_incoming<K, C, B, M>(
    overlay: &mut ChangeTree<K, C, B>,
    diff: &Diff<K, C>,
    merger: &M,
) -> Result<MergeOutcome>
where
    K: Key,
    C: Content,
    B: RefTree<K, C>,
    M: Merger<K, C> + ?Sized,
{
    if !overlay.has_changes() {
        overlay.apply(&diff.to_tree()?)?;
        tracing::debug!(nodes = diff.len(), "fast-forwarded overlay");
        return Ok(MergeOutcome::FastForward);
    }

    let incoming = decode(diff, overlay.base())?;
    let merged = merger.merge(&*overlay, &incoming)?;
    overlay.apply(&merged)?;
    tracing::debug!(nodes = merged.len(), "merged incoming delta into overlay");
    Ok(MergeOutcome::Merged)
}
