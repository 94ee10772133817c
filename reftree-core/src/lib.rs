//! Reftree Core Library
//!
//! Versioned storage for ordered, keyed trees:
//! - Node keys, key maps and content codecs
//! - Reference trees: materialized trees and copy-on-write change trees
//! - Base-relative deltas with tree and node references
//! - Reverse-delta version history with journaled, crash-safe commits
//! - File system and in-memory storage backends

pub mod backend;
pub mod change_tree;
pub mod config;
pub mod content;
pub mod diff;
pub mod error;
pub mod key;
pub mod keymap;
pub mod merge;
pub mod record;
pub mod tree;
pub mod versioned;

#[cfg(test)]
mod test_support;

pub use backend::{FsBackend, MemoryBackend, StoreBackend};
pub use change_tree::ChangeTree;
pub use config::StoreConfig;
pub use content::{BincodeCodec, CodecContext, Content, ContentCodec};
pub use diff::{decode, encode, expand_refs, normalize, Diff, DiffNode, UsedRefs};
pub use error::{Error, Result};
pub use key::{Key, LongKey, PosKey, StringKey};
pub use keymap::{IdentityMap, KeyMap, PrefixMap, TableMap};
pub use merge::{apply_incoming, KeepLocal, MergeOutcome, Merger, TakeIncoming};
pub use tree::{
    differences, tree_eq, Difference, MappedTree, MemTree, MutableRefTree, Node, NodeKind, RefTree,
};
pub use versioned::{VersionCheck, VersionInfo, VersionedTree};
