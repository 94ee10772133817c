//! Durable version history of one reference tree
//!
//! A [`VersionedTree`] keeps the current tree fully materialized and every
//! older version as a chain of reverse deltas: log entry `v` rebuilds version
//! `v` from version `v + 1`. Reconstructing version `v` therefore costs
//! `current - v` delta applications, independent of total history length.
//!
//! A commit writes, in order:
//! 1. the journal (forward delta of the new version)
//! 2. the reverse-delta log entry: the commit point
//! 3. the new snapshot
//!
//! and then clears the journal. A failure before the log entry leaves
//! nothing committed. A failure writing the snapshot is rolled back by
//! removing the log entry; if that removal fails too the store is poisoned.
//! A crash after the commit point is repaired on open by replaying the
//! journal.

use crate::backend::{FsBackend, StoreBackend};
use crate::change_tree::ChangeTree;
use crate::config::StoreConfig;
use crate::content::{BincodeCodec, Content, ContentCodec};
use crate::diff::{decode, encode, expand_refs, normalize, Diff};
use crate::error::{Error, Result};
use crate::key::Key;
use crate::record::{read_record, write_record, Journal, LogEntry, Snapshot};
use crate::tree::{MemTree, RefTree};
use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Summary of one retained version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: u64,
    /// Unix seconds
    pub committed_at: i64,
    /// Nodes in the reverse delta; `None` for the current version
    pub reverse_nodes: Option<usize>,
    /// Stored size of the reverse delta; `None` for the current version
    pub stored_bytes: Option<usize>,
}

/// A retained version that reconstructed successfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCheck {
    pub version: u64,
    pub nodes: usize,
}

type VersionCache<K, C> = Mutex<LruCache<u64, Arc<MemTree<K, C>>>>;

/// Versioned store over backend `S`, persisting content through codec `X`
pub struct VersionedTree<K: Key, C: Content, X = BincodeCodec, S = FsBackend> {
    backend: S,
    codec: X,
    config: StoreConfig,
    store_id: String,
    created_at: i64,
    committed_at: i64,
    version: u64,
    current: Arc<MemTree<K, C>>,
    cache: Option<VersionCache<K, C>>,
    poisoned: bool,
}

impl<K, C> VersionedTree<K, C, BincodeCodec, FsBackend>
where
    K: Key,
    C: Content + Serialize + DeserializeOwned,
{
    /// Create a store in `dir` holding a root-only tree as version 0.
    ///
    /// A `store-config.json` already present in `dir` is honoured.
    pub fn create(dir: &Path, root: K, root_content: C) -> Result<Self> {
        let config = StoreConfig::load(dir)?;
        fs::create_dir_all(dir)?;
        let backend = FsBackend::new(dir, config.sync_writes);
        let store = Self::create_with(backend, BincodeCodec, config, root, root_content)?;
        store.config.save(dir)?;
        Ok(store)
    }

    /// Open the store in `dir`, repairing an interrupted commit if needed
    pub fn open(dir: &Path) -> Result<Self> {
        let config = StoreConfig::load(dir)?;
        let backend = FsBackend::new(dir, config.sync_writes);
        Self::open_with(backend, BincodeCodec, config)
    }
}

impl<K, C, X, S> VersionedTree<K, C, X, S>
where
    K: Key,
    C: Content,
    X: ContentCodec<K, C>,
    S: StoreBackend,
{
    /// Genesis: write a root-only tree as version 0
    pub fn create_with(
        backend: S,
        codec: X,
        config: StoreConfig,
        root: K,
        root_content: C,
    ) -> Result<Self> {
        if backend.read_snapshot()?.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        let now = chrono::Utc::now().timestamp();
        let mut store = Self::assemble(
            backend,
            codec,
            config,
            uuid::Uuid::new_v4().to_string(),
            now,
            now,
            0,
            MemTree::new(root, root_content),
        );
        let snapshot = store.snapshot_record(0, now, &store.current)?;
        store.backend.write_snapshot(&snapshot)?;
        info!(store_id = %store.store_id, "created versioned store");
        Ok(store)
    }

    /// Open an existing store and reconcile it with its log
    pub fn open_with(backend: S, codec: X, config: StoreConfig) -> Result<Self> {
        let data = backend.read_snapshot()?.ok_or(Error::NotInitialized)?;
        let snapshot: Snapshot<K> = read_record(&data, config.verify_checksums)?;
        let tree = Self::decode_content(&codec, &snapshot.tree)?.to_tree()?;
        let mut store = Self::assemble(
            backend,
            codec,
            config,
            snapshot.store_id,
            snapshot.created_at,
            snapshot.committed_at,
            snapshot.version,
            tree,
        );
        store.recover()?;
        info!(
            store_id = %store.store_id,
            version = store.version,
            "opened versioned store"
        );
        Ok(store)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        backend: S,
        codec: X,
        config: StoreConfig,
        store_id: String,
        created_at: i64,
        committed_at: i64,
        version: u64,
        current: MemTree<K, C>,
    ) -> Self {
        let cache = NonZeroUsize::new(config.version_cache_capacity)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));
        Self {
            backend,
            codec,
            config,
            store_id,
            created_at,
            committed_at,
            version,
            current: Arc::new(current),
            cache,
            poisoned: false,
        }
    }

    /// Bring snapshot, log and journal into agreement
    fn recover(&mut self) -> Result<()> {
        let newest = self.backend.entry_versions()?.last().copied();
        match newest {
            Some(n) if n == self.version => self.replay_journal(),
            Some(n) if n + 1 == self.version => self.discard_stale_journal(),
            None => self.discard_stale_journal(),
            Some(n) => Err(Error::Corrupt(format!(
                "newest log entry {} does not match snapshot version {}",
                n, self.version
            ))),
        }
    }

    fn discard_stale_journal(&mut self) -> Result<()> {
        if self.backend.read_journal()?.is_some() {
            warn!(version = self.version, "discarding stale commit journal");
            self.backend.clear_journal()?;
        }
        Ok(())
    }

    /// The log holds an entry for the snapshot version, so the following
    /// commit passed its commit point but never wrote its snapshot.
    fn replay_journal(&mut self) -> Result<()> {
        let target = self.version + 1;
        let unrecoverable = |what: String| {
            error!(version = target, "{}", what);
            Error::Unrecoverable(what)
        };
        let data = self
            .backend
            .read_journal()?
            .ok_or_else(|| unrecoverable(format!("version {} is logged but has no journal", target)))?;
        let journal: Journal<K> = read_record(&data, self.config.verify_checksums)
            .map_err(|e| unrecoverable(format!("journal of version {} is unreadable: {}", target, e)))?;
        if journal.version != target {
            return Err(unrecoverable(format!(
                "journal is for version {}, expected {}",
                journal.version, target
            )));
        }
        let delta = Self::decode_content(&self.codec, &journal.delta)?;
        let tree = decode(&delta, &*self.current)
            .map_err(|e| unrecoverable(format!("journal of version {} does not apply: {}", target, e)))?;

        let snapshot = self.snapshot_record(target, journal.committed_at, &tree)?;
        self.backend.write_snapshot(&snapshot)?;
        self.backend.clear_journal()?;
        self.current = Arc::new(tree);
        self.version = target;
        self.committed_at = journal.committed_at;
        info!(version = target, "replayed interrupted commit");
        Ok(())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// The current tree
    pub fn current(&self) -> Arc<MemTree<K, C>> {
        self.current.clone()
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    /// Store creation time (Unix seconds)
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// True once a failed rollback has made the store refuse mutations
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// A mutable overlay over the current version
    pub fn change_tree(&self) -> ChangeTree<K, C, Arc<MemTree<K, C>>> {
        ChangeTree::new(self.current.clone())
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::Unrecoverable(format!(
                "store {} needs manual recovery",
                self.store_id
            )));
        }
        Ok(())
    }

    /// Commit `tree` as the next version and return its number.
    ///
    /// `tree` may be any view of the new state, typically a [`ChangeTree`]
    /// over [`current`](Self::current). Committing an unchanged tree still
    /// creates a version.
    pub fn commit<T: RefTree<K, C> + ?Sized>(&mut self, tree: &T) -> Result<u64> {
        self.ensure_usable()?;
        let delta = encode(&*self.current, tree).with_base(self.version);
        self.commit_delta(&delta)
    }

    /// Commit a delta computed against the current version
    pub fn commit_delta(&mut self, delta: &Diff<K, C>) -> Result<u64> {
        self.ensure_usable()?;
        if let Some(base) = delta.base_version() {
            if base != self.version {
                return Err(Error::BrokenDelta(format!(
                    "delta is based on version {}, current is {}",
                    base, self.version
                )));
            }
        }
        let base = self.current.clone();
        let previous = self.version;
        let target = previous + 1;

        let new_tree = decode(delta, &*base)?;
        let shape = delta.to_tree()?;
        let used = normalize(&*base, &[&shape as &dyn RefTree<K, C>]);
        let reverse_tree = expand_refs(&MemTree::reference_to(base.root_id()), &used[0], &*base)?;
        let reverse = Diff::from_tree(&reverse_tree).with_base(target);

        let now = chrono::Utc::now().timestamp();
        let level = self.config.compression_level;
        let journal = write_record(
            &Journal {
                version: target,
                committed_at: now,
                delta: self.encode_content(delta)?,
            },
            level,
        )?;
        let entry = write_record(
            &LogEntry {
                version: previous,
                committed_at: self.committed_at,
                reverse: self.encode_content(&reverse)?,
            },
            level,
        )?;
        let snapshot = self.snapshot_record(target, now, &new_tree)?;

        self.backend.write_journal(&journal)?;
        if let Err(e) = self.backend.append_entry(previous, &entry) {
            if let Err(clear) = self.backend.clear_journal() {
                warn!(version = target, error = %clear, "failed to clear journal of aborted commit");
            }
            return Err(e);
        }
        if let Err(e) = self.backend.write_snapshot(&snapshot) {
            return Err(self.roll_back(previous, e));
        }
        if let Err(e) = self.backend.clear_journal() {
            warn!(version = target, error = %e, "failed to clear commit journal");
        }

        if let Some(cache) = &self.cache {
            lock(cache).put(previous, base);
        }
        self.current = Arc::new(new_tree);
        self.version = target;
        self.committed_at = now;
        info!(
            version = target,
            delta_nodes = delta.len(),
            reverse_nodes = reverse.len(),
            "committed version"
        );
        Ok(target)
    }

    /// Undo the log entry of a commit whose snapshot could not be written.
    ///
    /// Only a log entry that cannot be removed poisons the store. A journal
    /// left behind is stale once the entry is gone and is discarded on open.
    fn roll_back(&mut self, entry: u64, cause: Error) -> Error {
        warn!(version = entry + 1, error = %cause, "commit failed, rolling back");
        if let Err(e) = self.backend.remove_entry(entry) {
            self.poisoned = true;
            error!(version = entry + 1, error = %e, "rollback failed, store needs manual recovery");
            return Error::Unrecoverable(format!(
                "rollback of version {} failed: {} (commit failed with: {})",
                entry + 1,
                e,
                cause
            ));
        }
        if let Err(e) = self.backend.clear_journal() {
            warn!(version = entry + 1, error = %e, "could not clear journal after rollback");
        }
        cause
    }

    /// Reconstruct version `v`.
    ///
    /// Fails with `NoSuchVersion` if `v` was never committed, was pruned, or
    /// its log entries are missing or corrupt.
    pub fn get_version(&self, v: u64) -> Result<Arc<MemTree<K, C>>> {
        if v == self.version {
            return Ok(self.current.clone());
        }
        if v > self.version {
            return Err(Error::NoSuchVersion(v));
        }

        let (mut at, mut tree) = self
            .nearest_cached(v)
            .unwrap_or_else(|| (self.version, self.current.clone()));
        while at > v {
            at -= 1;
            let reverse = self.load_entry(at).map_err(|e| {
                warn!(version = at, error = %e, "reverse delta unavailable");
                Error::NoSuchVersion(v)
            })?;
            let older = decode(&reverse, &*tree).map_err(|e| {
                warn!(version = at, error = %e, "reverse delta does not apply");
                Error::NoSuchVersion(v)
            })?;
            tree = Arc::new(older);
        }

        if let Some(cache) = &self.cache {
            lock(cache).put(v, tree.clone());
        }
        debug!(version = v, nodes = tree.len(), "reconstructed version");
        Ok(tree)
    }

    /// Closest cached version at or above `v`
    fn nearest_cached(&self, v: u64) -> Option<(u64, Arc<MemTree<K, C>>)> {
        let cache = lock(self.cache.as_ref()?);
        cache
            .iter()
            .filter(|(version, _)| **version >= v && **version <= self.version)
            .min_by_key(|(version, _)| **version)
            .map(|(version, tree)| (*version, tree.clone()))
    }

    fn load_entry(&self, version: u64) -> Result<Diff<K, C>> {
        let data = self
            .backend
            .read_entry(version)?
            .ok_or(Error::NoSuchVersion(version))?;
        let entry: LogEntry<K> = read_record(&data, self.config.verify_checksums)?;
        if entry.version != version {
            return Err(Error::Corrupt(format!(
                "log entry {} claims version {}",
                version, entry.version
            )));
        }
        Self::decode_content(&self.codec, &entry.reverse)
    }

    /// `version` expressed as references into `refs_version` wherever the
    /// two share unchanged subtrees
    pub fn referenced_view(&self, version: u64, refs_version: u64) -> Result<Diff<K, C>> {
        let tree = self.get_version(version)?;
        let refs = self.get_version(refs_version)?;
        let shape = encode(&*refs, &*tree).to_tree()?;
        let used = normalize(&*refs, &[&shape as &dyn RefTree<K, C>]);
        let view = expand_refs(&shape, &used[0], &*tree)?;
        Ok(Diff::from_tree(&view).with_base(refs_version))
    }

    /// The current version relative to `version`, for a peer holding it
    pub fn delta_since(&self, version: u64) -> Result<Diff<K, C>> {
        self.referenced_view(self.version, version)
    }

    /// Oldest version still reconstructible
    pub fn oldest_version(&self) -> Result<u64> {
        Ok(self
            .backend
            .entry_versions()?
            .first()
            .copied()
            .unwrap_or(self.version))
    }

    /// All retained versions, oldest first
    pub fn history(&self) -> Result<Vec<VersionInfo>> {
        let mut out = Vec::new();
        for version in self.backend.entry_versions()? {
            let Some(data) = self.backend.read_entry(version)? else {
                continue;
            };
            let entry: LogEntry<K> = read_record(&data, self.config.verify_checksums)?;
            out.push(VersionInfo {
                version,
                committed_at: entry.committed_at,
                reverse_nodes: Some(entry.reverse.len()),
                stored_bytes: Some(data.len()),
            });
        }
        out.push(VersionInfo {
            version: self.version,
            committed_at: self.committed_at,
            reverse_nodes: None,
            stored_bytes: None,
        });
        Ok(out)
    }

    /// Reconstruct every retained version, newest first, failing on the
    /// first gap or broken entry. Results are oldest first.
    pub fn verify(&self) -> Result<Vec<VersionCheck>> {
        let versions = self.backend.entry_versions()?;
        let mut checks = vec![VersionCheck {
            version: self.version,
            nodes: self.current.len(),
        }];
        let mut tree = self.current.clone();
        let mut expected = self.version;
        for &version in versions.iter().rev() {
            if version + 1 != expected {
                return Err(Error::Corrupt(format!(
                    "log has a gap: entry {} follows version {}",
                    version, expected
                )));
            }
            let reverse = self.load_entry(version)?;
            tree = Arc::new(decode(&reverse, &*tree).map_err(|e| {
                Error::Corrupt(format!("log entry {} does not apply: {}", version, e))
            })?);
            checks.push(VersionCheck {
                version,
                nodes: tree.len(),
            });
            expected = version;
        }
        checks.reverse();
        info!(versions = checks.len(), "verified version history");
        Ok(checks)
    }

    /// Drop the reverse deltas of all versions below `version`.
    /// Returns the number of entries removed.
    pub fn prune_before(&mut self, version: u64) -> Result<usize> {
        self.ensure_usable()?;
        if version > self.version {
            return Err(Error::NoSuchVersion(version));
        }
        let mut removed = 0;
        // Oldest first, so an interruption leaves a contiguous suffix
        for old in self.backend.entry_versions()? {
            if old >= version {
                break;
            }
            self.backend.remove_entry(old)?;
            removed += 1;
        }
        if let Some(cache) = &self.cache {
            let mut cache = lock(cache);
            let stale: Vec<u64> = cache.iter().map(|(v, _)| *v).filter(|v| *v < version).collect();
            for v in stale {
                cache.pop(&v);
            }
        }
        info!(before = version, removed, "pruned version history");
        Ok(removed)
    }

    /// Remove the store's storage entirely
    pub fn destroy(mut self) -> Result<()> {
        self.backend.destroy()?;
        info!(store_id = %self.store_id, "destroyed versioned store");
        Ok(())
    }

    fn encode_content(&self, diff: &Diff<K, C>) -> Result<Diff<K, Vec<u8>>> {
        diff.map_content(|ctx, content| self.codec.encode(ctx, content))
    }

    fn decode_content(codec: &X, diff: &Diff<K, Vec<u8>>) -> Result<Diff<K, C>> {
        diff.map_content(|ctx, data| codec.decode(ctx, data))
    }

    fn snapshot_record(&self, version: u64, committed_at: i64, tree: &MemTree<K, C>) -> Result<Vec<u8>> {
        let snapshot = Snapshot {
            store_id: self.store_id.clone(),
            version,
            created_at: self.created_at,
            committed_at,
            tree: self.encode_content(&Diff::from_tree(tree))?,
        };
        write_record(&snapshot, self.config.compression_level)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
