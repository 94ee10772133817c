//! Storage backends for versioned stores
//!
//! A backend stores opaque record bytes: the append-only reverse-delta log,
//! the current snapshot and the commit journal. It knows nothing about
//! trees. Backends are owned by exactly one store.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Byte storage behind a versioned store
pub trait StoreBackend {
    /// Store log entry `version`. Fails if the entry already exists.
    fn append_entry(&mut self, version: u64, data: &[u8]) -> Result<()>;

    fn read_entry(&self, version: u64) -> Result<Option<Vec<u8>>>;

    /// Remove log entry `version`; removing an absent entry succeeds
    fn remove_entry(&mut self, version: u64) -> Result<()>;

    /// Versions of all stored log entries, ascending
    fn entry_versions(&self) -> Result<Vec<u64>>;

    /// Replace the snapshot atomically
    fn write_snapshot(&mut self, data: &[u8]) -> Result<()>;

    fn read_snapshot(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the journal atomically
    fn write_journal(&mut self, data: &[u8]) -> Result<()>;

    fn read_journal(&self) -> Result<Option<Vec<u8>>>;

    fn clear_journal(&mut self) -> Result<()>;

    /// Remove everything the backend stores
    fn destroy(&mut self) -> Result<()>;
}

/// File name of the snapshot inside a store directory
pub const SNAPSHOT_FILE: &str = "current.snap";
/// File name of the commit journal inside a store directory
pub const JOURNAL_FILE: &str = "commit.journal";
/// Directory of the reverse-delta log inside a store directory
pub const LOG_DIR: &str = "log";

const ENTRY_EXT: &str = "rdelta";

/// Log entry file name; lexicographic order is version order
pub fn entry_file_name(version: u64) -> String {
    format!("{:020}.{}", version, ENTRY_EXT)
}

fn parse_entry_file_name(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(ENTRY_EXT)?.strip_suffix('.')?;
    if stem.len() != 20 {
        return None;
    }
    stem.parse().ok()
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Flush a directory so entries renamed into or removed from it are durable
#[cfg(unix)]
fn sync_dir(path: &Path) -> Result<()> {
    fs::File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> Result<()> {
    Ok(())
}

fn remove_optional(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Backend over a store directory
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
    sync: bool,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>, sync: bool) -> Self {
        Self {
            root: root.into(),
            sync,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn log_dir(&self) -> PathBuf {
        self.root.join(LOG_DIR)
    }

    fn entry_path(&self, version: u64) -> PathBuf {
        self.log_dir().join(entry_file_name(version))
    }

    /// Write through a temp file and rename over the target. With `sync`
    /// the file and then its directory are flushed.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        if !parent.is_dir() {
            fs::create_dir_all(parent)?;
            if self.sync {
                if let Some(outer) = parent.parent().filter(|p| !p.as_os_str().is_empty()) {
                    sync_dir(outer)?;
                }
            }
        }
        let tmp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(data)?;
        if self.sync {
            file.sync_all()?;
        }
        drop(file);
        fs::rename(&tmp_path, path)?;
        if self.sync {
            sync_dir(parent)?;
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        remove_optional(path)?;
        if self.sync {
            if let Some(parent) = path.parent().filter(|p| p.is_dir()) {
                sync_dir(parent)?;
            }
        }
        Ok(())
    }
}

impl StoreBackend for FsBackend {
    fn append_entry(&mut self, version: u64, data: &[u8]) -> Result<()> {
        let path = self.entry_path(version);
        if path.exists() {
            return Err(Error::Corrupt(format!("log entry {} already exists", version)));
        }
        self.write_atomic(&path, data)
    }

    fn read_entry(&self, version: u64) -> Result<Option<Vec<u8>>> {
        read_optional(&self.entry_path(version))
    }

    fn remove_entry(&mut self, version: u64) -> Result<()> {
        self.remove_file(&self.entry_path(version))
    }

    fn entry_versions(&self) -> Result<Vec<u64>> {
        let dir = match fs::read_dir(self.log_dir()) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut versions = Vec::new();
        for entry in dir {
            let entry = entry?;
            if let Some(version) = entry.file_name().to_str().and_then(parse_entry_file_name) {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    fn write_snapshot(&mut self, data: &[u8]) -> Result<()> {
        self.write_atomic(&self.root.join(SNAPSHOT_FILE), data)
    }

    fn read_snapshot(&self) -> Result<Option<Vec<u8>>> {
        read_optional(&self.root.join(SNAPSHOT_FILE))
    }

    fn write_journal(&mut self, data: &[u8]) -> Result<()> {
        self.write_atomic(&self.root.join(JOURNAL_FILE), data)
    }

    fn read_journal(&self) -> Result<Option<Vec<u8>>> {
        read_optional(&self.root.join(JOURNAL_FILE))
    }

    fn clear_journal(&mut self) -> Result<()> {
        self.remove_file(&self.root.join(JOURNAL_FILE))
    }

    fn destroy(&mut self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<u64, Vec<u8>>,
    snapshot: Option<Vec<u8>>,
    journal: Option<Vec<u8>>,
}

/// In-memory backend. Clones share the same storage, so a clone kept aside
/// outlives the store that used it.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StoreBackend for MemoryBackend {
    fn append_entry(&mut self, version: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        if state.entries.contains_key(&version) {
            return Err(Error::Corrupt(format!("log entry {} already exists", version)));
        }
        state.entries.insert(version, data.to_vec());
        Ok(())
    }

    fn read_entry(&self, version: u64) -> Result<Option<Vec<u8>>> {
        Ok(self.state().entries.get(&version).cloned())
    }

    fn remove_entry(&mut self, version: u64) -> Result<()> {
        self.state().entries.remove(&version);
        Ok(())
    }

    fn entry_versions(&self) -> Result<Vec<u64>> {
        Ok(self.state().entries.keys().copied().collect())
    }

    fn write_snapshot(&mut self, data: &[u8]) -> Result<()> {
        self.state().snapshot = Some(data.to_vec());
        Ok(())
    }

    fn read_snapshot(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.state().snapshot.clone())
    }

    fn write_journal(&mut self, data: &[u8]) -> Result<()> {
        self.state().journal = Some(data.to_vec());
        Ok(())
    }

    fn read_journal(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.state().journal.clone())
    }

    fn clear_journal(&mut self) -> Result<()> {
        self.state().journal = None;
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        *self.state() = MemoryState::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(backend: &mut dyn StoreBackend) {
        assert!(backend.read_snapshot().unwrap().is_none());
        assert!(backend.entry_versions().unwrap().is_empty());

        backend.append_entry(10, b"ten").unwrap();
        backend.append_entry(2, b"two").unwrap();
        assert!(matches!(backend.append_entry(2, b"again"), Err(Error::Corrupt(_))));
        assert_eq!(backend.entry_versions().unwrap(), vec![2, 10]);
        assert_eq!(backend.read_entry(10).unwrap().as_deref(), Some(&b"ten"[..]));
        assert!(backend.read_entry(3).unwrap().is_none());

        backend.remove_entry(2).unwrap();
        backend.remove_entry(2).unwrap();
        assert_eq!(backend.entry_versions().unwrap(), vec![10]);

        backend.write_snapshot(b"snap-1").unwrap();
        backend.write_snapshot(b"snap-2").unwrap();
        assert_eq!(backend.read_snapshot().unwrap().as_deref(), Some(&b"snap-2"[..]));

        backend.write_journal(b"journal").unwrap();
        assert!(backend.read_journal().unwrap().is_some());
        backend.clear_journal().unwrap();
        backend.clear_journal().unwrap();
        assert!(backend.read_journal().unwrap().is_none());

        backend.destroy().unwrap();
        assert!(backend.read_snapshot().unwrap().is_none());
        assert!(backend.entry_versions().unwrap().is_empty());
    }

    #[test]
    fn test_memory_backend() {
        exercise(&mut MemoryBackend::new());
    }

    #[test]
    fn test_fs_backend() {
        let tmp = TempDir::new().unwrap();
        exercise(&mut FsBackend::new(tmp.path().join("store"), false));
    }

    #[test]
    fn test_fs_backend_synced() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join("nested").join("store");
        exercise(&mut FsBackend::new(&store, true));

        let mut backend = FsBackend::new(&store, true);
        backend.write_journal(b"j").unwrap();
        backend.append_entry(7, b"seven").unwrap();
        assert!(!store.join(JOURNAL_FILE).with_extension("tmp").exists());
        backend.clear_journal().unwrap();
        backend.clear_journal().unwrap();
        assert!(!store.join(JOURNAL_FILE).exists());
        assert_eq!(backend.read_entry(7).unwrap().as_deref(), Some(&b"seven"[..]));
    }

    #[test]
    fn test_entry_file_names_sort_by_version() {
        let mut names: Vec<String> = [100u64, 9, 10, 0].iter().map(|v| entry_file_name(*v)).collect();
        names.sort();
        assert_eq!(names[0], "00000000000000000000.rdelta");
        assert_eq!(names[3], "00000000000000000100.rdelta");
        assert_eq!(parse_entry_file_name(&names[1]), Some(9));
        assert_eq!(parse_entry_file_name("00000000000000000009.tmp"), None);
        assert_eq!(parse_entry_file_name("9.rdelta"), None);
    }

    #[test]
    fn test_fs_backend_ignores_stray_files() {
        let tmp = TempDir::new().unwrap();
        let mut backend = FsBackend::new(tmp.path(), true);
        backend.append_entry(1, b"one").unwrap();
        fs::write(tmp.path().join(LOG_DIR).join("notes.txt"), b"x").unwrap();
        assert_eq!(backend.entry_versions().unwrap(), vec![1]);
    }
}
