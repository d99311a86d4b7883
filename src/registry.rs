//! Plugin registry seam
//!
//! The registry remembers which plugin files exist and when they last changed,
//! so the host can skip re-probing unchanged files. Kiln only drives it; how
//! (and whether) it persists is up to the implementation.

use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Storage for known plugin candidates.
pub trait PluginRegistry: Send {
    /// Restore state from the previous run.
    ///
    /// # Errors
    /// Returns an error if persisted state exists but cannot be read.
    fn load(&mut self) -> Result<()>;

    /// Persist current state for the next run.
    ///
    /// # Errors
    /// Returns an error if the state cannot be written.
    fn save(&mut self) -> Result<()>;

    /// Drop entries that were not seen during the latest scan.
    fn prune(&mut self);

    /// Record a plugin file found on disk.
    fn register_candidate(&mut self, path: &Path, mtime: SystemTime);
}

/// What the registry knows about one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub mtime: SystemTime,
    /// Modified (or new) since the previous scan
    pub changed: bool,
    seen: bool,
}

/// In-process registry with no backing store.
///
/// State survives across `init`/`cleanup` cycles of the same process, which is
/// enough for hosts that rescan on every start.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    candidates: HashMap<PathBuf, Candidate>,
    loads: usize,
    saves: usize,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&Candidate> {
        self.candidates.get(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates that are new or modified, sorted by path.
    #[must_use]
    pub fn changed(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = self
            .candidates
            .iter()
            .filter(|(_, c)| c.changed)
            .map(|(p, _)| p.as_path())
            .collect();
        paths.sort();
        paths
    }

    /// All known paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = self.candidates.keys().map(PathBuf::as_path).collect();
        paths.sort();
        paths
    }

    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads
    }

    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl PluginRegistry for MemoryRegistry {
    fn load(&mut self) -> Result<()> {
        self.loads += 1;
        for candidate in self.candidates.values_mut() {
            candidate.seen = false;
            candidate.changed = false;
        }
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        self.saves += 1;
        Ok(())
    }

    fn prune(&mut self) {
        self.candidates.retain(|_, c| c.seen);
    }

    fn register_candidate(&mut self, path: &Path, mtime: SystemTime) {
        match self.candidates.get_mut(path) {
            Some(candidate) => {
                candidate.changed |= candidate.mtime != mtime;
                candidate.mtime = mtime;
                candidate.seen = true;
            }
            None => {
                self.candidates.insert(
                    path.to_path_buf(),
                    Candidate {
                        mtime,
                        changed: true,
                        seen: true,
                    },
                );
            }
        }
    }
}
