//! Plugin directory scanning
//!
//! Discovery only: matching files are handed to the registry with their
//! modification time, and the registry decides what is worth loading.

use crate::error::PluginError;
use crate::registry::PluginRegistry;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Walks the entries of a directory.
pub trait DirWalker: Send + Sync {
    /// Call `visit(path, file_name)` for each entry under `root` until it
    /// returns `true`.
    ///
    /// # Errors
    /// Returns an error if `root` cannot be listed.
    fn walk(&self, root: &Path, visit: &mut dyn FnMut(&Path, &str) -> bool) -> io::Result<()>;
}

/// Non-recursive walker over `std::fs::read_dir`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsWalker;

impl DirWalker for FsWalker {
    fn walk(&self, root: &Path, visit: &mut dyn FnMut(&Path, &str) -> bool) -> io::Result<()> {
        for entry in fs::read_dir(root)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Error reading {}: {}", root.display(), e);
                    continue;
                }
            };
            let name = entry.file_name();
            // Plugin suffixes are ASCII; a name that is not UTF-8 cannot match.
            let Some(name) = name.to_str() else {
                continue;
            };
            if visit(&entry.path(), name) {
                break;
            }
        }
        Ok(())
    }
}

/// What a scan found.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    /// Entries whose name carries the plugin suffix
    pub matched: usize,
    /// Regular files passed on to the registry
    pub registered: usize,
    pub stat_failures: usize,
}

impl std::ops::AddAssign for ScanStats {
    fn add_assign(&mut self, other: Self) {
        self.matched += other.matched;
        self.registered += other.registered;
        self.stat_failures += other.stat_failures;
    }
}

/// Case-insensitive suffix check.
#[must_use]
pub fn has_plugin_suffix(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len()
        && name.as_bytes()[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
}

/// Finds plugin candidates and registers them.
pub struct Scanner {
    walker: Box<dyn DirWalker>,
    suffix: String,
}

impl Scanner {
    #[must_use]
    pub fn new(walker: impl DirWalker + 'static, suffix: impl Into<String>) -> Self {
        Self {
            walker: Box::new(walker),
            suffix: suffix.into(),
        }
    }

    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Register every regular file under `root` carrying the plugin suffix.
    ///
    /// Never fails: unreadable entries are logged and skipped, and a missing
    /// directory is simply empty.
    pub fn scan(&self, root: &Path, registry: &mut dyn PluginRegistry) -> ScanStats {
        let mut stats = ScanStats::default();

        let walked = self.walker.walk(root, &mut |path: &Path, name: &str| {
            if !has_plugin_suffix(name, &self.suffix) {
                return false;
            }
            stats.matched += 1;

            let metadata = match fs::symlink_metadata(path) {
                Ok(metadata) => metadata,
                Err(source) => {
                    let err = PluginError::ScanStat {
                        path: path.to_path_buf(),
                        source,
                    };
                    warn!("{}", err);
                    stats.stat_failures += 1;
                    return false;
                }
            };
            if !metadata.file_type().is_file() {
                return false;
            }

            match metadata.modified() {
                Ok(mtime) => {
                    registry.register_candidate(path, mtime);
                    stats.registered += 1;
                }
                Err(source) => {
                    let err = PluginError::ScanStat {
                        path: path.to_path_buf(),
                        source,
                    };
                    warn!("{}", err);
                    stats.stat_failures += 1;
                }
            }
            false
        });

        match walked {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Plugin directory {} does not exist", root.display());
            }
            Err(e) => warn!("Unable to scan {}: {}", root.display(), e),
        }

        debug!(
            "Scanned {}: {} matched, {} registered",
            root.display(),
            stats.matched,
            stats.registered
        );
        stats
    }
}
