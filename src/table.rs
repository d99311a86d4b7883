//! Loaded-module bookkeeping
//!
//! Every successfully loaded plugin is represented by exactly one
//! [`ModuleHandle`] held in a [`ModuleTable`]. The table's lock only ever
//! guards the container itself: opening, closing and running plugin hooks all
//! happen on handles that are outside the table.

use crate::header::{PluginHeader, PluginType};
use crate::native::NativeModule;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifier of a loaded module, unique per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An opened native library paired with its validated header.
pub struct ModuleHandle {
    id: ModuleId,
    path: PathBuf,
    header: Arc<dyn PluginHeader>,
    module: Box<dyn NativeModule>,
}

impl ModuleHandle {
    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn header(&self) -> &Arc<dyn PluginHeader> {
        &self.header
    }

    /// Split into the header and the native module, consuming the record.
    pub(crate) fn into_parts(self) -> (Arc<dyn PluginHeader>, Box<dyn NativeModule>) {
        (self.header, self.module)
    }

    fn info(&self) -> LoadedPluginInfo {
        LoadedPluginInfo {
            id: self.id,
            path: self.path.clone(),
            name: self.header.name(),
            plugin_type: self.header.plugin_type(),
            version: self.header.version(),
        }
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("version", &self.header.version())
            .finish_non_exhaustive()
    }
}

/// Snapshot of a loaded plugin for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPluginInfo {
    pub id: ModuleId,
    pub path: PathBuf,
    pub name: Option<String>,
    pub plugin_type: Option<PluginType>,
    pub version: u32,
}

/// All currently loaded modules.
#[derive(Default)]
pub struct ModuleTable {
    modules: Mutex<Vec<ModuleHandle>>,
    next_id: AtomicU64,
}

impl ModuleTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // A panic inside the critical section cannot leave the Vec half-mutated,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Vec<ModuleHandle>> {
        self.modules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wrap a validated module and append it. Returns the new handle's id.
    pub fn insert(
        &self,
        path: &Path,
        header: Arc<dyn PluginHeader>,
        module: Box<dyn NativeModule>,
    ) -> ModuleId {
        let id = ModuleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = ModuleHandle {
            id,
            path: path.to_path_buf(),
            header,
            module,
        };
        self.lock().push(handle);
        id
    }

    /// Take one handle out of the table.
    pub fn remove(&self, id: ModuleId) -> Option<ModuleHandle> {
        let mut modules = self.lock();
        let index = modules.iter().position(|m| m.id == id)?;
        Some(modules.swap_remove(index))
    }

    /// Take every handle out, leaving the table empty.
    pub fn drain(&self) -> Vec<ModuleHandle> {
        std::mem::take(&mut *self.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: ModuleId) -> bool {
        self.lock().iter().any(|m| m.id == id)
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<LoadedPluginInfo> {
        self.lock().iter().map(ModuleHandle::info).collect()
    }
}
