//! Plugin system lifecycle
//!
//! [`PluginSystem`] owns everything the host needs for plugins: the registry,
//! the loaded-module table, and the loader/scanner pair. Startup refreshes the
//! registry from disk; shutdown saves it and unloads whatever is still loaded.
//! The host keeps one instance (usually in an `Arc`) for the life of the
//! process and may load plugins through it from any thread.

use crate::config::Config;
use crate::error::PluginError;
use crate::header::PluginType;
use crate::loader::{LoadedPlugin, PluginLoader};
use crate::native::DylibLoader;
use crate::registry::PluginRegistry;
use crate::scan::{FsWalker, ScanStats, Scanner};
use crate::table::{LoadedPluginInfo, ModuleId, ModuleTable};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

pub struct PluginSystem<R: PluginRegistry> {
    plugin_root: PathBuf,
    loader: PluginLoader,
    scanner: Scanner,
    registry: Mutex<R>,
    table: ModuleTable,
}

impl<R: PluginRegistry> PluginSystem<R> {
    /// Plugin system backed by the platform's dynamic loader.
    #[must_use]
    pub fn new(config: &Config, registry: R) -> Self {
        let loader =
            PluginLoader::new(DylibLoader).with_release_native_handle(config.release_native_handle);
        let scanner = Scanner::new(FsWalker, config.plugin_suffix.clone());
        Self::from_parts(config.plugin_root.clone(), loader, scanner, registry)
    }

    /// Assemble a plugin system from explicit components.
    #[must_use]
    pub fn from_parts(
        plugin_root: impl Into<PathBuf>,
        loader: PluginLoader,
        scanner: Scanner,
        registry: R,
    ) -> Self {
        Self {
            plugin_root: plugin_root.into(),
            loader,
            scanner,
            registry: Mutex::new(registry),
            table: ModuleTable::new(),
        }
    }

    #[must_use]
    pub fn plugin_root(&self) -> &Path {
        &self.plugin_root
    }

    fn registry(&self) -> MutexGuard<'_, R> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the registry.
    pub fn with_registry<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        f(&mut self.registry())
    }

    /// Startup: restore the registry, rescan every category directory in
    /// order, and prune entries whose files are gone.
    ///
    /// # Errors
    /// Returns [`PluginError::Unsupported`] when the platform cannot load
    /// native code. The host cannot run without it.
    pub fn init(&self) -> Result<ScanStats, PluginError> {
        if !self.loader.native().is_supported() {
            error!("{}", PluginError::Unsupported);
            return Err(PluginError::Unsupported);
        }

        let mut registry = self.registry();
        if let Err(e) = registry.load() {
            warn!("Failed to load plugin registry, starting empty: {:#}", e);
        }

        let mut stats = ScanStats::default();
        for kind in PluginType::ALL {
            let dir = self.plugin_root.join(kind.dir_name());
            stats += self.scanner.scan(&dir, &mut *registry);
        }

        registry.prune();

        info!(
            "Plugin scan of {} complete: {} candidates registered",
            self.plugin_root.display(),
            stats.registered
        );
        if stats.stat_failures > 0 {
            warn!("{} plugin files could not be inspected", stats.stat_failures);
        }
        Ok(stats)
    }

    /// Shutdown: save the registry, then unload every loaded plugin.
    ///
    /// Returns the number of plugins unloaded. Safe to call with nothing
    /// loaded; the registry is still saved.
    pub fn cleanup(&self) -> usize {
        if let Err(e) = self.registry().save() {
            warn!("Failed to save plugin registry: {:#}", e);
        }

        let handles = self.table.drain();
        let count = handles.len();
        for handle in handles {
            self.loader.unload(handle);
        }

        debug!("Plugin system shut down, {} plugins unloaded", count);
        count
    }

    /// Load one plugin file.
    ///
    /// # Errors
    /// Returns why the file was rejected; see [`PluginLoader::load`].
    pub fn load_plugin(&self, path: impl AsRef<Path>) -> Result<LoadedPlugin, PluginError> {
        self.loader.load(&self.table, path.as_ref())
    }

    /// Unload a single plugin. Returns `false` if `id` is not loaded.
    pub fn unload(&self, id: ModuleId) -> bool {
        match self.table.remove(id) {
            Some(handle) => {
                self.loader.unload(handle);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn loaded(&self) -> Vec<LoadedPluginInfo> {
        self.table.snapshot()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl<R: PluginRegistry> Drop for PluginSystem<R> {
    fn drop(&mut self) {
        let handles = self.table.drain();
        if handles.is_empty() {
            return;
        }
        warn!(
            "Plugin system dropped with {} plugins loaded, unloading them now",
            handles.len()
        );
        for handle in handles {
            self.loader.unload(handle);
        }
    }
}
