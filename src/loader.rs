//! Plugin loading and unloading
//!
//! Loading is all-or-nothing: a library that fails any check is closed again
//! before the error is returned, and only a fully validated (and, for stateful
//! types, initialized) plugin reaches the [`ModuleTable`].

use crate::error::PluginError;
use crate::header::PluginHeader;
use crate::native::{NativeLoader, NativeModule};
use crate::table::{ModuleHandle, ModuleId, ModuleTable};
use kiln_abi::{PLUGIN_MAGIC, PLUGIN_VERSION, PLUGIN_VERSION_MIN};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A plugin that made it into the table.
#[derive(Clone)]
pub struct LoadedPlugin {
    pub id: ModuleId,
    pub header: Arc<dyn PluginHeader>,
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("id", &self.id)
            .field("name", &self.header.name())
            .field("type", &self.header.plugin_type())
            .finish()
    }
}

/// Counters from a batch load.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    pub attempted: usize,
    pub loaded: usize,
    pub failed: usize,
}

/// Validates, initializes and releases native plugins.
pub struct PluginLoader {
    native: Box<dyn NativeLoader>,
    release_native_handle: bool,
}

impl PluginLoader {
    #[must_use]
    pub fn new(native: impl NativeLoader + 'static) -> Self {
        Self {
            native: Box::new(native),
            release_native_handle: true,
        }
    }

    /// When `false`, unloading runs cleanup hooks but never closes the native
    /// library. Memory debuggers lose track of allocations made inside a
    /// library once it is unmapped, so leaking it keeps their reports usable.
    #[must_use]
    pub fn with_release_native_handle(mut self, release: bool) -> Self {
        self.release_native_handle = release;
        self
    }

    #[must_use]
    pub fn releases_native_handle(&self) -> bool {
        self.release_native_handle
    }

    #[must_use]
    pub fn native(&self) -> &dyn NativeLoader {
        self.native.as_ref()
    }

    /// Load a single plugin file into `table`.
    ///
    /// # Errors
    /// Returns the reason the file was rejected. The failure has already been
    /// logged and nothing was added to the table.
    pub fn load(&self, table: &ModuleTable, path: &Path) -> Result<LoadedPlugin, PluginError> {
        let result = self.try_load(table, path);
        if let Err(err) = &result {
            error!("{}", err);
        }
        result
    }

    fn try_load(&self, table: &ModuleTable, path: &Path) -> Result<LoadedPlugin, PluginError> {
        debug!("Loading plugin: {}", path.display());

        let module = self.native.open(path).map_err(|reason| PluginError::Load {
            path: path.to_path_buf(),
            reason,
        })?;

        let header = module.header().filter(|h| h.magic() == PLUGIN_MAGIC);
        let Some(header) = header else {
            close_rejected(module, path);
            return Err(PluginError::InvalidPlugin {
                path: path.to_path_buf(),
            });
        };

        let version = header.version();
        if !(PLUGIN_VERSION_MIN..=PLUGIN_VERSION).contains(&version) {
            drop(header);
            close_rejected(module, path);
            return Err(PluginError::IncompatibleVersion {
                path: path.to_path_buf(),
                found: version,
                min: PLUGIN_VERSION_MIN,
                max: PLUGIN_VERSION,
            });
        }

        if header.lifecycle().init && !header.init() {
            drop(header);
            close_rejected(module, path);
            return Err(PluginError::Initialization {
                path: path.to_path_buf(),
            });
        }

        let id = table.insert(path, Arc::clone(&header), module);
        info!(
            "Loaded plugin {} {} ({}, ABI {})",
            id,
            header.name().unwrap_or_else(|| path.display().to_string()),
            header
                .plugin_type()
                .map_or_else(|| "unknown type".to_string(), |t| t.to_string()),
            version
        );

        Ok(LoadedPlugin { id, header })
    }

    /// Load every path in turn. Failures are logged and counted, never fatal.
    pub fn load_all<I, P>(&self, table: &ModuleTable, paths: I) -> LoadStats
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut stats = LoadStats::default();
        for path in paths {
            stats.attempted += 1;
            match self.load(table, path.as_ref()) {
                Ok(_) => stats.loaded += 1,
                Err(_) => stats.failed += 1,
            }
        }
        stats
    }

    /// Reverse a load: run the cleanup hook, then release the library.
    ///
    /// The handle must already have been taken out of its table.
    pub fn unload(&self, handle: ModuleHandle) {
        let id = handle.id();
        let path = handle.path().to_path_buf();
        let (header, module) = handle.into_parts();

        if header.lifecycle().cleanup {
            header.cleanup();
        }
        // The header may borrow the library; let go of it before closing.
        drop(header);

        if self.release_native_handle {
            if let Err(reason) = module.close() {
                warn!("Failed to close {}: {}", path.display(), reason);
            }
        } else {
            debug!("Leaving {} mapped for memory debugging", path.display());
            module.leak();
        }

        debug!("Unloaded plugin {} ({})", id, path.display());
    }
}

fn close_rejected(module: Box<dyn NativeModule>, path: &Path) {
    if let Err(reason) = module.close() {
        warn!("Failed to close rejected library {}: {}", path.display(), reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{Capabilities, PluginType};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        opens: AtomicUsize,
        closes: AtomicUsize,
        leaks: AtomicUsize,
        inits: AtomicUsize,
        cleanups: AtomicUsize,
    }

    struct Header {
        magic: u32,
        version: u32,
        kind: PluginType,
        init_ok: Option<bool>,
        cleanup: bool,
        counters: Arc<Counters>,
    }

    impl PluginHeader for Header {
        fn magic(&self) -> u32 {
            self.magic
        }
        fn version(&self) -> u32 {
            self.version
        }
        fn raw_type(&self) -> u32 {
            self.kind as u32
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities {
                init: self.init_ok.is_some(),
                cleanup: self.cleanup,
            }
        }
        fn init(&self) -> bool {
            self.counters.inits.fetch_add(1, Ordering::SeqCst);
            self.init_ok.unwrap_or(true)
        }
        fn cleanup(&self) {
            self.counters.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Copy)]
    struct Spec {
        magic: u32,
        version: u32,
        kind: PluginType,
        init_ok: Option<bool>,
        cleanup: bool,
    }

    impl Spec {
        fn valid(kind: PluginType) -> Self {
            Self {
                magic: PLUGIN_MAGIC,
                version: PLUGIN_VERSION,
                kind,
                init_ok: Some(true),
                cleanup: true,
            }
        }
    }

    struct Module {
        spec: Spec,
        counters: Arc<Counters>,
    }

    impl NativeModule for Module {
        fn header(&self) -> Option<Arc<dyn PluginHeader>> {
            Some(Arc::new(Header {
                magic: self.spec.magic,
                version: self.spec.version,
                kind: self.spec.kind,
                init_ok: self.spec.init_ok,
                cleanup: self.spec.cleanup,
                counters: Arc::clone(&self.counters),
            }))
        }
        fn close(self: Box<Self>) -> Result<(), String> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn leak(self: Box<Self>) {
            self.counters.leaks.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Loader {
        spec: Spec,
        counters: Arc<Counters>,
    }

    impl NativeLoader for Loader {
        fn is_supported(&self) -> bool {
            true
        }
        fn open(&self, path: &Path) -> Result<Box<dyn NativeModule>, String> {
            if path.ends_with("missing.so") {
                return Err("cannot open shared object file".to_string());
            }
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Module {
                spec: self.spec,
                counters: Arc::clone(&self.counters),
            }))
        }
    }

    fn loader(spec: Spec) -> (PluginLoader, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let loader = PluginLoader::new(Loader {
            spec,
            counters: Arc::clone(&counters),
        });
        (loader, counters)
    }

    fn path() -> PathBuf {
        PathBuf::from("/plugins/Input/tone.so")
    }

    #[test]
    fn test_load_valid_plugin() {
        let (loader, counters) = loader(Spec::valid(PluginType::Input));
        let table = ModuleTable::new();
        let loaded = loader.load(&table, &path()).unwrap();
        assert_eq!(loaded.header.plugin_type(), Some(PluginType::Input));
        assert_eq!(table.len(), 1);
        assert!(table.contains(loaded.id));
        assert_eq!(counters.inits.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_open_failure_is_load_error() {
        let (loader, counters) = loader(Spec::valid(PluginType::Input));
        let table = ModuleTable::new();
        let err = loader.load(&table, Path::new("/plugins/missing.so")).unwrap_err();
        assert!(matches!(err, PluginError::Load { ref reason, .. } if reason.contains("cannot open")));
        assert!(table.is_empty());
        assert_eq!(counters.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bad_magic_closes_library() {
        let mut spec = Spec::valid(PluginType::Input);
        spec.magic = 0xdead_beef;
        let (loader, counters) = loader(spec);
        let table = ModuleTable::new();
        let err = loader.load(&table, &path()).unwrap_err();
        assert!(matches!(err, PluginError::InvalidPlugin { .. }));
        assert!(table.is_empty());
        assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(counters.inits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_version_window_is_inclusive() {
        for (version, accepted) in [
            (PLUGIN_VERSION_MIN - 1, false),
            (PLUGIN_VERSION_MIN, true),
            (PLUGIN_VERSION, true),
            (PLUGIN_VERSION + 1, false),
        ] {
            let mut spec = Spec::valid(PluginType::Output);
            spec.version = version;
            let (loader, counters) = loader(spec);
            let table = ModuleTable::new();
            let result = loader.load(&table, &path());
            assert_eq!(result.is_ok(), accepted, "version {version}");
            if !accepted {
                assert!(matches!(
                    result.unwrap_err(),
                    PluginError::IncompatibleVersion { found, .. } if found == version
                ));
                assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
            }
            assert_eq!(table.len(), usize::from(accepted));
        }
    }

    #[test]
    fn test_failed_init_is_not_registered() {
        let mut spec = Spec::valid(PluginType::Effect);
        spec.init_ok = Some(false);
        let (loader, counters) = loader(spec);
        let table = ModuleTable::new();
        let err = loader.load(&table, &path()).unwrap_err();
        assert!(matches!(err, PluginError::Initialization { .. }));
        assert!(table.is_empty());
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stateless_plugin_skips_init() {
        let mut spec = Spec::valid(PluginType::Visualization);
        spec.init_ok = Some(false);
        let (loader, counters) = loader(spec);
        let table = ModuleTable::new();
        assert!(loader.load(&table, &path()).is_ok());
        assert_eq!(counters.inits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unload_stateful_runs_cleanup_once() {
        let (loader, counters) = loader(Spec::valid(PluginType::Transport));
        let table = ModuleTable::new();
        let loaded = loader.load(&table, &path()).unwrap();
        drop(loaded.header);
        loader.unload(table.remove(loaded.id).unwrap());
        assert_eq!(counters.cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_unload_stateless_skips_cleanup() {
        let (loader, counters) = loader(Spec::valid(PluginType::General));
        let table = ModuleTable::new();
        let loaded = loader.load(&table, &path()).unwrap();
        loader.unload(table.remove(loaded.id).unwrap());
        assert_eq!(counters.cleanups.load(Ordering::SeqCst), 0);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unload_can_leak_native_handle() {
        let (loader, counters) = loader(Spec::valid(PluginType::Input));
        let loader = loader.with_release_native_handle(false);
        let table = ModuleTable::new();
        let loaded = loader.load(&table, &path()).unwrap();
        loader.unload(table.remove(loaded.id).unwrap());
        assert_eq!(counters.cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
        assert_eq!(counters.leaks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_load_all_counts_outcomes() {
        let (loader, _) = loader(Spec::valid(PluginType::Input));
        let table = ModuleTable::new();
        let stats = loader.load_all(
            &table,
            ["/plugins/a.so", "/plugins/missing.so", "/plugins/b.so"],
        );
        assert_eq!(
            stats,
            LoadStats {
                attempted: 3,
                loaded: 2,
                failed: 1
            }
        );
        assert_eq!(table.len(), 2);
    }
}
