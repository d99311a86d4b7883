//! Fake native loader for exercising the plugin system without real libraries.

#![allow(dead_code)]

use kiln::{Capabilities, NativeLoader, NativeModule, PluginHeader, PluginType};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy)]
pub struct FakePlugin {
    pub magic: u32,
    pub version: u32,
    pub kind: u32,
    pub init: Option<bool>,
    pub cleanup: bool,
}

impl FakePlugin {
    /// A well-formed plugin declaring both hooks.
    pub fn valid(kind: PluginType) -> Self {
        Self {
            magic: kiln_abi::PLUGIN_MAGIC,
            version: kiln_abi::PLUGIN_VERSION,
            kind: kind as u32,
            init: Some(true),
            cleanup: true,
        }
    }

    pub fn magic(mut self, magic: u32) -> Self {
        self.magic = magic;
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn init(mut self, init: Option<bool>) -> Self {
        self.init = init;
        self
    }
}

#[derive(Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub leaks: AtomicUsize,
    inits: Mutex<HashMap<PathBuf, usize>>,
    cleanups: Mutex<HashMap<PathBuf, usize>>,
}

impl Counters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn leaks(&self) -> usize {
        self.leaks.load(Ordering::SeqCst)
    }

    pub fn inits_of(&self, path: &Path) -> usize {
        self.inits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn cleanups_of(&self, path: &Path) -> usize {
        self.cleanups.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_cleanups(&self) -> usize {
        self.cleanups.lock().unwrap().values().sum()
    }
}

/// Serves [`FakePlugin`]s by path; unknown paths fail to open.
#[derive(Default)]
pub struct FakeLoader {
    plugins: HashMap<PathBuf, FakePlugin>,
    counters: Arc<Counters>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<PathBuf>, plugin: FakePlugin) -> Self {
        self.plugins.insert(path.into(), plugin);
        self
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }
}

impl NativeLoader for FakeLoader {
    fn is_supported(&self) -> bool {
        true
    }

    fn open(&self, path: &Path) -> Result<Box<dyn NativeModule>, String> {
        let plugin = self
            .plugins
            .get(path)
            .copied()
            .ok_or_else(|| format!("{}: No such file or directory", path.display()))?;
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeModule {
            path: path.to_path_buf(),
            plugin,
            counters: Arc::clone(&self.counters),
        }))
    }
}

/// Loader for a platform without dynamic loading.
pub struct NoDlLoader;

impl NativeLoader for NoDlLoader {
    fn is_supported(&self) -> bool {
        false
    }

    fn open(&self, path: &Path) -> Result<Box<dyn NativeModule>, String> {
        Err(format!("cannot open {}", path.display()))
    }
}

struct FakeModule {
    path: PathBuf,
    plugin: FakePlugin,
    counters: Arc<Counters>,
}

impl NativeModule for FakeModule {
    fn header(&self) -> Option<Arc<dyn PluginHeader>> {
        Some(Arc::new(FakeHeader {
            path: self.path.clone(),
            plugin: self.plugin,
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

struct FakeHeader {
    path: PathBuf,
    plugin: FakePlugin,
    counters: Arc<Counters>,
}

impl PluginHeader for FakeHeader {
    fn magic(&self) -> u32 {
        self.plugin.magic
    }

    fn version(&self) -> u32 {
        self.plugin.version
    }

    fn raw_type(&self) -> u32 {
        self.plugin.kind
    }

    fn name(&self) -> Option<String> {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            init: self.plugin.init.is_some(),
            cleanup: self.plugin.cleanup,
        }
    }

    fn init(&self) -> bool {
        *self
            .counters
            .inits
            .lock()
            .unwrap()
            .entry(self.path.clone())
            .or_default() += 1;
        self.plugin.init.unwrap_or(true)
    }

    fn cleanup(&self) {
        *self
            .counters
            .cleanups
            .lock()
            .unwrap()
            .entry(self.path.clone())
            .or_default() += 1;
    }
}
