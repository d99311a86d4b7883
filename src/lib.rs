//! Kiln - native plugin loading and lifecycle management
//!
//! Kiln discovers shared-library plugins on disk, checks them against the
//! host's ABI contract, loads and unloads them, and runs their lifecycle hooks.
//! A registry of known plugin files is refreshed at every startup so the host
//! can decide what to load without probing each file.
//!
//! # Modules
//!
//! - [`system`]: Startup/shutdown orchestration and the host-facing API
//! - [`loader`]: Validating, initializing and releasing a single plugin
//! - [`table`]: The set of currently loaded modules
//! - [`scan`]: Plugin directory discovery
//! - [`registry`]: Registry interface and an in-memory implementation
//! - [`native`]: Dynamic library access (`libloading`)
//! - [`header`]: Host-side view of the plugin header
//! - [`config`]: Configuration loading
//! - [`error`]: Error types

pub mod config;
pub mod error;
pub mod header;
pub mod loader;
pub mod native;
pub mod registry;
pub mod scan;
pub mod system;
pub mod table;

pub use error::PluginError;
pub use header::{Capabilities, PluginHeader, PluginType};
pub use loader::{LoadStats, LoadedPlugin, PluginLoader};
pub use native::{DylibLoader, NativeLoader, NativeModule};
pub use registry::{MemoryRegistry, PluginRegistry};
pub use scan::{DirWalker, FsWalker, ScanStats, Scanner};
pub use system::PluginSystem;
pub use table::{LoadedPluginInfo, ModuleHandle, ModuleId, ModuleTable};
