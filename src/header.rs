//! Host-side view of a plugin header
//!
//! The raw header is a C struct of function pointers living inside the loaded
//! library. The host talks to it through [`PluginHeader`], which exposes the
//! optional hooks as a capability set so the loader never pokes at pointers
//! directly and tests can stand in their own headers.

use std::ffi::CStr;

pub use kiln_abi::PluginType;

/// Optional entry points a header declares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub init: bool,
    pub cleanup: bool,
}

/// A validated-or-not plugin descriptor.
pub trait PluginHeader: Send + Sync {
    fn magic(&self) -> u32;

    fn version(&self) -> u32;

    /// Raw type tag as declared by the plugin
    fn raw_type(&self) -> u32;

    fn name(&self) -> Option<String> {
        None
    }

    fn capabilities(&self) -> Capabilities;

    /// Run the init hook. Only called when [`Capabilities::init`] is set.
    fn init(&self) -> bool;

    /// Run the cleanup hook. Only called when [`Capabilities::cleanup`] is set.
    fn cleanup(&self);

    fn plugin_type(&self) -> Option<PluginType> {
        PluginType::from_raw(self.raw_type())
    }

    /// Unknown type tags are treated as stateless.
    fn is_stateful(&self) -> bool {
        self.plugin_type().is_some_and(PluginType::is_stateful)
    }

    /// Hooks the host actually runs for this plugin: the declared capabilities
    /// for stateful types, nothing otherwise.
    fn lifecycle(&self) -> Capabilities {
        if self.is_stateful() {
            self.capabilities()
        } else {
            Capabilities::default()
        }
    }
}

impl PluginHeader for kiln_abi::PluginHeader {
    fn magic(&self) -> u32 {
        self.magic
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn raw_type(&self) -> u32 {
        self.kind
    }

    fn name(&self) -> Option<String> {
        if self.name.is_null() {
            return None;
        }
        // Safety: a non-null name is a NUL-terminated string in the plugin's
        // static data, valid for as long as the library stays mapped.
        let name = unsafe { CStr::from_ptr(self.name) };
        Some(name.to_string_lossy().into_owned())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            init: self.init.is_some(),
            cleanup: self.cleanup.is_some(),
        }
    }

    fn init(&self) -> bool {
        self.init.map_or(true, |init| init())
    }

    fn cleanup(&self) {
        if let Some(cleanup) = self.cleanup {
            cleanup();
        }
    }
}
