//! Kiln plugin ABI
//!
//! The contract shared between the kiln host and the native libraries it
//! loads. A plugin exports one [`PluginHeader`] under [`PLUGIN_SELF_SYMBOL`];
//! the host checks its magic and version window before touching anything else.
//!
//! Plugins normally use [`declare_plugin!`] rather than writing the static by
//! hand:
//!
//! ```rust,ignore
//! extern "C" fn init() -> bool {
//!     true
//! }
//!
//! kiln_abi::declare_plugin!(kiln_abi::PluginType::Input, name: "wav-reader", init: init);
//! ```

use std::fmt;
use std::os::raw::c_char;

/// Marks a header as belonging to a kiln plugin.
pub const PLUGIN_MAGIC: u32 = 0x4b49_4c4e; // "KILN"

/// Current ABI version. Plugins built against this crate report it.
pub const PLUGIN_VERSION: u32 = 4;

/// Oldest ABI version the host still accepts.
pub const PLUGIN_VERSION_MIN: u32 = 3;

/// Exported symbol name of the plugin header, NUL-terminated for `dlsym`.
pub const PLUGIN_SELF_SYMBOL: &[u8] = b"_kiln_plugin_self\0";

/// Init hook. Returning `false` refuses the load.
pub type InitFn = extern "C" fn() -> bool;

/// Cleanup hook, called once before the library is released.
pub type CleanupFn = extern "C" fn();

/// Fixed-layout descriptor every plugin library exports.
#[repr(C)]
#[derive(Debug)]
pub struct PluginHeader {
    pub magic: u32,
    pub version: u32,
    /// Raw [`PluginType`] tag
    pub kind: u32,
    /// NUL-terminated display name, or null
    pub name: *const c_char,
    pub init: Option<InitFn>,
    pub cleanup: Option<CleanupFn>,
}

// The header is immutable once exported and `name` points at static data.
unsafe impl Sync for PluginHeader {}
unsafe impl Send for PluginHeader {}

/// Plugin categories. The category decides whether lifecycle hooks run.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginType {
    Transport = 0,
    Playlist = 1,
    Input = 2,
    Output = 3,
    Effect = 4,
    General = 5,
    Visualization = 6,
}

impl PluginType {
    /// All categories, in plugin directory scan order.
    pub const ALL: [PluginType; 7] = [
        PluginType::Transport,
        PluginType::Playlist,
        PluginType::Input,
        PluginType::Output,
        PluginType::Effect,
        PluginType::General,
        PluginType::Visualization,
    ];

    /// Decode a raw header tag.
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Stateful plugins get `init` after load and `cleanup` before unload.
    #[must_use]
    pub fn is_stateful(self) -> bool {
        matches!(
            self,
            PluginType::Transport | PluginType::Playlist | PluginType::Input | PluginType::Effect
        )
    }

    /// Name of the subdirectory under the plugin root holding this category.
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            PluginType::Transport => "Transport",
            PluginType::Playlist => "Container",
            PluginType::Input => "Input",
            PluginType::Output => "Output",
            PluginType::Effect => "Effect",
            PluginType::General => "General",
            PluginType::Visualization => "Visualization",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginType::Transport => "transport",
            PluginType::Playlist => "playlist",
            PluginType::Input => "input",
            PluginType::Output => "output",
            PluginType::Effect => "effect",
            PluginType::General => "general",
            PluginType::Visualization => "visualization",
        };
        f.write_str(name)
    }
}

/// Export a [`PluginHeader`] under [`PLUGIN_SELF_SYMBOL`].
///
/// `init` and `cleanup` are optional and must be `extern "C"` functions.
#[macro_export]
macro_rules! declare_plugin {
    (@hook) => {
        None
    };
    (@hook $f:path) => {
        Some($f)
    };
    ($kind:expr, name: $name:literal $(, init: $init:path)? $(, cleanup: $cleanup:path)? $(,)?) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static _kiln_plugin_self: $crate::PluginHeader = $crate::PluginHeader {
            magic: $crate::PLUGIN_MAGIC,
            version: $crate::PLUGIN_VERSION,
            kind: $kind as u32,
            name: concat!($name, "\0").as_ptr().cast(),
            init: $crate::declare_plugin!(@hook $($init)?),
            cleanup: $crate::declare_plugin!(@hook $($cleanup)?),
        };
    };
}
