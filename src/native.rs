//! Native module loading
//!
//! [`NativeLoader`] is the seam between the plugin loader and the platform's
//! dynamic linker. [`DylibLoader`] is the real implementation on top of
//! `libloading`; tests plug in their own loader to count open/close calls.
//!
//! Headers handed out by a [`DylibModule`] keep a reference to the library, so
//! the code they point into stays mapped even if the host holds on to a header
//! after the plugin has been unloaded. The final `dlclose` happens when the
//! last reference goes away.

use crate::header::{Capabilities, PluginHeader};
use kiln_abi::PLUGIN_SELF_SYMBOL;
use libloading::{Library, Symbol};
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::debug;

/// Opens native libraries.
pub trait NativeLoader: Send + Sync {
    /// Whether this platform can load code at runtime at all.
    fn is_supported(&self) -> bool;

    /// Open `path` with lazy, process-local symbol binding.
    ///
    /// # Errors
    /// Returns the platform loader's diagnostic message.
    fn open(&self, path: &Path) -> Result<Box<dyn NativeModule>, String>;
}

/// One opened native library.
pub trait NativeModule: Send {
    /// Resolve the exported plugin header, if the library has one.
    fn header(&self) -> Option<Arc<dyn PluginHeader>>;

    /// Release the library.
    ///
    /// # Errors
    /// Returns the platform loader's diagnostic message.
    fn close(self: Box<Self>) -> Result<(), String>;

    /// Give up the handle without releasing it. The library stays mapped for
    /// the rest of the process.
    fn leak(self: Box<Self>);
}

/// `libloading` backed loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

impl NativeLoader for DylibLoader {
    fn is_supported(&self) -> bool {
        cfg!(any(unix, windows))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn NativeModule>, String> {
        // Safety: running a library's initializers is inherent to loading a
        // plugin; callers only pass files they intend to trust.
        let library = unsafe { open_local(path) }.map_err(|e| e.to_string())?;
        Ok(Box::new(DylibModule {
            library: Arc::new(library),
        }))
    }
}

#[cfg(unix)]
unsafe fn open_local(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix;

    unix::Library::open(Some(path), unix::RTLD_LAZY | unix::RTLD_LOCAL).map(Library::from)
}

#[cfg(not(unix))]
unsafe fn open_local(path: &Path) -> Result<Library, libloading::Error> {
    Library::new(path)
}

/// A library opened by [`DylibLoader`].
pub struct DylibModule {
    library: Arc<Library>,
}

impl NativeModule for DylibModule {
    fn header(&self) -> Option<Arc<dyn PluginHeader>> {
        // Safety: the symbol is a data symbol; `Symbol<*const T>` yields its
        // address. Its layout is checked by the loader through the magic field.
        let raw = unsafe {
            let symbol: Symbol<*const kiln_abi::PluginHeader> =
                self.library.get(PLUGIN_SELF_SYMBOL).ok()?;
            *symbol
        };
        let raw = NonNull::new(raw.cast_mut())?;

        Some(Arc::new(LibraryHeader {
            raw,
            _library: Arc::clone(&self.library),
        }))
    }

    fn close(self: Box<Self>) -> Result<(), String> {
        match Arc::try_unwrap(self.library) {
            Ok(library) => library.close().map_err(|e| e.to_string()),
            Err(shared) => {
                debug!(
                    references = Arc::strong_count(&shared) - 1,
                    "Plugin header still referenced, library closes when released"
                );
                Ok(())
            }
        }
    }

    fn leak(self: Box<Self>) {
        std::mem::forget(self.library);
    }
}

/// Header living inside a loaded library.
struct LibraryHeader {
    raw: NonNull<kiln_abi::PluginHeader>,
    _library: Arc<Library>,
}

// Safety: the header is immutable static data in a library that stays mapped
// while `_library` is alive.
unsafe impl Send for LibraryHeader {}
unsafe impl Sync for LibraryHeader {}

impl LibraryHeader {
    fn raw(&self) -> &kiln_abi::PluginHeader {
        // Safety: see the Send/Sync impls above.
        unsafe { self.raw.as_ref() }
    }
}

impl PluginHeader for LibraryHeader {
    fn magic(&self) -> u32 {
        self.raw().magic
    }

    fn version(&self) -> u32 {
        self.raw().version
    }

    fn raw_type(&self) -> u32 {
        self.raw().kind
    }

    fn name(&self) -> Option<String> {
        PluginHeader::name(self.raw())
    }

    fn capabilities(&self) -> Capabilities {
        self.raw().capabilities()
    }

    fn init(&self) -> bool {
        PluginHeader::init(self.raw())
    }

    fn cleanup(&self) {
        PluginHeader::cleanup(self.raw());
    }
}
