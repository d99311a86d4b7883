//! Tone generator - an input plugin that needs setup before use
use std::sync::atomic::{AtomicUsize, Ordering};

static INITS: AtomicUsize = AtomicUsize::new(0);
static CLEANUPS: AtomicUsize = AtomicUsize::new(0);

extern "C" fn init() -> bool {
    INITS.fetch_add(1, Ordering::SeqCst);
    eprintln!("[tone] initialized");
    true
}

extern "C" fn cleanup() {
    CLEANUPS.fetch_add(1, Ordering::SeqCst);
    eprintln!("[tone] cleaned up");
}

/// Number of times the host has run `init` while this copy was mapped
#[no_mangle]
pub extern "C" fn kiln_tone_init_count() -> usize {
    INITS.load(Ordering::SeqCst)
}

/// Number of times the host has run `cleanup` while this copy was mapped
#[no_mangle]
pub extern "C" fn kiln_tone_cleanup_count() -> usize {
    CLEANUPS.load(Ordering::SeqCst)
}

kiln_abi::declare_plugin!(
    kiln_abi::PluginType::Input,
    name: "Tone Generator",
    init: init,
    cleanup: cleanup,
);
