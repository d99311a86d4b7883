//! Oscilloscope - a visualization plugin. Stateless, so the host never calls
//! its hooks; `init` refuses so a host that did call it would fail the load.
use std::sync::atomic::{AtomicUsize, Ordering};

static INITS: AtomicUsize = AtomicUsize::new(0);

extern "C" fn init() -> bool {
    INITS.fetch_add(1, Ordering::SeqCst);
    eprintln!("[scope] init should never run");
    false
}

#[no_mangle]
pub extern "C" fn kiln_scope_init_count() -> usize {
    INITS.load(Ordering::SeqCst)
}

kiln_abi::declare_plugin!(kiln_abi::PluginType::Visualization, name: "Scope", init: init);
