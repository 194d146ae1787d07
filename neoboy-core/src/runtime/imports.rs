//! Host import definitions.
//!
//! Cores need almost nothing from the host. Emscripten builds with memory growth enabled call
//! `emscripten_notify_memory_growth`, which we count so growth shows up in diagnostics.
//! Every other function import is defined as a trap, so libc plumbing the core never calls at
//! run time does not prevent instantiation.

use tracing::trace;
use wasmtime::{Caller, Linker, Module};

use super::HostState;
use crate::abi::{IMPORT_MODULE, host_imports};

/// Define all host imports for `module`.
///
/// Must be called before instantiating the module.
pub fn define_imports(linker: &mut Linker<HostState>, module: &Module) -> Result<(), wasmtime::Error> {
    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::NOTIFY_MEMORY_GROWTH,
        |mut caller: Caller<'_, HostState>, memory_index: i32| {
            let state = caller.data_mut();
            state.growth_notifications += 1;
            trace!(memory_index, count = state.growth_notifications, "guest memory grew");
        },
    )?;

    linker.define_unknown_imports_as_traps(module)?;

    Ok(())
}
