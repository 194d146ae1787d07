//! The module handle: one instantiated emulator core and everything bound to it.
//!
//! Lifecycle is `BridgeEngine::instantiate` (create + bind) -> use -> [`ModuleHandle::destroy`]
//! (or drop). The handle is passed explicitly to every operation; there is no global core.
//!
//! Data marshalling, framebuffer and audio access, and input forwarding are implemented on
//! this type in [`crate::marshal`], [`crate::av`] and [`crate::input`].

use tracing::{debug, error, info};
use wasmtime::{Instance, Store};

use crate::abi::{CoreKind, Export, MEMORY_EXPORT};
use crate::error::{BridgeError, Result};
use crate::exports::ExportTable;
use crate::memory::MemoryViews;
use crate::runtime::HostState;

pub struct ModuleHandle {
    pub(crate) core: CoreKind,
    pub(crate) store: Store<HostState>,
    /// Not used after binding, but kept so the handle owns everything the store refers to.
    #[allow(dead_code)]
    instance: Instance,
    pub(crate) exports: ExportTable,
    pub(crate) views: MemoryViews,
    pub(crate) initialized: bool,
    destroyed: bool,
    pub(crate) save_state_scratch: u32,
}

impl ModuleHandle {
    /// Resolve exports and memory of a freshly instantiated core.
    pub(crate) fn bind(
        mut store: Store<HostState>,
        instance: Instance,
        core: CoreKind,
        save_state_scratch: u32,
    ) -> Result<Self> {
        let memory = instance
            .get_memory(&mut store, MEMORY_EXPORT)
            .ok_or(BridgeError::MissingMemory)?;
        let exports = ExportTable::bind(&instance, &mut store, core);
        let views = MemoryViews::new(memory, &store);

        Ok(Self {
            core,
            store,
            instance,
            exports,
            views,
            initialized: false,
            destroyed: false,
            save_state_scratch,
        })
    }

    pub fn core(&self) -> CoreKind {
        self.core
    }

    pub fn exports(&self) -> &ExportTable {
        &self.exports
    }

    pub fn views(&self) -> &MemoryViews {
        &self.views
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Growth notifications received from Emscripten-built cores.
    pub fn growth_notifications(&self) -> u64 {
        self.store.data().growth_notifications
    }

    /// Override the `save_state` scratch size configured on the engine.
    pub fn set_save_state_scratch(&mut self, bytes: u32) {
        self.save_state_scratch = bytes;
    }

    /// Run `call` against the store, wrapping growth-capable exports in the view checkpoint.
    pub(crate) fn guarded<R>(
        &mut self,
        export: Export,
        call: impl FnOnce(&mut Store<HostState>) -> wasmtime::Result<R>,
    ) -> Result<R> {
        let grows = export.may_grow_memory();
        if grows {
            self.views.note_growth_capable_call();
        }
        let result = call(&mut self.store);
        if grows {
            self.views.after_possible_growth(&self.store);
        }
        result.map_err(|trap| {
            error!(%export, "core export trapped: {trap:#}");
            BridgeError::Trap(trap)
        })
    }

    /// Call the core's `init`. A core without `init` counts as initialised.
    pub fn initialize(&mut self) -> Result<()> {
        if let Some(init) = self.exports.init.clone() {
            self.guarded(Export::Init, |store| init.call(store, ()))?;
        } else {
            debug!(core = %self.core, "core has no init export, proceeding as initialised");
        }
        self.initialized = true;
        Ok(())
    }

    /// Run the core for one logical frame.
    pub fn step(&mut self) -> Result<()> {
        let Some(step) = self.exports.step_frame.clone() else {
            return Ok(());
        };
        self.guarded(Export::StepFrame, |store| step.call(store, ()))
    }

    pub fn reset(&mut self) -> Result<()> {
        let Some(reset) = self.exports.reset.clone() else {
            return Ok(());
        };
        info!(core = %self.core, "resetting core");
        self.guarded(Export::Reset, |store| reset.call(store, ()))
    }

    /// Release the core's resources. Runs `destroy` at most once.
    pub fn destroy(&mut self) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        self.initialized = false;
        if let Some(destroy) = self.exports.destroy.clone() {
            self.guarded(Export::Destroy, |store| destroy.call(store, ()))?;
        }
        info!(core = %self.core, "core destroyed");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn probe(&mut self, name: &str) -> u32 {
        let probe = self
            .instance
            .get_typed_func::<(), u32>(&mut self.store, name)
            .expect("probe export");
        probe.call(&mut self.store, ()).expect("probe call")
    }
}

impl Drop for ModuleHandle {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            error!("failed to destroy core: {err}");
        }
    }
}
