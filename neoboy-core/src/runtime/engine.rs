//! Engine and store setup.

use tracing::info;
use wasmtime::{Linker, Module, Store, StoreLimits, StoreLimitsBuilder};

use crate::abi::CoreKind;
use crate::config::{BridgeConfig, EngineConfig, MarshalConfig};
use crate::error::Result;
use crate::loader;
use crate::module::ModuleHandle;

/// Per-store host data.
#[derive(Default)]
pub struct HostState {
    limits: StoreLimits,
    /// Number of `emscripten_notify_memory_growth` calls received.
    pub growth_notifications: u64,
}

impl HostState {
    fn new(config: &EngineConfig) -> Self {
        let mut limits = StoreLimitsBuilder::new();
        if let Some(max) = config.max_memory_bytes {
            limits = limits.memory_size(max);
        }
        Self {
            limits: limits.build(),
            growth_notifications: 0,
        }
    }
}

/// Compiles and instantiates emulator core modules.
pub struct BridgeEngine {
    engine: wasmtime::Engine,
    engine_config: EngineConfig,
    marshal: MarshalConfig,
}

impl BridgeEngine {
    /// Create a new engine with the WebAssembly features emscripten and clang builds rely on.
    pub fn new(config: &BridgeConfig) -> Result<Self> {
        let mut cfg = wasmtime::Config::new();

        cfg.wasm_multi_value(true);
        cfg.wasm_bulk_memory(true);
        cfg.wasm_reference_types(true);
        cfg.wasm_simd(true);

        let engine = wasmtime::Engine::new(&cfg)?;

        Ok(Self {
            engine,
            engine_config: config.engine.clone(),
            marshal: config.marshal.clone(),
        })
    }

    pub fn engine(&self) -> &wasmtime::Engine {
        &self.engine
    }

    /// Compile WASM or WAT bytes.
    pub fn compile(&self, bytes: &[u8]) -> Result<Module> {
        Ok(loader::compile_module(&self.engine, bytes)?)
    }

    /// Instantiate `module` and bind its exports for `core`.
    pub fn instantiate(&self, module: &Module, core: CoreKind) -> Result<ModuleHandle> {
        let mut store = Store::new(&self.engine, HostState::new(&self.engine_config));
        store.limiter(|state| &mut state.limits);

        let mut linker = Linker::new(&self.engine);
        super::imports::define_imports(&mut linker, module)?;

        let instance = linker.instantiate(&mut store, module)?;
        let handle = ModuleHandle::bind(store, instance, core, self.marshal.save_state_scratch_bytes)?;

        info!(%core, "core module instantiated");
        Ok(handle)
    }

    /// Compile and instantiate in one step.
    pub fn load(&self, bytes: &[u8], core: CoreKind) -> Result<ModuleHandle> {
        let module = self.compile(bytes)?;
        self.instantiate(&module, core)
    }
}
