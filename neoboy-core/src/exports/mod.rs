//! Export resolution.
//!
//! Emulator cores reach us through different build pipelines, and each decorates symbols its
//! own way. For every canonical [`Export`] the resolver probes, in order:
//!
//! 1. `_name` (Emscripten decoration)
//! 2. `name` (bare export)
//! 3. `_<prefix>name` (decorated, core-prefixed)
//! 4. `<prefix>name` (bare, core-prefixed)
//!
//! The first candidate that names a function export wins. A miss is not an error: the entry is
//! recorded as absent and callers match on presence. Resolution happens once, at bind time,
//! and produces an immutable [`ExportTable`].

use std::collections::BTreeMap;

use tracing::{debug, warn};
use wasmtime::{Instance, Store, TypedFunc, WasmParams, WasmResults};

use crate::abi::{CoreKind, EMSCRIPTEN_DECORATION, Export};
use crate::runtime::HostState;

/// Candidate symbol names for `export` on `core`, in probe order.
pub fn candidates(core: CoreKind, export: Export) -> [String; 4] {
    let bare = export.name();
    let prefixed = format!("{}{bare}", core.prefix());
    [
        format!("{EMSCRIPTEN_DECORATION}{bare}"),
        bare.to_string(),
        format!("{EMSCRIPTEN_DECORATION}{prefixed}"),
        prefixed,
    ]
}

/// Pick the first candidate for which `has_function` answers `true`.
///
/// Pure with respect to module state: `has_function` only inspects the export namespace.
pub fn resolve_symbol(
    core: CoreKind,
    export: Export,
    mut has_function: impl FnMut(&str) -> bool,
) -> Option<String> {
    candidates(core, export)
        .into_iter()
        .find(|name| has_function(name))
}

/// Resolved, typed entry points of one core instance.
///
/// Every entry is either a typed function of the instance owned by the same
/// [`ModuleHandle`](crate::module::ModuleHandle) or `None`.
pub struct ExportTable {
    pub init: Option<TypedFunc<(), ()>>,
    pub load_rom: Option<TypedFunc<(u32, u32), i32>>,
    pub step_frame: Option<TypedFunc<(), ()>>,
    pub set_button: Option<TypedFunc<(i32, i32), ()>>,
    pub get_framebuffer: Option<TypedFunc<(), u32>>,
    pub get_audio_buffer: Option<TypedFunc<(), u32>>,
    pub get_audio_buffer_size: Option<TypedFunc<(), u32>>,
    pub save_state: Option<TypedFunc<u32, u32>>,
    pub load_state: Option<TypedFunc<(u32, u32), i32>>,
    pub reset: Option<TypedFunc<(), ()>>,
    pub destroy: Option<TypedFunc<(), ()>>,
    pub malloc: Option<TypedFunc<u32, u32>>,
    pub free: Option<TypedFunc<u32, ()>>,
    symbols: BTreeMap<Export, String>,
}

impl ExportTable {
    /// Resolve every canonical export of `instance` for `core`.
    pub fn bind(instance: &Instance, store: &mut Store<HostState>, core: CoreKind) -> Self {
        let mut symbols = BTreeMap::new();
        let mut binder = Binder {
            instance,
            store,
            core,
            symbols: &mut symbols,
        };

        let init = binder.bind(Export::Init);
        let load_rom = binder.bind(Export::LoadRom);
        let step_frame = binder.bind(Export::StepFrame);
        let set_button = binder.bind(Export::SetButton);
        let get_framebuffer = binder.bind(Export::GetFramebuffer);
        let get_audio_buffer = binder.bind(Export::GetAudioBuffer);
        let get_audio_buffer_size = binder.bind(Export::GetAudioBufferSize);
        let save_state = binder.bind(Export::SaveState);
        let load_state = binder.bind(Export::LoadState);
        let reset = binder.bind(Export::Reset);
        let destroy = binder.bind(Export::Destroy);
        let malloc = binder.bind(Export::Malloc);
        let free = binder.bind(Export::Free);

        let table = Self {
            init,
            load_rom,
            step_frame,
            set_button,
            get_framebuffer,
            get_audio_buffer,
            get_audio_buffer_size,
            save_state,
            load_state,
            reset,
            destroy,
            malloc,
            free,
            symbols,
        };

        let missing = table.missing();
        if !missing.is_empty() {
            debug!(%core, ?missing, "core omits optional exports");
        }
        table
    }

    pub fn is_present(&self, export: Export) -> bool {
        self.symbols.contains_key(&export)
    }

    /// Symbol the export was bound to, if present.
    pub fn symbol(&self, export: Export) -> Option<&str> {
        self.symbols.get(&export).map(String::as_str)
    }

    pub fn missing(&self) -> Vec<Export> {
        Export::ALL
            .into_iter()
            .filter(|export| !self.is_present(*export))
            .collect()
    }
}

struct Binder<'a> {
    instance: &'a Instance,
    store: &'a mut Store<HostState>,
    core: CoreKind,
    symbols: &'a mut BTreeMap<Export, String>,
}

impl Binder<'_> {
    fn bind<Params, Results>(&mut self, export: Export) -> Option<TypedFunc<Params, Results>>
    where
        Params: WasmParams,
        Results: WasmResults,
    {
        let instance = self.instance;
        let store = &mut *self.store;
        let symbol = resolve_symbol(self.core, export, |name| {
            instance.get_func(&mut *store, name).is_some()
        })?;

        let func = instance.get_func(&mut *store, &symbol)?;
        match func.typed::<Params, Results>(&*store) {
            Ok(typed) => {
                debug!(%export, %symbol, "bound core export");
                self.symbols.insert(export, symbol);
                Some(typed)
            }
            Err(err) => {
                warn!(%export, %symbol, "export signature mismatch, treating as absent: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests;
