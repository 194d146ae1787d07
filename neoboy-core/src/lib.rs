//! neoboy-core: host bridge for NeoBoy emulator cores compiled to WebAssembly.
//!
//! A core (GB, GBC or GBA) is an opaque WASM module exporting a small C ABI: allocate, load a
//! ROM, step one frame, expose a framebuffer and an audio buffer, save and restore state. This
//! crate sits between that module and the host:
//!
//! - [`runtime::BridgeEngine`] compiles and instantiates a core into a [`ModuleHandle`];
//! - [`exports`] negotiates which entry points the core actually provides;
//! - [`memory`] keeps views of guest memory valid across `memory.grow`;
//! - [`marshal`] moves ROMs and save states in and out through the core's allocator;
//! - [`av`] delivers frames to a [`DisplaySurface`] and schedules audio on an [`AudioOutput`];
//! - [`pacing`] decouples the 60 Hz logical step rate from the display refresh rate;
//! - [`session`] runs the fixed step/present/enqueue sequence once per logical tick.
//!
//! Everything is single threaded. The handle is an explicit value; there is no global core.

pub mod abi;
pub mod av;
pub mod config;
pub mod error;
pub mod exports;
pub mod input;
pub mod loader;
pub mod marshal;
pub mod memory;
pub mod module;
pub mod pacing;
pub mod runtime;
pub mod session;
pub mod storage;

#[cfg(test)]
mod test_utils;

pub use abi::{Button, CoreKind, Export};
pub use av::{AudioOutput, AudioScheduler, DisplaySurface, OwnedImage, PixelImage};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use memory::Region;
pub use module::ModuleHandle;
pub use pacing::{FramePacer, PaceOutcome, RateObserver, RepaintScheduler};
pub use runtime::BridgeEngine;
pub use session::Session;
pub use storage::{FileSaveStore, MemorySaveStore, SaveRecord, SaveStore};
