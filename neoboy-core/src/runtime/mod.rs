//! Wasmtime-backed runtime glue for neoboy-core.
//!
//! Responsibilities:
//! - Create a Wasmtime `Engine` with the proposals emulator core toolchains emit.
//! - Define host imports under module `"env"` and trap stubs for everything else.
//! - Instantiate a compiled core into a [`ModuleHandle`](crate::module::ModuleHandle).
//!
//! Export resolution lives in [`crate::exports`]; memory view management in [`crate::memory`].

pub mod engine;
pub mod imports;

pub use engine::{BridgeEngine, HostState};
