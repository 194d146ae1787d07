//! Bridge error type.

use crate::abi::Export;
use crate::loader::LoadError;

/// Result alias used across the bridge.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Errors surfaced by bridge operations.
///
/// Boundary operations (`load_rom`, `load_state`) fold these into a `bool` for the
/// embedding layer; everything else propagates them with `?`.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// An optional export is missing from the module.
    #[error("module does not export `{0}`")]
    ResolutionAbsent(Export),

    /// The allocator export is missing or returned a null pointer.
    #[error("allocation of {size} bytes via `{export}` failed")]
    Allocation { export: Export, size: usize },

    /// The module reported a nonzero status.
    #[error("`{export}` reported failure status {status}")]
    MarshalFailure { export: Export, status: i32 },

    /// The audio output device could not be created.
    #[error("audio device initialisation failed: {0}")]
    DeviceInit(String),

    /// A region does not fit inside guest linear memory.
    #[error("region {ptr:#x}+{len} is outside guest memory ({memory} bytes)")]
    OutOfBounds { ptr: u32, len: usize, memory: usize },

    /// `save_state` reported more bytes than the scratch region holds.
    #[error("save state of {size} bytes overflowed the {capacity}-byte scratch region")]
    SaveStateOverflow { size: u32, capacity: u32 },

    /// The module does not export a linear memory.
    #[error("module does not export linear memory")]
    MissingMemory,

    /// No core has been selected.
    #[error("no core module is loaded")]
    NoModule,

    /// A call into the module trapped, or instantiation failed.
    #[error("wasm runtime error: {0:#}")]
    Trap(#[from] wasmtime::Error),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}
