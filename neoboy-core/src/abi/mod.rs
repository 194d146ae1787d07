//! neoboy-core ABI module
//!
//! This module defines the contract between:
//! - **Host**: `neoboy-core` (this bridge)
//! - **Guest**: an emulator core compiled to a WASM module (GB, GBC or GBA)
//!
//! ## Exports (host -> guest)
//! All exports are optional. The bridge degrades the matching feature when one is missing.
//!
//! - `init()`
//! - `load_rom(ptr: u32, len: u32) -> i32` (status)
//! - `step_frame()`
//! - `set_button(id: i32, pressed: i32)`
//! - `get_framebuffer() -> u32` (pointer to `width * height * 4` RGBA bytes)
//! - `get_audio_buffer() -> u32` (pointer to mono f32 samples)
//! - `get_audio_buffer_size() -> u32` (sample count)
//! - `save_state(ptr: u32) -> u32` (bytes written)
//! - `load_state(ptr: u32, len: u32) -> i32` (status)
//! - `reset()`
//! - `destroy()`
//! - `malloc(len: u32) -> u32`
//! - `free(ptr: u32)`
//!
//! ## Naming conventions
//! Build pipelines decorate symbols differently. Emscripten prefixes C symbols with `_`,
//! plain clang/wasm-ld builds export them bare, and each core may additionally prefix its
//! symbols with its identifier (`gb_`, `gbc_`, `gba_`). See [`crate::exports`] for the
//! resolution order.
//!
//! ## Status convention
//! Every status code is `0` for success and anything else for failure. Sizes and pointers are
//! unsigned byte offsets into guest linear memory.
//!
//! ## Imports (guest -> host)
//! Imported from module `"env"`:
//! - `emscripten_notify_memory_growth(memory_index: i32)`
//!
//! Any other function import is linked as a trap so that standalone Emscripten builds can be
//! instantiated without a full libc environment.

use std::fmt;
use std::str::FromStr;

/// Import module name used by the guest.
pub const IMPORT_MODULE: &str = "env";

/// Name of the linear memory export.
pub const MEMORY_EXPORT: &str = "memory";

/// Leading marker character Emscripten adds to exported C symbols.
pub const EMSCRIPTEN_DECORATION: char = '_';

/// Scratch allocation used for `save_state`; an upper bound for every supported core.
pub const SAVE_STATE_SCRATCH_BYTES: u32 = 1024 * 1024;

/// Sample rate of the mono f32 audio the cores produce.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Host import names provided to the guest.
pub mod host_imports {
    /// Emscripten calls this after `memory.grow` when built with `-sALLOW_MEMORY_GROWTH`.
    pub const NOTIFY_MEMORY_GROWTH: &str = "emscripten_notify_memory_growth";
}

/// `true` if an ABI status code reports success.
#[inline]
pub const fn status_ok(status: i32) -> bool {
    status == 0
}

/// Canonical operations a core may export.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Export {
    Init,
    LoadRom,
    StepFrame,
    SetButton,
    GetFramebuffer,
    GetAudioBuffer,
    GetAudioBufferSize,
    SaveState,
    LoadState,
    Reset,
    Destroy,
    Malloc,
    Free,
}

impl Export {
    pub const ALL: [Export; 13] = [
        Export::Init,
        Export::LoadRom,
        Export::StepFrame,
        Export::SetButton,
        Export::GetFramebuffer,
        Export::GetAudioBuffer,
        Export::GetAudioBufferSize,
        Export::SaveState,
        Export::LoadState,
        Export::Reset,
        Export::Destroy,
        Export::Malloc,
        Export::Free,
    ];

    /// Bare, undecorated symbol name.
    pub const fn name(self) -> &'static str {
        match self {
            Export::Init => "init",
            Export::LoadRom => "load_rom",
            Export::StepFrame => "step_frame",
            Export::SetButton => "set_button",
            Export::GetFramebuffer => "get_framebuffer",
            Export::GetAudioBuffer => "get_audio_buffer",
            Export::GetAudioBufferSize => "get_audio_buffer_size",
            Export::SaveState => "save_state",
            Export::LoadState => "load_state",
            Export::Reset => "reset",
            Export::Destroy => "destroy",
            Export::Malloc => "malloc",
            Export::Free => "free",
        }
    }

    /// Whether a call into this export may grow linear memory.
    ///
    /// The C cores allocate while initialising and while loading ROM or state data, so those
    /// entry points are treated like the allocator itself.
    pub const fn may_grow_memory(self) -> bool {
        matches!(
            self,
            Export::Malloc
                | Export::Init
                | Export::LoadRom
                | Export::LoadState
                | Export::StepFrame
                | Export::Reset
        )
    }
}

impl fmt::Display for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The emulator core a module implements.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CoreKind {
    /// Game Boy (primary core).
    Gb,
    /// Game Boy Color.
    Gbc,
    /// Game Boy Advance.
    Gba,
}

impl CoreKind {
    pub const ALL: [CoreKind; 3] = [CoreKind::Gb, CoreKind::Gbc, CoreKind::Gba];

    pub const fn id(self) -> &'static str {
        match self {
            CoreKind::Gb => "gb",
            CoreKind::Gbc => "gbc",
            CoreKind::Gba => "gba",
        }
    }

    /// Symbol prefix used by core-prefixed builds.
    pub const fn prefix(self) -> &'static str {
        match self {
            CoreKind::Gb => "gb_",
            CoreKind::Gbc => "gbc_",
            CoreKind::Gba => "gba_",
        }
    }

    /// Display resolution `(width, height)` in pixels.
    pub const fn screen_size(self) -> (u32, u32) {
        match self {
            CoreKind::Gb | CoreKind::Gbc => (160, 144),
            CoreKind::Gba => (240, 160),
        }
    }

    /// Number of button ids the core understands (ids are `0..button_count`).
    pub const fn button_count(self) -> u8 {
        match self {
            CoreKind::Gb | CoreKind::Gbc => 8,
            CoreKind::Gba => 10,
        }
    }

    /// Persistence key for this core's save state.
    pub fn state_key(self) -> String {
        format!("{}_state", self.id())
    }
}

impl fmt::Display for CoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown core `{0}` (expected gb, gbc or gba)")]
pub struct UnknownCore(pub String);

impl FromStr for CoreKind {
    type Err = UnknownCore;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gb" => Ok(CoreKind::Gb),
            "gbc" => Ok(CoreKind::Gbc),
            "gba" => Ok(CoreKind::Gba),
            _ => Err(UnknownCore(s.to_string())),
        }
    }
}

/// Button ids passed to `set_button`.
///
/// Ids 0-7 are shared by every core; `L` and `R` only exist on the GBA.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Button {
    A = 0,
    B = 1,
    Select = 2,
    Start = 3,
    Right = 4,
    Left = 5,
    Up = 6,
    Down = 7,
    L = 8,
    R = 9,
}

impl Button {
    pub const ALL: [Button; 10] = [
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
        Button::Right,
        Button::Left,
        Button::Up,
        Button::Down,
        Button::L,
        Button::R,
    ];

    pub const fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Whether `core` has this button.
    pub const fn supported_by(self, core: CoreKind) -> bool {
        self.id() < core.button_count()
    }
}
