//! Generation-tagged views over guest linear memory.
//!
//! Growing a linear memory may reallocate its backing buffer, so a view taken before the
//! growth must never be read afterwards. [`MemoryViews`] enforces the checkpoint discipline:
//!
//! - before calling a growth-capable export, the caller marks the views stale with
//!   [`MemoryViews::note_growth_capable_call`];
//! - right after the call returns, the caller runs [`MemoryViews::after_possible_growth`];
//! - every view carries the generation it was taken at.
//!
//! Taking a view while stale is a programming error and trips a debug assertion. Release
//! builds log it and refresh instead of reading through a stale view.
//!
//! Views borrow the store, so the borrow checker already rules out holding one across a call
//! into the module. The generation tag lets tests and diagnostics observe refreshes.

use tracing::{debug, error, trace, warn};
use wasmtime::{Memory, Store};

use crate::error::{BridgeError, Result};
use crate::runtime::HostState;

/// A span of guest memory: `(ptr, len)` in bytes.
///
/// Regions returned by `malloc` are host-owned until freed. Regions returned by accessor
/// exports (`get_framebuffer`, `get_audio_buffer`) belong to the module and are only valid
/// for the current tick.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Region {
    pub ptr: u32,
    pub len: u32,
}

impl Region {
    pub const fn new(ptr: u32, len: u32) -> Self {
        Self { ptr, len }
    }

    fn range(self, memory: usize) -> Result<std::ops::Range<usize>> {
        let start = self.ptr as usize;
        let end = start + self.len as usize;
        if end > memory {
            return Err(BridgeError::OutOfBounds {
                ptr: self.ptr,
                len: self.len as usize,
                memory,
            });
        }
        Ok(start..end)
    }
}

/// Owns the generation counter for one linear memory.
pub struct MemoryViews {
    memory: Memory,
    generation: u64,
    byte_len: usize,
    stale: bool,
}

impl MemoryViews {
    pub fn new(memory: Memory, store: &Store<HostState>) -> Self {
        Self {
            memory,
            generation: 0,
            byte_len: memory.data_size(store),
            stale: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Size of the backing buffer as of the last refresh.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Record that a growth-capable export is about to run.
    pub fn note_growth_capable_call(&mut self) {
        self.stale = true;
    }

    /// Re-read the backing buffer and bump the generation.
    pub fn refresh(&mut self, store: &Store<HostState>) {
        self.byte_len = self.memory.data_size(store);
        self.generation += 1;
        self.stale = false;
        trace!(generation = self.generation, bytes = self.byte_len, "memory views refreshed");
    }

    /// Checkpoint to run immediately after any growth-capable export returns.
    pub fn after_possible_growth(&mut self, store: &Store<HostState>) {
        let before = self.byte_len;
        self.refresh(store);
        if self.byte_len != before {
            debug!(
                from = before,
                to = self.byte_len,
                generation = self.generation,
                "guest memory grew"
            );
        }
    }

    fn ensure_fresh(&mut self, store: &Store<HostState>) {
        debug_assert!(
            !self.stale,
            "guest memory accessed without a refresh after a growth-capable call"
        );
        if self.stale {
            error!("guest memory accessed without a refresh after a growth-capable call");
            self.refresh(store);
        } else if self.memory.data_size(store) != self.byte_len {
            warn!(
                previous = self.byte_len,
                "guest memory changed size outside a growth checkpoint"
            );
            self.refresh(store);
        }
    }

    /// Read-only view valid as of the last refresh.
    pub fn current_view<'a>(&mut self, store: &'a Store<HostState>) -> MemoryView<'a> {
        self.ensure_fresh(store);
        MemoryView {
            bytes: self.memory.data(store),
            generation: self.generation,
        }
    }

    /// Writable view valid as of the last refresh.
    pub fn current_view_mut<'a>(&mut self, store: &'a mut Store<HostState>) -> MemoryViewMut<'a> {
        self.ensure_fresh(store);
        MemoryViewMut {
            bytes: self.memory.data_mut(store),
            generation: self.generation,
        }
    }
}

/// Read-only window over guest memory.
#[derive(Copy, Clone)]
pub struct MemoryView<'a> {
    bytes: &'a [u8],
    generation: u64,
}

impl<'a> MemoryView<'a> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow `region` out of guest memory.
    pub fn slice(&self, region: Region) -> Result<&'a [u8]> {
        let bytes: &'a [u8] = self.bytes;
        Ok(&bytes[region.range(bytes.len())?])
    }

    /// Decode `count` little-endian f32 values starting at `ptr`.
    pub fn read_f32s(&self, ptr: u32, count: u32) -> Result<Vec<f32>> {
        let len = count
            .checked_mul(4)
            .ok_or(BridgeError::OutOfBounds {
                ptr,
                len: count as usize * 4,
                memory: self.bytes.len(),
            })?;
        let bytes = self.slice(Region::new(ptr, len))?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

/// Writable window over guest memory.
pub struct MemoryViewMut<'a> {
    bytes: &'a mut [u8],
    generation: u64,
}

impl MemoryViewMut<'_> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Copy `data` into guest memory at `ptr`.
    pub fn write(&mut self, ptr: u32, data: &[u8]) -> Result<()> {
        let len = u32::try_from(data.len()).map_err(|_| BridgeError::OutOfBounds {
            ptr,
            len: data.len(),
            memory: self.bytes.len(),
        })?;
        let range = Region::new(ptr, len).range(self.bytes.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }
}
