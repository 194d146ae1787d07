//! Data marshalling between host buffers and guest memory.
//!
//! Host-owned bytes (ROM images, save states) go in through the core's own allocator;
//! guest-owned bytes (save snapshots) come out as copies. Whatever the bridge allocates it
//! releases, on the failure paths too.

use tracing::{debug, error, info, warn};

use crate::abi::{Export, status_ok};
use crate::error::{BridgeError, Result};
use crate::memory::Region;
use crate::module::ModuleHandle;

impl ModuleHandle {
    /// Allocate `len` bytes in guest memory and run the growth checkpoint.
    fn allocate(&mut self, len: u32) -> Result<Region> {
        let allocation_error = BridgeError::Allocation {
            export: Export::Malloc,
            size: len as usize,
        };
        let Some(malloc) = self.exports.malloc.clone() else {
            return Err(allocation_error);
        };
        let ptr = self.guarded(Export::Malloc, |store| malloc.call(store, len))?;
        if ptr == 0 {
            return Err(allocation_error);
        }
        Ok(Region::new(ptr, len))
    }

    /// Copy `bytes` into freshly allocated guest memory.
    ///
    /// The caller owns the returned region and must release it.
    pub fn write_buffer(&mut self, bytes: &[u8]) -> Result<Region> {
        let len = u32::try_from(bytes.len()).map_err(|_| BridgeError::Allocation {
            export: Export::Malloc,
            size: bytes.len(),
        })?;
        let region = self.allocate(len)?;

        let written = self
            .views
            .current_view_mut(&mut self.store)
            .write(region.ptr, bytes);
        if let Err(err) = written {
            self.release(region);
            return Err(err);
        }
        Ok(region)
    }

    /// Return a host-owned region to the core's allocator.
    ///
    /// A missing `free` export leaks the region; that is logged, not raised.
    pub fn release(&mut self, region: Region) {
        let Some(free) = self.exports.free.clone() else {
            error!(
                ptr = region.ptr,
                len = region.len,
                "core has no free export, leaking guest allocation"
            );
            return;
        };
        if let Err(err) = self.guarded(Export::Free, |store| free.call(store, region.ptr)) {
            error!(ptr = region.ptr, "failed to release guest allocation: {err}");
        }
    }

    /// Copy `region` out of guest memory, then release it.
    pub fn read_and_release(&mut self, region: Region) -> Result<Vec<u8>> {
        let copied = self
            .views
            .current_view(&self.store)
            .slice(region)
            .map(<[u8]>::to_vec);
        self.release(region);
        copied
    }

    /// Write `bytes`, hand them to `export(ptr, len)`, always release, and check the status.
    fn marshal_in(&mut self, export: Export, bytes: &[u8]) -> Result<()> {
        let func = match export {
            Export::LoadRom => self.exports.load_rom.clone(),
            Export::LoadState => self.exports.load_state.clone(),
            _ => None,
        };
        let Some(func) = func else {
            return Err(BridgeError::ResolutionAbsent(export));
        };

        let region = self.write_buffer(bytes)?;
        let status = self.guarded(export, |store| func.call(store, (region.ptr, region.len)));
        self.release(region);

        match status? {
            status if status_ok(status) => Ok(()),
            status => Err(BridgeError::MarshalFailure { export, status }),
        }
    }

    /// Load a ROM image, initialising the core first if needed.
    pub fn try_load_rom(&mut self, rom: &[u8]) -> Result<()> {
        if !self.initialized {
            self.initialize()?;
        }
        self.marshal_in(Export::LoadRom, rom)?;
        info!(core = %self.core, bytes = rom.len(), "ROM loaded");
        Ok(())
    }

    /// Load a ROM image; `true` if the core accepted it.
    pub fn load_rom(&mut self, rom: &[u8]) -> bool {
        match self.try_load_rom(rom) {
            Ok(()) => true,
            Err(err) => {
                warn!(core = %self.core, "ROM load failed: {err}");
                false
            }
        }
    }

    /// Snapshot the core's state.
    ///
    /// Returns `Ok(None)` if the core has no `save_state` export. A snapshot larger than the
    /// scratch region means the core wrote past it; that is reported as
    /// [`BridgeError::SaveStateOverflow`] rather than truncated.
    pub fn save_state(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(save) = self.exports.save_state.clone() else {
            debug!(core = %self.core, "core has no save_state export");
            return Ok(None);
        };

        let capacity = self.save_state_scratch;
        let scratch = self.allocate(capacity)?;
        let size = match self.guarded(Export::SaveState, |store| save.call(store, scratch.ptr)) {
            Ok(size) => size,
            Err(err) => {
                self.release(scratch);
                return Err(err);
            }
        };

        if size > capacity {
            self.release(scratch);
            return Err(BridgeError::SaveStateOverflow { size, capacity });
        }

        let snapshot = self.read_and_release(Region::new(scratch.ptr, size))?;
        debug!(core = %self.core, bytes = snapshot.len(), "state saved");
        Ok(Some(snapshot))
    }

    /// Restore a snapshot produced by [`ModuleHandle::save_state`].
    pub fn try_load_state(&mut self, state: &[u8]) -> Result<()> {
        self.marshal_in(Export::LoadState, state)
    }

    /// Restore a snapshot; `true` if the core accepted it.
    pub fn load_state(&mut self, state: &[u8]) -> bool {
        match self.try_load_state(state) {
            Ok(()) => true,
            Err(err) => {
                warn!(core = %self.core, "state load failed: {err}");
                false
            }
        }
    }
}
