//! Tick orchestration.
//!
//! A [`Session`] ties one core to a display surface, an audio scheduler and the frame pacer.
//! Each logical tick runs, in this order: `step_frame`, framebuffer read and present, audio
//! read and enqueue. The core may reuse its buffers between steps, so the order is fixed.
//!
//! The async operations (ROM file reads, persistence) take `&mut self`, so no tick can run
//! while one is pending.

use std::path::Path;

use tracing::{error, info, warn};

use crate::abi::Button;
use crate::av::{AudioOutput, AudioScheduler, DisplaySurface};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::module::ModuleHandle;
use crate::pacing::{FramePacer, PaceOutcome, QueuedRepaints, RateObserver, RepaintScheduler};
use crate::storage::SaveStore;

pub struct Session<O, D, S = QueuedRepaints> {
    handle: Option<ModuleHandle>,
    audio: AudioScheduler<O>,
    pacer: FramePacer<S>,
    display: D,
}

impl<O, D> Session<O, D>
where
    O: AudioOutput,
    D: DisplaySurface,
{
    /// Session driven by a polling host.
    pub fn new(config: &BridgeConfig, display: D) -> Self {
        Self::with_scheduler(config, display, QueuedRepaints::default())
    }
}

impl<O, D, S> Session<O, D, S>
where
    O: AudioOutput,
    D: DisplaySurface,
    S: RepaintScheduler,
{
    pub fn with_scheduler(config: &BridgeConfig, display: D, scheduler: S) -> Self {
        Self {
            handle: None,
            audio: AudioScheduler::new(&config.audio),
            pacer: FramePacer::new(&config.pacing, scheduler),
            display,
        }
    }

    pub fn handle(&self) -> Option<&ModuleHandle> {
        self.handle.as_ref()
    }

    pub fn handle_mut(&mut self) -> Option<&mut ModuleHandle> {
        self.handle.as_mut()
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn audio(&self) -> &AudioScheduler<O> {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut AudioScheduler<O> {
        &mut self.audio
    }

    pub fn pacer(&self) -> &FramePacer<S> {
        &self.pacer
    }

    pub fn set_rate_observer(&mut self, observer: impl RateObserver + 'static) {
        self.pacer.set_rate_observer(observer);
    }

    fn module(&mut self) -> Result<&mut ModuleHandle> {
        self.handle.as_mut().ok_or(BridgeError::NoModule)
    }

    /// Make `handle` the active core. The previous core is destroyed.
    pub fn select_core(&mut self, mut handle: ModuleHandle) -> Result<()> {
        handle.initialize()?;
        info!(core = %handle.core(), "core selected");
        if let Some(mut previous) = self.handle.replace(handle) {
            if let Err(err) = previous.destroy() {
                warn!(core = %previous.core(), "failed to destroy previous core: {err}");
            }
        }
        self.audio.resync();
        Ok(())
    }

    /// Open the audio device. Call this from a user interaction.
    pub fn enable_audio(&mut self, open: impl FnOnce(u32) -> Result<O>) {
        self.audio.init(open);
    }

    pub fn set_audio_enabled(&mut self, enabled: bool) {
        self.audio.set_enabled(enabled);
    }

    /// Run one logical tick.
    pub fn tick(&mut self) -> Result<()> {
        let handle = self.handle.as_mut().ok_or(BridgeError::NoModule)?;
        run_tick(handle, &mut self.display, &mut self.audio)
    }

    /// Start pacing. Leaving Idle re-anchors the audio schedule on the device clock; starting
    /// an already running session changes nothing.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_none() {
            return Err(BridgeError::NoModule);
        }
        if self.pacer.is_running() {
            return Ok(());
        }
        self.audio.resync();
        self.pacer.start();
        Ok(())
    }

    pub fn stop(&mut self) {
        self.pacer.stop();
    }

    pub fn is_running(&self) -> bool {
        self.pacer.is_running()
    }

    /// Display refresh callback. A failing tick stops pacing and is returned.
    pub fn on_repaint(&mut self, t_ms: f64) -> Result<PaceOutcome> {
        let Self {
            handle,
            audio,
            pacer,
            display,
        } = self;

        let mut failure = None;
        let outcome = pacer.on_repaint(t_ms, |_delta| {
            if let Some(handle) = handle.as_mut() {
                if let Err(err) = run_tick(handle, display, audio) {
                    failure = Some(err);
                }
            }
        });

        match failure {
            Some(err) => {
                error!("tick failed, stopping: {err}");
                pacer.stop();
                Err(err)
            }
            None => Ok(outcome),
        }
    }

    /// Load a ROM image; `true` if the core accepted it.
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<bool> {
        Ok(self.module()?.load_rom(rom))
    }

    /// Read a ROM file and load it.
    pub async fn load_rom_file(&mut self, path: &Path) -> Result<bool> {
        if self.handle.is_none() {
            return Err(BridgeError::NoModule);
        }
        let rom = tokio::fs::read(path).await?;
        info!(path = %path.display(), bytes = rom.len(), "ROM file read");
        self.load_rom(&rom)
    }

    /// Snapshot the core into `store` under its state key.
    ///
    /// `false` if the core cannot save state.
    pub async fn save_to(&mut self, store: &mut impl SaveStore) -> Result<bool> {
        let handle = self.module()?;
        let key = handle.core().state_key();
        let Some(state) = handle.save_state()? else {
            warn!(%key, "core cannot save state");
            return Ok(false);
        };
        store.put(&key, &state).await?;
        info!(%key, bytes = state.len(), "state saved");
        Ok(true)
    }

    /// Restore the core from `store`. `false` if nothing is stored or the core rejects it.
    pub async fn load_from(&mut self, store: &impl SaveStore) -> Result<bool> {
        let key = self.module()?.core().state_key();
        let Some(record) = store.get(&key).await? else {
            warn!(%key, "no saved state found");
            return Ok(false);
        };
        let loaded = self.module()?.load_state(&record.data);
        info!(%key, loaded, "state restored");
        Ok(loaded)
    }

    pub fn press(&mut self, button: Button, pressed: bool) -> Result<bool> {
        self.module()?.set_button(button, pressed)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.module()?.reset()
    }

    /// Stop pacing, close audio and destroy the core.
    pub fn shutdown(&mut self) {
        self.pacer.stop();
        self.audio.cleanup();
        if let Some(mut handle) = self.handle.take() {
            if let Err(err) = handle.destroy() {
                warn!("failed to destroy core: {err}");
            }
        }
    }
}

fn run_tick<O: AudioOutput, D: DisplaySurface>(
    handle: &mut ModuleHandle,
    display: &mut D,
    audio: &mut AudioScheduler<O>,
) -> Result<()> {
    handle.step()?;

    if display.attached() {
        let (width, height) = handle.core().screen_size();
        if let Some(frame) = handle.current_frame(width, height)? {
            display.present(&frame);
        }
    }

    if let Some(samples) = handle.audio_samples()? {
        audio.enqueue(&samples);
    }
    Ok(())
}

#[cfg(test)]
mod tests;
