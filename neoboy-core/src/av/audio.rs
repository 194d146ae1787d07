//! Audio sample scheduling.
//!
//! The core produces one chunk of mono f32 samples per frame. Each chunk is scheduled at an
//! explicit start time on the device clock, right where the previous one ends, so playback is
//! gapless as long as the host keeps up. When it falls behind, the schedule jumps forward to
//! `now + lead` instead of piling chunks up in the past.

use tracing::{debug, error, info, warn};

use crate::abi::Export;
use crate::config::AudioConfig;
use crate::error::Result;
use crate::module::ModuleHandle;

/// An output device with its own clock.
pub trait AudioOutput {
    fn sample_rate(&self) -> u32;

    /// Device clock in seconds.
    fn current_time(&self) -> f64;

    /// Play `samples` starting at `start_time` on the device clock.
    fn schedule(&mut self, samples: &[f32], start_time: f64);

    fn suspend(&mut self);

    fn resume(&mut self);

    /// Release the device. No further calls follow.
    fn close(&mut self);
}

/// Lays audio chunks back to back on an [`AudioOutput`].
pub struct AudioScheduler<O> {
    output: Option<O>,
    next_start: f64,
    lead: f64,
    requested_rate: u32,
    enabled: bool,
    closed: bool,
}

impl<O: AudioOutput> AudioScheduler<O> {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            output: None,
            next_start: 0.0,
            lead: config.lead_ms / 1000.0,
            requested_rate: config.sample_rate,
            enabled: config.enabled,
            closed: false,
        }
    }

    /// Open the device. Call this in response to a user interaction.
    ///
    /// Idempotent; a failing `open` is logged and leaves audio disabled.
    pub fn init(&mut self, open: impl FnOnce(u32) -> Result<O>) {
        if self.output.is_some() {
            return;
        }
        match open(self.requested_rate) {
            Ok(mut output) => {
                if output.sample_rate() != self.requested_rate {
                    warn!(
                        requested = self.requested_rate,
                        actual = output.sample_rate(),
                        "audio device runs at a different rate"
                    );
                }
                if !self.enabled {
                    output.suspend();
                }
                self.next_start = output.current_time();
                self.closed = false;
                info!(sample_rate = output.sample_rate(), "audio output initialised");
                self.output = Some(output);
            }
            Err(err) => {
                error!("failed to initialise audio output: {err}");
                self.enabled = false;
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.output.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start time the next chunk will be scheduled at, absent an underrun.
    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    pub fn output(&self) -> Option<&O> {
        self.output.as_ref()
    }

    pub fn output_mut(&mut self) -> Option<&mut O> {
        self.output.as_mut()
    }

    /// Schedule one chunk and return the start time it was given.
    ///
    /// `None` if audio is uninitialised, disabled or `samples` is empty.
    pub fn enqueue(&mut self, samples: &[f32]) -> Option<f64> {
        if !self.enabled || samples.is_empty() {
            return None;
        }
        let output = self.output.as_mut()?;

        let now = output.current_time();
        if self.next_start < now {
            debug!(
                behind_ms = (now - self.next_start) * 1000.0,
                "audio underrun, resynchronising"
            );
            self.next_start = now + self.lead;
        }

        let start = self.next_start;
        output.schedule(samples, start);
        self.next_start += samples.len() as f64 / output.sample_rate() as f64;
        Some(start)
    }

    /// Suspend or resume playback without closing the device.
    ///
    /// The schedule is left alone; a stale `next_start` is caught by the underrun check in
    /// [`AudioScheduler::enqueue`].
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if let Some(output) = self.output.as_mut() {
            if enabled {
                output.resume();
            } else {
                output.suspend();
            }
        }
        debug!(enabled, "audio toggled");
    }

    /// Re-anchor the schedule on the device clock.
    pub fn resync(&mut self) {
        if let Some(output) = self.output.as_ref() {
            self.next_start = output.current_time();
        }
    }

    /// Close the device. A later [`AudioScheduler::init`] opens a fresh one.
    pub fn cleanup(&mut self) {
        if let Some(mut output) = self.output.take() {
            output.close();
            self.closed = true;
            info!("audio output closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl ModuleHandle {
    /// Copy this frame's audio samples out of the core.
    ///
    /// `Ok(None)` if either audio export is missing.
    pub fn audio_samples(&mut self) -> Result<Option<Vec<f32>>> {
        let (Some(get_buffer), Some(get_size)) = (
            self.exports.get_audio_buffer.clone(),
            self.exports.get_audio_buffer_size.clone(),
        ) else {
            return Ok(None);
        };

        let ptr = self.guarded(Export::GetAudioBuffer, |store| get_buffer.call(store, ()))?;
        let count = self.guarded(Export::GetAudioBufferSize, |store| get_size.call(store, ()))?;
        if ptr == 0 || count == 0 {
            return Ok(Some(Vec::new()));
        }
        self.views.refresh(&self.store);

        let samples = self.views.current_view(&self.store).read_f32s(ptr, count)?;
        Ok(Some(samples))
    }
}
