//! Capture sinks: a display that keeps the last frame and an audio device with a virtual clock.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use neoboy_core::{AudioOutput, DisplaySurface, OwnedImage, PixelImage};

/// Keeps a copy of the most recent frame.
#[derive(Default)]
pub struct PngCapture {
    last: Option<OwnedImage>,
    presented: u64,
}

impl PngCapture {
    pub fn last_frame(&self) -> Option<&OwnedImage> {
        self.last.as_ref()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Write the last frame as an RGBA PNG.
    pub fn write_png(&self, path: &Path) -> Result<()> {
        let frame = self.last.as_ref().context("no frame was presented")?;
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;

        let mut encoder = png::Encoder::new(BufWriter::new(file), frame.width, frame.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&frame.rgba)?;
        writer.finish()?;
        Ok(())
    }
}

impl DisplaySurface for PngCapture {
    fn present(&mut self, frame: &PixelImage<'_>) {
        self.presented += 1;
        match self.last.as_mut() {
            Some(last) if last.width == frame.width() && last.height == frame.height() => {
                last.rgba.copy_from_slice(frame.bytes());
            }
            _ => self.last = Some(frame.to_owned_image()),
        }
    }
}

/// Audio device whose clock is advanced by the caller.
///
/// Scheduled chunks are written into a timeline at their start sample, so gaps come out as
/// silence and late chunks overwrite what was there.
pub struct WavCapture {
    sample_rate: u32,
    now: f64,
    timeline: Vec<f32>,
    suspended: bool,
}

impl WavCapture {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            now: 0.0,
            timeline: Vec::new(),
            suspended: false,
        }
    }

    /// Move the device clock to `seconds`.
    pub fn set_time(&mut self, seconds: f64) {
        self.now = seconds;
    }

    pub fn samples(&self) -> &[f32] {
        &self.timeline
    }

    /// Write everything captured so far as a mono 32-bit float WAV.
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("failed to create {}", path.display()))?;
        for &sample in &self.timeline {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

impl AudioOutput for WavCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.now
    }

    fn schedule(&mut self, samples: &[f32], start_time: f64) {
        if self.suspended {
            return;
        }
        let start = (start_time * self.sample_rate as f64).round().max(0.0) as usize;
        let end = start + samples.len();
        if self.timeline.len() < end {
            self.timeline.resize(end, 0.0);
        }
        self.timeline[start..end].copy_from_slice(samples);
    }

    fn suspend(&mut self) {
        self.suspended = true;
    }

    fn resume(&mut self) {
        self.suspended = false;
    }

    fn close(&mut self) {}
}
