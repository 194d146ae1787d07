//! Audio output on the default device, via cpal and a ring buffer.
//!
//! The device clock is the number of frames the stream callback has rendered, silence
//! included. A chunk scheduled in the future is preceded by enough silence to land on the
//! requested frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};
use tracing::{debug, error, warn};

use super::audio::AudioOutput;
use crate::error::{BridgeError, Result};

/// Ring capacity in seconds of mono audio.
const RING_SECONDS: f64 = 0.5;

pub struct CpalOutput {
    producer: ringbuf::HeapProd<f32>,
    stream: Option<cpal::Stream>,
    frames_played: Arc<AtomicU64>,
    sample_rate: u32,
}

/// Consumer side, owned by the stream callback.
struct MonoSource {
    consumer: ringbuf::HeapCons<f32>,
    scratch: Vec<f32>,
    frames_played: Arc<AtomicU64>,
}

impl MonoSource {
    /// Pop one mono sample per output frame, padding with silence, and advance the clock.
    fn render(&mut self, frames: usize) -> &[f32] {
        if self.scratch.len() < frames {
            self.scratch.resize(frames, 0.0);
        }
        let popped = self.consumer.pop_slice(&mut self.scratch[..frames]);
        self.scratch[popped..frames].fill(0.0);
        self.frames_played.fetch_add(frames as u64, Ordering::Release);
        &self.scratch[..frames]
    }
}

fn device_error(context: &str, err: impl std::fmt::Display) -> BridgeError {
    BridgeError::DeviceInit(format!("{context}: {err}"))
}

impl CpalOutput {
    /// Open the default output device, preferring `requested_rate`.
    pub fn open(requested_rate: u32) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| BridgeError::DeviceInit("no audio output device available".into()))?;

        let supported = device
            .supported_output_configs()
            .ok()
            .and_then(|mut configs| {
                configs.find(|c| {
                    matches!(c.sample_format(), cpal::SampleFormat::F32 | cpal::SampleFormat::I16)
                        && c.min_sample_rate().0 <= requested_rate
                        && requested_rate <= c.max_sample_rate().0
                })
            })
            .map(|c| c.with_sample_rate(cpal::SampleRate(requested_rate)));
        let config = match supported {
            Some(config) => config,
            None => device
                .default_output_config()
                .map_err(|e| device_error("failed to get default output config", e))?,
        };

        let sample_rate = config.sample_rate().0;
        let channels = config.channels().max(1) as usize;
        let sample_format = config.sample_format();
        let stream_config: cpal::StreamConfig = config.into();

        let (mut output, mut source) = Self::ring(sample_rate);

        let on_error = |err: cpal::StreamError| error!("audio stream error: {err}");
        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mono = source.render(data.len() / channels);
                    for (frame, &sample) in data.chunks_exact_mut(channels).zip(mono) {
                        frame.fill(sample);
                    }
                },
                on_error,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let mono = source.render(data.len() / channels);
                    for (frame, &sample) in data.chunks_exact_mut(channels).zip(mono) {
                        frame.fill((sample * 32767.0).clamp(-32768.0, 32767.0) as i16);
                    }
                },
                on_error,
                None,
            ),
            other => {
                return Err(BridgeError::DeviceInit(format!(
                    "unsupported sample format: {other:?}"
                )));
            }
        }
        .map_err(|e| device_error("failed to build audio stream", e))?;

        stream
            .play()
            .map_err(|e| device_error("failed to start audio stream", e))?;
        debug!(sample_rate, channels, "audio stream started");

        output.stream = Some(stream);
        Ok(output)
    }

    /// Output half and stream half of a fresh ring, with no stream attached yet.
    fn ring(sample_rate: u32) -> (Self, MonoSource) {
        let capacity = (sample_rate as f64 * RING_SECONDS) as usize;
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let frames_played = Arc::new(AtomicU64::new(0));

        let source = MonoSource {
            consumer,
            scratch: vec![0.0; 4096],
            frames_played: Arc::clone(&frames_played),
        };
        let output = Self {
            producer,
            stream: None,
            frames_played,
            sample_rate,
        };
        (output, source)
    }

    fn played(&self) -> u64 {
        self.frames_played.load(Ordering::Acquire)
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.played() as f64 / self.sample_rate as f64
    }

    fn schedule(&mut self, samples: &[f32], start_time: f64) {
        let target = (start_time * self.sample_rate as f64).round().max(0.0) as u64;
        let queued_until = self.played() + self.producer.occupied_len() as u64;

        if target > queued_until {
            let gap = (target - queued_until) as usize;
            let silence = vec![0.0; gap.min(self.producer.vacant_len())];
            self.producer.push_slice(&silence);
        }

        let pushed = self.producer.push_slice(samples);
        if pushed < samples.len() {
            debug!(dropped = samples.len() - pushed, "audio ring full, dropping samples");
        }
    }

    fn suspend(&mut self) {
        if let Some(stream) = &self.stream {
            if let Err(err) = stream.pause() {
                warn!("failed to pause audio stream: {err}");
            }
        }
    }

    fn resume(&mut self) {
        if let Some(stream) = &self.stream {
            if let Err(err) = stream.play() {
                warn!("failed to resume audio stream: {err}");
            }
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                debug!("failed to pause audio stream before closing: {err}");
            }
        }
    }
}
