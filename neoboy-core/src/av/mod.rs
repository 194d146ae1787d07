//! Audio/video delivery from the core to the host.
//!
//! - Video: after `step_frame` the core exposes a densely packed RGBA8 framebuffer. The host
//!   borrows it straight out of guest memory as a [`PixelImage`] and hands it to a
//!   [`DisplaySurface`].
//!
//! - Audio: the core exposes a mono f32 buffer for the frame. The host copies it out and an
//!   [`AudioScheduler`] lays the chunks back to back on an [`AudioOutput`] clock.
//!
//! Both accessors are optional exports; a core without them simply produces no picture or
//! no sound.

pub mod audio;
#[cfg(feature = "cpal-output")]
pub mod cpal_output;
pub mod framebuffer;

pub use audio::{AudioOutput, AudioScheduler};
#[cfg(feature = "cpal-output")]
pub use cpal_output::CpalOutput;
pub use framebuffer::{DisplaySurface, OwnedImage, PixelImage};
