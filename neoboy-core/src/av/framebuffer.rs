//! Framebuffer delivery.

use tracing::trace;

use crate::abi::Export;
use crate::error::Result;
use crate::memory::Region;
use crate::module::ModuleHandle;

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// A frame borrowed from guest memory.
///
/// Rows are densely packed, top to bottom, each pixel `R, G, B, A`. The borrow ties the image
/// to its [`ModuleHandle`], so it cannot outlive the next call into the core. Use
/// [`PixelImage::to_owned_image`] to keep a copy.
#[derive(Copy, Clone)]
pub struct PixelImage<'a> {
    width: u32,
    height: u32,
    bytes: &'a [u8],
    generation: u64,
}

impl<'a> PixelImage<'a> {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Memory generation the frame was read at.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// One row of RGBA bytes, or `None` past the bottom edge.
    pub fn row(&self, y: u32) -> Option<&'a [u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride();
        self.bytes.get(start..start + self.stride())
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width {
            return None;
        }
        let offset = x as usize * BYTES_PER_PIXEL;
        let px = self.row(y)?.get(offset..offset + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Pack into `0x00RRGGBB` words, the layout most window surfaces take.
    pub fn to_xrgb8888(&self) -> Vec<u32> {
        self.bytes
            .chunks_exact(BYTES_PER_PIXEL)
            .map(|px| (px[0] as u32) << 16 | (px[1] as u32) << 8 | px[2] as u32)
            .collect()
    }

    pub fn to_owned_image(&self) -> OwnedImage {
        OwnedImage {
            width: self.width,
            height: self.height,
            rgba: self.bytes.to_vec(),
        }
    }
}

/// A frame copied out of guest memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl OwnedImage {
    pub fn as_image(&self) -> PixelImage<'_> {
        PixelImage {
            width: self.width,
            height: self.height,
            bytes: &self.rgba,
            generation: 0,
        }
    }
}

/// Where frames go.
pub trait DisplaySurface {
    /// Whether the surface can currently show frames. Delivery is skipped while detached.
    fn attached(&self) -> bool {
        true
    }

    fn present(&mut self, frame: &PixelImage<'_>);
}

impl ModuleHandle {
    /// Borrow the current frame as a `width` x `height` RGBA image.
    ///
    /// `Ok(None)` if the core has no framebuffer export or has not allocated one yet.
    pub fn current_frame(&mut self, width: u32, height: u32) -> Result<Option<PixelImage<'_>>> {
        let Some(get_framebuffer) = self.exports.get_framebuffer.clone() else {
            return Ok(None);
        };
        let ptr = self.guarded(Export::GetFramebuffer, |store| get_framebuffer.call(store, ()))?;
        if ptr == 0 {
            trace!("core returned a null framebuffer");
            return Ok(None);
        }
        // Accessors do not allocate, but the preceding step may have grown memory.
        self.views.refresh(&self.store);

        let len = width as usize * height as usize * BYTES_PER_PIXEL;
        let region = Region::new(ptr, u32::try_from(len).unwrap_or(u32::MAX));
        let view = self.views.current_view(&self.store);
        Ok(Some(PixelImage {
            width,
            height,
            bytes: view.slice(region)?,
            generation: view.generation(),
        }))
    }
}
