// SPDX-License-Identifier: GPL-3.0-only

use crate::{
    transport::WireFormat,
    utils::geometry::{Rectangle, Size},
};
use drm_fourcc::DrmFourcc;
use std::collections::TryReserveError;

/// Every format the shadow surface uses is stored packed with three bytes per pixel.
/// Alpha never reaches the wire, formats that carry it simply drop it.
pub const BYTES_PER_PIXEL: usize = 3;

/// Memory layout of the shadow surface for a negotiated wire format.
pub fn wire_format_to_layout(format: WireFormat) -> DrmFourcc {
    match format {
        WireFormat::Rgb8 => DrmFourcc::Bgr888,
        WireFormat::Rgba8 => DrmFourcc::Abgr8888,
        WireFormat::Bgr8 => DrmFourcc::Rgb888,
        WireFormat::Bgra8 => DrmFourcc::Argb8888,
    }
}

/// Byte order of the three color samples in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

impl ChannelOrder {
    fn for_format(format: DrmFourcc) -> Result<Self, SurfaceError> {
        // fourcc codes are little endian, `Bgr888` puts red in the lowest byte
        match format {
            DrmFourcc::Bgr888 | DrmFourcc::Abgr8888 => Ok(ChannelOrder::Rgb),
            DrmFourcc::Rgb888 | DrmFourcc::Argb8888 => Ok(ChannelOrder::Bgr),
            format => Err(SurfaceError::UnsupportedFormat(format)),
        }
    }

    fn encode(self, [r, g, b]: [u8; 3]) -> [u8; 3] {
        match self {
            ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Bgr => [b, g, r],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("Failed to allocate shadow surface")]
    Alloc(#[from] TryReserveError),
    #[error("Invalid shadow surface size {0}")]
    Size(Size),
    #[error("Unsupported shadow surface format {0:?}")]
    UnsupportedFormat(DrmFourcc),
}

/// Offscreen framebuffer the scene is rendered into before it is streamed.
pub struct ShadowSurface {
    size: Size,
    format: DrmFourcc,
    order: ChannelOrder,
    data: Vec<u8>,
}

impl std::fmt::Debug for ShadowSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowSurface")
            .field("size", &self.size)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl ShadowSurface {
    /// Allocates a zero filled surface.
    pub fn new(size: Size, format: DrmFourcc) -> Result<Self, SurfaceError> {
        let order = ChannelOrder::for_format(format)?;
        let len = (size.w > 0 && size.h > 0)
            .then(|| (size.w as usize).checked_mul(size.h as usize))
            .flatten()
            .and_then(|pixels| pixels.checked_mul(BYTES_PER_PIXEL))
            .ok_or(SurfaceError::Size(size))?;

        let mut data = Vec::new();
        data.try_reserve_exact(len)?;
        data.resize(len, 0);

        Ok(ShadowSurface {
            size,
            format,
            order,
            data,
        })
    }

    /// Creates a surface with new dimensions and layout, carrying over the content of
    /// `self` that overlaps with it (aligned at the origin). The rest stays zero.
    pub fn reformat(&self, size: Size, format: DrmFourcc) -> Result<Self, SurfaceError> {
        let mut new = ShadowSurface::new(size, format)?;
        let overlap = self.size.min(size);
        let len = overlap.w as usize * BYTES_PER_PIXEL;
        for y in 0..overlap.h {
            let src = &self.data[self.row_start(y)..][..len];
            let dst_start = new.row_start(y);
            let dst = &mut new.data[dst_start..][..len];
            if self.order == new.order {
                dst.copy_from_slice(src);
            } else {
                for (dst, src) in dst
                    .chunks_exact_mut(BYTES_PER_PIXEL)
                    .zip(src.chunks_exact(BYTES_PER_PIXEL))
                {
                    dst.copy_from_slice(&[src[2], src[1], src[0]]);
                }
            }
        }
        Ok(new)
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn format(&self) -> DrmFourcc {
        self.format
    }

    pub fn stride(&self) -> usize {
        self.size.w as usize * BYTES_PER_PIXEL
    }

    fn row_start(&self, y: i32) -> usize {
        y as usize * self.stride()
    }

    fn offset(&self, x: i32, y: i32) -> usize {
        self.row_start(y) + x as usize * BYTES_PER_PIXEL
    }

    /// `len` bytes of row `y` starting at column `x`. Callers keep the span in bounds.
    pub fn line(&self, x: i32, y: i32, len: usize) -> &[u8] {
        &self.data[self.offset(x, y)..][..len]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Color at (`x`, `y`) as `[r, g, b]`.
    pub fn pixel(&self, x: i32, y: i32) -> [u8; 3] {
        let offset = self.offset(x, y);
        let stored = [self.data[offset], self.data[offset + 1], self.data[offset + 2]];
        // the swap is its own inverse
        self.order.encode(stored)
    }

    pub fn put_pixel(&mut self, x: i32, y: i32, rgb: [u8; 3]) {
        let offset = self.offset(x, y);
        self.data[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&self.order.encode(rgb));
    }

    /// Fills the part of `rect` inside the surface with `rgb`.
    pub fn fill(&mut self, rect: Rectangle, rgb: [u8; 3]) {
        let rect = rect.clamp_to(self.size);
        let encoded = self.order.encode(rgb);
        for y in rect.y1..rect.y2 {
            let start = self.offset(rect.x1, y);
            let end = start + rect.width() as usize * BYTES_PER_PIXEL;
            for pixel in self.data[start..end].chunks_exact_mut(BYTES_PER_PIXEL) {
                pixel.copy_from_slice(&encoded);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn gradient(size: Size, format: DrmFourcc) -> ShadowSurface {
        let mut surface = ShadowSurface::new(size, format).unwrap();
        for y in 0..size.h {
            for x in 0..size.w {
                surface.put_pixel(x, y, [x as u8, y as u8, (x + y) as u8]);
            }
        }
        surface
    }

    #[test]
    fn layouts() {
        assert_eq!(wire_format_to_layout(WireFormat::Rgb8), DrmFourcc::Bgr888);
        assert_eq!(wire_format_to_layout(WireFormat::Rgba8), DrmFourcc::Abgr8888);
        assert_eq!(wire_format_to_layout(WireFormat::Bgr8), DrmFourcc::Rgb888);
        assert_eq!(wire_format_to_layout(WireFormat::Bgra8), DrmFourcc::Argb8888);

        let mut rgb = ShadowSurface::new((1, 1).into(), DrmFourcc::Bgr888).unwrap();
        rgb.put_pixel(0, 0, [1, 2, 3]);
        assert_eq!(rgb.as_bytes(), &[1, 2, 3]);

        let mut bgr = ShadowSurface::new((1, 1).into(), DrmFourcc::Argb8888).unwrap();
        bgr.put_pixel(0, 0, [1, 2, 3]);
        assert_eq!(bgr.as_bytes(), &[3, 2, 1]);
        assert_eq!(bgr.pixel(0, 0), [1, 2, 3]);
    }

    #[test]
    fn new_is_zeroed() {
        let surface = ShadowSurface::new((640, 480).into(), DrmFourcc::Bgr888).unwrap();
        assert_eq!(surface.as_bytes().len(), 640 * 480 * 3);
        assert_eq!(surface.stride(), 1920);
        assert!(surface.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn invalid() {
        assert!(matches!(
            ShadowSurface::new((0, 480).into(), DrmFourcc::Bgr888),
            Err(SurfaceError::Size(_))
        ));
        assert!(matches!(
            ShadowSurface::new((-4, 4).into(), DrmFourcc::Bgr888),
            Err(SurfaceError::Size(_))
        ));
        assert!(matches!(
            ShadowSurface::new((4, 4).into(), DrmFourcc::Nv12),
            Err(SurfaceError::UnsupportedFormat(DrmFourcc::Nv12))
        ));
    }

    #[test]
    fn reformat_preserves_overlap() {
        let sizes: [(i32, i32); 4] = [(16, 8), (8, 16), (20, 20), (4, 4)];
        for &(w1, h1) in &sizes {
            for &(w2, h2) in &sizes {
                let old = gradient((w1, h1).into(), DrmFourcc::Bgr888);
                let new = old.reformat((w2, h2).into(), DrmFourcc::Bgr888).unwrap();
                assert_eq!(new.size(), Size::new(w2, h2));
                for y in 0..h2 {
                    for x in 0..w2 {
                        let expected = if x < w1.min(w2) && y < h1.min(h2) {
                            old.pixel(x, y)
                        } else {
                            [0, 0, 0]
                        };
                        assert_eq!(new.pixel(x, y), expected, "{w1}x{h1} -> {w2}x{h2} at {x},{y}");
                    }
                }
            }
        }
    }

    #[test]
    fn reformat_converts_channel_order() {
        let old = gradient((6, 3).into(), DrmFourcc::Bgr888);
        let new = old.reformat((6, 3).into(), DrmFourcc::Rgb888).unwrap();
        assert_eq!(new.format(), DrmFourcc::Rgb888);
        for y in 0..3 {
            for x in 0..6 {
                assert_eq!(new.pixel(x, y), old.pixel(x, y));
            }
        }
        assert_eq!(new.line(1, 0, 3), &[1, 0, 1]);
        assert_ne!(new.as_bytes(), old.as_bytes());
    }

    #[test]
    fn fill_clamps() {
        let mut surface = ShadowSurface::new((4, 4).into(), DrmFourcc::Bgr888).unwrap();
        surface.fill(Rectangle::new(2, 2, 10, 10), [9, 9, 9]);
        assert_eq!(surface.pixel(3, 3), [9, 9, 9]);
        assert_eq!(surface.pixel(1, 3), [0, 0, 0]);
    }
}
