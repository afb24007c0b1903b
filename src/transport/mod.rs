// SPDX-License-Identifier: GPL-3.0-only

use rtpvideo_comp_config::ColorSpace;
use std::io;

pub mod rtp;

pub use self::rtp::RtpSession;

/// Pixel component order of the scanlines a session puts on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireFormat {
    Rgb8,
    Rgba8,
    Bgr8,
    Bgra8,
}

impl From<ColorSpace> for WireFormat {
    fn from(space: ColorSpace) -> Self {
        match space {
            ColorSpace::Rgb => WireFormat::Rgb8,
            ColorSpace::Argb => WireFormat::Rgba8,
            ColorSpace::Bgr => WireFormat::Bgr8,
            ColorSpace::Abgr => WireFormat::Bgra8,
        }
    }
}

/// Scratch memory for a single scanline, handed out by [`VideoTransport::line_buffer`].
pub type LineBuffer = Vec<u8>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("No line buffer available ({0} bytes requested)")]
    Exhausted(usize),
    #[error("Line {row} offset {offset} is out of range for the payload format")]
    OutOfRange { row: u32, offset: u32 },
    #[error("Invalid destination {0}")]
    Address(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A scanline based video session, one per output.
///
/// A frame is opened with [`begin_frame`](Self::begin_frame), filled with lines in
/// increasing row order and closed with [`flush`](Self::flush).
pub trait VideoTransport {
    fn begin_frame(&mut self, timestamp: u32);
    fn line_buffer(&mut self, length: usize) -> Result<LineBuffer, TransportError>;
    /// Queues `buffer` as row `row` starting at pixel column `offset`. `last` marks the final
    /// line of the frame.
    fn add_line(
        &mut self,
        row: u32,
        offset: u32,
        buffer: LineBuffer,
        last: bool,
    ) -> Result<(), TransportError>;
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Format negotiated when the session was opened.
    fn video_format(&self) -> WireFormat;
    fn add_destination(&mut self, address: &str, port: u16) -> Result<(), TransportError>;
    fn set_ssrc(&mut self, ssrc: u32);
}
