// SPDX-License-Identifier: GPL-3.0-only

use super::shadow::{ShadowSurface, BYTES_PER_PIXEL};
use crate::{transport::VideoTransport, utils::geometry::Rectangle};
use std::time::Duration;
use tracing::{trace, warn};

/// Ticks per second of the transport timestamps.
pub const TIMESTAMP_RATE: u64 = 25;

/// Quantizes a presentation clock reading to the transport time base.
pub fn frame_timestamp(time: Duration) -> u32 {
    let ticks = time.as_secs() * TIMESTAMP_RATE
        + u64::from(time.subsec_nanos()) / (1_000_000_000 / TIMESTAMP_RATE);
    ticks as u32
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EncodeStats {
    pub lines: usize,
    pub skipped: usize,
    pub bytes: usize,
}

/// Streams the rows of `region` as one transport frame.
///
/// The region is clamped to the surface first; nothing is sent if that leaves it empty.
/// Rows that cannot get a line buffer are dropped, the frame is still flushed.
pub fn encode_region(
    surface: &ShadowSurface,
    region: Rectangle,
    transport: &mut dyn VideoTransport,
    timestamp: u32,
) -> EncodeStats {
    let mut stats = EncodeStats::default();
    let region = region.clamp_to(surface.size());
    if region.is_empty() {
        return stats;
    }

    let length = region.width() as usize * BYTES_PER_PIXEL;
    let last_row = region.y2 - 1;

    transport.begin_frame(timestamp);
    for y in region.y1..region.y2 {
        let mut buffer = match transport.line_buffer(length) {
            Ok(buffer) => buffer,
            Err(err) => {
                warn!(?err, row = y, "Could not get line buffer");
                stats.skipped += 1;
                continue;
            }
        };
        buffer.clear();
        buffer.extend_from_slice(surface.line(region.x1, y, length));

        match transport.add_line(y as u32, region.x1 as u32, buffer, y == last_row) {
            Ok(()) => {
                stats.lines += 1;
                stats.bytes += length;
            }
            Err(err) => {
                warn!(?err, row = y, "Failed to queue line");
                stats.skipped += 1;
            }
        }
    }
    if let Err(err) = transport.flush() {
        warn!(?err, "Failed to flush frame");
    }

    trace!(%region, ?stats, "Encoded region");
    stats
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::{
        test::{Call, RecordingTransport},
        WireFormat,
    };
    use drm_fourcc::DrmFourcc;

    fn surface(w: i32, h: i32) -> ShadowSurface {
        let mut surface = ShadowSurface::new((w, h).into(), DrmFourcc::Bgr888).unwrap();
        for y in 0..h {
            for x in 0..w {
                surface.put_pixel(x, y, [x as u8, y as u8, 0xaa]);
            }
        }
        surface
    }

    #[test]
    fn timestamps() {
        assert_eq!(frame_timestamp(Duration::ZERO), 0);
        assert_eq!(frame_timestamp(Duration::from_secs(2)), 50);
        assert_eq!(frame_timestamp(Duration::from_millis(2_039)), 50);
        assert_eq!(frame_timestamp(Duration::from_millis(2_040)), 51);
        assert_eq!(frame_timestamp(Duration::from_millis(2_999)), 74);
    }

    #[test]
    fn full_frame() {
        let surface = surface(640, 480);
        let mut transport = RecordingTransport::new(WireFormat::Rgb8);
        let stats = encode_region(
            &surface,
            Rectangle::new(0, 0, 640, 480),
            &mut transport,
            7,
        );

        assert_eq!(stats.lines, 480);
        assert_eq!(stats.skipped, 0);
        let lines = transport.lines();
        assert_eq!(lines.len(), 480);
        for (i, (row, offset, len, last)) in lines.iter().enumerate() {
            assert_eq!(*row, i as u32);
            assert_eq!(*offset, 0);
            assert_eq!(*len, 1920);
            assert_eq!(*last, i == 479);
        }
        let calls = transport.calls.borrow();
        assert_eq!(calls.first(), Some(&Call::Begin(7)));
        assert_eq!(calls.last(), Some(&Call::Flush));
        assert_eq!(calls.iter().filter(|c| matches!(c, Call::Begin(_))).count(), 1);
        assert_eq!(calls.iter().filter(|c| **c == Call::Flush).count(), 1);
    }

    #[test]
    fn partial_region_copies_the_right_bytes() {
        let surface = surface(32, 16);
        let mut transport = RecordingTransport::new(WireFormat::Rgb8);
        encode_region(&surface, Rectangle::new(4, 3, 7, 5), &mut transport, 0);

        let calls = transport.calls.borrow();
        let lines = calls
            .iter()
            .filter_map(|call| match call {
                Call::Line { row, offset, data, last } => Some((*row, *offset, data.clone(), *last)),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![
                (3, 4, vec![4, 3, 0xaa, 5, 3, 0xaa, 6, 3, 0xaa], false),
                (4, 4, vec![4, 4, 0xaa, 5, 4, 0xaa, 6, 4, 0xaa], true),
            ]
        );
    }

    #[test]
    fn skipped_rows_keep_framing() {
        let surface = surface(10, 10);
        let mut transport = RecordingTransport::new(WireFormat::Rgb8);
        transport.fail_buffers.borrow_mut().extend([0, 3, 5]);
        let stats = encode_region(&surface, Rectangle::new(0, 2, 10, 8), &mut transport, 0);

        assert_eq!(stats.lines, 3);
        assert_eq!(stats.skipped, 3);
        let rows = transport
            .lines()
            .into_iter()
            .map(|(row, _, _, last)| (row, last))
            .collect::<Vec<_>>();
        assert_eq!(rows, vec![(3, false), (4, false), (6, false)]);
        assert_eq!(transport.count(|c| matches!(c, Call::Begin(_))), 1);
        assert_eq!(transport.count(|c| *c == Call::Flush), 1);
    }

    #[test]
    fn last_row_failure_still_flushes() {
        let surface = surface(4, 4);
        let mut transport = RecordingTransport::new(WireFormat::Rgb8);
        transport.fail_buffers.borrow_mut().insert(3);
        encode_region(&surface, Rectangle::from_size(surface.size()), &mut transport, 0);

        assert!(transport.lines().iter().all(|(_, _, _, last)| !last));
        assert_eq!(transport.count(|c| *c == Call::Flush), 1);
    }

    #[test]
    fn clamps_to_surface() {
        let surface = surface(8, 8);
        let mut transport = RecordingTransport::new(WireFormat::Rgb8);
        encode_region(&surface, Rectangle::new(-4, 6, 20, 30), &mut transport, 0);
        assert_eq!(
            transport.lines(),
            vec![(6, 0, 24, false), (7, 0, 24, true)]
        );

        let mut transport = RecordingTransport::new(WireFormat::Rgb8);
        let stats = encode_region(&surface, Rectangle::new(8, 8, 9, 9), &mut transport, 0);
        assert_eq!(stats, EncodeStats::default());
        assert!(transport.calls.borrow().is_empty());
    }
}
