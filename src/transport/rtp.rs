// SPDX-License-Identifier: GPL-3.0-only

//! Uncompressed video over RTP (RFC 4175), one line segment per packet.

use super::{LineBuffer, TransportError, VideoTransport, WireFormat};
use std::{
    io::ErrorKind,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
};
use tracing::{debug, trace, warn};

const RTP_VERSION: u8 = 2;
const PAYLOAD_TYPE: u8 = 96;
const RTP_HEADER_LEN: usize = 12;
const EXT_SEQUENCE_LEN: usize = 2;
const LINE_HEADER_LEN: usize = 6;
/// Bytes per pixel group, 8 bit RGB/BGR samples.
const PGROUP: usize = 3;
const MAX_FIELD: u32 = 0x7fff;

pub const DEFAULT_MAX_PAYLOAD: usize = 1400;
/// Queued bytes after which packets go out before the frame is flushed.
const DEFAULT_SEND_THRESHOLD: usize = 4 * 1024 * 1024;
const MAX_POOLED_BUFFERS: usize = 16;

#[derive(Debug)]
pub struct RtpSession {
    socket: UdpSocket,
    destinations: Vec<SocketAddr>,
    format: WireFormat,
    ssrc: u32,
    sequence: u32,
    timestamp: u32,
    max_payload: usize,

    pool: Vec<LineBuffer>,
    queued: Vec<Vec<u8>>,
    queued_bytes: usize,
    send_threshold: usize,
    frame_packets: usize,
    frame_marker: bool,
}

impl RtpSession {
    /// Opens a session sending from `bind`, or from an ephemeral port on all interfaces.
    pub fn open(format: WireFormat, bind: Option<(&str, u16)>) -> Result<Self, TransportError> {
        let socket = match bind {
            Some(addr) => UdpSocket::bind(addr)?,
            None => UdpSocket::bind(("0.0.0.0", 0))?,
        };
        socket.set_nonblocking(true)?;
        debug!(local = ?socket.local_addr().ok(), ?format, "Opened RTP session");

        Ok(RtpSession {
            socket,
            destinations: Vec::new(),
            format,
            ssrc: rand::random(),
            sequence: rand::random::<u16>() as u32,
            timestamp: 0,
            max_payload: DEFAULT_MAX_PAYLOAD,
            pool: Vec::new(),
            queued: Vec::new(),
            queued_bytes: 0,
            send_threshold: DEFAULT_SEND_THRESHOLD,
            frame_packets: 0,
            frame_marker: false,
        })
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    fn segment_len(&self) -> usize {
        (self.max_payload - EXT_SEQUENCE_LEN - LINE_HEADER_LEN) / PGROUP * PGROUP
    }

    fn queue_packet(&mut self, row: u32, offset: u32, data: &[u8], marker: bool) {
        let mut packet =
            Vec::with_capacity(RTP_HEADER_LEN + EXT_SEQUENCE_LEN + LINE_HEADER_LEN + data.len());
        write_header(
            &mut packet,
            &PacketHeader {
                marker,
                sequence: self.sequence,
                timestamp: self.timestamp,
                ssrc: self.ssrc,
            },
        );
        packet.extend_from_slice(&(data.len() as u16).to_be_bytes());
        packet.extend_from_slice(&((row & MAX_FIELD) as u16).to_be_bytes());
        packet.extend_from_slice(&((offset & MAX_FIELD) as u16).to_be_bytes());
        packet.extend_from_slice(data);

        self.sequence = self.sequence.wrapping_add(1);
        self.queued_bytes += packet.len();
        self.queued.push(packet);
        self.frame_packets += 1;
        self.frame_marker |= marker;
    }

    /// Sends everything queued so far to every destination.
    fn send_queued(&mut self) -> Result<(), TransportError> {
        let packets = std::mem::take(&mut self.queued);
        self.queued_bytes = 0;
        if self.destinations.is_empty() {
            trace!(packets = packets.len(), "No destination, discarding packets");
            return Ok(());
        }

        let mut dropped = 0usize;
        let mut result = Ok(());
        for packet in &packets {
            for destination in &self.destinations {
                match self.socket.send_to(packet, destination) {
                    Ok(_) => {}
                    Err(err) if err.kind() == ErrorKind::WouldBlock => dropped += 1,
                    Err(err) => {
                        if result.is_ok() {
                            result = Err(TransportError::Io(err));
                        }
                    }
                }
            }
        }
        if dropped > 0 {
            warn!(dropped, "Socket buffer full, packets dropped");
        }
        result
    }

    fn recycle(&mut self, buffer: LineBuffer) {
        if self.pool.len() < MAX_POOLED_BUFFERS {
            self.pool.push(buffer);
        }
    }
}

impl VideoTransport for RtpSession {
    fn begin_frame(&mut self, timestamp: u32) {
        if !self.queued.is_empty() {
            warn!(
                packets = self.queued.len(),
                "Dropping packets of a frame that was never flushed"
            );
            self.queued.clear();
            self.queued_bytes = 0;
        }
        self.timestamp = timestamp;
        self.frame_packets = 0;
        self.frame_marker = false;
    }

    fn line_buffer(&mut self, length: usize) -> Result<LineBuffer, TransportError> {
        let mut buffer = self.pool.pop().unwrap_or_default();
        buffer.clear();
        buffer
            .try_reserve(length)
            .map_err(|_| TransportError::Exhausted(length))?;
        buffer.resize(length, 0);
        Ok(buffer)
    }

    fn add_line(
        &mut self,
        row: u32,
        offset: u32,
        buffer: LineBuffer,
        last: bool,
    ) -> Result<(), TransportError> {
        let pixels = (buffer.len() / PGROUP) as u32;
        if row > MAX_FIELD || offset.saturating_add(pixels.saturating_sub(1)) > MAX_FIELD {
            self.recycle(buffer);
            return Err(TransportError::OutOfRange { row, offset });
        }

        let segment_len = self.segment_len();
        let segments = buffer.len().div_ceil(segment_len).max(1);
        for (i, start) in (0..buffer.len().max(1)).step_by(segment_len).enumerate() {
            let end = (start + segment_len).min(buffer.len());
            let marker = last && i + 1 == segments;
            let pixel_offset = offset + (start / PGROUP) as u32;
            self.queue_packet(row, pixel_offset, &buffer[start..end], marker);
        }
        self.recycle(buffer);

        if self.queued_bytes >= self.send_threshold {
            self.send_queued()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        let result = self.send_queued();
        trace!(
            packets = self.frame_packets,
            marker = self.frame_marker,
            "Flushed frame"
        );
        result
    }

    fn video_format(&self) -> WireFormat {
        self.format
    }

    fn add_destination(&mut self, address: &str, port: u16) -> Result<(), TransportError> {
        let destination = (address, port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| TransportError::Address(format!("{}:{}", address, port)))?;
        debug!(%destination, "Added RTP destination");
        self.destinations.push(destination);
        Ok(())
    }

    fn set_ssrc(&mut self, ssrc: u32) {
        self.ssrc = ssrc;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub marker: bool,
    /// Extended sequence number, the upper half travels in the payload header.
    pub sequence: u32,
    pub timestamp: u32,
    pub ssrc: u32,
}

fn write_header(packet: &mut Vec<u8>, header: &PacketHeader) {
    packet.push(RTP_VERSION << 6);
    packet.push(((header.marker as u8) << 7) | PAYLOAD_TYPE);
    packet.extend_from_slice(&(header.sequence as u16).to_be_bytes());
    packet.extend_from_slice(&header.timestamp.to_be_bytes());
    packet.extend_from_slice(&header.ssrc.to_be_bytes());
    packet.extend_from_slice(&((header.sequence >> 16) as u16).to_be_bytes());
}

/// Parsed view of a packet produced by [`RtpSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPacket<'a> {
    pub header: PacketHeader,
    pub row: u32,
    pub offset: u32,
    pub data: &'a [u8],
}

pub fn parse_packet(packet: &[u8]) -> Option<ParsedPacket<'_>> {
    let header_len = RTP_HEADER_LEN + EXT_SEQUENCE_LEN + LINE_HEADER_LEN;
    if packet.len() < header_len || packet[0] >> 6 != RTP_VERSION {
        return None;
    }
    let be16 = |at: usize| u16::from_be_bytes([packet[at], packet[at + 1]]);
    let be32 = |at: usize| u32::from_be_bytes([packet[at], packet[at + 1], packet[at + 2], packet[at + 3]]);

    let length = be16(14) as usize;
    let data = packet.get(header_len..header_len + length)?;
    Some(ParsedPacket {
        header: PacketHeader {
            marker: packet[1] & 0x80 != 0,
            sequence: ((be16(12) as u32) << 16) | be16(2) as u32,
            timestamp: be32(4),
            ssrc: be32(8),
        },
        row: (be16(16) as u32) & MAX_FIELD,
        offset: (be16(18) as u32) & MAX_FIELD,
        data,
    })
}
