//! RTP packet encoding/decoding and payload packetization.
//!
//! RTP header format (RFC 3550):
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           synchronization source (SSRC) identifier            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use std::io;
use std::time::Duration;

use crate::error::{Result, SessionError};

/// Minimum RTP header size in bytes (no CSRC, no extension).
pub const RTP_HEADER_SIZE: usize = 12;

/// Largest RTP payload produced by the packetizers.
pub const MTU: usize = 1200;

/// Parsed RTP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload: Vec<u8>,
}

/// Compute the full RTP header length from raw packet bytes.
///
/// Accounts for CSRC entries and header extensions (RFC 3550 §5.3.1).
/// Returns `None` if the packet is too short.
pub fn full_header_len(data: &[u8]) -> Option<usize> {
    if data.len() < RTP_HEADER_SIZE {
        return None;
    }
    let csrc_count = (data[0] & 0x0F) as usize;
    let has_extension = data[0] & 0x10 != 0;
    let mut len = RTP_HEADER_SIZE + csrc_count * 4;
    if data.len() < len {
        return None;
    }
    if has_extension {
        // 2 bytes profile + 2 bytes length in 32-bit words
        if data.len() < len + 4 {
            return None;
        }
        let ext_words = u16::from_be_bytes([data[len + 2], data[len + 3]]) as usize;
        len += 4 + ext_words * 4;
        if data.len() < len {
            return None;
        }
    }
    Some(len)
}

/// Encode an RTP packet into bytes (no CSRC, no extension).
pub fn encode(packet: &RtpPacket) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RTP_HEADER_SIZE + packet.payload.len());
    buf.push(0x80);
    let marker = if packet.marker { 0x80 } else { 0 };
    buf.push(marker | (packet.payload_type & 0x7F));
    buf.extend_from_slice(&packet.sequence_number.to_be_bytes());
    buf.extend_from_slice(&packet.timestamp.to_be_bytes());
    buf.extend_from_slice(&packet.ssrc.to_be_bytes());
    buf.extend_from_slice(&packet.payload);
    buf
}

/// Decode bytes into an RTP packet, dropping CSRCs, extensions and padding.
pub fn decode(data: &[u8]) -> Result<RtpPacket> {
    if data.len() < RTP_HEADER_SIZE {
        return Err(SessionError::parse(format!("RTP packet too short: {} bytes", data.len())));
    }

    let version = data[0] >> 6;
    if version != 2 {
        return Err(SessionError::parse(format!("unsupported RTP version {}", version)));
    }

    let header_len = full_header_len(data)
        .ok_or_else(|| SessionError::parse(format!("RTP header truncated: {} bytes", data.len())))?;

    let mut end = data.len();
    if data[0] & 0x20 != 0 {
        let pad = data[end - 1] as usize;
        if pad == 0 || header_len + pad > end {
            return Err(SessionError::parse(format!("invalid RTP padding length {}", pad)));
        }
        end -= pad;
    }

    Ok(RtpPacket {
        marker: data[1] & 0x80 != 0,
        payload_type: data[1] & 0x7F,
        sequence_number: u16::from_be_bytes([data[2], data[3]]),
        timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        payload: data[header_len..end].to_vec(),
    })
}

/// Generate a random SSRC via OS CSPRNG.
pub fn generate_ssrc() -> Result<u32> {
    let mut buf = [0u8; 4];
    getrandom::getrandom(&mut buf)
        .map_err(|e| io::Error::other(format!("OS CSPRNG failed: {}", e)))?;
    Ok(u32::from_be_bytes(buf))
}

/// Convert a wall-clock duration to RTP clock ticks.
pub fn duration_to_ticks(duration: Duration, clock_rate: u32) -> u32 {
    (duration.as_nanos() * clock_rate as u128 / 1_000_000_000) as u32
}

/// Wraps payloads in RTP headers with running sequence numbers and timestamps.
#[derive(Debug)]
pub struct Packetizer {
    payload_type: u8,
    ssrc: u32,
    sequence_number: u16,
    timestamp: u32,
}

impl Packetizer {
    pub fn new(payload_type: u8, ssrc: u32) -> Self {
        Self {
            payload_type,
            ssrc,
            sequence_number: 0,
            timestamp: 0,
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Packetize the payloads of one frame. The marker bit goes on the last
    /// packet; the timestamp then advances by `ticks`.
    pub fn packetize(&mut self, payloads: Vec<Vec<u8>>, ticks: u32) -> Vec<Vec<u8>> {
        let count = payloads.len();
        let packets = payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| {
                let packet = RtpPacket {
                    marker: i + 1 == count,
                    payload_type: self.payload_type,
                    sequence_number: self.sequence_number,
                    timestamp: self.timestamp,
                    ssrc: self.ssrc,
                    payload,
                };
                self.sequence_number = self.sequence_number.wrapping_add(1);
                encode(&packet)
            })
            .collect();
        self.timestamp = self.timestamp.wrapping_add(ticks);
        packets
    }
}
