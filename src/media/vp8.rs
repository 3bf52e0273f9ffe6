//! VP8 RTP payload format (RFC 7741).
//!
//! ```text
//!       0 1 2 3 4 5 6 7
//!      +-+-+-+-+-+-+-+-+
//!      |X|R|N|S|R| PID | (REQUIRED)
//!      +-+-+-+-+-+-+-+-+
//! X:   |I|L|T|K| RSV   | (OPTIONAL)
//!      +-+-+-+-+-+-+-+-+
//! I:   |M| PictureID   | (OPTIONAL, 7 or 15 bits)
//!      +-+-+-+-+-+-+-+-+
//! L:   |   TL0PICIDX   | (OPTIONAL)
//!      +-+-+-+-+-+-+-+-+
//! T/K: |TID|Y| KEYIDX  | (OPTIONAL)
//!      +-+-+-+-+-+-+-+-+
//! ```

use crate::error::{Result, SessionError};

/// Parsed VP8 payload descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vp8Descriptor {
    pub non_reference: bool,
    /// S bit: this packet starts a VP8 partition.
    pub start_of_partition: bool,
    pub partition_id: u8,
    pub picture_id: Option<u16>,
    pub tl0_pic_idx: Option<u8>,
    pub tid: Option<u8>,
    pub key_idx: Option<u8>,
}

/// Split an RTP payload into its descriptor and the VP8 bitstream bytes.
///
/// A descriptor that leaves no bitstream bytes is rejected.
pub fn parse_payload(payload: &[u8]) -> Result<(Vp8Descriptor, &[u8])> {
    let short = || SessionError::parse(format!("VP8 payload too short: {} bytes", payload.len()));

    let first = *payload.first().ok_or_else(short)?;
    let mut desc = Vp8Descriptor {
        non_reference: first & 0x20 != 0,
        start_of_partition: first & 0x10 != 0,
        partition_id: first & 0x07,
        ..Default::default()
    };
    let mut idx = 1;

    if first & 0x80 != 0 {
        let ext = *payload.get(idx).ok_or_else(short)?;
        idx += 1;

        if ext & 0x80 != 0 {
            let b = *payload.get(idx).ok_or_else(short)?;
            idx += 1;
            if b & 0x80 != 0 {
                let lo = *payload.get(idx).ok_or_else(short)?;
                idx += 1;
                desc.picture_id = Some((((b & 0x7F) as u16) << 8) | lo as u16);
            } else {
                desc.picture_id = Some(b as u16);
            }
        }
        if ext & 0x40 != 0 {
            desc.tl0_pic_idx = Some(*payload.get(idx).ok_or_else(short)?);
            idx += 1;
        }
        if ext & 0x30 != 0 {
            let b = *payload.get(idx).ok_or_else(short)?;
            idx += 1;
            if ext & 0x20 != 0 {
                desc.tid = Some(b >> 6);
            }
            if ext & 0x10 != 0 {
                desc.key_idx = Some(b & 0x1F);
            }
        }
    }

    if idx >= payload.len() {
        return Err(short());
    }
    Ok((desc, &payload[idx..]))
}

/// Inverse key frame flag (P bit) of the VP8 frame tag.
pub fn is_keyframe(bitstream: &[u8]) -> bool {
    bitstream.first().map(|b| b & 0x01 == 0).unwrap_or(false)
}

/// Splits VP8 frames into RTP payloads with a minimal one-byte descriptor.
#[derive(Debug, Clone)]
pub struct Vp8Payloader {
    mtu: usize,
}

impl Vp8Payloader {
    pub fn new(mtu: usize) -> Self {
        Self { mtu }
    }

    pub fn payload(&self, frame: &[u8]) -> Vec<Vec<u8>> {
        let max_chunk = self.mtu.saturating_sub(1).max(1);
        frame
            .chunks(max_chunk)
            .enumerate()
            .map(|(i, chunk)| {
                let mut payload = Vec::with_capacity(1 + chunk.len());
                payload.push(if i == 0 { 0x10 } else { 0x00 });
                payload.extend_from_slice(chunk);
                payload
            })
            .collect()
    }
}
