//! RTCP picture loss indication building and compound packet classification.
//!
//! Only PLI is ever sent. Inbound feedback is walked block by block so it
//! can be logged; nothing acts on it.

use std::fmt;

/// RTCP packet types (RFC 3550 section 12.1, RFC 4585).
const PT_SR: u8 = 200;
const PT_RR: u8 = 201;
const PT_SDES: u8 = 202;
const PT_BYE: u8 = 203;
const PT_RTPFB: u8 = 205;
const PT_PSFB: u8 = 206;

/// Feedback message types (FMT field).
const FMT_GENERIC_NACK: u8 = 1;
const FMT_PLI: u8 = 1;
const FMT_FIR: u8 = 4;
const FMT_AFB: u8 = 15;

/// Size of a PLI packet: common header + sender SSRC + media SSRC.
pub const PLI_LEN: usize = 12;

/// Parsed RTCP block from an incoming compound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpBlock {
    SenderReport { ssrc: u32, packet_count: u32, octet_count: u32 },
    ReceiverReport { ssrc: u32, report_count: u8 },
    SourceDescription,
    Goodbye { sources: Vec<u32> },
    GenericNack { sender_ssrc: u32, media_ssrc: u32, lost: Vec<u16> },
    PictureLossIndication { sender_ssrc: u32, media_ssrc: u32 },
    FullIntraRequest { sender_ssrc: u32 },
    ReceiverEstimatedMaxBitrate { sender_ssrc: u32, bitrate: u64 },
    Unknown { packet_type: u8, fmt: u8 },
}

impl fmt::Display for RtcpBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtcpBlock::SenderReport { ssrc, packet_count, octet_count } => write!(
                f,
                "SR ssrc={:#010x} packets={} octets={}",
                ssrc, packet_count, octet_count
            ),
            RtcpBlock::ReceiverReport { ssrc, report_count } => {
                write!(f, "RR ssrc={:#010x} reports={}", ssrc, report_count)
            }
            RtcpBlock::SourceDescription => f.write_str("SDES"),
            RtcpBlock::Goodbye { sources } => write!(f, "BYE sources={:?}", sources),
            RtcpBlock::GenericNack { media_ssrc, lost, .. } => {
                write!(f, "NACK media={:#010x} lost={:?}", media_ssrc, lost)
            }
            RtcpBlock::PictureLossIndication { media_ssrc, .. } => {
                write!(f, "PLI media={:#010x}", media_ssrc)
            }
            RtcpBlock::FullIntraRequest { sender_ssrc } => {
                write!(f, "FIR sender={:#010x}", sender_ssrc)
            }
            RtcpBlock::ReceiverEstimatedMaxBitrate { bitrate, .. } => {
                write!(f, "REMB bitrate={}bps", bitrate)
            }
            RtcpBlock::Unknown { packet_type, fmt } => {
                write!(f, "unknown pt={} fmt={}", packet_type, fmt)
            }
        }
    }
}

/// Check if a datagram looks like RTCP (payload type 200-206 in byte 1).
pub fn is_rtcp_packet(data: &[u8]) -> bool {
    if data.len() < 8 || data[0] >> 6 != 2 {
        return false;
    }
    (PT_SR..=PT_PSFB).contains(&data[1])
}

/// Build a picture loss indication (RFC 4585 §6.3.1) for `media_ssrc`.
///
/// The sender SSRC is left as 0.
pub fn build_pli(media_ssrc: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PLI_LEN);
    // V=2, P=0, FMT=1
    buf.push(0x80 | FMT_PLI);
    buf.push(PT_PSFB);
    // Length in 32-bit words minus one
    buf.extend_from_slice(&2u16.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.extend_from_slice(&media_ssrc.to_be_bytes());
    buf
}

fn be32(pkt: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([pkt[at], pkt[at + 1], pkt[at + 2], pkt[at + 3]])
}

/// Parse an incoming compound RTCP packet into blocks.
///
/// Parsing stops at the first block whose declared length overruns the
/// datagram.
pub fn parse_rtcp(data: &[u8]) -> Vec<RtcpBlock> {
    let mut blocks = Vec::new();
    let mut offset = 0;

    while offset + 4 <= data.len() {
        let fmt = data[offset] & 0x1F;
        let pt = data[offset + 1];
        let length_words = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
        let packet_len = (length_words + 1) * 4;

        if offset + packet_len > data.len() {
            break;
        }

        let pkt = &data[offset..offset + packet_len];

        let block = match (pt, fmt) {
            (PT_SR, _) if pkt.len() >= 28 => RtcpBlock::SenderReport {
                ssrc: be32(pkt, 4),
                packet_count: be32(pkt, 20),
                octet_count: be32(pkt, 24),
            },
            (PT_RR, _) if pkt.len() >= 8 => RtcpBlock::ReceiverReport {
                ssrc: be32(pkt, 4),
                report_count: fmt,
            },
            (PT_SDES, _) => RtcpBlock::SourceDescription,
            (PT_BYE, _) => RtcpBlock::Goodbye {
                sources: pkt[4..]
                    .chunks_exact(4)
                    .take(fmt as usize)
                    .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            },
            (PT_RTPFB, FMT_GENERIC_NACK) if pkt.len() >= 12 => {
                let mut lost = Vec::new();
                for fci in pkt[12..].chunks_exact(4) {
                    let pid = u16::from_be_bytes([fci[0], fci[1]]);
                    let blp = u16::from_be_bytes([fci[2], fci[3]]);
                    lost.push(pid);
                    for bit in 0..16u16 {
                        if blp & (1 << bit) != 0 {
                            lost.push(pid.wrapping_add(bit + 1));
                        }
                    }
                }
                RtcpBlock::GenericNack {
                    sender_ssrc: be32(pkt, 4),
                    media_ssrc: be32(pkt, 8),
                    lost,
                }
            }
            (PT_PSFB, FMT_PLI) if pkt.len() >= 12 => RtcpBlock::PictureLossIndication {
                sender_ssrc: be32(pkt, 4),
                media_ssrc: be32(pkt, 8),
            },
            (PT_PSFB, FMT_FIR) if pkt.len() >= 8 => RtcpBlock::FullIntraRequest {
                sender_ssrc: be32(pkt, 4),
            },
            (PT_PSFB, FMT_AFB) if pkt.len() >= 20 && &pkt[12..16] == b"REMB" => {
                let exp = pkt[17] >> 2;
                let mantissa =
                    (((pkt[17] & 0x03) as u64) << 16) | ((pkt[18] as u64) << 8) | pkt[19] as u64;
                RtcpBlock::ReceiverEstimatedMaxBitrate {
                    sender_ssrc: be32(pkt, 4),
                    bitrate: mantissa.checked_shl(exp as u32).unwrap_or(u64::MAX),
                }
            }
            (packet_type, fmt) => RtcpBlock::Unknown { packet_type, fmt },
        };
        blocks.push(block);

        offset += packet_len;
    }

    blocks
}

/// One-line summary of a feedback datagram for logging.
pub fn describe(data: &[u8]) -> String {
    if !is_rtcp_packet(data) {
        return format!("{} bytes (not RTCP)", data.len());
    }
    let blocks = parse_rtcp(data);
    if blocks.is_empty() {
        return format!("{} bytes (truncated RTCP)", data.len());
    }
    blocks
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
