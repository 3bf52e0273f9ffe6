//! IVF container reading and writing.
//!
//! File header (32 bytes, little-endian):
//! ```text
//! bytes 0-3    signature "DKIF"
//! bytes 4-5    version (0)
//! bytes 6-7    header length in bytes
//! bytes 8-11   FourCC, e.g. "VP80"
//! bytes 12-13  width
//! bytes 14-15  height
//! bytes 16-19  timebase denominator
//! bytes 20-23  timebase numerator
//! bytes 24-27  frame count
//! bytes 28-31  unused
//! ```
//! Each frame is a 12-byte header (u32 size, u64 timestamp) followed by
//! `size` bytes of payload.

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SessionError};
use crate::media::vp8;
use crate::transport::rtp::RtpPacket;

pub const IVF_SIGNATURE: &[u8; 4] = b"DKIF";
pub const IVF_HEADER_LEN: usize = 32;
pub const IVF_FRAME_HEADER_LEN: usize = 12;
pub const FOURCC_VP8: &[u8; 4] = b"VP80";

/// Offset of the frame count field, rewritten when a writer closes.
const FRAME_COUNT_OFFSET: u64 = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IvfFileHeader {
    pub fourcc: [u8; 4],
    pub width: u16,
    pub height: u16,
    pub timebase_denominator: u32,
    pub timebase_numerator: u32,
    pub frame_count: u32,
}

impl IvfFileHeader {
    /// Header the receive paths write: VP8 at 1/30.
    pub fn vp8(width: u16, height: u16) -> Self {
        Self {
            fourcc: *FOURCC_VP8,
            width,
            height,
            timebase_denominator: 30,
            timebase_numerator: 1,
            frame_count: 0,
        }
    }

    pub fn parse(buf: &[u8; IVF_HEADER_LEN]) -> Result<Self> {
        if &buf[0..4] != IVF_SIGNATURE {
            return Err(SessionError::parse("IVF signature mismatch"));
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != 0 {
            return Err(SessionError::parse(format!("unsupported IVF version {}", version)));
        }
        let header_len = u16::from_le_bytes([buf[6], buf[7]]) as usize;
        if header_len < IVF_HEADER_LEN {
            return Err(SessionError::parse(format!("IVF header length {} too small", header_len)));
        }

        Ok(Self {
            fourcc: [buf[8], buf[9], buf[10], buf[11]],
            width: u16::from_le_bytes([buf[12], buf[13]]),
            height: u16::from_le_bytes([buf[14], buf[15]]),
            timebase_denominator: u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
            timebase_numerator: u32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]),
            frame_count: u32::from_le_bytes([buf[24], buf[25], buf[26], buf[27]]),
        })
    }

    pub fn to_bytes(&self) -> [u8; IVF_HEADER_LEN] {
        let mut buf = [0u8; IVF_HEADER_LEN];
        buf[0..4].copy_from_slice(IVF_SIGNATURE);
        buf[6..8].copy_from_slice(&(IVF_HEADER_LEN as u16).to_le_bytes());
        buf[8..12].copy_from_slice(&self.fourcc);
        buf[12..14].copy_from_slice(&self.width.to_le_bytes());
        buf[14..16].copy_from_slice(&self.height.to_le_bytes());
        buf[16..20].copy_from_slice(&self.timebase_denominator.to_le_bytes());
        buf[20..24].copy_from_slice(&self.timebase_numerator.to_le_bytes());
        buf[24..28].copy_from_slice(&self.frame_count.to_le_bytes());
        buf
    }

    /// Duration of one timebase unit: numerator / denominator seconds.
    pub fn frame_interval(&self) -> Result<Duration> {
        if self.timebase_denominator == 0 || self.timebase_numerator == 0 {
            return Err(SessionError::parse(format!(
                "invalid IVF timebase {}/{}",
                self.timebase_numerator, self.timebase_denominator
            )));
        }
        let nanos =
            1_000_000_000u64 * self.timebase_numerator as u64 / self.timebase_denominator as u64;
        if nanos == 0 {
            return Err(SessionError::parse(format!(
                "IVF timebase {}/{} below timer resolution",
                self.timebase_numerator, self.timebase_denominator
            )));
        }
        Ok(Duration::from_nanos(nanos))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfFrameHeader {
    pub size: u32,
    pub timestamp: u64,
}

/// Reads frames from an IVF stream. The header is consumed on construction.
pub struct IvfReader<R> {
    reader: R,
    header: IvfFileHeader,
}

impl<R: Read> IvfReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let mut buf = [0u8; IVF_HEADER_LEN];
        reader.read_exact(&mut buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => SessionError::parse("truncated IVF file header"),
            _ => SessionError::Io(e),
        })?;
        let header = IvfFileHeader::parse(&buf)?;

        // Skip any header extension beyond the fixed 32 bytes
        let header_len = u16::from_le_bytes([buf[6], buf[7]]) as u64;
        let extra = header_len - IVF_HEADER_LEN as u64;
        if extra > 0 {
            let skipped = std::io::copy(&mut (&mut reader).take(extra), &mut std::io::sink())?;
            if skipped != extra {
                return Err(SessionError::parse("truncated IVF file header"));
            }
        }

        Ok(Self { reader, header })
    }

    pub fn header(&self) -> &IvfFileHeader {
        &self.header
    }

    /// Next frame, or `None` at a clean end of stream.
    pub fn next_frame(&mut self) -> Result<Option<(IvfFrameHeader, Vec<u8>)>> {
        let mut buf = [0u8; IVF_FRAME_HEADER_LEN];
        let filled = read_until_eof(&mut self.reader, &mut buf)?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < IVF_FRAME_HEADER_LEN {
            return Err(SessionError::parse(format!(
                "truncated IVF frame header ({} of {} bytes)",
                filled, IVF_FRAME_HEADER_LEN
            )));
        }

        let frame_header = IvfFrameHeader {
            size: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            timestamp: u64::from_le_bytes([
                buf[4], buf[5], buf[6], buf[7], buf[8], buf[9], buf[10], buf[11],
            ]),
        };

        let mut payload = Vec::new();
        (&mut self.reader)
            .take(frame_header.size as u64)
            .read_to_end(&mut payload)?;
        if payload.len() != frame_header.size as usize {
            return Err(SessionError::parse(format!(
                "truncated IVF frame: expected {} bytes, got {}",
                frame_header.size,
                payload.len()
            )));
        }

        Ok(Some((frame_header, payload)))
    }
}

/// Fill `buf` until it is full or the reader hits EOF; returns bytes read.
fn read_until_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Writes an IVF file, reassembling VP8 frames from RTP packets.
pub struct IvfWriter<W: Write + Seek> {
    writer: W,
    header: IvfFileHeader,
    frame_count: u32,
    current_frame: Option<Vec<u8>>,
    seen_keyframe: bool,
}

impl IvfWriter<BufWriter<File>> {
    /// Create (or truncate) `path` and write a VP8 header.
    pub fn create(path: &Path, width: u16, height: u16) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), IvfFileHeader::vp8(width, height))
    }
}

impl<W: Write + Seek> IvfWriter<W> {
    pub fn new(mut writer: W, header: IvfFileHeader) -> Result<Self> {
        writer.write_all(&header.to_bytes())?;
        Ok(Self {
            writer,
            header,
            frame_count: 0,
            current_frame: None,
            seen_keyframe: false,
        })
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Append one complete frame.
    pub fn write_frame(&mut self, timestamp: u64, frame: &[u8]) -> Result<()> {
        let size = u32::try_from(frame.len())
            .map_err(|_| SessionError::parse(format!("frame of {} bytes too large", frame.len())))?;
        let mut frame_header = [0u8; IVF_FRAME_HEADER_LEN];
        frame_header[0..4].copy_from_slice(&size.to_le_bytes());
        frame_header[4..12].copy_from_slice(&timestamp.to_le_bytes());

        self.writer.write_all(&frame_header)?;
        self.writer.write_all(frame)?;
        self.frame_count += 1;
        Ok(())
    }

    /// Feed one VP8 RTP packet.
    ///
    /// Packets before the first key frame are dropped. A frame starts on a
    /// packet with the S bit set and is written when the marker bit arrives,
    /// stamped with the RTP timestamp.
    pub fn write_rtp(&mut self, packet: &RtpPacket) -> Result<()> {
        if packet.payload.is_empty() {
            return Ok(());
        }

        let (desc, data) = vp8::parse_payload(&packet.payload)?;

        if !self.seen_keyframe && !vp8::is_keyframe(data) {
            return Ok(());
        }
        if self.current_frame.is_none() && !desc.start_of_partition {
            return Ok(());
        }
        self.seen_keyframe = true;

        let frame = self.current_frame.get_or_insert_with(Vec::new);
        frame.extend_from_slice(data);

        if !packet.marker {
            return Ok(());
        }
        if let Some(frame) = self.current_frame.take() {
            self.write_frame(packet.timestamp as u64, &frame)?;
            tracing::trace!(
                "IVF frame {} written ({} bytes, ts {})",
                self.frame_count,
                frame.len(),
                packet.timestamp
            );
        }
        Ok(())
    }

    /// Rewrite the header frame count and flush. Returns the inner writer.
    pub fn close(mut self) -> Result<W> {
        self.header.frame_count = self.frame_count;
        self.writer.seek(SeekFrom::Start(FRAME_COUNT_OFFSET))?;
        self.writer.write_all(&self.frame_count.to_le_bytes())?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn vp8_packet(payload: Vec<u8>, marker: bool, timestamp: u32) -> RtpPacket {
        RtpPacket {
            marker,
            payload_type: 96,
            sequence_number: 0,
            timestamp,
            ssrc: 1,
            payload,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let header = IvfFileHeader::vp8(640, 480);
        let parsed = IvfFileHeader::parse(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(&header.to_bytes()[0..4], b"DKIF");
    }

    #[test]
    fn test_frame_interval_1_30() {
        let interval = IvfFileHeader::vp8(640, 480).frame_interval().unwrap();
        let ms = interval.as_secs_f64() * 1000.0;
        assert!((ms - 33.333).abs() < 0.01, "interval {} ms", ms);
    }

    #[test]
    fn test_zero_timebase_is_parse_error() {
        let mut header = IvfFileHeader::vp8(640, 480);
        header.timebase_denominator = 0;
        assert!(matches!(header.frame_interval(), Err(SessionError::Parse(_))));
    }

    #[test]
    fn test_bad_signature() {
        let mut bytes = IvfFileHeader::vp8(640, 480).to_bytes();
        bytes[0] = b'X';
        assert!(matches!(IvfReader::new(Cursor::new(bytes.to_vec())), Err(SessionError::Parse(_))));
        assert!(matches!(IvfReader::new(Cursor::new(vec![0u8; 10])), Err(SessionError::Parse(_))));
    }

    #[test]
    fn test_write_then_read_frames() {
        let mut writer =
            IvfWriter::new(Cursor::new(Vec::new()), IvfFileHeader::vp8(320, 240)).unwrap();
        writer.write_frame(0, b"first").unwrap();
        writer.write_frame(3000, b"second").unwrap();
        let bytes = writer.close().unwrap().into_inner();

        let mut reader = IvfReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.header().frame_count, 2);
        assert_eq!(reader.header().width, 320);

        let (h, data) = reader.next_frame().unwrap().unwrap();
        assert_eq!((h.size, h.timestamp), (5, 0));
        assert_eq!(data, b"first");
        let (h, data) = reader.next_frame().unwrap().unwrap();
        assert_eq!(h.timestamp, 3000);
        assert_eq!(data, b"second");
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_truncated_frame_is_parse_error() {
        let mut writer =
            IvfWriter::new(Cursor::new(Vec::new()), IvfFileHeader::vp8(320, 240)).unwrap();
        writer.write_frame(0, b"abcdef").unwrap();
        let mut bytes = writer.close().unwrap().into_inner();
        bytes.truncate(bytes.len() - 2);

        let mut reader = IvfReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(reader.next_frame(), Err(SessionError::Parse(_))));
    }

    #[test]
    fn test_rtp_waits_for_keyframe_and_reassembles() {
        let mut writer =
            IvfWriter::new(Cursor::new(Vec::new()), IvfFileHeader::vp8(640, 480)).unwrap();

        // Interframe (P bit set) before any key frame is dropped
        writer.write_rtp(&vp8_packet(vec![0x10, 0x01, 0xAA], true, 100)).unwrap();
        assert_eq!(writer.frame_count(), 0);

        // Key frame split across two packets
        writer.write_rtp(&vp8_packet(vec![0x10, 0x00, 0x01], false, 200)).unwrap();
        writer.write_rtp(&vp8_packet(vec![0x00, 0x02, 0x03], true, 200)).unwrap();
        assert_eq!(writer.frame_count(), 1);

        // Continuation without a start packet is ignored
        writer.write_rtp(&vp8_packet(vec![0x00, 0x04], true, 300)).unwrap();
        // Empty payload is ignored
        writer.write_rtp(&vp8_packet(Vec::new(), true, 300)).unwrap();
        // Interframes are accepted once a key frame was seen
        writer.write_rtp(&vp8_packet(vec![0x10, 0x05, 0x06], true, 400)).unwrap();
        assert_eq!(writer.frame_count(), 2);

        let bytes = writer.close().unwrap().into_inner();
        let mut reader = IvfReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.header().frame_count, 2);
        let (h, data) = reader.next_frame().unwrap().unwrap();
        assert_eq!(h.timestamp, 200);
        assert_eq!(data, vec![0x00, 0x01, 0x02, 0x03]);
        let (h, data) = reader.next_frame().unwrap().unwrap();
        assert_eq!(h.timestamp, 400);
        assert_eq!(data, vec![0x05, 0x06]);
    }

    #[test]
    fn test_malformed_vp8_payload_is_error() {
        let mut writer =
            IvfWriter::new(Cursor::new(Vec::new()), IvfFileHeader::vp8(640, 480)).unwrap();
        assert!(writer.write_rtp(&vp8_packet(vec![0x90], true, 0)).is_err());
    }
}
