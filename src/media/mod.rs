//! Media containers, payload formats and the paced frame source.

pub mod annexb;
pub mod codec;
pub mod h264;
pub mod ivf;
pub mod vp8;

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, SessionError};
use annexb::AnnexBReader;
use codec::{MIME_TYPE_H264, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use ivf::IvfReader;

/// Fixed pacing interval for Annex-B input (~30 fps).
pub const ANNEXB_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Codec families a session can be asked to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecFamily {
    Vp8,
    H264,
    Opus,
}

impl CodecFamily {
    /// Parse a MIME type (`video/VP8`) or bare codec name (`vp8`), ignoring case.
    pub fn from_mime(mime: &str) -> Result<Self> {
        let name = mime.rsplit('/').next().unwrap_or(mime);
        match name.to_ascii_lowercase().as_str() {
            "vp8" => Ok(CodecFamily::Vp8),
            "h264" => Ok(CodecFamily::H264),
            "opus" => Ok(CodecFamily::Opus),
            _ => Err(SessionError::UnsupportedCodec(mime.to_string())),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            CodecFamily::Vp8 => MIME_TYPE_VP8,
            CodecFamily::H264 => MIME_TYPE_H264,
            CodecFamily::Opus => MIME_TYPE_OPUS,
        }
    }
}

impl FromStr for CodecFamily {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_mime(s)
    }
}

impl fmt::Display for CodecFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// One unit of paced output: a VP8 frame or an H.264 NAL unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Vec<u8>,
    pub duration: Duration,
}

type BoxedReader = Box<dyn BufRead + Send>;

/// Finite, non-restartable sequence of frames with a fixed pacing interval.
pub enum FrameSource {
    /// IVF container; interval comes from the header timebase.
    Ivf {
        reader: IvfReader<BoxedReader>,
        interval: Duration,
    },
    /// Raw Annex-B H.264; fixed interval.
    AnnexB { reader: AnnexBReader<BoxedReader> },
}

impl FrameSource {
    /// Open `path` with the demuxer for `family`.
    pub fn open(family: CodecFamily, path: &Path) -> Result<Self> {
        if family == CodecFamily::Opus {
            return Err(SessionError::UnsupportedCodec(family.to_string()));
        }
        let file = File::open(path)?;
        tracing::debug!("Opened {} source {}", family, path.display());
        Self::from_reader(family, BufReader::new(file))
    }

    pub fn from_reader(family: CodecFamily, reader: impl BufRead + Send + 'static) -> Result<Self> {
        let reader: BoxedReader = Box::new(reader);
        match family {
            CodecFamily::Vp8 => {
                let reader = IvfReader::new(reader)?;
                let interval = reader.header().frame_interval()?;
                let header = reader.header();
                tracing::debug!(
                    "IVF {}x{} timebase {}/{} ({} frames declared)",
                    header.width,
                    header.height,
                    header.timebase_numerator,
                    header.timebase_denominator,
                    header.frame_count
                );
                Ok(FrameSource::Ivf { reader, interval })
            }
            CodecFamily::H264 => Ok(FrameSource::AnnexB {
                reader: AnnexBReader::new(reader),
            }),
            CodecFamily::Opus => Err(SessionError::UnsupportedCodec(family.to_string())),
        }
    }

    pub fn family(&self) -> CodecFamily {
        match self {
            FrameSource::Ivf { .. } => CodecFamily::Vp8,
            FrameSource::AnnexB { .. } => CodecFamily::H264,
        }
    }

    pub fn interval(&self) -> Duration {
        match self {
            FrameSource::Ivf { interval, .. } => *interval,
            FrameSource::AnnexB { .. } => ANNEXB_FRAME_INTERVAL,
        }
    }

    /// Next frame; `Ok(None)` is end of stream.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let duration = self.interval();
        let payload = match self {
            FrameSource::Ivf { reader, .. } => reader.next_frame()?.map(|(_, payload)| payload),
            FrameSource::AnnexB { reader } => reader.next_nal()?,
        };
        Ok(payload.map(|payload| Frame { payload, duration }))
    }
}

impl fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSource")
            .field("family", &self.family())
            .field("interval", &self.interval())
            .finish()
    }
}
