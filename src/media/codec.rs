//! Static RTP codec capability tables.
//!
//! The catalog is built once and shared by reference; it has no mutation API.
//! Each family lists its primary payload types, each followed by the
//! retransmission (`video/rtx`) payload type bound to it through `apt=`.

use std::fmt::Write as _;

pub const MIME_TYPE_VP8: &str = "video/VP8";
pub const MIME_TYPE_H264: &str = "video/H264";
pub const MIME_TYPE_RTX: &str = "video/rtx";
pub const MIME_TYPE_OPUS: &str = "audio/opus";

/// RTP clock rate for every video payload.
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// An `a=rtcp-fb` mechanism, e.g. `nack pli`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpFeedback {
    pub typ: String,
    pub parameter: String,
}

impl RtcpFeedback {
    fn new(typ: &str, parameter: &str) -> Self {
        Self {
            typ: typ.to_string(),
            parameter: parameter.to_string(),
        }
    }
}

/// Feedback attached to every primary video payload type.
fn video_feedback() -> Vec<RtcpFeedback> {
    vec![
        RtcpFeedback::new("goog-remb", ""),
        RtcpFeedback::new("ccm", "fir"),
        RtcpFeedback::new("nack", ""),
        RtcpFeedback::new("nack", "pli"),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecDescriptor {
    pub mime_type: String,
    pub clock_rate: u32,
    pub channels: u16,
    pub payload_type: u8,
    /// Retransmission payload type paired with this primary, if any.
    pub rtx_payload_type: Option<u8>,
    /// Ordered `key=value` format parameters.
    pub fmtp: Vec<(String, String)>,
    pub feedback: Vec<RtcpFeedback>,
}

impl CodecDescriptor {
    fn primary(mime_type: &str, payload_type: u8, rtx: u8, fmtp: &[(&str, &str)]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            clock_rate: VIDEO_CLOCK_RATE,
            channels: 0,
            payload_type,
            rtx_payload_type: Some(rtx),
            fmtp: fmtp
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            feedback: video_feedback(),
        }
    }

    fn rtx(payload_type: u8, apt: u8) -> Self {
        Self {
            mime_type: MIME_TYPE_RTX.to_string(),
            clock_rate: VIDEO_CLOCK_RATE,
            channels: 0,
            payload_type,
            rtx_payload_type: None,
            fmtp: vec![("apt".to_string(), apt.to_string())],
            feedback: Vec::new(),
        }
    }

    /// Whether this is a retransmission payload type.
    pub fn is_rtx(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case(MIME_TYPE_RTX)
    }

    /// The primary payload type named by `apt=` (retransmission entries only).
    pub fn associated_payload_type(&self) -> Option<u8> {
        self.fmtp
            .iter()
            .find(|(k, _)| k == "apt")
            .and_then(|(_, v)| v.parse().ok())
    }

    /// `a=fmtp` value, e.g. `level-asymmetry-allowed=1;packetization-mode=1`.
    pub fn fmtp_line(&self) -> String {
        self.fmtp
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Render `a=rtpmap`, `a=fmtp` and `a=rtcp-fb` lines.
    pub fn sdp_attributes(&self) -> Vec<String> {
        let encoding = self
            .mime_type
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.mime_type);

        let mut rtpmap = format!("a=rtpmap:{} {}/{}", self.payload_type, encoding, self.clock_rate);
        if self.channels > 0 {
            let _ = write!(rtpmap, "/{}", self.channels);
        }

        let mut lines = vec![rtpmap];
        if !self.fmtp.is_empty() {
            lines.push(format!("a=fmtp:{} {}", self.payload_type, self.fmtp_line()));
        }
        for fb in &self.feedback {
            if fb.parameter.is_empty() {
                lines.push(format!("a=rtcp-fb:{} {}", self.payload_type, fb.typ));
            } else {
                lines.push(format!(
                    "a=rtcp-fb:{} {} {}",
                    self.payload_type, fb.typ, fb.parameter
                ));
            }
        }
        lines
    }
}

/// Read-only registry of codec families keyed by primary MIME type.
#[derive(Debug, Clone)]
pub struct CodecCatalog {
    families: Vec<(String, Vec<CodecDescriptor>)>,
}

impl CodecCatalog {
    pub fn new() -> Self {
        let vp8 = vec![
            CodecDescriptor::primary(MIME_TYPE_VP8, 96, 97, &[]),
            CodecDescriptor::rtx(97, 96),
        ];

        let mut h264 = Vec::new();
        for (pt, rtx, mode, profile) in [
            (102, 121, "1", "42001f"),
            (127, 120, "0", "42001f"),
            (125, 107, "1", "42e01f"),
            (108, 109, "0", "42e01f"),
            (123, 118, "1", "640032"),
        ] {
            h264.push(CodecDescriptor::primary(
                MIME_TYPE_H264,
                pt,
                rtx,
                &[
                    ("level-asymmetry-allowed", "1"),
                    ("packetization-mode", mode),
                    ("profile-level-id", profile),
                ],
            ));
            h264.push(CodecDescriptor::rtx(rtx, pt));
        }

        Self {
            families: vec![
                (MIME_TYPE_VP8.to_string(), vp8),
                (MIME_TYPE_H264.to_string(), h264),
            ],
        }
    }

    /// Ordered descriptors for a family; empty for unknown MIME types.
    pub fn descriptors_for(&self, mime_type: &str) -> &[CodecDescriptor] {
        self.families
            .iter()
            .find(|(mime, _)| mime.eq_ignore_ascii_case(mime_type))
            .map(|(_, descriptors)| descriptors.as_slice())
            .unwrap_or(&[])
    }

    /// Primary MIME types in registration order.
    pub fn mime_types(&self) -> impl Iterator<Item = &str> {
        self.families.iter().map(|(mime, _)| mime.as_str())
    }
}

impl Default for CodecCatalog {
    fn default() -> Self {
        Self::new()
    }
}
