//! Error taxonomy shared by every session path.
//!
//! End-of-stream is not an error: frame sources report it as `Ok(None)`.

use std::io;

use thiserror::Error;

/// Errors that end a session or reject its setup.
#[derive(Debug, Error)]
pub enum SessionError {
    /// File or socket open/read/write failure.
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    /// Malformed container header, NAL stream, SDP document or packet.
    #[error("parse failure: {0}")]
    Parse(String),

    /// An endpoint could not be determined from the SDP pair.
    #[error("endpoint resolution failed: {0}")]
    Resolution(String),

    /// No demuxer or transport exists for the selected codec family.
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// A configuration value no session can run with.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SessionError {
    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        SessionError::Parse(msg.into())
    }

    pub(crate) fn resolution(msg: impl Into<String>) -> Self {
        SessionError::Resolution(msg.into())
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
