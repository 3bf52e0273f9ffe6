//! framecast - paced video streaming over SDP-negotiated UDP or media tracks
//!
//! Reads VP8 (IVF) or H.264 (Annex-B) files and sends them frame by frame at
//! their native rate, either over a UDP socket pair derived from an SDP
//! offer/answer or into a track owned by an external media engine. The
//! receive side writes incoming VP8 RTP back into IVF files.

pub mod config;
pub mod error;
pub mod media;
pub mod session;
pub mod transport;

pub use error::{Result, SessionError};
