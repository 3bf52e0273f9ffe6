//! Wire formats and SDP-derived addressing.

pub mod endpoint;
pub mod ice;
pub mod rtcp;
pub mod rtp;
pub mod sdp;

pub use endpoint::{resolve, EndpointPair, ResolvedEndpoints};
