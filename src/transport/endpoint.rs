//! Media and feedback endpoint resolution from an SDP offer/answer pair.
//!
//! The local endpoint is the first usable ICE candidate in the offer's first
//! media section, the remote endpoint is the answer's session connection
//! address (IP literal or host name) with its first media port. Feedback
//! runs on both ports + 1.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use serde::Serialize;

use super::ice;
use super::sdp::SessionDescription;
use crate::error::{Result, SessionError};

/// A local/remote UDP address pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EndpointPair {
    pub local: SocketAddr,
    pub remote: SocketAddr,
}

impl EndpointPair {
    /// The companion pair with both ports incremented by one.
    pub fn feedback_pair(&self) -> Result<EndpointPair> {
        Ok(EndpointPair {
            local: next_port(self.local)?,
            remote: next_port(self.remote)?,
        })
    }
}

fn next_port(addr: SocketAddr) -> Result<SocketAddr> {
    let port = addr
        .port()
        .checked_add(1)
        .ok_or_else(|| SessionError::resolution(format!("no feedback port above {}", addr)))?;
    Ok(SocketAddr::new(addr.ip(), port))
}

/// Everything the direct-socket paths need to open their sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedEndpoints {
    pub media: EndpointPair,
    pub feedback: EndpointPair,
    /// SSRC the keyframe requests are addressed to (0 when the offer has none).
    pub ssrc: u32,
}

/// Resolve media and feedback endpoints plus the session SSRC.
pub fn resolve(offer: &str, answer: &str) -> Result<ResolvedEndpoints> {
    let offer = SessionDescription::parse(offer)?;
    let media = offer
        .media
        .first()
        .ok_or_else(|| SessionError::parse("offer has no media section"))?;

    let mut local = None;
    let mut ssrc = None;
    for attr in media.attributes() {
        match (attr.key, attr.value) {
            ("candidate", Some(value)) if local.is_none() => {
                match ice::parse_candidate(value).and_then(|c| c.socket_addr()) {
                    Ok(addr) => local = Some(addr),
                    Err(e) => tracing::warn!("Skipping candidate attribute: {}", e),
                }
            }
            ("ssrc", Some(value)) if ssrc.is_none() => {
                let token = value.split(' ').next().unwrap_or_default();
                match token.parse::<u32>() {
                    Ok(v) => ssrc = Some(v),
                    Err(e) => tracing::warn!("Skipping ssrc attribute '{}': {}", value, e),
                }
            }
            _ => {}
        }
    }

    let local = local.ok_or_else(|| {
        SessionError::resolution("no usable ICE candidate in the offer's first media section")
    })?;
    let ssrc = ssrc.unwrap_or_else(|| {
        tracing::warn!("Offer carries no ssrc attribute, keyframe requests will target SSRC 0");
        0
    });

    let answer = SessionDescription::parse(answer)?;
    let answer_media = answer
        .media
        .first()
        .ok_or_else(|| SessionError::resolution("answer has no media section"))?;
    let connection = answer
        .connection()
        .ok_or_else(|| SessionError::resolution("answer has no connection address"))??;
    let remote = remote_address(&connection.address, answer_media.port)?;

    let media_pair = EndpointPair { local, remote };
    let feedback = media_pair.feedback_pair()?;

    tracing::debug!(
        "Resolved media {} -> {}, feedback {} -> {}, ssrc {}",
        media_pair.local,
        media_pair.remote,
        feedback.local,
        feedback.remote,
        ssrc
    );

    Ok(ResolvedEndpoints {
        media: media_pair,
        feedback,
        ssrc,
    })
}

/// IP literals are used as-is; host names go through the system resolver
/// and the first address wins.
fn remote_address(host: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let mut addrs = (host, port).to_socket_addrs().map_err(|e| {
        SessionError::resolution(format!("cannot resolve answer address {}: {}", host, e))
    })?;
    let addr = addrs.next().ok_or_else(|| {
        SessionError::resolution(format!("answer address {} resolved to nothing", host))
    })?;
    tracing::debug!("Resolved answer host {} to {}", host, addr.ip());
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "v=0\r\n\
o=- 1 1 IN IP4 0.0.0.0\r\n\
s=-\r\n\
t=0 0\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:0\r\n\
a=candidate:bad\r\n\
a=candidate:1 1 UDP 2130706431 10.0.0.5 5000 typ host\r\n\
a=candidate:2 1 UDP 1694498815 203.0.113.9 6000 typ srflx raddr 10.0.0.5 rport 5000\r\n\
a=ssrc:notanumber cname:x\r\n\
a=ssrc:3735928559 cname:x\r\n\
a=ssrc:42 msid:y\r\n";

    const ANSWER: &str = "v=0\r\n\
o=- 2 1 IN IP4 198.51.100.3\r\n\
s=-\r\n\
c=IN IP4 198.51.100.3\r\n\
t=0 0\r\n\
m=video 7000 RTP/AVPF 96\r\n";

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_resolve_first_candidate_and_ssrc() {
        let resolved = resolve(OFFER, ANSWER).unwrap();
        assert_eq!(resolved.media.local, addr("10.0.0.5:5000"));
        assert_eq!(resolved.media.remote, addr("198.51.100.3:7000"));
        assert_eq!(resolved.feedback.local, addr("10.0.0.5:5001"));
        assert_eq!(resolved.feedback.remote, addr("198.51.100.3:7001"));
        assert_eq!(resolved.ssrc, 3735928559);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        assert_eq!(resolve(OFFER, ANSWER).unwrap(), resolve(OFFER, ANSWER).unwrap());
    }

    #[test]
    fn test_offer_without_candidate() {
        let offer = "v=0\r\ns=-\r\nm=video 9 RTP/AVP 96\r\na=ssrc:1 cname:x\r\n";
        assert!(matches!(resolve(offer, ANSWER), Err(SessionError::Resolution(_))));
    }

    #[test]
    fn test_candidate_outside_first_media_section_is_ignored() {
        let offer = "v=0\r\ns=-\r\nm=audio 9 RTP/AVP 0\r\n\
m=video 9 RTP/AVP 96\r\na=candidate:1 1 UDP 1 10.0.0.5 5000 typ host\r\n";
        assert!(matches!(resolve(offer, ANSWER), Err(SessionError::Resolution(_))));
    }

    #[test]
    fn test_missing_ssrc_defaults_to_zero() {
        let offer = "v=0\r\ns=-\r\nm=video 9 RTP/AVP 96\r\n\
a=candidate:1 1 UDP 2130706431 10.0.0.5 5000 typ host\r\n";
        assert_eq!(resolve(offer, ANSWER).unwrap().ssrc, 0);
    }

    #[test]
    fn test_offer_errors() {
        assert!(matches!(resolve("garbage", ANSWER), Err(SessionError::Parse(_))));
        assert!(matches!(resolve("v=0\r\ns=-\r\n", ANSWER), Err(SessionError::Parse(_))));
    }

    #[test]
    fn test_answer_errors() {
        assert!(matches!(resolve(OFFER, "garbage"), Err(SessionError::Parse(_))));

        let no_media = "v=0\r\ns=-\r\nc=IN IP4 198.51.100.3\r\n";
        assert!(matches!(resolve(OFFER, no_media), Err(SessionError::Resolution(_))));

        let media_level_only = "v=0\r\ns=-\r\nm=video 7000 RTP/AVP 96\r\nc=IN IP4 198.51.100.3\r\n";
        assert!(matches!(resolve(OFFER, media_level_only), Err(SessionError::Resolution(_))));

        let unresolvable = "v=0\r\ns=-\r\nc=IN IP4 no-such-host.invalid\r\nm=video 7000 RTP/AVP 96\r\n";
        assert!(matches!(resolve(OFFER, unresolvable), Err(SessionError::Resolution(_))));
    }

    #[test]
    fn test_answer_host_name_is_looked_up() {
        let answer = "v=0\r\ns=-\r\nc=IN IP4 localhost\r\nm=video 7000 RTP/AVP 96\r\n";
        let resolved = resolve(OFFER, answer).unwrap();
        assert!(resolved.media.remote.ip().is_loopback());
        assert_eq!(resolved.media.remote.port(), 7000);
        assert_eq!(resolved.feedback.remote.port(), 7001);
        assert_eq!(resolved.feedback.remote.ip(), resolved.media.remote.ip());
    }

    #[test]
    fn test_feedback_port_overflow() {
        let pair = EndpointPair {
            local: addr("10.0.0.5:65535"),
            remote: addr("10.0.0.6:7000"),
        };
        assert!(matches!(pair.feedback_pair(), Err(SessionError::Resolution(_))));
    }
}
