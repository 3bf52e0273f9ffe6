//! Minimal SDP (RFC 4566) model: parse, inspect, serialize.
//!
//! Lines are kept in document order so a parsed description serializes back
//! to the same text (modulo line endings). Only the fields the transport
//! needs get typed accessors.

use std::fmt;

use crate::error::{Result, SessionError};

/// One `<type>=<value>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpLine {
    pub kind: char,
    pub value: String,
}

/// An `a=` attribute split into key and optional value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute<'a> {
    pub key: &'a str,
    pub value: Option<&'a str>,
}

impl<'a> Attribute<'a> {
    fn from_line(value: &'a str) -> Self {
        match value.split_once(':') {
            Some((key, value)) => Attribute {
                key,
                value: Some(value),
            },
            None => Attribute { key: value, value: None },
        }
    }
}

/// `c=` line: `IN IP4 203.0.113.1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub net_type: String,
    pub addr_type: String,
    pub address: String,
}

impl Connection {
    fn parse(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 3 {
            return Err(SessionError::parse(format!("malformed c= line: {}", value)));
        }
        // Multicast addresses may carry /ttl and /count suffixes
        let address = parts[2].split('/').next().unwrap_or(parts[2]);
        Ok(Self {
            net_type: parts[0].to_string(),
            addr_type: parts[1].to_string(),
            address: address.to_string(),
        })
    }
}

/// One `m=` section and the lines that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub media: String,
    pub port: u16,
    pub proto: String,
    pub formats: Vec<String>,
    m_line: String,
    lines: Vec<SdpLine>,
}

impl MediaDescription {
    fn parse_m_line(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 3 {
            return Err(SessionError::parse(format!("malformed m= line: {}", value)));
        }
        // port may be written as <port>/<count>
        let port_str = parts[1].split('/').next().unwrap_or(parts[1]);
        let port = port_str
            .parse()
            .map_err(|_| SessionError::parse(format!("bad media port in m= line: {}", value)))?;

        Ok(Self {
            media: parts[0].to_string(),
            port,
            proto: parts[2].to_string(),
            formats: parts[3..].iter().map(|s| s.to_string()).collect(),
            m_line: value.to_string(),
            lines: Vec::new(),
        })
    }

    pub fn attributes(&self) -> impl Iterator<Item = Attribute<'_>> {
        attributes(&self.lines)
    }

    pub fn connection(&self) -> Option<Result<Connection>> {
        connection(&self.lines)
    }
}

/// A parsed session description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    session: Vec<SdpLine>,
    pub media: Vec<MediaDescription>,
}

fn attributes(lines: &[SdpLine]) -> impl Iterator<Item = Attribute<'_>> {
    lines
        .iter()
        .filter(|l| l.kind == 'a')
        .map(|l| Attribute::from_line(&l.value))
}

fn connection(lines: &[SdpLine]) -> Option<Result<Connection>> {
    lines
        .iter()
        .find(|l| l.kind == 'c')
        .map(|l| Connection::parse(&l.value))
}

impl SessionDescription {
    pub fn parse(text: &str) -> Result<Self> {
        let mut session = Vec::new();
        let mut media: Vec<MediaDescription> = Vec::new();

        for (n, raw) in text.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let (kind, value) = line
                .split_once('=')
                .ok_or_else(|| SessionError::parse(format!("SDP line {} has no '=': {}", n + 1, line)))?;
            let mut chars = kind.chars();
            let kind = match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_lowercase() => c,
                _ => {
                    return Err(SessionError::parse(format!(
                        "SDP line {} has invalid type '{}'",
                        n + 1,
                        kind
                    )))
                }
            };

            if session.is_empty() && media.is_empty() && kind != 'v' {
                return Err(SessionError::parse("SDP must start with a v= line"));
            }

            match kind {
                'm' => media.push(MediaDescription::parse_m_line(value)?),
                'c' => {
                    Connection::parse(value)?;
                    push_line(&mut session, &mut media, kind, value);
                }
                _ => push_line(&mut session, &mut media, kind, value),
            }
        }

        if session.is_empty() {
            return Err(SessionError::parse("empty SDP document"));
        }

        Ok(Self { session, media })
    }

    /// Session-level attributes in document order.
    pub fn attributes(&self) -> impl Iterator<Item = Attribute<'_>> {
        attributes(&self.session)
    }

    /// Session-level connection information.
    pub fn connection(&self) -> Option<Result<Connection>> {
        connection(&self.session)
    }

    /// Remove the first session-level attribute named `key`.
    pub fn remove_attribute(&mut self, key: &str) -> bool {
        let pos = self
            .session
            .iter()
            .position(|l| l.kind == 'a' && Attribute::from_line(&l.value).key == key);
        match pos {
            Some(pos) => {
                self.session.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Serialize with CRLF line endings.
    pub fn marshal(&self) -> String {
        self.to_string()
    }
}

fn push_line(session: &mut Vec<SdpLine>, media: &mut [MediaDescription], kind: char, value: &str) {
    let line = SdpLine {
        kind,
        value: value.to_string(),
    };
    match media.last_mut() {
        Some(m) => m.lines.push(line),
        None => session.push(line),
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.session {
            write!(f, "{}={}\r\n", line.kind, line.value)?;
        }
        for m in &self.media {
            write!(f, "m={}\r\n", m.m_line)?;
            for line in &m.lines {
                write!(f, "{}={}\r\n", line.kind, line.value)?;
            }
        }
        Ok(())
    }
}

/// Drop the first session-level `a=fingerprint` and re-serialize.
///
/// Some media servers answer with the fingerprint at both session and media
/// level, which stricter peers reject.
pub fn strip_duplicate_fingerprint(text: &str) -> Result<String> {
    let mut sdp = SessionDescription::parse(text)?;
    if sdp.remove_attribute("fingerprint") {
        tracing::debug!("Removed session-level fingerprint attribute");
    }
    Ok(sdp.marshal())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWER: &str = "v=0\r\n\
o=- 123 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
c=IN IP4 192.168.1.20\r\n\
t=0 0\r\n\
a=fingerprint:sha-256 AA:BB\r\n\
a=group:BUNDLE 0\r\n\
m=video 40000 UDP/TLS/RTP/SAVPF 96 97\r\n\
a=mid:0\r\n\
a=fingerprint:sha-256 AA:BB\r\n\
a=rtpmap:96 VP8/90000\r\n\
a=ssrc:1111 cname:abc\r\n";

    #[test]
    fn test_parse_sections() {
        let sdp = SessionDescription::parse(ANSWER).unwrap();
        assert_eq!(sdp.media.len(), 1);
        let m = &sdp.media[0];
        assert_eq!(m.media, "video");
        assert_eq!(m.port, 40000);
        assert_eq!(m.formats, vec!["96", "97"]);

        let conn = sdp.connection().unwrap().unwrap();
        assert_eq!(conn.address, "192.168.1.20");
        assert!(m.connection().is_none());

        let keys: Vec<&str> = m.attributes().map(|a| a.key).collect();
        assert_eq!(keys, vec!["mid", "fingerprint", "rtpmap", "ssrc"]);
        let ssrc = m.attributes().find(|a| a.key == "ssrc").unwrap();
        assert_eq!(ssrc.value, Some("1111 cname:abc"));
    }

    #[test]
    fn test_marshal_roundtrip() {
        let sdp = SessionDescription::parse(ANSWER).unwrap();
        assert_eq!(sdp.marshal(), ANSWER);
    }

    #[test]
    fn test_strip_duplicate_fingerprint() {
        let fixed = strip_duplicate_fingerprint(ANSWER).unwrap();
        let sdp = SessionDescription::parse(&fixed).unwrap();
        assert!(sdp.attributes().all(|a| a.key != "fingerprint"));
        // Media-level fingerprint stays
        assert!(sdp.media[0].attributes().any(|a| a.key == "fingerprint"));
        assert!(fixed.contains("a=group:BUNDLE 0\r\n"));
    }

    #[test]
    fn test_lf_only_and_flag_attributes() {
        let sdp = SessionDescription::parse("v=0\ns=-\nm=audio 9 RTP/AVP 0\na=sendrecv\n").unwrap();
        let attr = sdp.media[0].attributes().next().unwrap();
        assert_eq!(attr, Attribute { key: "sendrecv", value: None });
    }

    #[test]
    fn test_malformed_documents() {
        assert!(SessionDescription::parse("").is_err());
        assert!(SessionDescription::parse("s=-\r\n").is_err());
        assert!(SessionDescription::parse("v=0\r\nbogus line\r\n").is_err());
        assert!(SessionDescription::parse("v=0\r\nm=video abc RTP/AVP 96\r\n").is_err());
        assert!(SessionDescription::parse("v=0\r\nc=IN IP4\r\n").is_err());
        assert!(SessionDescription::parse("v=0\r\nab=1\r\n").is_err());
    }
}
