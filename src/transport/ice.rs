//! ICE candidate attribute parsing (RFC 8839 §5.1).
//!
//! ```text
//! candidate:<foundation> <component> <transport> <priority> <address> <port>
//!           typ <host|srflx|prflx|relay> [raddr <addr>] [rport <port>] *(<ext> <value>)
//! ```
//! Only candidates whose address is an IP literal can be turned into a
//! socket address; mDNS hostnames are rejected.

use std::net::{IpAddr, SocketAddr};

use crate::error::{Result, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateType {
    Host,
    ServerReflexive,
    PeerReflexive,
    Relay,
}

/// Parsed ICE candidate from SDP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub foundation: String,
    pub component: u16,
    pub transport: Transport,
    pub priority: u32,
    pub address: String,
    pub port: u16,
    pub candidate_type: CandidateType,
    /// For srflx/prflx/relay: the related address.
    pub raddr: Option<String>,
    pub rport: Option<u16>,
}

impl IceCandidate {
    /// The candidate's transport address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.address.parse().map_err(|_| {
            SessionError::parse(format!("candidate address is not an IP literal: {}", self.address))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Parse a candidate from an `a=candidate:` line, a `candidate:` string or
/// a bare attribute value.
pub fn parse_candidate(line: &str) -> Result<IceCandidate> {
    let line = line.trim();
    let content = line.strip_prefix("a=").unwrap_or(line);
    let content = content.strip_prefix("candidate:").unwrap_or(content);

    let bad = |what: &str| SessionError::parse(format!("bad candidate {}: {}", what, line));

    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 8 {
        return Err(SessionError::parse(format!("candidate line too short: {}", line)));
    }

    let foundation = parts[0].to_string();
    let component: u16 = parts[1].parse().map_err(|_| bad("component"))?;

    let transport = match parts[2].to_ascii_lowercase().as_str() {
        "udp" => Transport::Udp,
        "tcp" => Transport::Tcp,
        _ => return Err(bad("transport")),
    };

    let priority: u32 = parts[3].parse().map_err(|_| bad("priority"))?;
    let address = parts[4].to_string();
    let port: u16 = parts[5].parse().map_err(|_| bad("port"))?;

    if parts[6] != "typ" {
        return Err(bad("'typ' keyword"));
    }

    let candidate_type = match parts[7] {
        "host" => CandidateType::Host,
        "srflx" => CandidateType::ServerReflexive,
        "prflx" => CandidateType::PeerReflexive,
        "relay" => CandidateType::Relay,
        _ => return Err(bad("type")),
    };

    let mut raddr = None;
    let mut rport = None;
    let mut i = 8;
    while i + 1 < parts.len() {
        match parts[i] {
            "raddr" => raddr = Some(parts[i + 1].to_string()),
            "rport" => rport = Some(parts[i + 1].parse().map_err(|_| bad("rport"))?),
            // generation, ufrag, network-id, tcptype, ...
            _ => {}
        }
        i += 2;
    }

    Ok(IceCandidate {
        foundation,
        component,
        transport,
        priority,
        address,
        port,
        candidate_type,
        raddr,
        rport,
    })
}
