//! Seams to an external media engine that owns negotiated tracks.
//!
//! The engine (ICE, DTLS, SRTP, packetization) is not part of this crate;
//! the track paths only need these four capabilities from it.

use std::io;
use std::time::Duration;

use futures::future::BoxFuture;

/// A self-contained timed media sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub data: Vec<u8>,
    pub duration: Duration,
}

/// Outbound local track accepting whole samples.
pub trait SampleWriter: Send + 'static {
    fn write_sample(&mut self, sample: Sample) -> BoxFuture<'_, io::Result<()>>;
}

/// RTCP arriving for an outbound track.
pub trait RtcpReader: Send + 'static {
    /// Next raw RTCP datagram. An error means the channel is gone.
    fn read_rtcp(&mut self) -> BoxFuture<'_, io::Result<Vec<u8>>>;
}

/// Inbound remote track delivering raw RTP packets.
pub trait RemoteTrack: Send + 'static {
    fn ssrc(&self) -> u32;

    fn mime_type(&self) -> &str;

    fn read_rtp(&mut self) -> BoxFuture<'_, io::Result<Vec<u8>>>;
}

/// Sends RTCP toward the remote peer of an inbound track.
pub trait RtcpWriter: Send + Sync + 'static {
    fn write_rtcp(&self, packet: Vec<u8>) -> BoxFuture<'_, io::Result<()>>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Channel-backed track doubles.

    use super::*;
    use futures::FutureExt;
    use tokio::sync::mpsc;

    fn closed() -> io::Error {
        io::Error::new(io::ErrorKind::BrokenPipe, "channel closed")
    }

    pub struct ChannelSampleWriter(pub mpsc::UnboundedSender<Sample>);

    impl SampleWriter for ChannelSampleWriter {
        fn write_sample(&mut self, sample: Sample) -> BoxFuture<'_, io::Result<()>> {
            let result = self.0.send(sample).map_err(|_| closed());
            async move { result }.boxed()
        }
    }

    pub struct ChannelRtcpReader(pub mpsc::UnboundedReceiver<Vec<u8>>);

    impl RtcpReader for ChannelRtcpReader {
        fn read_rtcp(&mut self) -> BoxFuture<'_, io::Result<Vec<u8>>> {
            async move { self.0.recv().await.ok_or_else(closed) }.boxed()
        }
    }

    pub struct ChannelRemoteTrack {
        pub ssrc: u32,
        pub mime_type: String,
        pub packets: mpsc::UnboundedReceiver<Vec<u8>>,
    }

    impl RemoteTrack for ChannelRemoteTrack {
        fn ssrc(&self) -> u32 {
            self.ssrc
        }

        fn mime_type(&self) -> &str {
            &self.mime_type
        }

        fn read_rtp(&mut self) -> BoxFuture<'_, io::Result<Vec<u8>>> {
            async move { self.packets.recv().await.ok_or_else(closed) }.boxed()
        }
    }

    pub struct ChannelRtcpWriter(pub mpsc::UnboundedSender<Vec<u8>>);

    impl RtcpWriter for ChannelRtcpWriter {
        fn write_rtcp(&self, packet: Vec<u8>) -> BoxFuture<'_, io::Result<()>> {
            let result = self.0.send(packet).map_err(|_| closed());
            async move { result }.boxed()
        }
    }

    fn std_port_pair() -> (std::net::UdpSocket, std::net::UdpSocket) {
        for _ in 0..100 {
            let first = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
            let port = first.local_addr().unwrap().port();
            if port == u16::MAX {
                continue;
            }
            if let Ok(second) = std::net::UdpSocket::bind(("127.0.0.1", port + 1)) {
                return (first, second);
            }
        }
        panic!("no free UDP port pair on loopback");
    }

    /// A port `p` such that `p` and `p + 1` were both free a moment ago.
    pub fn free_port_pair() -> u16 {
        let (first, _second) = std_port_pair();
        first.local_addr().unwrap().port()
    }

    /// Bound loopback sockets on adjacent ports (media, feedback).
    pub async fn bind_port_pair() -> (tokio::net::UdpSocket, tokio::net::UdpSocket) {
        let (first, second) = std_port_pair();
        first.set_nonblocking(true).unwrap();
        second.set_nonblocking(true).unwrap();
        (
            tokio::net::UdpSocket::from_std(first).unwrap(),
            tokio::net::UdpSocket::from_std(second).unwrap(),
        )
    }

    /// Loopback offer/answer pair for the direct paths.
    pub fn direct_sdp(local_port: u16, remote_port: u16, ssrc: Option<u32>) -> (String, String) {
        let mut offer = format!(
            "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
             m=video 9 RTP/AVPF 96\r\n\
             a=candidate:1 1 UDP 2130706431 127.0.0.1 {} typ host\r\n",
            local_port
        );
        if let Some(ssrc) = ssrc {
            offer.push_str(&format!("a=ssrc:{} cname:test\r\n", ssrc));
        }
        let answer = format!(
            "v=0\r\no=- 2 1 IN IP4 127.0.0.1\r\ns=-\r\nc=IN IP4 127.0.0.1\r\nt=0 0\r\n\
             m=video {} RTP/AVPF 96\r\n",
            remote_port
        );
        (offer, answer)
    }
}
