//! Keyframe requests and feedback draining.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time;

use super::track::RtcpReader;
use crate::transport::rtcp;

/// Back-off after a failed feedback read.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Send a PLI for `media_ssrc` every `period` through `send`.
///
/// The first request goes out one period after start. Send failures are
/// logged and the loop carries on.
pub(crate) async fn request_keyframes<F, Fut>(period: Duration, media_ssrc: u32, mut send: F)
where
    F: FnMut(Vec<u8>) -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let mut ticker = time::interval(period);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match send(rtcp::build_pli(media_ssrc)).await {
            Ok(()) => tracing::debug!("Sent PLI for SSRC {:#010x}", media_ssrc),
            Err(e) => tracing::warn!("PLI send failed: {}", e),
        }
    }
}

/// Log every datagram arriving on a feedback socket. Read errors are
/// logged and retried after a short back-off.
pub(crate) async fn drain_socket(socket: Arc<UdpSocket>, buffer_size: usize) {
    drain_socket_with(socket, buffer_size, |packet| {
        tracing::info!("Feedback: {}", rtcp::describe(packet));
    })
    .await
}

async fn drain_socket_with<F>(socket: Arc<UdpSocket>, buffer_size: usize, mut on_packet: F)
where
    F: FnMut(&[u8]),
{
    let mut buf = vec![0u8; buffer_size];
    loop {
        match socket.recv(&mut buf).await {
            Ok(len) => on_packet(&buf[..len]),
            Err(e) => {
                tracing::warn!("Feedback recv error: {}", e);
                time::sleep(READ_ERROR_BACKOFF).await;
            }
        }
    }
}

/// Log every RTCP packet arriving for an outbound track until the
/// reader closes.
pub(crate) async fn drain_track<R: RtcpReader>(mut reader: R) {
    loop {
        match reader.read_rtcp().await {
            Ok(packet) => tracing::info!("Track feedback: {}", rtcp::describe(&packet)),
            Err(e) => {
                tracing::debug!("Track feedback channel closed: {}", e);
                return;
            }
        }
    }
}
