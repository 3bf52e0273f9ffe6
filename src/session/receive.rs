//! VP8 receivers writing IVF files.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::feedback;
use super::track::{RemoteTrack, RtcpWriter};
use super::transmit::{bind_pair, spawn_direct_feedback};
use super::{SessionBuilder, SessionHandle, SessionState, StreamEnd};
use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::media::ivf::IvfWriter;
use crate::media::CodecFamily;
use crate::transport::{endpoint, rtp};

type FileWriter = IvfWriter<BufWriter<File>>;

fn require_vp8(family: CodecFamily) -> Result<()> {
    match family {
        CodecFamily::Vp8 => Ok(()),
        other => Err(SessionError::UnsupportedCodec(other.to_string())),
    }
}

fn open_writer(output: &Path, config: &Config) -> Result<FileWriter> {
    let writer = IvfWriter::create(output, config.ivf_width, config.ivf_height)?;
    tracing::info!(
        "Recording VP8 to {} ({}x{})",
        output.display(),
        config.ivf_width,
        config.ivf_height
    );
    Ok(writer)
}

/// Close the writer whatever the loop returned; the loop's error wins.
fn finish(writer: FileWriter, result: Result<StreamEnd>) -> Result<StreamEnd> {
    let frames = writer.frame_count();
    let closed = writer.close();
    let end = result?;
    closed?;
    tracing::info!("Closed IVF file after {} frames", frames);
    Ok(end)
}

/// Receive VP8 RTP over a UDP socket pair resolved from `offer`/`answer`
/// and write it to `output`.
pub async fn receive_direct(
    family: CodecFamily,
    output: &Path,
    offer: &str,
    answer: &str,
    config: &Config,
) -> Result<SessionHandle> {
    require_vp8(family)?;
    config.validate()?;
    let endpoints = endpoint::resolve(offer, answer)?;

    let media = bind_pair(endpoints.media).await?;
    let feedback_socket = bind_pair(endpoints.feedback).await?;
    let mut writer = open_writer(output, config)?;
    tracing::info!(
        "Direct receive on {} from {}",
        endpoints.media.local,
        endpoints.media.remote
    );

    let mut builder = SessionBuilder::new("direct-recv", SessionState::EndpointsResolved);
    spawn_direct_feedback(&mut builder, feedback_socket, endpoints.ssrc, config);

    let cancel = builder.token();
    let state = builder.state_sender();
    let buffer_size = config.recv_buffer_size;
    Ok(builder.run(async move {
        state.send_replace(SessionState::Streaming);
        let result = read_socket(&media, buffer_size, &mut writer, &cancel).await;
        finish(writer, result)
    }))
}

async fn read_socket(
    socket: &UdpSocket,
    buffer_size: usize,
    writer: &mut FileWriter,
    cancel: &CancellationToken,
) -> Result<StreamEnd> {
    let mut buf = vec![0u8; buffer_size];
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            len = socket.recv(&mut buf) => {
                let packet = rtp::decode(&buf[..len?])?;
                writer.write_rtp(&packet)?;
            }
        }
    }
}

/// Receive a caller-owned remote VP8 track into `output`, requesting a
/// keyframe through `rtcp` every track keyframe interval.
pub fn receive_track<T: RemoteTrack>(
    mut track: T,
    rtcp: Arc<dyn RtcpWriter>,
    output: &Path,
    config: &Config,
) -> Result<SessionHandle> {
    let family = CodecFamily::from_mime(track.mime_type())?;
    require_vp8(family)?;
    config.validate()?;
    let mut writer = open_writer(output, config)?;

    let ssrc = track.ssrc();
    tracing::info!("Receiving remote track SSRC {:#010x}", ssrc);

    let mut builder = SessionBuilder::new("track-recv", SessionState::Idle);
    builder.spawn_background(
        "keyframe-request",
        feedback::request_keyframes(config.track_keyframe_interval(), ssrc, move |pkt| {
            let rtcp = rtcp.clone();
            async move { rtcp.write_rtcp(pkt).await }
        }),
    );

    let cancel = builder.token();
    let state = builder.state_sender();
    Ok(builder.run(async move {
        state.send_replace(SessionState::Streaming);
        let result = read_track(&mut track, &mut writer, &cancel).await;
        finish(writer, result)
    }))
}

async fn read_track<T: RemoteTrack>(
    track: &mut T,
    writer: &mut FileWriter,
    cancel: &CancellationToken,
) -> Result<StreamEnd> {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            data = track.read_rtp() => {
                let packet = rtp::decode(&data?)?;
                writer.write_rtp(&packet)?;
            }
        }
    }
}
