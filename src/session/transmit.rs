//! Paced transmitters: direct UDP socket pair and caller-owned track.

use std::future::{self, Future};
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::feedback;
use super::pacer::Pacer;
use super::track::{RtcpReader, Sample, SampleWriter};
use super::{SessionBuilder, SessionHandle, SessionState, StreamEnd};
use crate::config::{Config, DirectFraming};
use crate::error::{Result, SessionError};
use crate::media::codec::CodecCatalog;
use crate::media::h264::H264Payloader;
use crate::media::vp8::Vp8Payloader;
use crate::media::{CodecFamily, Frame, FrameSource};
use crate::transport::endpoint::{self, EndpointPair};
use crate::transport::rtp::{self, Packetizer};

/// Bind the local side of `pair` and connect it to the remote side.
pub(crate) async fn bind_pair(pair: EndpointPair) -> Result<Arc<UdpSocket>> {
    let socket = UdpSocket::bind(pair.local).await?;
    socket.connect(pair.remote).await?;
    Ok(Arc::new(socket))
}

enum Payloader {
    Vp8(Vp8Payloader),
    H264(H264Payloader),
}

/// Turns frames into datagrams for the direct socket.
enum Framer {
    Raw,
    Rtp {
        packetizer: Packetizer,
        payloader: Payloader,
        clock_rate: u32,
    },
}

impl Framer {
    fn new(framing: DirectFraming, family: CodecFamily, catalog: &CodecCatalog) -> Result<Self> {
        if framing == DirectFraming::Raw {
            return Ok(Framer::Raw);
        }

        let descriptor = catalog
            .descriptors_for(family.mime_type())
            .iter()
            .find(|d| !d.is_rtx())
            .ok_or_else(|| SessionError::UnsupportedCodec(family.to_string()))?;
        let payloader = match family {
            CodecFamily::Vp8 => Payloader::Vp8(Vp8Payloader::new(rtp::MTU)),
            CodecFamily::H264 => Payloader::H264(H264Payloader::new(rtp::MTU)),
            CodecFamily::Opus => return Err(SessionError::UnsupportedCodec(family.to_string())),
        };
        let ssrc = rtp::generate_ssrc()?;
        tracing::info!(
            "RTP framing: payload type {}, SSRC {:#010x}",
            descriptor.payload_type,
            ssrc
        );

        Ok(Framer::Rtp {
            packetizer: Packetizer::new(descriptor.payload_type, ssrc),
            payloader,
            clock_rate: descriptor.clock_rate,
        })
    }

    fn datagrams(&mut self, frame: Frame) -> Vec<Vec<u8>> {
        match self {
            Framer::Raw => vec![frame.payload],
            Framer::Rtp {
                packetizer,
                payloader,
                clock_rate,
            } => {
                let payloads = match payloader {
                    Payloader::Vp8(p) => p.payload(&frame.payload),
                    Payloader::H264(p) => p.payload(&frame.payload),
                };
                let ticks = rtp::duration_to_ticks(frame.duration, *clock_rate);
                packetizer.packetize(payloads, ticks)
            }
        }
    }
}

/// Stream `source` over a UDP socket pair resolved from `offer`/`answer`.
///
/// Setup failures (resolution, socket binding) are returned directly; once
/// the handle exists every further failure ends up in its outcome.
pub async fn transmit_direct(
    source: FrameSource,
    offer: &str,
    answer: &str,
    config: &Config,
    catalog: &CodecCatalog,
) -> Result<SessionHandle> {
    config.validate()?;
    let endpoints = endpoint::resolve(offer, answer)?;
    let framer = Framer::new(config.direct_framing, source.family(), catalog)?;

    let media = bind_pair(endpoints.media).await?;
    let feedback_socket = bind_pair(endpoints.feedback).await?;
    tracing::info!(
        "Direct transmit {} -> {} (feedback {} -> {})",
        endpoints.media.local,
        endpoints.media.remote,
        endpoints.feedback.local,
        endpoints.feedback.remote
    );

    let mut builder = SessionBuilder::new("direct-send", SessionState::EndpointsResolved);
    spawn_direct_feedback(&mut builder, feedback_socket, endpoints.ssrc, config);

    let cancel = builder.token();
    let state = builder.state_sender();
    let remote = endpoints.media.remote;
    Ok(builder.run(async move {
        let pacer = Pacer::arm(source, future::ready(())).await;
        state.send_replace(SessionState::Streaming);
        send_datagrams(pacer, media, remote, framer, cancel).await
    }))
}

/// PLI requests and feedback drain shared by both direct paths.
pub(crate) fn spawn_direct_feedback(
    builder: &mut SessionBuilder,
    socket: Arc<UdpSocket>,
    ssrc: u32,
    config: &Config,
) {
    let pli_socket = socket.clone();
    builder.spawn_background(
        "keyframe-request",
        feedback::request_keyframes(config.direct_keyframe_interval(), ssrc, move |pkt| {
            let socket = pli_socket.clone();
            async move { socket.send(&pkt).await.map(|_| ()) }
        }),
    );
    builder.spawn_background(
        "feedback-drain",
        feedback::drain_socket(socket, config.feedback_buffer_size),
    );
}

async fn send_datagrams(
    mut pacer: Pacer,
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    mut framer: Framer,
    cancel: CancellationToken,
) -> Result<StreamEnd> {
    tracing::info!("Sending a frame every {:?} to {}", pacer.interval(), remote);
    let mut frames = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            frame = pacer.next_frame() => {
                let Some(frame) = frame? else {
                    tracing::info!("Sent {} frames", frames);
                    return Ok(StreamEnd::EndOfStream);
                };
                for datagram in framer.datagrams(frame) {
                    socket.send(&datagram).await?;
                }
                frames += 1;
            }
        }
    }
}

/// Stream `source` into a caller-owned track once `ready` resolves.
///
/// RTCP arriving through `feedback` is logged only.
pub fn transmit_track<W, R, F>(source: FrameSource, track: W, feedback: R, ready: F) -> SessionHandle
where
    W: SampleWriter,
    R: RtcpReader,
    F: Future<Output = ()> + Send + 'static,
{
    let mut builder = SessionBuilder::new("track-send", SessionState::Idle);
    builder.spawn_background("feedback-drain", feedback::drain_track(feedback));

    let cancel = builder.token();
    let state = builder.state_sender();
    builder.run(async move {
        let pacer = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            pacer = Pacer::arm(source, ready) => pacer,
        };
        state.send_replace(SessionState::Streaming);
        write_samples(pacer, track, cancel).await
    })
}

async fn write_samples<W: SampleWriter>(
    mut pacer: Pacer,
    mut track: W,
    cancel: CancellationToken,
) -> Result<StreamEnd> {
    tracing::info!("Writing a sample every {:?}", pacer.interval());

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            frame = pacer.next_frame() => {
                let Some(frame) = frame? else {
                    return Ok(StreamEnd::EndOfStream);
                };
                track
                    .write_sample(Sample {
                        data: frame.payload,
                        duration: frame.duration,
                    })
                    .await?;
            }
        }
    }
}
