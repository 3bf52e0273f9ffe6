//! framecast CLI - stream and record paced video over SDP-negotiated UDP

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use framecast::config::Config;
use framecast::media::codec::CodecCatalog;
use framecast::media::{CodecFamily, FrameSource};
use framecast::session::{self, SessionHandle, SessionOutcome};
use framecast::transport::{self, sdp};

#[derive(Parser)]
#[command(name = "framecast")]
#[command(about = "Paced IVF / Annex-B video streaming over SDP-negotiated UDP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a file to the peer described by an offer/answer pair
    Send {
        /// SDP offer file (local side)
        #[arg(long)]
        offer: PathBuf,

        /// SDP answer file (remote side)
        #[arg(long)]
        answer: PathBuf,

        /// Codec family: vp8 (IVF input) or h264 (Annex-B input)
        #[arg(long, default_value = "vp8")]
        codec: CodecFamily,

        /// Input file
        input: PathBuf,

        /// Drop the duplicate session-level fingerprint some media servers emit
        #[arg(long)]
        kurento_compat: bool,
    },

    /// Record incoming VP8 RTP into an IVF file
    Recv {
        #[arg(long)]
        offer: PathBuf,

        #[arg(long)]
        answer: PathBuf,

        #[arg(long, default_value = "vp8")]
        codec: CodecFamily,

        /// Output IVF file
        output: PathBuf,

        #[arg(long)]
        kurento_compat: bool,
    },

    /// Print the endpoints an offer/answer pair resolves to
    Resolve {
        #[arg(long)]
        offer: PathBuf,

        #[arg(long)]
        answer: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,

        #[arg(long)]
        kurento_compat: bool,
    },

    /// List the codec catalog as SDP attributes
    Codecs {
        /// Only this MIME type (e.g. video/H264)
        mime: Option<String>,
    },

    /// Show the effective configuration
    Config {
        /// Write the defaults to the config file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Send {
            offer,
            answer,
            codec,
            input,
            kurento_compat,
        } => {
            let offer = read_sdp(&offer, false)?;
            let answer = read_sdp(&answer, kurento_compat)?;
            let source = FrameSource::open(codec, &input)
                .with_context(|| format!("Failed to open {}", input.display()))?;
            tracing::info!("Sending {} ({})", input.display(), codec);
            let handle =
                session::transmit_direct(source, &offer, &answer, &config, &CodecCatalog::new())
                    .await?;
            run_session(handle).await?;
        }
        Commands::Recv {
            offer,
            answer,
            codec,
            output,
            kurento_compat,
        } => {
            let offer = read_sdp(&offer, false)?;
            let answer = read_sdp(&answer, kurento_compat)?;
            let handle = session::receive_direct(codec, &output, &offer, &answer, &config).await?;
            tracing::info!("Recording to {} (Ctrl-C to stop)", output.display());
            run_session(handle).await?;
        }
        Commands::Resolve {
            offer,
            answer,
            json,
            kurento_compat,
        } => {
            let offer = read_sdp(&offer, false)?;
            let answer = read_sdp(&answer, kurento_compat)?;
            let endpoints = transport::resolve(&offer, &answer)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&endpoints)?);
            } else {
                println!("media:    {} -> {}", endpoints.media.local, endpoints.media.remote);
                println!(
                    "feedback: {} -> {}",
                    endpoints.feedback.local, endpoints.feedback.remote
                );
                println!("ssrc:     {}", endpoints.ssrc);
            }
        }
        Commands::Codecs { mime } => {
            let catalog = CodecCatalog::new();
            let mimes: Vec<String> = match mime {
                Some(mime) => vec![mime],
                None => catalog.mime_types().map(str::to_string).collect(),
            };
            for mime in mimes {
                let descriptors = catalog.descriptors_for(&mime);
                if descriptors.is_empty() {
                    bail!("No codecs registered for {}", mime);
                }
                println!("{}", mime);
                for descriptor in descriptors {
                    for line in descriptor.sdp_attributes() {
                        println!("  {}", line);
                    }
                }
            }
        }
        Commands::Config { init } => {
            if init {
                let path = match &cli.config {
                    Some(path) => {
                        config.save_to(path)?;
                        path.clone()
                    }
                    None => config.save()?,
                };
                println!("Wrote {}", path.display());
            }
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn read_sdp(path: &Path, kurento_compat: bool) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read SDP file {}", path.display()))?;
    if !kurento_compat {
        return Ok(text);
    }
    sdp::strip_duplicate_fingerprint(&text)
        .with_context(|| format!("Failed to fix up SDP {}", path.display()))
}

/// Wait for the session to finish, cancelling it on Ctrl-C.
async fn run_session(handle: SessionHandle) -> Result<()> {
    let label = handle.label();
    let cancel = handle.cancellation_token();
    let wait = handle.wait();
    tokio::pin!(wait);

    let outcome = tokio::select! {
        outcome = &mut wait => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, stopping {}...", label);
            cancel.cancel();
            wait.await
        }
    };

    match outcome {
        SessionOutcome::Completed => tracing::info!("{}: done", label),
        SessionOutcome::Cancelled => tracing::info!("{}: stopped", label),
        SessionOutcome::Failed(e) => return Err(e).context(format!("{} failed", label)),
    }
    Ok(())
}
