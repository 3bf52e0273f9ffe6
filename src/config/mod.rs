//! Configuration storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SessionError;

/// How frames are put on the wire by the direct-socket transmitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectFraming {
    /// Bare frame / NAL bytes, one datagram each. Debug transport only.
    #[default]
    Raw,
    /// RTP packetization (VP8 payload descriptor or H.264 FU-A).
    Rtp,
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// PLI period on the direct-socket paths
    pub direct_keyframe_interval_ms: u64,
    /// PLI period on the track receive path
    pub track_keyframe_interval_ms: u64,
    /// Read buffer for the feedback drain
    pub feedback_buffer_size: usize,
    /// Read buffer for inbound media datagrams
    pub recv_buffer_size: usize,
    pub direct_framing: DirectFraming,
    /// Dimensions stamped into IVF headers written by the receivers
    pub ivf_width: u16,
    pub ivf_height: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            direct_keyframe_interval_ms: 2000,
            track_keyframe_interval_ms: 3000,
            feedback_buffer_size: 2000,
            recv_buffer_size: 2000,
            direct_framing: DirectFraming::Raw,
            ivf_width: 640,
            ivf_height: 480,
        }
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "framecast", "framecast")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the platform config directory
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Reject values that would stall a session: zero periods or buffers.
    pub fn validate(&self) -> crate::error::Result<()> {
        let invalid = |field: &str| -> crate::error::Result<()> {
            Err(SessionError::Config(format!("{} must be greater than zero", field)))
        };
        if self.direct_keyframe_interval_ms == 0 {
            return invalid("direct_keyframe_interval_ms");
        }
        if self.track_keyframe_interval_ms == 0 {
            return invalid("track_keyframe_interval_ms");
        }
        if self.feedback_buffer_size == 0 {
            return invalid("feedback_buffer_size");
        }
        if self.recv_buffer_size == 0 {
            return invalid("recv_buffer_size");
        }
        Ok(())
    }

    /// Save configuration to the platform config directory
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn direct_keyframe_interval(&self) -> Duration {
        Duration::from_millis(self.direct_keyframe_interval_ms)
    }

    pub fn track_keyframe_interval(&self) -> Duration {
        Duration::from_millis(self.track_keyframe_interval_ms)
    }
}
