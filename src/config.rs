//! Application configuration
//!
//! Loaded from a TOML file in the platform config directory. Every field has a
//! default, so a partial file (or none at all) is valid.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = "lipsync-streamer.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub sync: SyncConfig,
    pub playback: PlaybackConfig,
    pub viseme: VisemeConfig,
}

/// UDP transport settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the media socket binds to
    pub bind_address: IpAddr,
    /// Port the server listens on (and sends from)
    pub udp_port: u16,
    /// Server endpoint a client says hello to
    pub server_addr: SocketAddr,
    /// Socket receive buffer size
    pub recv_buffer_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            udp_port: DEFAULT_UDP_PORT,
            server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_UDP_PORT),
            recv_buffer_bytes: DEFAULT_RECV_BUFFER_BYTES,
        }
    }
}

/// Framing and clock synchronization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Duration of one audio frame
    pub frame_ms: u32,
    /// Lead the server assigns to new streams
    pub pre_roll_ms: u32,
    /// Buffered depth a client waits for before releasing frames
    pub jitter_target_ms: u32,
    /// Weight of each new clock offset observation
    pub offset_lerp_alpha: f64,
    /// Drain tick period
    pub drain_interval_ms: u64,
    /// Fall back to every hello client when a stream has no subscribers
    pub broadcast_when_no_subscribers: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            frame_ms: DEFAULT_FRAME_MS,
            pre_roll_ms: DEFAULT_PRE_ROLL_MS,
            jitter_target_ms: DEFAULT_JITTER_TARGET_MS,
            offset_lerp_alpha: DEFAULT_OFFSET_LERP_ALPHA,
            drain_interval_ms: DEFAULT_DRAIN_INTERVAL_MS,
            broadcast_when_no_subscribers: true,
        }
    }
}

/// Playback endpoint behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub default_sample_rate: u32,
    pub default_channels: u16,
    /// Audio that must be queued before the renderer starts
    pub warmup_ms: f32,
    /// A pending format switch waits until buffered audio drops to this
    pub format_switch_low_water_ms: f32,
    pub pad_silence_on_underflow: bool,
    pub underflow_low_water_steps: u32,
    pub underflow_pad_steps: u32,
    pub underrun_fade: bool,
    pub fade_ms: u32,
    pub compact_threshold_bytes: usize,
    /// Application update tick period
    pub update_interval_ms: u64,
    /// Renderer block size
    pub render_block_ms: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_sample_rate: DEFAULT_SAMPLE_RATE,
            default_channels: DEFAULT_CHANNELS,
            warmup_ms: 120.0,
            format_switch_low_water_ms: 40.0,
            pad_silence_on_underflow: false,
            underflow_low_water_steps: 4,
            underflow_pad_steps: 8,
            underrun_fade: false,
            fade_ms: 3,
            compact_threshold_bytes: DEFAULT_COMPACT_THRESHOLD,
            update_interval_ms: 16,
            render_block_ms: 10,
        }
    }
}

/// Mouth-shape stepping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VisemeConfig {
    pub step_ms: u32,
    pub neutral_index: usize,
    pub slot_count: usize,
    /// Pop visemes by audio consumption once playback has started
    pub pop_by_audio_progress: bool,
    /// Pop on a step timer while playback has not started
    pub auto_pop: bool,
}

impl Default for VisemeConfig {
    fn default() -> Self {
        Self {
            step_ms: DEFAULT_VISEME_STEP_MS,
            neutral_index: 0,
            slot_count: VISEME_SLOT_COUNT,
            pop_by_audio_progress: true,
            auto_pop: false,
        }
    }
}

impl AppConfig {
    /// Platform config file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "lipsync", "lipsync-streamer")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the platform path, falling back to defaults when absent
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Write the config as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Reject values the media path cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.sync.frame_ms == 0 || self.sync.frame_ms > 1000 {
            return Err(Error::Config(format!("frame_ms out of range: {}", self.sync.frame_ms)));
        }
        if !(0.0..=1.0).contains(&self.sync.offset_lerp_alpha) {
            return Err(Error::Config(format!(
                "offset_lerp_alpha must be within 0..=1, got {}",
                self.sync.offset_lerp_alpha
            )));
        }
        if self.sync.drain_interval_ms == 0 {
            return Err(Error::Config("drain_interval_ms must be positive".into()));
        }
        if self.playback.default_sample_rate == 0 {
            return Err(Error::Config("default_sample_rate must be positive".into()));
        }
        if self.playback.default_channels == 0 || self.playback.default_channels > MAX_CHANNELS {
            return Err(Error::Config(format!(
                "default_channels must be within 1..={}, got {}",
                MAX_CHANNELS, self.playback.default_channels
            )));
        }
        if self.viseme.step_ms == 0 {
            return Err(Error::Config("viseme step_ms must be positive".into()));
        }
        if self.viseme.slot_count > MAX_VISEME_SLOTS {
            return Err(Error::Config(format!(
                "viseme slot_count must be at most {}, got {}",
                MAX_VISEME_SLOTS, self.viseme.slot_count
            )));
        }
        if self.viseme.slot_count == 0 || self.viseme.neutral_index >= self.viseme.slot_count {
            return Err(Error::Config(format!(
                "neutral_index {} outside {} viseme slots",
                self.viseme.neutral_index, self.viseme.slot_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.udp_port, 18500);
        assert_eq!(config.sync.frame_ms, 20);
        assert_eq!(config.viseme.slot_count, 15);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [sync]
            frame_ms = 10

            [viseme]
            neutral_index = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.sync.frame_ms, 10);
        assert_eq!(config.sync.pre_roll_ms, DEFAULT_PRE_ROLL_MS);
        assert_eq!(config.viseme.neutral_index, 3);
        assert_eq!(config.playback, PlaybackConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_neutral_index() {
        let mut config = AppConfig::default();
        config.viseme.neutral_index = 15;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_slot_count_bounds() {
        let mut config = AppConfig::default();
        config.viseme.slot_count = 0;
        config.viseme.neutral_index = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.viseme.slot_count = 257;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.viseme.slot_count = 256;
        config.viseme.neutral_index = 255;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("lipsync-cfg-{}", uuid::Uuid::new_v4()));
        let path = dir.join(CONFIG_FILE_NAME);

        let mut config = AppConfig::default();
        config.playback.pad_silence_on_underflow = true;
        config.sync.jitter_target_ms = 60;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(dir);
    }
}
