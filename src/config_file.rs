//! Configuration file support
//!
//! Loads transcoder configuration from TOML files.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{AppConfig, LogFormat, LoggingConfig, TranscoderConfig, VideoCodec};
use crate::error::{Result, TranscodeError};

/// Configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Transcode settings
    pub transcode: TranscodeSettings,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeSettings {
    /// Video codec (h264, hevc, mpeg4)
    pub video_codec: Option<VideoCodec>,
    /// Average video bitrate in bps
    pub video_bitrate: u64,
    /// Keyframe interval in frames
    pub gop_size: Option<u32>,
    /// Encoder preset
    pub encoder_preset: Option<String>,
    /// Video track to use (0 = first)
    pub video_track: Option<usize>,
    /// Audio track to use (0 = first)
    pub audio_track: Option<usize>,
    /// Replace existing outputs
    pub overwrite: Option<bool>,
    /// Pipeline deadline in seconds
    pub deadline_secs: Option<u64>,
    /// Writer readiness poll interval in milliseconds
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| {
            TranscodeError::Config(format!("{}: {}", path.as_ref().display(), e))
        })
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TranscodeError::Config(format!("serialize: {}", e)))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Generate default configuration file
    pub fn default_config() -> Self {
        let defaults = TranscoderConfig::default();
        Self {
            transcode: TranscodeSettings {
                video_codec: Some(defaults.video_codec),
                video_bitrate: defaults.video_bitrate,
                gop_size: None,
                encoder_preset: None,
                video_track: Some(defaults.video_track),
                audio_track: Some(defaults.audio_track),
                overwrite: Some(defaults.overwrite),
                deadline_secs: None,
                poll_interval_ms: Some(defaults.poll_interval_ms),
            },
            logging: Some(LoggingSettings {
                level: "info".to_string(),
                format: Some("pretty".to_string()),
            }),
        }
    }

    /// Convert to AppConfig, filling unset fields with defaults
    pub fn into_app_config(self) -> Result<AppConfig> {
        let defaults = TranscoderConfig::default();
        let t = self.transcode;
        let transcode = TranscoderConfig {
            video_codec: t.video_codec.unwrap_or(defaults.video_codec),
            video_bitrate: t.video_bitrate,
            gop_size: t.gop_size,
            encoder_preset: t.encoder_preset,
            video_track: t.video_track.unwrap_or(defaults.video_track),
            audio_track: t.audio_track.unwrap_or(defaults.audio_track),
            overwrite: t.overwrite.unwrap_or(defaults.overwrite),
            deadline_secs: t.deadline_secs,
            poll_interval_ms: t.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
        };
        transcode.validate()?;

        let logging = match self.logging {
            Some(l) => LoggingConfig {
                level: l.level,
                format: match l.format.as_deref() {
                    None | Some("pretty") => LogFormat::Pretty,
                    Some("json") => LogFormat::Json,
                    Some(other) => {
                        return Err(TranscodeError::Config(format!(
                            "unknown log format: {}",
                            other
                        )))
                    }
                },
            },
            None => LoggingConfig::default(),
        };

        Ok(AppConfig { transcode, logging })
    }
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    ConfigFile::default_config().to_file(path)
}
