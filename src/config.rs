//! Transcoder configuration

use std::time::Duration;

use ffmpeg_next as ffmpeg;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TranscodeError};

/// Average video bitrate used when none is configured (bits per second)
pub const DEFAULT_VIDEO_BITRATE: u64 = 900_000;

/// How long a pull loop waits before re-checking a writer that is not ready
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5;

/// Target codec for the re-encoded video track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    Hevc,
    Mpeg4,
}

impl VideoCodec {
    /// FFmpeg codec id for this codec
    pub fn codec_id(self) -> ffmpeg::codec::Id {
        match self {
            VideoCodec::H264 => ffmpeg::codec::Id::H264,
            VideoCodec::Hevc => ffmpeg::codec::Id::HEVC,
            VideoCodec::Mpeg4 => ffmpeg::codec::Id::MPEG4,
        }
    }
}

/// Transcoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    /// Codec of the re-encoded video track
    pub video_codec: VideoCodec,

    /// Target average video bitrate in bps
    pub video_bitrate: u64,

    /// Keyframe interval in frames; encoder default when unset
    pub gop_size: Option<u32>,

    /// Encoder speed preset (e.g. "veryfast" for libx264)
    pub encoder_preset: Option<String>,

    /// Which video track to transcode, counted among video tracks (0 = first)
    pub video_track: usize,

    /// Which audio track to pass through, counted among audio tracks (0 = first)
    pub audio_track: usize,

    /// Replace an existing file at the output location instead of failing
    pub overwrite: bool,

    /// Upper bound for the whole pipeline run in seconds; unbounded when unset
    pub deadline_secs: Option<u64>,

    /// Back-off between readiness checks of a busy writer, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            video_codec: VideoCodec::H264,
            video_bitrate: DEFAULT_VIDEO_BITRATE,
            gop_size: None,
            encoder_preset: None,
            video_track: 0,
            audio_track: 0,
            overwrite: false,
            deadline_secs: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl TranscoderConfig {
    /// Pipeline deadline, if any
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// Writer readiness poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject settings the encoder or the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.video_bitrate == 0 {
            return Err(TranscodeError::Config(
                "video_bitrate must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(TranscodeError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.gop_size == Some(0) {
            return Err(TranscodeError::Config(
                "gop_size must be greater than zero".to_string(),
            ));
        }
        if self.deadline_secs == Some(0) {
            return Err(TranscodeError::Config(
                "deadline_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration for the command-line entry point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Everything the binary needs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub transcode: TranscoderConfig,
    pub logging: LoggingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TranscoderConfig::default();
        assert_eq!(config.video_codec, VideoCodec::H264);
        assert_eq!(config.video_bitrate, 900_000);
        assert_eq!(config.video_track, 0);
        assert_eq!(config.audio_track, 0);
        assert!(!config.overwrite);
        assert!(config.deadline().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_poll_interval() {
        let config = TranscoderConfig {
            poll_interval_ms: 20,
            ..Default::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_validate_rejects_zero_bitrate() {
        let config = TranscoderConfig {
            video_bitrate: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TranscodeError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_deadline() {
        let config = TranscoderConfig {
            deadline_secs: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_codec_ids() {
        assert_eq!(VideoCodec::H264.codec_id(), ffmpeg::codec::Id::H264);
        assert_eq!(VideoCodec::Hevc.codec_id(), ffmpeg::codec::Id::HEVC);
        assert_eq!(VideoCodec::Mpeg4.codec_id(), ffmpeg::codec::Id::MPEG4);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TranscoderConfig = toml::from_str("video_bitrate = 1500000").unwrap();
        assert_eq!(config.video_bitrate, 1_500_000);
        assert_eq!(config.video_codec, VideoCodec::H264);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }
}
