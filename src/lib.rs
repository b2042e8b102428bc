pub mod asset;
pub mod config;
pub mod config_file;
pub mod error;
pub mod export;
pub mod ffmpeg_utils;
pub mod fs;
pub mod pipeline;
pub mod transcode;
pub mod transcoder;

#[cfg(test)]
pub(crate) mod tests;

pub use asset::{SourceAsset, TrackDetails, TrackInfo};
pub use config::{TranscoderConfig, VideoCodec, DEFAULT_VIDEO_BITRATE};
pub use error::{ErrorCategory, FfmpegError, Result, TrackKind, TranscodeError};
pub use export::{export_with_preset, ExportPreset, ExportSession, ExportStatus};
pub use ffmpeg_utils::version_info as ffmpeg_version_info;
pub use ffmpeg_utils::{init, install_log_filter};
pub use fs::{FileSystem, LocalFileSystem};
pub use transcoder::Transcoder;
