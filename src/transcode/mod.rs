//! FFmpeg-backed track endpoints
//!
//! This module handles:
//! - Video decoding and ARGB normalization (the video track reader)
//! - Audio packet pass-through (the audio track reader and writer)
//! - Video re-encoding at the configured codec and bitrate
//! - The output container and its write session

pub mod decoder;
pub mod encoder;
pub mod output;
pub mod reader;
pub mod scaler;
pub mod writer;

pub use encoder::{is_encoder_available, VideoEncoder, VideoEncoderSettings};
pub use output::{OutputAsset, OutputState, SharedOutput};
pub use reader::{AudioTrackReader, VideoTrackReader};
pub use writer::{AudioTrackWriter, VideoTrackWriter};
