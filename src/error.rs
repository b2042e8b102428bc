use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Kind of track inside a media container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => write!(f, "video"),
            TrackKind::Audio => write!(f, "audio"),
        }
    }
}

/// Coarse classification of a [`TranscodeError`].
///
/// Every failure a caller can observe falls into exactly one of these buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Nothing readable at the input location
    InputUnreadable,
    /// The input lacks a required video or audio track
    MissingTrack,
    /// A reader, writer or the output container could not be set up
    Construction,
    /// Failure after the write session started (append, flush or finalize)
    Write,
    /// The run was stopped by a deadline or cancellation
    Aborted,
}

/// Main error type for the transcoder
#[derive(Error, Debug)]
pub enum TranscodeError {
    /// An error originating from the underlying FFmpeg library
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No file exists at the input location
    #[error("Input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// A file exists at the input location but could not be opened as media
    #[error("Input unreadable: {0}")]
    InputUnreadable(String),

    /// The source has no track of the required kind
    #[error("No {0} track found in source file")]
    MissingTrack(TrackKind),

    /// The output location is already taken and overwriting is disabled
    #[error("Output already exists: {}", .0.display())]
    OutputExists(PathBuf),

    /// A reader or writer could not be constructed
    #[error("Construction failed: {0}")]
    Construction(String),

    /// Writing into the output container failed
    #[error("Write failed: {0}")]
    Write(String),

    /// A pipeline task panicked or was aborted by the runtime
    #[error("Pipeline task failed: {0}")]
    Task(String),

    /// A pull loop did not complete before the configured deadline
    #[error("Transcode timed out after {0:?}")]
    Timeout(Duration),

    /// The run was cancelled before it could complete
    #[error("Transcode cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TranscodeError {
    /// Map this error onto the four-way failure taxonomy (plus aborts).
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranscodeError::InputNotFound(_) | TranscodeError::InputUnreadable(_) => {
                ErrorCategory::InputUnreadable
            }
            TranscodeError::MissingTrack(_) => ErrorCategory::MissingTrack,
            TranscodeError::OutputExists(_)
            | TranscodeError::Construction(_)
            | TranscodeError::Config(_) => ErrorCategory::Construction,
            TranscodeError::Write(_) | TranscodeError::Io(_) | TranscodeError::Task(_) => {
                ErrorCategory::Write
            }
            TranscodeError::Timeout(_) | TranscodeError::Cancelled => ErrorCategory::Aborted,
            TranscodeError::Ffmpeg(e) => e.category(),
        }
    }

    /// Whether this error only reflects that another part of the run failed first.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TranscodeError::Cancelled)
    }
}

/// FFmpeg-specific errors
#[derive(Error, Debug)]
pub enum FfmpegError {
    /// Failure during global FFmpeg initialization
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    /// Failure opening an input media file
    #[error("Failed to open input file: {0}")]
    OpenInput(String),

    /// The requested decoder for a specific codec ID was not found
    #[error("Failed to find decoder: codec_id={0}")]
    DecoderNotFound(String),

    /// Failure instantiating a decoder
    #[error("Failed to create decoder: {0}")]
    DecoderCreate(String),

    /// The requested encoder for a specific codec ID was not found
    #[error("Failed to find encoder: codec_id={0}")]
    EncoderNotFound(String),

    /// Failure instantiating or opening an encoder
    #[error("Failed to create encoder: {0}")]
    EncoderCreate(String),

    /// Failure creating a pixel format converter
    #[error("Failed to create scaler: {0}")]
    ScalerCreate(String),

    /// Failure creating an output format muxer
    #[error("Failed to create muxer: {0}")]
    MuxerCreate(String),

    /// Failure configuring output streams
    #[error("Stream configuration failed: {0}")]
    StreamConfig(String),

    /// Failure writing the container header
    #[error("Failed to write header: {0}")]
    WriteHeader(String),

    /// Failure reading a packet from the input container
    #[error("Failed to read packet: {0}")]
    ReadPacket(String),

    /// Failure decoding a single packet into a frame
    #[error("Failed to decode packet: {0}")]
    DecodePacket(String),

    /// Failure converting a frame between pixel formats
    #[error("Failed to scale frame: {0}")]
    ScaleFrame(String),

    /// Failure encoding a single frame into a packet
    #[error("Failed to encode frame: {0}")]
    EncodeFrame(String),

    /// Failure writing a media packet to the container
    #[error("Failed to write packet: {0}")]
    WritePacket(String),

    /// Failure writing the container trailer
    #[error("Failed to write trailer: {0}")]
    WriteTrailer(String),
}

impl FfmpegError {
    fn category(&self) -> ErrorCategory {
        match self {
            FfmpegError::OpenInput(_) => ErrorCategory::InputUnreadable,
            FfmpegError::InitFailed(_)
            | FfmpegError::DecoderNotFound(_)
            | FfmpegError::DecoderCreate(_)
            | FfmpegError::EncoderNotFound(_)
            | FfmpegError::EncoderCreate(_)
            | FfmpegError::ScalerCreate(_)
            | FfmpegError::MuxerCreate(_)
            | FfmpegError::StreamConfig(_)
            | FfmpegError::WriteHeader(_) => ErrorCategory::Construction,
            FfmpegError::ReadPacket(_)
            | FfmpegError::DecodePacket(_)
            | FfmpegError::ScaleFrame(_)
            | FfmpegError::EncodeFrame(_)
            | FfmpegError::WritePacket(_)
            | FfmpegError::WriteTrailer(_) => ErrorCategory::Write,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TranscodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_kind_display() {
        assert_eq!(TrackKind::Video.to_string(), "video");
        assert_eq!(TrackKind::Audio.to_string(), "audio");
    }

    #[test]
    fn test_missing_track_message() {
        let err = TranscodeError::MissingTrack(TrackKind::Audio);
        assert_eq!(err.to_string(), "No audio track found in source file");
        assert_eq!(err.category(), ErrorCategory::MissingTrack);
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            TranscodeError::InputNotFound(PathBuf::from("/nope.mov")).category(),
            ErrorCategory::InputUnreadable
        );
        assert_eq!(
            TranscodeError::OutputExists(PathBuf::from("/out.mov")).category(),
            ErrorCategory::Construction
        );
        assert_eq!(
            TranscodeError::from(FfmpegError::EncoderNotFound("h264".into())).category(),
            ErrorCategory::Construction
        );
        assert_eq!(
            TranscodeError::from(FfmpegError::WriteTrailer("eio".into())).category(),
            ErrorCategory::Write
        );
        assert_eq!(
            TranscodeError::from(FfmpegError::OpenInput("bad".into())).category(),
            ErrorCategory::InputUnreadable
        );
        assert_eq!(
            TranscodeError::Timeout(Duration::from_secs(1)).category(),
            ErrorCategory::Aborted
        );
    }

    #[test]
    fn test_path_in_message() {
        let err = TranscodeError::OutputExists(PathBuf::from("/tmp/out.mov"));
        assert_eq!(err.to_string(), "Output already exists: /tmp/out.mov");
    }
}
