//! Source asset module
//!
//! This module handles:
//! - Opening the input container
//! - Track discovery (video and audio, with codec and dimension details)
//! - Track selection ("first track wins" unless an index is configured)
//! - Fresh read sessions for the per-track readers

mod track;

pub use track::{analyze_audio_stream, analyze_video_stream, TrackDetails, TrackInfo};

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;

use crate::error::{FfmpegError, Result, TrackKind, TranscodeError};
use crate::fs::{FileSystem, LocalFileSystem};

/// Immutable view of an input media container.
pub struct SourceAsset {
    path: PathBuf,
    tracks: Vec<TrackInfo>,
}

impl SourceAsset {
    /// Open the container at `path` and discover its tracks.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &LocalFileSystem)
    }

    /// Like [`open`](Self::open), asking `fs` whether the input exists.
    pub fn open_with<P: AsRef<Path>>(path: P, fs: &dyn FileSystem) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !fs.exists(&path) {
            return Err(TranscodeError::InputNotFound(path));
        }

        crate::ffmpeg_utils::init()?;

        let context = open_input(&path)?;
        let mut tracks = Vec::new();
        for stream in context.streams() {
            let medium = stream.parameters().medium();
            match medium {
                ffmpeg::media::Type::Video => {
                    let info = analyze_video_stream(&stream);
                    tracing::debug!(
                        "Found video stream {}: {:?}, codec={}",
                        info.stream_index,
                        info.dimensions(),
                        info.codec_name()
                    );
                    tracks.push(info);
                }
                ffmpeg::media::Type::Audio => {
                    let info = analyze_audio_stream(&stream);
                    tracing::debug!(
                        "Found audio stream {}: codec={}",
                        info.stream_index,
                        info.codec_name()
                    );
                    tracks.push(info);
                }
                _ => {
                    tracing::debug!("Skipping stream {} (type={:?})", stream.index(), medium);
                }
            }
        }

        Ok(Self {
            path,
            tracks,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every video and audio track, in container order.
    pub fn tracks(&self) -> &[TrackInfo] {
        &self.tracks
    }

    /// The `nth` track of `kind`, counted among tracks of that kind.
    pub fn select_track(&self, kind: TrackKind, nth: usize) -> Result<&TrackInfo> {
        self.tracks
            .iter()
            .filter(|t| t.kind == kind)
            .nth(nth)
            .ok_or(TranscodeError::MissingTrack(kind))
    }

    /// Open a new read session on the container.
    ///
    /// Each track reader owns its own session so the two can be pulled from
    /// different threads.
    pub fn open_read_session(&self) -> Result<ffmpeg::format::context::Input> {
        open_input(&self.path)
    }
}

fn open_input(path: &Path) -> Result<ffmpeg::format::context::Input> {
    ffmpeg::format::input(path).map_err(|e| {
        TranscodeError::InputUnreadable(
            FfmpegError::OpenInput(format!("{:?}: {}", path, e)).to_string(),
        )
    })
}
