//! Output container being assembled
//!
//! `OutputAsset` owns the muxer for the destination file. It holds exactly one
//! video input and one audio input and moves through
//! `NotStarted -> Writing -> Finished`, each step once. It refuses to finish
//! until both tracks have been marked finished.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ffmpeg_next as ffmpeg;
use parking_lot::Mutex;

use crate::error::{FfmpegError, Result, TrackKind, TranscodeError};
use crate::ffmpeg_utils::helpers;

/// Output asset shared by the two track writers and the finalizer.
pub type SharedOutput = Arc<Mutex<OutputAsset>>;

/// Write session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    NotStarted,
    Writing,
    Finished,
}

/// One track input of the output container
struct TrackInput {
    stream_index: usize,
    /// Time base of packets handed to `write_sample`
    packet_time_base: ffmpeg::Rational,
    /// Time base chosen by the muxer, known once the header is written
    stream_time_base: ffmpeg::Rational,
    samples: u64,
    finished: bool,
}

/// Mutable, write-once container at a destination path
pub struct OutputAsset {
    path: PathBuf,
    output: ffmpeg::format::context::Output,
    state: OutputState,
    video: Option<TrackInput>,
    audio: Option<TrackInput>,
}

// SAFETY: the muxer context is only ever touched through `&mut self`, and every
// shared use goes through `SharedOutput`'s mutex, so no two threads access the
// underlying `AVFormatContext` at the same time.
unsafe impl Send for OutputAsset {}

impl OutputAsset {
    /// Create the muxer for `path`; the container format follows the extension.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let output = ffmpeg::format::output(&path).map_err(|e| {
            FfmpegError::MuxerCreate(format!("Failed to create output {:?}: {}", path, e))
        })?;

        tracing::debug!("Output container created: {:?} ({})", path, output.format().name());

        Ok(Self {
            path,
            output,
            state: OutputState::NotStarted,
            video: None,
            audio: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> OutputState {
        self.state
    }

    /// Whether encoders feeding this container must emit global headers.
    pub fn wants_global_header(&self) -> bool {
        self.output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER)
    }

    /// Add the video input, described by an opened encoder's parameters.
    pub fn add_video_track(
        &mut self,
        codec_id: ffmpeg::codec::Id,
        params: ffmpeg::codec::Parameters,
        time_base: ffmpeg::Rational,
        display_matrix: Option<&[i32; 9]>,
    ) -> Result<()> {
        self.ensure_state(OutputState::NotStarted, "add a video track")?;
        if self.video.is_some() {
            return Err(TranscodeError::Construction(
                "output already has a video track".to_string(),
            ));
        }

        let mut out_stream = self
            .output
            .add_stream(ffmpeg::encoder::find(codec_id))
            .map_err(|e| FfmpegError::StreamConfig(format!("Failed to add video stream: {}", e)))?;
        out_stream.set_parameters(params);
        out_stream.set_time_base(time_base);

        if let Some(matrix) = display_matrix {
            if !helpers::stream_set_display_matrix(&mut out_stream, matrix) {
                return Err(FfmpegError::StreamConfig(
                    "Failed to attach display matrix to video stream".to_string(),
                )
                .into());
            }
        }

        let stream_index = out_stream.index();
        tracing::debug!(stream_index, "Added video stream");
        self.video = Some(TrackInput::new(stream_index, time_base));
        Ok(())
    }

    /// Add the audio input as a stream copy of the source parameters.
    pub fn add_audio_track(
        &mut self,
        params: ffmpeg::codec::Parameters,
        time_base: ffmpeg::Rational,
    ) -> Result<()> {
        self.ensure_state(OutputState::NotStarted, "add an audio track")?;
        if self.audio.is_some() {
            return Err(TranscodeError::Construction(
                "output already has an audio track".to_string(),
            ));
        }

        let mut out_stream = self
            .output
            .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))
            .map_err(|e| FfmpegError::StreamConfig(format!("Failed to add audio stream: {}", e)))?;
        out_stream.set_parameters(params);
        // Reset codec_tag to let the muxer decide the correct tag for the container.
        helpers::stream_reset_codec_tag(&mut out_stream);
        out_stream.set_time_base(time_base);

        let stream_index = out_stream.index();
        tracing::debug!(stream_index, "Added audio stream");
        self.audio = Some(TrackInput::new(stream_index, time_base));
        Ok(())
    }

    /// Write the container header. The timeline always starts at zero.
    pub fn start_session(&mut self) -> Result<()> {
        self.ensure_state(OutputState::NotStarted, "start writing")?;
        if self.video.is_none() || self.audio.is_none() {
            return Err(TranscodeError::Construction(
                "output needs one video and one audio track before writing".to_string(),
            ));
        }

        let mut opts = ffmpeg::Dictionary::new();
        opts.set("movflags", "+faststart");
        self.output
            .write_header_with(opts)
            .map_err(|e| FfmpegError::WriteHeader(format!("Failed to write header: {}", e)))?;

        // The muxer may have replaced the requested time bases
        for track in [self.video.as_mut(), self.audio.as_mut()].into_iter().flatten() {
            if let Some(stream) = self.output.stream(track.stream_index) {
                track.stream_time_base = stream.time_base();
            }
        }

        self.state = OutputState::Writing;
        tracing::debug!("Write session started: {:?}", self.path);
        Ok(())
    }

    /// Write one packet of `kind`, with timestamps in that track's packet time base.
    pub fn write_sample(&mut self, kind: TrackKind, packet: &mut ffmpeg::Packet) -> Result<()> {
        if self.state != OutputState::Writing {
            return Err(TranscodeError::Write(format!(
                "cannot write {} sample while output is {:?}",
                kind, self.state
            )));
        }
        let track = self.track_mut(kind)?;
        if track.finished {
            return Err(TranscodeError::Write(format!(
                "{} track already marked finished",
                kind
            )));
        }

        packet.rescale_ts(track.packet_time_base, track.stream_time_base);
        packet.set_stream(track.stream_index);
        packet.set_position(-1);
        track.samples += 1;

        packet
            .write_interleaved(&mut self.output)
            .map_err(|e| FfmpegError::WritePacket(format!("{} packet: {}", kind, e)).into())
    }

    /// Record that no more samples of `kind` will arrive.
    pub fn mark_finished(&mut self, kind: TrackKind) -> Result<()> {
        let track = self.track_mut(kind)?;
        track.finished = true;
        tracing::debug!(track = %kind, samples = track.samples, "Output track finished");
        Ok(())
    }

    pub fn is_track_finished(&self, kind: TrackKind) -> bool {
        self.track(kind).map(|t| t.finished).unwrap_or(false)
    }

    /// Packets written so far for `kind`.
    pub fn samples_written(&self, kind: TrackKind) -> u64 {
        self.track(kind).map(|t| t.samples).unwrap_or(0)
    }

    /// Write the trailer and close the container.
    pub fn finish(&mut self) -> Result<()> {
        self.ensure_state(OutputState::Writing, "finish")?;
        for kind in [TrackKind::Video, TrackKind::Audio] {
            if !self.is_track_finished(kind) {
                return Err(TranscodeError::Write(format!(
                    "cannot finish output before the {} track is finished",
                    kind
                )));
            }
        }

        self.output
            .write_trailer()
            .map_err(|e| FfmpegError::WriteTrailer(format!("{:?}: {}", self.path, e)))?;
        self.state = OutputState::Finished;
        tracing::debug!(
            video_packets = self.samples_written(TrackKind::Video),
            audio_packets = self.samples_written(TrackKind::Audio),
            "Output finalized: {:?}",
            self.path
        );
        Ok(())
    }

    pub fn into_shared(self) -> SharedOutput {
        Arc::new(Mutex::new(self))
    }

    fn ensure_state(&self, expected: OutputState, action: &str) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        let message = format!("cannot {} while output is {:?}", action, self.state);
        match self.state {
            OutputState::NotStarted => Err(TranscodeError::Construction(message)),
            OutputState::Writing | OutputState::Finished => Err(TranscodeError::Write(message)),
        }
    }

    fn track(&self, kind: TrackKind) -> Option<&TrackInput> {
        match kind {
            TrackKind::Video => self.video.as_ref(),
            TrackKind::Audio => self.audio.as_ref(),
        }
    }

    fn track_mut(&mut self, kind: TrackKind) -> Result<&mut TrackInput> {
        let track = match kind {
            TrackKind::Video => self.video.as_mut(),
            TrackKind::Audio => self.audio.as_mut(),
        };
        track.ok_or_else(|| TranscodeError::Write(format!("output has no {} track", kind)))
    }
}

impl TrackInput {
    fn new(stream_index: usize, time_base: ffmpeg::Rational) -> Self {
        Self {
            stream_index,
            packet_time_base: time_base,
            stream_time_base: time_base,
            samples: 0,
            finished: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio_params() -> ffmpeg::codec::Parameters {
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::AAC).unwrap();
        let mut ctx = ffmpeg::codec::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .unwrap();
        ctx.set_rate(48000);
        ctx.set_channel_layout(ffmpeg::ChannelLayout::STEREO);
        ctx.set_format(ffmpeg::util::format::sample::Sample::F32(
            ffmpeg::util::format::sample::Type::Planar,
        ));
        ctx.set_time_base(ffmpeg::Rational::new(1, 48000));
        let encoder = ctx.open_as(codec).unwrap();
        helpers::encoder_codec_parameters(&encoder)
    }

    #[test]
    fn test_state_machine_guards() {
        crate::ffmpeg_utils::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut output = OutputAsset::create(dir.path().join("out.mov")).unwrap();
        assert_eq!(output.state(), OutputState::NotStarted);
        assert!(output.wants_global_header());

        // Nothing can be written or finished before the session starts
        let mut packet = ffmpeg::Packet::empty();
        assert!(output.write_sample(TrackKind::Audio, &mut packet).is_err());
        assert!(output.finish().is_err());
        assert_eq!(output.samples_written(TrackKind::Audio), 0);

        // A session needs both tracks
        output
            .add_audio_track(audio_params(), ffmpeg::Rational::new(1, 48000))
            .unwrap();
        let err = output.start_session().unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Construction);
        assert!(output
            .add_audio_track(audio_params(), ffmpeg::Rational::new(1, 48000))
            .is_err());
    }

    #[test]
    fn test_unknown_extension_fails() {
        crate::ffmpeg_utils::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        // Format is guessed from the extension; an unknown one cannot be muxed
        assert!(OutputAsset::create(dir.path().join("out.nosuchformat")).is_err());
    }
}
