//! Track writers into the shared output asset

use ffmpeg_next as ffmpeg;

use super::encoder::VideoEncoder;
use super::output::SharedOutput;
use super::scaler::FrameScaler;
use crate::error::{Result, TrackKind};
use crate::ffmpeg_utils::helpers;
use crate::pipeline::TrackWriter;

/// Re-encodes ARGB frames and muxes the resulting packets.
///
/// Frames are converted to the encoder's pixel format first.
pub struct VideoTrackWriter {
    output: SharedOutput,
    encoder: VideoEncoder,
    scaler: FrameScaler,
    /// Time base of incoming frame timestamps
    source_time_base: ffmpeg::Rational,
}

// SAFETY: the encoder and scaler contexts are owned exclusively by this writer
// and only used from the pull loop it is moved into. The output is behind a
// mutex.
unsafe impl Send for VideoTrackWriter {}

impl VideoTrackWriter {
    /// The encoder's packets must already have a video track in `output`.
    pub fn new(
        output: SharedOutput,
        encoder: VideoEncoder,
        source_time_base: ffmpeg::Rational,
    ) -> Self {
        Self {
            output,
            scaler: FrameScaler::new(encoder.pixel_format()),
            encoder,
            source_time_base,
        }
    }

    fn drain_encoder(&mut self) -> Result<()> {
        while let Some(mut packet) = self.encoder.receive_packet()? {
            self.output
                .lock()
                .write_sample(TrackKind::Video, &mut packet)?;
        }
        Ok(())
    }
}

impl TrackWriter for VideoTrackWriter {
    type Sample = ffmpeg::util::frame::Video;

    fn append(&mut self, frame: Self::Sample) -> Result<()> {
        let mut converted = self.scaler.convert(&frame)?;
        converted.set_pts(
            frame
                .pts()
                .map(|pts| helpers::rescale_ts(pts, self.source_time_base, self.encoder.time_base())),
        );
        self.encoder.send_frame(&mut converted)?;
        self.drain_encoder()
    }

    fn mark_finished(&mut self) -> Result<()> {
        for mut packet in self.encoder.flush()? {
            self.output
                .lock()
                .write_sample(TrackKind::Video, &mut packet)?;
        }
        self.output.lock().mark_finished(TrackKind::Video)
    }
}

/// Copies audio packets into the output unchanged.
pub struct AudioTrackWriter {
    output: SharedOutput,
}

impl AudioTrackWriter {
    /// Packets must be in the time base the audio track was added with.
    pub fn new(output: SharedOutput) -> Self {
        Self { output }
    }
}

impl TrackWriter for AudioTrackWriter {
    type Sample = ffmpeg::Packet;

    fn append(&mut self, mut packet: Self::Sample) -> Result<()> {
        self.output
            .lock()
            .write_sample(TrackKind::Audio, &mut packet)
    }

    fn mark_finished(&mut self) -> Result<()> {
        self.output.lock().mark_finished(TrackKind::Audio)
    }
}
