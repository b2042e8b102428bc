//! Track readers over a source asset
//!
//! Each reader owns a private read session (demuxer) on the source file with
//! every other stream discarded, so the video and audio loops never contend
//! for one `AVFormatContext`.

use ffmpeg_next as ffmpeg;

use super::decoder::VideoDecoder;
use super::scaler::{FrameScaler, READER_PIXEL_FORMAT};
use crate::asset::{SourceAsset, TrackInfo};
use crate::error::{FfmpegError, Result, TranscodeError};
use crate::ffmpeg_utils::helpers;
use crate::pipeline::TrackReader;

/// Open a read session limited to `track`.
fn open_session(
    source: &SourceAsset,
    track: &TrackInfo,
) -> Result<ffmpeg::format::context::Input> {
    let mut input = source.open_read_session()?;
    if input.stream(track.stream_index).is_none() {
        return Err(TranscodeError::Construction(format!(
            "stream {} vanished from {:?}",
            track.stream_index,
            source.path()
        )));
    }
    helpers::input_discard_other_streams(&mut input, track.stream_index);
    Ok(input)
}

/// Read the next packet belonging to `stream_index`, `None` at end of file.
fn read_packet(
    input: &mut ffmpeg::format::context::Input,
    stream_index: usize,
) -> Result<Option<ffmpeg::Packet>> {
    loop {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(input) {
            Ok(()) if packet.stream() == stream_index => return Ok(Some(packet)),
            Ok(()) => continue,
            Err(ffmpeg::Error::Eof) => return Ok(None),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => continue,
            Err(e) => {
                return Err(FfmpegError::ReadPacket(format!(
                    "stream {}: {}",
                    stream_index, e
                ))
                .into())
            }
        }
    }
}

/// Decodes the video track and hands out ARGB frames.
///
/// Frame timestamps stay in the source stream's time base.
pub struct VideoTrackReader {
    input: Option<ffmpeg::format::context::Input>,
    decoder: VideoDecoder,
    scaler: FrameScaler,
    stream_index: usize,
    draining: bool,
}

// SAFETY: the demuxer, decoder and scaler contexts are owned exclusively by
// this reader and never aliased; the reader is moved into a single pull loop
// and used from one thread at a time.
unsafe impl Send for VideoTrackReader {}

impl VideoTrackReader {
    pub fn open(source: &SourceAsset, track: &TrackInfo) -> Result<Self> {
        let input = open_session(source, track)?;
        let decoder = match input.stream(track.stream_index) {
            Some(stream) => VideoDecoder::open(&stream)?,
            None => {
                return Err(TranscodeError::Construction(format!(
                    "video stream {} not found",
                    track.stream_index
                )))
            }
        };

        tracing::debug!(
            stream_index = track.stream_index,
            codec = track.codec_name(),
            "Video track reader opened"
        );

        Ok(Self {
            input: Some(input),
            decoder,
            scaler: FrameScaler::new(READER_PIXEL_FORMAT),
            stream_index: track.stream_index,
            draining: false,
        })
    }
}

impl TrackReader for VideoTrackReader {
    type Sample = ffmpeg::util::frame::Video;

    fn next_sample(&mut self) -> Result<Option<Self::Sample>> {
        loop {
            if let Some(frame) = self.decoder.receive_frame()? {
                return Ok(Some(self.scaler.convert(&frame)?));
            }
            if self.draining {
                tracing::trace!(
                    stream_index = self.stream_index,
                    skipped = self.decoder.skipped_packets(),
                    "Video track drained"
                );
                return Ok(None);
            }
            let Some(input) = self.input.as_mut() else {
                return Ok(None);
            };
            match read_packet(input, self.stream_index)? {
                Some(packet) => self.decoder.send_packet(&packet)?,
                None => {
                    self.decoder.send_eof()?;
                    self.draining = true;
                }
            }
        }
    }

    fn cancel_reading(&mut self) {
        if self.input.take().is_some() {
            tracing::trace!(stream_index = self.stream_index, "Video read session closed");
        }
    }
}

/// Hands out the audio track's encoded packets unchanged.
///
/// Packet timestamps stay in the source stream's time base.
pub struct AudioTrackReader {
    input: Option<ffmpeg::format::context::Input>,
    stream_index: usize,
}

// SAFETY: the demuxer context is owned exclusively by this reader and only
// used from the pull loop it is moved into.
unsafe impl Send for AudioTrackReader {}

impl AudioTrackReader {
    pub fn open(source: &SourceAsset, track: &TrackInfo) -> Result<Self> {
        let input = open_session(source, track)?;

        tracing::debug!(
            stream_index = track.stream_index,
            codec = track.codec_name(),
            "Audio track reader opened"
        );

        Ok(Self {
            input: Some(input),
            stream_index: track.stream_index,
        })
    }

    /// Codec parameters of the source stream, for a stream-copy output track.
    pub fn codec_parameters(&self) -> Option<ffmpeg::codec::Parameters> {
        let input = self.input.as_ref()?;
        let stream = input.stream(self.stream_index)?;
        let mut params = ffmpeg::codec::Parameters::new();
        // SAFETY: both pointers are valid for the duration of the call and
        // `avcodec_parameters_copy` deep-copies into the freshly allocated
        // destination, so the result does not borrow the demuxer.
        let ret = unsafe {
            ffmpeg::ffi::avcodec_parameters_copy(params.as_mut_ptr(), stream.parameters().as_ptr())
        };
        (ret >= 0).then_some(params)
    }
}

impl TrackReader for AudioTrackReader {
    type Sample = ffmpeg::Packet;

    fn next_sample(&mut self) -> Result<Option<Self::Sample>> {
        match self.input.as_mut() {
            Some(input) => read_packet(input, self.stream_index),
            None => Ok(None),
        }
    }

    fn cancel_reading(&mut self) {
        if self.input.take().is_some() {
            tracing::trace!(stream_index = self.stream_index, "Audio read session closed");
        }
    }
}
