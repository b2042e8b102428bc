//! Video decoder feeding the video track reader

use crate::error::{FfmpegError, Result};
use ffmpeg_next as ffmpeg;

/// Decodes one source video stream into raw frames in the codec's native
/// pixel format. Frame timestamps are in the stream's time base.
pub struct VideoDecoder {
    decoder: ffmpeg::decoder::Video,
    stream_index: usize,
    /// Corrupt packets dropped so far
    skipped: u64,
}

impl VideoDecoder {
    pub fn open(stream: &ffmpeg::format::stream::Stream) -> Result<Self> {
        let stream_index = stream.index();
        let mut context = ffmpeg::codec::Context::from_parameters(stream.parameters())
            .map_err(|e| FfmpegError::DecoderCreate(format!("stream {}: {}", stream_index, e)))?;
        context.set_time_base(stream.time_base());

        let decoder = context.decoder().video().map_err(|e| {
            FfmpegError::DecoderNotFound(format!("no video decoder for stream {}: {}", stream_index, e))
        })?;

        tracing::trace!(
            stream_index,
            width = decoder.width(),
            height = decoder.height(),
            format = ?decoder.format(),
            "Video decoder opened"
        );

        Ok(Self {
            decoder,
            stream_index,
            skipped: 0,
        })
    }

    /// Queue one compressed packet. A corrupt packet is dropped, not fatal.
    pub fn send_packet(&mut self, packet: &ffmpeg::Packet) -> Result<()> {
        match self.decoder.send_packet(packet) {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::InvalidData) => {
                self.skipped += 1;
                tracing::debug!(stream_index = self.stream_index, "Dropping undecodable packet");
                Ok(())
            }
            Err(e) => Err(self.error("send_packet", e)),
        }
    }

    /// Signal end of stream so buffered frames can be drained.
    pub fn send_eof(&mut self) -> Result<()> {
        if self.skipped > 0 {
            tracing::warn!(
                stream_index = self.stream_index,
                skipped = self.skipped,
                "Undecodable packets were dropped"
            );
        }
        match self.decoder.send_eof() {
            Ok(()) | Err(ffmpeg::Error::Eof) => Ok(()),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(()),
            Err(e) => Err(self.error("send_eof", e)),
        }
    }

    /// Next decoded frame; `None` when more input is needed or the decoder is drained.
    pub fn receive_frame(&mut self) -> Result<Option<ffmpeg::util::frame::Video>> {
        let mut frame = ffmpeg::util::frame::Video::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(e) => Err(self.error("receive_frame", e)),
        }
    }

    pub fn skipped_packets(&self) -> u64 {
        self.skipped
    }

    fn error(&self, op: &str, e: ffmpeg::Error) -> crate::error::TranscodeError {
        FfmpegError::DecodePacket(format!("{} on stream {}: {}", op, self.stream_index, e)).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_decoders_present() {
        crate::ffmpeg_utils::init().unwrap();
        assert!(ffmpeg::codec::decoder::find(ffmpeg::codec::Id::MPEG4).is_some());
        assert!(ffmpeg::codec::decoder::find(ffmpeg::codec::Id::AAC).is_some());
    }
}
