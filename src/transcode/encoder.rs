//! Video encoder for the transcoding pipeline
//!
//! Wraps an FFmpeg `AVCodecContext` to encode YUV frames (4:2:0, or 4:4:4
//! for odd H.264/HEVC frame sizes) to the
//! configured codec (H.264 by default) at a target average bitrate.

use crate::config::VideoCodec;
use crate::error::{FfmpegError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec;
use ffmpeg_next::util::format::Pixel;

/// Pixel format the encoder is opened with
pub const ENCODER_PIXEL_FORMAT: Pixel = Pixel::YUV420P;

/// H.264/HEVC format for odd frame sizes, which 4:2:0 cannot represent
pub const ODD_SIZE_PIXEL_FORMAT: Pixel = Pixel::YUV444P;

/// Frame rate assumed when the source stream does not declare one
pub const FALLBACK_FRAME_RATE: (i32, i32) = (25, 1);

/// Everything needed to open a [`VideoEncoder`]
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEncoderSettings {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub frame_rate: ffmpeg::Rational,
    pub bitrate: u64,
    pub gop_size: Option<u32>,
    pub preset: Option<String>,
    /// Put codec headers in extradata (required by MP4/QuickTime muxers)
    pub global_header: bool,
}

impl VideoEncoderSettings {
    /// Encoder time base, the inverse of the frame rate
    pub fn time_base(&self) -> ffmpeg::Rational {
        let rate = usable_frame_rate(self.frame_rate);
        ffmpeg::Rational::new(rate.denominator(), rate.numerator())
    }

    /// Pixel format frames must be converted to before encoding.
    pub fn pixel_format(&self) -> Pixel {
        let odd = self.width % 2 == 1 || self.height % 2 == 1;
        match self.codec {
            VideoCodec::H264 | VideoCodec::Hevc if odd => ODD_SIZE_PIXEL_FORMAT,
            _ => ENCODER_PIXEL_FORMAT,
        }
    }
}

/// Video encoder backed by a real FFmpeg codec context
pub struct VideoEncoder {
    encoder: ffmpeg::encoder::Video,
    codec_id: codec::Id,
    format: Pixel,
    time_base: ffmpeg::Rational,
    /// Last pts handed to the encoder, in `time_base`
    last_pts: Option<i64>,
}

impl VideoEncoder {
    /// Open an encoder with the given settings.
    pub fn open(settings: &VideoEncoderSettings) -> Result<Self> {
        let codec_id = settings.codec.codec_id();
        let codec = codec::encoder::find(codec_id).ok_or_else(|| {
            FfmpegError::EncoderNotFound(format!(
                "{:?} encoder not found in this FFmpeg build",
                codec_id
            ))
        })?;

        let time_base = settings.time_base();
        let frame_rate = usable_frame_rate(settings.frame_rate);
        let format = settings.pixel_format();

        // Build context and configure the video encoder BEFORE opening
        let mut context = codec::Context::new_with_codec(codec);
        context.set_time_base(time_base);

        let mut video_enc = context.encoder().video().map_err(|e| {
            FfmpegError::EncoderCreate(format!("Cannot get video encoder handle: {}", e))
        })?;

        video_enc.set_width(settings.width);
        video_enc.set_height(settings.height);
        video_enc.set_format(format);
        video_enc.set_time_base(time_base);
        video_enc.set_frame_rate(Some(frame_rate));
        video_enc.set_bit_rate(settings.bitrate as usize);
        if let Some(gop) = settings.gop_size {
            video_enc.set_gop(gop);
        }
        if settings.global_header {
            video_enc.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut opts = ffmpeg::Dictionary::new();
        if let Some(preset) = settings.preset.as_deref() {
            opts.set("preset", preset);
        }

        let encoder = video_enc.open_with(opts).map_err(|e| {
            FfmpegError::EncoderCreate(format!(
                "Failed to open {:?} encoder at {}x{}: {}",
                codec_id, settings.width, settings.height, e
            ))
        })?;

        tracing::debug!(
            codec = ?codec_id,
            width = settings.width,
            height = settings.height,
            format = ?format,
            bitrate = settings.bitrate,
            "Video encoder opened"
        );

        Ok(Self {
            encoder,
            codec_id,
            format,
            time_base,
            last_pts: None,
        })
    }

    /// Send one frame to the encoder.
    ///
    /// The frame's pts must already be in [`time_base`](Self::time_base).
    /// Timestamps that would not increase are bumped so the encoder never
    /// sees a duplicate.
    pub fn send_frame(&mut self, frame: &mut ffmpeg::util::frame::Video) -> Result<()> {
        let pts = next_pts(self.last_pts, frame.pts());
        frame.set_pts(Some(pts));
        self.last_pts = Some(pts);

        self.encoder
            .send_frame(frame)
            .map_err(|e| FfmpegError::EncodeFrame(format!("send_frame error: {}", e)).into())
    }

    /// Send EOF to flush the encoder's buffered output.
    pub fn send_eof(&mut self) -> Result<()> {
        match self.encoder.send_eof() {
            Ok(()) | Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(FfmpegError::EncodeFrame(format!("send_eof error: {}", e)).into()),
        }
    }

    /// Receive one encoded packet, or `None` if the encoder needs more input.
    pub fn receive_packet(&mut self) -> Result<Option<ffmpeg::codec::packet::Packet>> {
        let mut packet = ffmpeg::codec::packet::Packet::empty();
        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(packet)),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(FfmpegError::EncodeFrame(format!("receive_packet error: {}", e)).into()),
        }
    }

    /// Flush any remaining buffered packets after sending EOF.
    pub fn flush(&mut self) -> Result<Vec<ffmpeg::codec::packet::Packet>> {
        self.send_eof()?;
        let mut packets = Vec::new();
        while let Some(p) = self.receive_packet()? {
            packets.push(p);
        }
        Ok(packets)
    }

    pub fn codec_id(&self) -> codec::Id {
        self.codec_id
    }

    /// Pixel format of frames handed to [`send_frame`](Self::send_frame).
    pub fn pixel_format(&self) -> Pixel {
        self.format
    }

    /// Time base of frames sent and packets received.
    pub fn time_base(&self) -> ffmpeg::Rational {
        self.time_base
    }

    /// Codec parameters for the encoded stream (for muxer stream setup).
    pub fn codec_parameters(&self) -> ffmpeg::codec::Parameters {
        crate::ffmpeg_utils::helpers::encoder_codec_parameters(&self.encoder)
    }
}

/// Check whether the FFmpeg build includes an encoder for `codec`.
pub fn is_encoder_available(codec: VideoCodec) -> bool {
    codec::encoder::find(codec.codec_id()).is_some()
}

fn usable_frame_rate(rate: ffmpeg::Rational) -> ffmpeg::Rational {
    if rate.numerator() > 0 && rate.denominator() > 0 {
        rate
    } else {
        ffmpeg::Rational::new(FALLBACK_FRAME_RATE.0, FALLBACK_FRAME_RATE.1)
    }
}

/// Strictly increasing pts; frames without one follow the previous frame.
fn next_pts(last: Option<i64>, pts: Option<i64>) -> i64 {
    match (last, pts) {
        (Some(last), Some(pts)) if pts > last => pts,
        (Some(last), _) => last + 1,
        (None, Some(pts)) => pts,
        (None, None) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(codec: VideoCodec) -> VideoEncoderSettings {
        VideoEncoderSettings {
            codec,
            width: 64,
            height: 48,
            frame_rate: ffmpeg::Rational::new(25, 1),
            bitrate: 900_000,
            gop_size: Some(12),
            preset: None,
            global_header: true,
        }
    }

    #[test]
    fn test_next_pts() {
        assert_eq!(next_pts(None, None), 0);
        assert_eq!(next_pts(None, Some(10)), 10);
        assert_eq!(next_pts(Some(10), Some(11)), 11);
        assert_eq!(next_pts(Some(10), Some(10)), 11);
        assert_eq!(next_pts(Some(10), Some(3)), 11);
        assert_eq!(next_pts(Some(10), None), 11);
    }

    #[test]
    fn test_time_base_from_frame_rate() {
        let mut s = settings(VideoCodec::Mpeg4);
        assert_eq!(s.time_base(), ffmpeg::Rational::new(1, 25));
        s.frame_rate = ffmpeg::Rational::new(30000, 1001);
        assert_eq!(s.time_base(), ffmpeg::Rational::new(1001, 30000));
        s.frame_rate = ffmpeg::Rational::new(0, 1);
        assert_eq!(s.time_base(), ffmpeg::Rational::new(1, 25));
    }

    #[test]
    fn test_odd_sizes_avoid_chroma_subsampling() {
        let mut s = settings(VideoCodec::H264);
        assert_eq!(s.pixel_format(), ENCODER_PIXEL_FORMAT);
        s.width = 641;
        assert_eq!(s.pixel_format(), ODD_SIZE_PIXEL_FORMAT);
        s.width = 640;
        s.height = 361;
        assert_eq!(s.pixel_format(), ODD_SIZE_PIXEL_FORMAT);
        s.codec = VideoCodec::Hevc;
        assert_eq!(s.pixel_format(), ODD_SIZE_PIXEL_FORMAT);
        // MPEG-4 Part 2 only encodes 4:2:0
        s.codec = VideoCodec::Mpeg4;
        assert_eq!(s.pixel_format(), ENCODER_PIXEL_FORMAT);
    }

    #[test]
    fn test_mpeg4_encoder_roundtrip() {
        crate::ffmpeg_utils::init().unwrap();
        if !is_encoder_available(VideoCodec::Mpeg4) {
            return;
        }
        let mut enc = VideoEncoder::open(&settings(VideoCodec::Mpeg4)).unwrap();
        assert_eq!(enc.time_base(), ffmpeg::Rational::new(1, 25));
        assert_eq!(enc.pixel_format(), ENCODER_PIXEL_FORMAT);
        assert_eq!(enc.codec_parameters().id(), codec::Id::MPEG4);

        let mut packets = 0;
        for i in 0..10 {
            let mut frame = ffmpeg::util::frame::Video::new(ENCODER_PIXEL_FORMAT, 64, 48);
            for plane in 0..3 {
                for byte in frame.data_mut(plane).iter_mut() {
                    *byte = 128;
                }
            }
            frame.set_pts(Some(i));
            enc.send_frame(&mut frame).unwrap();
            while enc.receive_packet().unwrap().is_some() {
                packets += 1;
            }
        }
        packets += enc.flush().unwrap().len();
        assert_eq!(packets, 10);
    }

    #[test]
    fn test_missing_encoder_reported() {
        crate::ffmpeg_utils::init().unwrap();
        if is_encoder_available(VideoCodec::Hevc) {
            return;
        }
        let err = VideoEncoder::open(&settings(VideoCodec::Hevc)).err().unwrap();
        assert_eq!(err.category(), crate::error::ErrorCategory::Construction);
    }
}
