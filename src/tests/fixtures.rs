//! Test fixtures for end-to-end tests
//!
//! Synthesizes small but real media containers with FFmpeg's native MPEG-4
//! Part 2 and AAC encoders, so no sample files have to be checked in.

use std::path::{Path, PathBuf};

use crate::config::VideoCodec;
use crate::error::TrackKind;
use crate::fs::{FileSystem, LocalFileSystem};
use crate::ffmpeg_utils::{ffmpeg, helpers};
use crate::transcode::{VideoEncoder, VideoEncoderSettings};
use ffmpeg::util::channel_layout::ChannelLayout;
use ffmpeg::util::format::sample::{Sample, Type as SampleType};

const AUDIO_RATE: i32 = 48000;

/// Shape of a synthesized container
#[derive(Debug, Clone)]
pub struct FixtureSpec {
    pub video: bool,
    pub audio: bool,
    pub width: u32,
    pub height: u32,
    pub fps: i32,
    pub seconds: u32,
    /// Clockwise rotation stored as the video track's display matrix
    pub rotation: Option<f64>,
}

impl FixtureSpec {
    /// One video and one audio track
    pub fn two_track() -> Self {
        Self {
            video: true,
            audio: true,
            width: 160,
            height: 96,
            fps: 25,
            seconds: 2,
            rotation: None,
        }
    }

    pub fn ten_seconds() -> Self {
        Self {
            seconds: 10,
            ..Self::two_track()
        }
    }

    pub fn rotated(degrees: f64) -> Self {
        Self {
            rotation: Some(degrees),
            ..Self::two_track()
        }
    }

    pub fn video_only() -> Self {
        Self {
            audio: false,
            ..Self::two_track()
        }
    }

    pub fn audio_only() -> Self {
        Self {
            video: false,
            ..Self::two_track()
        }
    }
}

/// Whether the FFmpeg build can synthesize fixtures at all.
pub fn can_synthesize() -> bool {
    crate::ffmpeg_utils::init().is_ok()
        && ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4).is_some()
        && ffmpeg::encoder::find(ffmpeg::codec::Id::AAC).is_some()
}

/// Codec to transcode into: H.264 when an encoder actually opens, else MPEG-4.
pub fn output_codec() -> VideoCodec {
    let probe = VideoEncoderSettings {
        codec: VideoCodec::H264,
        width: 64,
        height: 64,
        frame_rate: ffmpeg::Rational::new(25, 1),
        bitrate: 200_000,
        gop_size: None,
        preset: None,
        global_header: true,
    };
    if VideoEncoder::open(&probe).is_ok() {
        VideoCodec::H264
    } else {
        VideoCodec::Mpeg4
    }
}

/// Write a container at `path` according to `spec`.
pub fn synthesize(path: &Path, spec: &FixtureSpec) {
    crate::ffmpeg_utils::init().unwrap();
    let mut octx = ffmpeg::format::output(path).unwrap();
    let global_header = octx
        .format()
        .flags()
        .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

    let mut video = if spec.video {
        let encoder = VideoEncoder::open(&VideoEncoderSettings {
            codec: VideoCodec::Mpeg4,
            width: spec.width,
            height: spec.height,
            frame_rate: ffmpeg::Rational::new(spec.fps, 1),
            bitrate: 400_000,
            gop_size: Some(12),
            preset: None,
            global_header,
        })
        .unwrap();
        let mut stream = octx
            .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4))
            .unwrap();
        stream.set_parameters(encoder.codec_parameters());
        stream.set_time_base(encoder.time_base());
        if let Some(degrees) = spec.rotation {
            assert!(helpers::stream_set_display_matrix(
                &mut stream,
                &helpers::display_matrix_clockwise(degrees)
            ));
        }
        Some((stream.index(), encoder))
    } else {
        None
    };

    let mut audio = if spec.audio {
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::AAC).unwrap();
        let mut ctx = ffmpeg::codec::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .unwrap();
        ctx.set_rate(AUDIO_RATE);
        ctx.set_channel_layout(ChannelLayout::STEREO);
        ctx.set_format(Sample::F32(SampleType::Planar));
        ctx.set_bit_rate(128_000);
        ctx.set_time_base(ffmpeg::Rational::new(1, AUDIO_RATE));
        if global_header {
            ctx.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = ctx.open_as(codec).unwrap();
        let mut stream = octx.add_stream(codec).unwrap();
        stream.set_parameters(helpers::encoder_codec_parameters(&encoder));
        stream.set_time_base(ffmpeg::Rational::new(1, AUDIO_RATE));
        Some((stream.index(), encoder))
    } else {
        None
    };

    octx.write_header().unwrap();

    if let Some((index, encoder)) = video.as_mut() {
        let index = *index;
        let stream_tb = octx.stream(index).unwrap().time_base();
        let encoder_tb = encoder.time_base();
        let write = |octx: &mut ffmpeg::format::context::Output, mut p: ffmpeg::Packet| {
            p.rescale_ts(encoder_tb, stream_tb);
            p.set_stream(index);
            p.write_interleaved(octx).unwrap();
        };

        for i in 0..(spec.fps as u32 * spec.seconds) {
            let mut frame = ffmpeg::util::frame::Video::new(
                ffmpeg::util::format::Pixel::YUV420P,
                spec.width,
                spec.height,
            );
            // Moving gradient so consecutive frames differ
            let stride = frame.stride(0);
            for (n, byte) in frame.data_mut(0).iter_mut().enumerate() {
                *byte = ((n % stride) as u32 + i * 4) as u8;
            }
            for plane in 1..3 {
                for byte in frame.data_mut(plane).iter_mut() {
                    *byte = 128;
                }
            }
            frame.set_pts(Some(i as i64));
            encoder.send_frame(&mut frame).unwrap();
            while let Some(packet) = encoder.receive_packet().unwrap() {
                write(&mut octx, packet);
            }
        }
        for packet in encoder.flush().unwrap() {
            write(&mut octx, packet);
        }
    }

    if let Some((index, encoder)) = audio.as_mut() {
        let index = *index;
        let stream_tb = octx.stream(index).unwrap().time_base();
        let encoder_tb = ffmpeg::Rational::new(1, AUDIO_RATE);
        let frame_size = match encoder.frame_size() {
            0 => 1024,
            n => n as usize,
        };
        let total_samples = AUDIO_RATE as usize * spec.seconds as usize;

        let drain = |octx: &mut ffmpeg::format::context::Output,
                         encoder: &mut ffmpeg::encoder::Audio| {
            let mut packet = ffmpeg::Packet::empty();
            while encoder.receive_packet(&mut packet).is_ok() {
                packet.rescale_ts(encoder_tb, stream_tb);
                packet.set_stream(index);
                packet.write_interleaved(octx).unwrap();
            }
        };

        let mut pts = 0usize;
        while pts < total_samples {
            let mut frame = ffmpeg::util::frame::Audio::new(
                Sample::F32(SampleType::Planar),
                frame_size,
                ChannelLayout::STEREO,
            );
            frame.set_rate(AUDIO_RATE as u32);
            for ch in 0..2 {
                for (n, chunk) in frame.data_mut(ch).chunks_exact_mut(4).enumerate() {
                    let t = (pts + n) as f32 / AUDIO_RATE as f32;
                    let value = (t * 440.0 * std::f32::consts::TAU).sin() * 0.25;
                    chunk.copy_from_slice(&value.to_ne_bytes());
                }
            }
            frame.set_pts(Some(pts as i64));
            encoder.send_frame(&frame).unwrap();
            drain(&mut octx, encoder);
            pts += frame_size;
        }
        encoder.send_eof().unwrap();
        drain(&mut octx, encoder);
    }

    octx.write_trailer().unwrap();
}

/// Number of packets in the `nth` track of `kind`, read straight from the demuxer.
pub fn count_packets(path: &Path, kind: TrackKind, nth: usize) -> u64 {
    let mut input = ffmpeg::format::input(path).unwrap();
    let medium = match kind {
        TrackKind::Video => ffmpeg::media::Type::Video,
        TrackKind::Audio => ffmpeg::media::Type::Audio,
    };
    let index = input
        .streams()
        .filter(|s| s.parameters().medium() == medium)
        .nth(nth)
        .map(|s| s.index())
        .unwrap();

    let mut count = 0;
    let mut packet = ffmpeg::Packet::empty();
    while packet.read(&mut input).is_ok() {
        if packet.stream() == index {
            count += 1;
        }
    }
    count
}

/// Local file system that claims the `hidden` paths do not exist.
///
/// Stands in for a path that another process creates, or removes, between
/// an existence check and the following operation.
#[derive(Debug, Default)]
pub struct HidingFileSystem {
    pub hidden: Vec<PathBuf>,
}

impl HidingFileSystem {
    pub fn hiding(path: &Path) -> Self {
        Self {
            hidden: vec![path.to_path_buf()],
        }
    }
}

impl FileSystem for HidingFileSystem {
    fn exists(&self, path: &Path) -> bool {
        !self.hidden.iter().any(|h| h == path) && LocalFileSystem.exists(path)
    }

    fn create_directory(&self, path: &Path) -> bool {
        LocalFileSystem.create_directory(path)
    }

    fn create_new(&self, path: &Path) -> bool {
        LocalFileSystem.create_new(path)
    }

    fn remove(&self, path: &Path) -> bool {
        LocalFileSystem.remove(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> bool {
        LocalFileSystem.copy(from, to)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> bool {
        LocalFileSystem.write(path, bytes)
    }

    fn size_of(&self, path: &Path) -> Option<u64> {
        LocalFileSystem.size_of(path)
    }

    fn list_directory(&self, path: &Path) -> Vec<String> {
        LocalFileSystem.list_directory(path)
    }
}
