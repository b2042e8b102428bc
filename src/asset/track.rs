//! Per-stream analysis

use ffmpeg_next as ffmpeg;

use crate::error::TrackKind;
use crate::ffmpeg_utils::helpers;

/// Description of one track found in a source container
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub kind: TrackKind,
    /// Index of the stream inside the container
    pub stream_index: usize,
    pub codec_id: ffmpeg::codec::Id,
    pub time_base: ffmpeg::Rational,
    pub language: Option<String>,
    pub details: TrackDetails,
}

/// Kind-specific properties of a track
#[derive(Debug, Clone, PartialEq)]
pub enum TrackDetails {
    Video {
        /// Natural size in pixels, before any display transform
        width: u32,
        height: u32,
        frame_rate: ffmpeg::Rational,
        /// Orientation transform attached to the stream, if any
        display_matrix: Option<[i32; 9]>,
    },
    Audio {
        sample_rate: u32,
        channels: u16,
    },
}

impl TrackInfo {
    /// Short codec name, e.g. "h264" or "aac"
    pub fn codec_name(&self) -> &'static str {
        self.codec_id.name()
    }

    /// Natural size of a video track
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self.details {
            TrackDetails::Video { width, height, .. } => Some((width, height)),
            TrackDetails::Audio { .. } => None,
        }
    }

    pub fn display_matrix(&self) -> Option<[i32; 9]> {
        match self.details {
            TrackDetails::Video { display_matrix, .. } => display_matrix,
            TrackDetails::Audio { .. } => None,
        }
    }

    /// Counterclockwise rotation in degrees described by the display matrix
    pub fn rotation(&self) -> Option<f64> {
        self.display_matrix()
            .as_ref()
            .and_then(helpers::display_matrix_rotation)
    }
}

/// Analyze a video stream and extract metadata
pub fn analyze_video_stream(stream: &ffmpeg::Stream) -> TrackInfo {
    let params = stream.parameters();

    let mut frame_rate = stream.avg_frame_rate();
    if frame_rate.numerator() <= 0 || frame_rate.denominator() <= 0 {
        frame_rate = stream.rate();
    }

    TrackInfo {
        kind: TrackKind::Video,
        stream_index: stream.index(),
        codec_id: params.id(),
        time_base: stream.time_base(),
        language: get_stream_language(stream),
        details: TrackDetails::Video {
            width: helpers::codec_params_width(&params),
            height: helpers::codec_params_height(&params),
            frame_rate,
            display_matrix: helpers::codec_params_display_matrix(&params),
        },
    }
}

/// Analyze an audio stream and extract metadata
pub fn analyze_audio_stream(stream: &ffmpeg::Stream) -> TrackInfo {
    let params = stream.parameters();
    TrackInfo {
        kind: TrackKind::Audio,
        stream_index: stream.index(),
        codec_id: params.id(),
        time_base: stream.time_base(),
        language: get_stream_language(stream),
        details: TrackDetails::Audio {
            sample_rate: helpers::codec_params_sample_rate(&params),
            channels: helpers::codec_params_channels(&params),
        },
    }
}

/// Extract language from stream metadata
fn get_stream_language(stream: &ffmpeg::Stream) -> Option<String> {
    stream
        .metadata()
        .get("language")
        .filter(|lang| *lang != "und")
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_track(display_matrix: Option<[i32; 9]>) -> TrackInfo {
        TrackInfo {
            kind: TrackKind::Video,
            stream_index: 0,
            codec_id: ffmpeg::codec::Id::H264,
            time_base: ffmpeg::Rational::new(1, 90000),
            language: None,
            details: TrackDetails::Video {
                width: 1920,
                height: 1080,
                frame_rate: ffmpeg::Rational::new(30, 1),
                display_matrix,
            },
        }
    }

    #[test]
    fn test_video_accessors() {
        let track = video_track(Some(helpers::display_matrix_clockwise(90.0)));
        assert_eq!(track.dimensions(), Some((1920, 1080)));
        assert_eq!(track.codec_name(), "h264");
        let rotation = track.rotation().unwrap();
        assert!((rotation + 90.0).abs() < 1e-6);

        assert_eq!(video_track(None).rotation(), None);
    }

    #[test]
    fn test_audio_has_no_dimensions() {
        let track = TrackInfo {
            kind: TrackKind::Audio,
            stream_index: 1,
            codec_id: ffmpeg::codec::Id::AAC,
            time_base: ffmpeg::Rational::new(1, 48000),
            language: Some("eng".into()),
            details: TrackDetails::Audio {
                sample_rate: 48000,
                channels: 2,
            },
        };
        assert_eq!(track.dimensions(), None);
        assert_eq!(track.display_matrix(), None);
    }
}
