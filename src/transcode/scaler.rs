//! Pixel format conversion for the transcoding pipeline
//!
//! The video reader normalizes decoded frames to packed ARGB; the video writer
//! converts them to the planar layout the encoder wants. Both go through
//! FFmpeg's `SwsContext`, built lazily from the first frame and rebuilt if the
//! source geometry changes mid-stream.

use crate::error::{FfmpegError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::format::Pixel;

/// Layout of every frame handed out by the video reader
pub const READER_PIXEL_FORMAT: Pixel = Pixel::ARGB;

/// Frame converter wrapping FFmpeg's `SwsContext`
pub struct FrameScaler {
    context: Option<scaling::Context>,
    /// Source (format, width, height) the context was built for
    source: Option<(Pixel, u32, u32)>,
    target: Pixel,
}

impl FrameScaler {
    /// Create a converter to `target`. Dimensions are preserved.
    pub fn new(target: Pixel) -> Self {
        Self {
            context: None,
            source: None,
            target,
        }
    }

    /// Convert one frame, carrying its presentation timestamp over.
    pub fn convert(
        &mut self,
        frame: &ffmpeg::util::frame::Video,
    ) -> Result<ffmpeg::util::frame::Video> {
        let source = (frame.format(), frame.width(), frame.height());
        if self.source != Some(source) {
            if self.source.is_some() {
                tracing::debug!(
                    "Source frame geometry changed to {:?} {}x{}, rebuilding scaler",
                    source.0,
                    source.1,
                    source.2
                );
            }
            self.context = None;
            self.source = Some(source);
        }

        let context = match self.context.take() {
            Some(context) => context,
            None => scaling::Context::get(
                source.0,
                source.1,
                source.2,
                self.target,
                source.1,
                source.2,
                scaling::Flags::BILINEAR,
            )
            .map_err(|e| {
                FfmpegError::ScalerCreate(format!(
                    "{:?} {}x{} -> {:?}: {}",
                    source.0, source.1, source.2, self.target, e
                ))
            })?,
        };
        let context = self.context.insert(context);

        // Output frame must be empty so sws allocates it for the target format
        let mut out = ffmpeg::util::frame::Video::empty();
        context
            .run(frame, &mut out)
            .map_err(|e| FfmpegError::ScaleFrame(format!("Scaling error: {}", e)))?;
        out.set_pts(frame.timestamp().or(frame.pts()));

        Ok(out)
    }
}
