//! Media transcoder
//!
//! Re-encodes the video track of one input container and copies its audio
//! track unchanged into a new output container. Every invocation builds its
//! own source, readers, writers and output; nothing is shared between jobs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::asset::{SourceAsset, TrackDetails, TrackInfo};
use crate::config::TranscoderConfig;
use crate::error::{Result, TrackKind, TranscodeError};
use crate::fs::{FileSystem, LocalFileSystem};
use crate::pipeline::{self, PipelineOptions};
use crate::transcode::{
    AudioTrackReader, AudioTrackWriter, OutputAsset, SharedOutput, VideoEncoder,
    VideoEncoderSettings, VideoTrackReader, VideoTrackWriter,
};

/// Converts one media file into another.
#[derive(Debug, Clone)]
pub struct Transcoder {
    config: TranscoderConfig,
    fs: Arc<dyn FileSystem>,
}

/// Readers, writers and output for one run, ready to be pulled.
struct PreparedJob {
    video: (VideoTrackReader, VideoTrackWriter),
    audio: (AudioTrackReader, AudioTrackWriter),
    output: SharedOutput,
}

impl Transcoder {
    pub fn new(config: TranscoderConfig) -> Self {
        Self::with_file_system(config, Arc::new(LocalFileSystem))
    }

    /// Use `fs` for output existence checks and cleanup.
    pub fn with_file_system(config: TranscoderConfig, fs: Arc<dyn FileSystem>) -> Self {
        Self { config, fs }
    }

    pub fn config(&self) -> &TranscoderConfig {
        &self.config
    }

    /// Transcode `input` into `output`.
    ///
    /// Resolves to `Ok(output)` once the output container has been fully
    /// written and finalized. On failure nothing is left at `output`.
    pub async fn transcode<P, Q>(&self, input: P, output: Q) -> Result<PathBuf>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let input = input.as_ref().to_path_buf();
        let output = output.as_ref().to_path_buf();
        let span = tracing::info_span!("transcode", job_id = %Uuid::new_v4());
        self.run_job(input, output).instrument(span).await
    }

    /// Callback form of [`transcode`](Self::transcode).
    ///
    /// `on_complete` is invoked exactly once with the terminal result. Outside
    /// a Tokio runtime nothing is spawned: `on_complete` receives a
    /// `Construction` error right away and `None` is returned.
    pub fn transcode_with_callback<F>(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        on_complete: F,
    ) -> Option<tokio::task::JoinHandle<()>>
    where
        F: FnOnce(Result<PathBuf>) + Send + 'static,
    {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!("Transcode needs a Tokio runtime: {}", e);
                on_complete(Err(TranscodeError::Construction(format!(
                    "transcode needs a Tokio runtime: {}",
                    e
                ))));
                return None;
            }
        };

        let transcoder = self.clone();
        let input = input.as_ref().to_path_buf();
        let output = output.as_ref().to_path_buf();
        Some(runtime.spawn(async move {
            let result = transcoder.transcode(input, output).await;
            on_complete(result);
        }))
    }

    async fn run_job(&self, input: PathBuf, output: PathBuf) -> Result<PathBuf> {
        self.config.validate()?;
        tracing::info!(input = ?input, output = ?output, "Transcode starting");

        let job = {
            let config = self.config.clone();
            let fs = self.fs.clone();
            let (input, output) = (input.clone(), output.clone());
            let span = tracing::Span::current();
            tokio::task::spawn_blocking(move || {
                span.in_scope(|| prepare(&config, fs.as_ref(), &input, &output))
            })
            .await
            .map_err(|e| TranscodeError::Task(e.to_string()))
            .and_then(|prepared| prepared)
        };

        let job = match job {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(error = %e, "Transcode could not start");
                return Err(e);
            }
        };

        let finalizer = {
            let output = job.output.clone();
            move || output.lock().finish()
        };
        let options = PipelineOptions {
            deadline: self.config.deadline(),
            poll_interval: self.config.poll_interval(),
        };
        let PreparedJob {
            video,
            audio,
            output: shared,
        } = job;

        let result = pipeline::run(video, audio, finalizer, options).await;
        // Last reference: closes the muxer so the file can be inspected or removed
        drop(shared);

        match result {
            Ok(report) => {
                tracing::info!(
                    output = ?output,
                    video_frames = report.video_samples,
                    audio_packets = report.audio_samples,
                    bytes = self.fs.size_of(&output).unwrap_or(0),
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Transcode finished"
                );
                Ok(output)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Transcode failed, removing partial output");
                self.discard_output(&output);
                Err(e)
            }
        }
    }

    fn discard_output(&self, output: &Path) {
        if self.fs.exists(output) && !self.fs.remove(output) {
            tracing::warn!("Partial output left behind at {:?}", output);
        }
    }
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new(TranscoderConfig::default())
    }
}

/// Open the source, build both track pipelines and start the write session.
fn prepare(
    config: &TranscoderConfig,
    fs: &dyn FileSystem,
    input: &Path,
    output: &Path,
) -> Result<PreparedJob> {
    let source = SourceAsset::open_with(input, fs)?;
    let video_track = source
        .select_track(TrackKind::Video, config.video_track)?
        .clone();
    let audio_track = source
        .select_track(TrackKind::Audio, config.audio_track)?
        .clone();

    if fs.exists(output) {
        if !config.overwrite {
            return Err(TranscodeError::OutputExists(output.to_path_buf()));
        }
        if !fs.remove(output) {
            return Err(TranscodeError::Construction(format!(
                "cannot replace existing output {:?}",
                output
            )));
        }
        tracing::debug!("Replacing existing output {:?}", output);
    }

    let video_reader = VideoTrackReader::open(&source, &video_track)?;
    let audio_reader = AudioTrackReader::open(&source, &audio_track)?;
    let audio_params = audio_reader.codec_parameters().ok_or_else(|| {
        TranscodeError::Construction("cannot copy audio codec parameters".to_string())
    })?;

    // Claim the path before the muxer opens it, so a file that appeared
    // since the check above is never truncated
    if !fs.create_new(output) {
        if fs.exists(output) {
            return Err(TranscodeError::OutputExists(output.to_path_buf()));
        }
        return Err(TranscodeError::Construction(format!(
            "cannot create output {:?}",
            output
        )));
    }

    let started = OutputAsset::create(output).and_then(|mut out| {
        start_output(&mut out, config, &video_track, &audio_track, audio_params)
            .map(|encoder| (out, encoder))
    });
    let (out, encoder) = match started {
        Ok(started) => started,
        Err(e) => {
            // The muxer is closed by now; only the claimed file remains
            if !fs.remove(output) {
                tracing::warn!("Partial output left behind at {:?}", output);
            }
            return Err(e);
        }
    };

    let output = out.into_shared();
    Ok(PreparedJob {
        video: (
            video_reader,
            VideoTrackWriter::new(output.clone(), encoder, video_track.time_base),
        ),
        audio: (audio_reader, AudioTrackWriter::new(output.clone())),
        output,
    })
}

/// Open the encoder, add both tracks and write the header.
fn start_output(
    out: &mut OutputAsset,
    config: &TranscoderConfig,
    video_track: &TrackInfo,
    audio_track: &TrackInfo,
    audio_params: ffmpeg_next::codec::Parameters,
) -> Result<VideoEncoder> {
    let (width, height, frame_rate) = match video_track.details {
        TrackDetails::Video {
            width,
            height,
            frame_rate,
            ..
        } => (width, height, frame_rate),
        TrackDetails::Audio { .. } => return Err(TranscodeError::MissingTrack(TrackKind::Video)),
    };
    if width == 0 || height == 0 {
        return Err(TranscodeError::Construction(format!(
            "video stream {} has no dimensions",
            video_track.stream_index
        )));
    }

    let encoder = VideoEncoder::open(&VideoEncoderSettings {
        codec: config.video_codec,
        width,
        height,
        frame_rate,
        bitrate: config.video_bitrate,
        gop_size: config.gop_size,
        preset: config.encoder_preset.clone(),
        global_header: out.wants_global_header(),
    })?;

    out.add_video_track(
        encoder.codec_id(),
        encoder.codec_parameters(),
        encoder.time_base(),
        video_track.display_matrix().as_ref(),
    )?;
    out.add_audio_track(audio_params, audio_track.time_base)?;
    out.start_session()?;

    tracing::debug!(
        width,
        height,
        rotation = ?video_track.rotation(),
        video_codec = ?config.video_codec,
        bitrate = config.video_bitrate,
        audio_codec = audio_track.codec_name(),
        "Write session started"
    );

    Ok(encoder)
}
