//! Runs the video and audio pull loops and joins them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::latch::{CancelToken, CompletionLatch};
use super::{TrackReader, TrackWriter};
use crate::config::DEFAULT_POLL_INTERVAL_MS;
use crate::error::{Result, TrackKind, TranscodeError};

/// Scheduling knobs for one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Fail a loop that has not completed within this time
    pub deadline: Option<Duration>,
    /// Back-off while a writer is not ready
    pub poll_interval: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            deadline: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub video_samples: u64,
    pub audio_samples: u64,
    pub elapsed: Duration,
}

type Finalizer = Box<dyn FnOnce() -> Result<()> + Send>;

/// State shared by both loops.
struct Join {
    latch: CompletionLatch,
    cancel: CancelToken,
    finalize: Mutex<Option<Finalizer>>,
    deadline_at: Option<Instant>,
    options: PipelineOptions,
}

impl Join {
    /// Count this track down; the last arrival runs the finalizer.
    fn arrive(&self, kind: TrackKind) -> Result<()> {
        if !self.latch.count_down() {
            tracing::debug!(track = %kind, "Track finished, waiting for the other track");
            return Ok(());
        }

        tracing::debug!(track = %kind, "Both tracks finished, finalizing output");
        let finalize = self.finalize.lock().take();
        let result = match finalize {
            Some(finalize) => finalize(),
            None => Ok(()),
        };
        // Release the read session even though both readers are exhausted
        self.cancel.cancel();
        result
    }
}

/// Drive both tracks to exhaustion and finalize exactly once.
///
/// Each `(reader, writer)` pair runs on its own blocking task. Samples within a
/// track are appended in reader order; the tracks only meet at the join. When
/// one loop fails the other is cancelled, and the first real failure is
/// returned in preference to the resulting `Cancelled`.
pub async fn run<VR, VW, AR, AW, F>(
    video: (VR, VW),
    audio: (AR, AW),
    finalize: F,
    options: PipelineOptions,
) -> Result<PipelineReport>
where
    VR: TrackReader + 'static,
    VW: TrackWriter<Sample = VR::Sample> + 'static,
    AR: TrackReader + 'static,
    AW: TrackWriter<Sample = AR::Sample> + 'static,
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let started = Instant::now();
    let join = Arc::new(Join {
        latch: CompletionLatch::new(2),
        cancel: CancelToken::new(),
        finalize: Mutex::new(Some(Box::new(finalize))),
        // A deadline past the end of the clock is no deadline at all
        deadline_at: options.deadline.and_then(|d| started.checked_add(d)),
        options,
    });

    let video_task = spawn_loop(TrackKind::Video, video.0, video.1, join.clone());
    let audio_task = spawn_loop(TrackKind::Audio, audio.0, audio.1, join.clone());

    let (video_result, audio_result) = tokio::join!(video_task, audio_task);
    let video_result = flatten(video_result, &join.cancel);
    let audio_result = flatten(audio_result, &join.cancel);

    match (video_result, audio_result) {
        (Ok(video_samples), Ok(audio_samples)) => Ok(PipelineReport {
            video_samples,
            audio_samples,
            elapsed: started.elapsed(),
        }),
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
        (Err(video_err), Err(audio_err)) => {
            if video_err.is_cancellation() {
                Err(audio_err)
            } else {
                Err(video_err)
            }
        }
    }
}

fn spawn_loop<R, W>(
    kind: TrackKind,
    reader: R,
    writer: W,
    join: Arc<Join>,
) -> tokio::task::JoinHandle<Result<u64>>
where
    R: TrackReader + 'static,
    W: TrackWriter<Sample = R::Sample> + 'static,
{
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || {
        span.in_scope(|| {
            let mut reader = reader;
            let mut writer = writer;
            let result = pull_loop(kind, &mut reader, &mut writer, &join);
            reader.cancel_reading();
            if let Err(e) = &result {
                if !e.is_cancellation() {
                    tracing::debug!(track = %kind, error = %e, "Track loop failed, cancelling run");
                }
                join.cancel.cancel();
            }
            result
        })
    })
}

fn pull_loop<R, W>(kind: TrackKind, reader: &mut R, writer: &mut W, join: &Join) -> Result<u64>
where
    R: TrackReader,
    W: TrackWriter<Sample = R::Sample>,
{
    let mut appended = 0u64;
    loop {
        if join.cancel.is_cancelled() {
            return Err(TranscodeError::Cancelled);
        }
        if let (Some(at), Some(deadline)) = (join.deadline_at, join.options.deadline) {
            if Instant::now() >= at {
                tracing::warn!(track = %kind, samples = appended, "Track did not complete before the deadline");
                return Err(TranscodeError::Timeout(deadline));
            }
        }
        if !writer.is_ready_for_more_data() {
            std::thread::sleep(join.options.poll_interval);
            continue;
        }

        match reader.next_sample()? {
            Some(sample) => {
                writer.append(sample)?;
                appended += 1;
            }
            None => {
                writer.mark_finished()?;
                tracing::debug!(track = %kind, samples = appended, "Track exhausted");
                join.arrive(kind)?;
                return Ok(appended);
            }
        }
    }
}

fn flatten(
    result: std::result::Result<Result<u64>, tokio::task::JoinError>,
    cancel: &CancelToken,
) -> Result<u64> {
    match result {
        Ok(inner) => inner,
        Err(e) => {
            cancel.cancel();
            Err(TranscodeError::Task(e.to_string()))
        }
    }
}
