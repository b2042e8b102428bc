//! Two-track pull pipeline
//!
//! This module handles:
//! - The reader/writer seams every track endpoint implements
//! - The two-permit completion latch that guards finalization
//! - Driving one pull loop per track on its own blocking context

mod latch;
mod runner;

pub use latch::{CancelToken, CompletionLatch};
pub use runner::{run, PipelineOptions, PipelineReport};

use crate::error::Result;

/// Sequential, pull-based cursor over the samples of one track.
pub trait TrackReader: Send {
    type Sample: Send;

    /// Next sample in track order, or `None` once the track is exhausted.
    fn next_sample(&mut self) -> Result<Option<Self::Sample>>;

    /// Stop reading and release the underlying read session.
    ///
    /// Called exactly once when the loop ends, whether the reader was
    /// exhausted, the run failed, or the join already fired.
    fn cancel_reading(&mut self) {}
}

/// Sequential, push-based sink for the samples of one output track.
pub trait TrackWriter: Send {
    type Sample: Send;

    /// Whether the writer can take another sample right now.
    fn is_ready_for_more_data(&self) -> bool {
        true
    }

    /// Append one sample. Samples arrive in reader order.
    fn append(&mut self, sample: Self::Sample) -> Result<()>;

    /// Flush whatever the writer still buffers and mark its track finished.
    fn mark_finished(&mut self) -> Result<()>;
}
