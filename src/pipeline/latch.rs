//! Join and cancellation primitives shared by the pull loops.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Countdown that opens exactly once.
///
/// Each participant calls [`count_down`](Self::count_down) when it is done;
/// only the caller that takes the last permit sees `true`. Extra calls after
/// the latch opened return `false` and leave it at zero.
#[derive(Debug, Clone)]
pub struct CompletionLatch {
    remaining: Arc<AtomicUsize>,
}

impl CompletionLatch {
    pub fn new(permits: usize) -> Self {
        Self {
            remaining: Arc::new(AtomicUsize::new(permits)),
        }
    }

    /// Release one permit. Returns `true` for the caller that released the last one.
    pub fn count_down(&self) -> bool {
        match self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(previous) => previous == 1,
            Err(_) => false,
        }
    }

    /// Permits still outstanding.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.remaining() == 0
    }
}

/// Shared stop flag observed by both pull loops.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
