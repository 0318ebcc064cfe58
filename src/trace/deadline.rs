// Deadline and cancellation, checked once per hop

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{AnalyzerError, AnalyzerResult};

/// Shared flag a caller flips to abandon in-flight analyses.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Deadline {
    at: Option<Instant>,
    cancel: Option<CancelHandle>,
}

impl Deadline {
    /// No time limit and no cancellation.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn after(timeout: Duration) -> Self {
        Deadline {
            at: Some(Instant::now() + timeout),
            cancel: None,
        }
    }

    pub fn at(instant: Instant) -> Self {
        Deadline {
            at: Some(instant),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, handle: CancelHandle) -> Self {
        self.cancel = Some(handle);
        self
    }

    /// This deadline, further bounded to `budget` from now. The cancel
    /// handle is shared with the original.
    pub fn limited_to(&self, budget: Duration) -> Self {
        let limit = Instant::now() + budget;
        Deadline {
            at: Some(self.at.map_or(limit, |at| at.min(limit))),
            cancel: self.cancel.clone(),
        }
    }

    /// `hops` is the number of device passes completed so far, reported in the error.
    pub fn check(&self, hops: usize) -> AnalyzerResult<()> {
        if self.cancel.as_ref().is_some_and(CancelHandle::is_cancelled) {
            return Err(AnalyzerError::Cancelled { hops });
        }
        if self.at.is_some_and(|at| Instant::now() >= at) {
            return Err(AnalyzerError::DeadlineExceeded { hops });
        }
        Ok(())
    }
}
