//! Progress reporting and cooperative cancellation for long package walks
//!
//! Imports, exports and graph algorithms report through a [`ProgressLogger`]
//! and poll its [`CancellationToken`] once per node. Reports are emitted as
//! tracing events and, when one is installed, passed synchronously to a
//! callback on the calling thread.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, SedaError};

/// Granularity of a progress report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProgressLevel {
    /// Start or end of a whole operation
    Global,
    /// A phase inside an operation
    Step,
    /// Per-node progress
    Object,
}

/// Progress callback: level, message, and the running node count
pub type ProgressCallback = Box<dyn Fn(ProgressLevel, &str, u64) + Send + Sync>;

/// Shared flag asking a running operation to stop
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation has been requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SedaError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Default number of nodes between two object-level reports
pub const DEFAULT_OBJECT_STEP: u64 = 1000;

/// Progress sink handed to package walks
pub struct ProgressLogger {
    callback: Option<ProgressCallback>,
    object_step: u64,
    token: CancellationToken,
}

impl fmt::Debug for ProgressLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressLogger")
            .field("callback", &self.callback.is_some())
            .field("object_step", &self.object_step)
            .field("token", &self.token)
            .finish()
    }
}

impl Default for ProgressLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressLogger {
    /// Logger reporting through tracing only
    pub fn new() -> Self {
        Self {
            callback: None,
            object_step: DEFAULT_OBJECT_STEP,
            token: CancellationToken::new(),
        }
    }

    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Report every `step` nodes at object level. Zero disables object reports.
    pub fn with_object_step(mut self, step: u64) -> Self {
        self.object_step = step;
        self
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn object_step(&self) -> u64 {
        self.object_step
    }

    /// Emit a report
    pub fn log(&self, level: ProgressLevel, message: &str, count: u64) {
        match level {
            ProgressLevel::Global | ProgressLevel::Step => {
                tracing::info!(count, "{}", message)
            }
            ProgressLevel::Object => tracing::debug!(count, "{}", message),
        }
        if let Some(callback) = &self.callback {
            callback(level, message, count);
        }
    }

    /// Called once per visited node: checks cancellation, then reports at
    /// object level when `count` reaches a multiple of the step
    pub fn node(&self, count: u64, message: &str) -> Result<()> {
        self.token.check()?;
        if self.object_step > 0 && count % self.object_step == 0 {
            self.log(ProgressLevel::Object, message, count);
        }
        Ok(())
    }
}
