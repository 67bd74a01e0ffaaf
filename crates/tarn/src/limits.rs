//! Execution limits and cooperative cancellation.
//!
//! A VM instance runs a single flow of control; the only way to stop it from
//! outside is the polled [`CancelToken`]. The dispatcher checks the token
//! every [`CANCEL_CHECK_INTERVAL`] instructions and raises `Cancelled`,
//! which unwinds through `try`/`finally` and `defer` like any thrown error.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::errors::{ErrKind, RunError};

/// Default bound on call-frame depth.
pub const DEFAULT_MAX_FRAME_DEPTH: usize = 1024;

/// How many instructions run between cancellation checks.
pub const CANCEL_CHECK_INTERVAL: u32 = 64;

/// A shareable flag that requests cancellation of a running VM.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the token. Every VM polling it raises `Cancelled` at its next
    /// check point.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Limits enforced while a script runs.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Maximum call-frame depth; exceeding it raises `StackOverflowError`.
    pub max_frame_depth: usize,
    /// Optional cap on executed instructions.
    pub max_ops: Option<u64>,
    pub cancel: CancelToken,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_frame_depth: DEFAULT_MAX_FRAME_DEPTH,
            max_ops: None,
            cancel: CancelToken::new(),
        }
    }
}

impl ResourceLimits {
    pub(crate) fn check_cancelled(&self) -> Result<(), RunError> {
        if self.cancel.is_cancelled() {
            Err(ErrKind::Cancelled.err("execution cancelled"))
        } else {
            Ok(())
        }
    }

    pub(crate) fn check_ops(&self, executed: u64) -> Result<(), RunError> {
        match self.max_ops {
            Some(limit) if executed > limit => {
                Err(ErrKind::Cancelled.err(format!("operation limit exceeded: {executed} > {limit}")))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_trips_once_for_all_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
