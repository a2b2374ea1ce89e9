//! Escalation path for faults the axis cannot recover from.
//!
//! The default hook logs and aborts the process: continuing while the axis
//! may still be moving is unsafe. Embedders and tests can install their own.
use std::sync::Arc;

use crate::error::FeedError;

pub type FaultHook = Arc<dyn Fn(&FeedError) + Send + Sync>;

pub fn abort_on_fault() -> FaultHook {
    Arc::new(|err: &FeedError| {
        tracing::error!(error = %err, "unrecoverable motion fault, aborting");
        std::process::abort();
    })
}
