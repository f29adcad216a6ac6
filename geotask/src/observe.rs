//! Observability sink for failed remote operations.
//!
//! Remote failures are never fatal and never retried; they are handed to an
//! [`ErrorSink`] exactly once. Reporting is fire-and-forget: a sink must not
//! block or await, so it is safe to call from inside any async operation.

use std::sync::Arc;

use tokio::sync::mpsc;

/// A single failed remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Name of the operation that failed (e.g. `"add"`, `"refresh"`).
    pub operation: &'static str,
    /// Human-readable description of the failure.
    pub detail: String,
}

impl ErrorReport {
    /// Creates a report for `operation` from any displayable error.
    pub fn new(operation: &'static str, detail: impl ToString) -> Self {
        Self {
            operation,
            detail: detail.to_string(),
        }
    }
}

/// Receives reports of failed remote operations.
pub trait ErrorSink: Send + Sync {
    /// Record a failure. Must return promptly without blocking.
    fn report(&self, report: ErrorReport);
}

impl<T: ErrorSink + ?Sized> ErrorSink for Arc<T> {
    fn report(&self, report: ErrorReport) {
        (**self).report(report);
    }
}

/// Sink that logs every report through `tracing` at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, report: ErrorReport) {
        tracing::error!(
            operation = report.operation,
            detail = %report.detail,
            "remote operation failed"
        );
    }
}

/// Sink that forwards reports over a bounded channel, e.g. to a UI that
/// shows a toast.
///
/// When the channel is full or closed the report is logged and dropped;
/// the caller is never blocked.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ErrorReport>,
}

impl ChannelSink {
    /// Creates a sink and the receiver that consumes its reports.
    ///
    /// A zero `buffer` is raised to one.
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ErrorReport>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

impl ErrorSink for ChannelSink {
    fn report(&self, report: ErrorReport) {
        if let Err(e) = self.tx.try_send(report) {
            let dropped = match e {
                mpsc::error::TrySendError::Full(r) | mpsc::error::TrySendError::Closed(r) => r,
            };
            tracing::warn!(
                operation = dropped.operation,
                detail = %dropped.detail,
                "error report dropped, sink channel unavailable"
            );
        }
    }
}
