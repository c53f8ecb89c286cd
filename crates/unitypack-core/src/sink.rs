//! Caller-supplied log sink for human-readable progress lines.
//!
//! Structured diagnostics go through `tracing`; the sink receives the same
//! milestones as plain text for embedders that want their own output.

use std::sync::Arc;

/// Sink for log lines. Called from worker tasks, so it must be thread-safe.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Optional sink handle passed through the pipeline.
#[derive(Clone, Default)]
pub struct RunLog {
    sink: Option<LogSink>,
}

impl RunLog {
    pub fn new(sink: Option<LogSink>) -> Self {
        Self { sink }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn line(&self, text: &str) {
        if let Some(sink) = &self.sink {
            sink(text);
        }
    }
}

impl std::fmt::Debug for RunLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLog")
            .field("sink", &self.sink.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
