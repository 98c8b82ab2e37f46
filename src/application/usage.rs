//! Fire-and-forget usage log for produced documents.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::quota::IdentityClass;

pub const METRIC_DOCUMENTS_TOTAL: &str = "pagesmith_documents_total";
pub const METRIC_DOCUMENT_PAGES: &str = "pagesmith_document_pages";
pub const METRIC_DOCUMENT_MS: &str = "pagesmith_document_ms";
pub const METRIC_USAGE_SINK_FAILED_TOTAL: &str = "pagesmith_usage_sink_failed_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Assemble,
    Merge,
    Convert,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Assemble => "assemble",
            Operation::Merge => "merge",
            Operation::Convert => "convert",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageEvent {
    pub operation: Operation,
    pub file_count: usize,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub page_count: usize,
    pub elapsed_ms: u64,
    pub identity_class: IdentityClass,
    pub client_version: Option<String>,
}

#[derive(Debug, Error)]
#[error("usage sink `{sink}` failed: {message}")]
pub struct UsageSinkError {
    pub sink: &'static str,
    pub message: String,
}

#[async_trait]
pub trait UsageSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn record(&self, event: &UsageEvent) -> Result<(), UsageSinkError>;
}

/// Publishes usage through the `metrics` facade and the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsUsageSink;

#[async_trait]
impl UsageSink for MetricsUsageSink {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn record(&self, event: &UsageEvent) -> Result<(), UsageSinkError> {
        let operation = event.operation.as_str();
        counter!(METRIC_DOCUMENTS_TOTAL, "operation" => operation).increment(1);
        histogram!(METRIC_DOCUMENT_PAGES, "operation" => operation).record(event.page_count as f64);
        histogram!(METRIC_DOCUMENT_MS, "operation" => operation).record(event.elapsed_ms as f64);
        info!(
            target = "application::usage",
            operation,
            file_count = event.file_count,
            input_bytes = event.input_bytes,
            output_bytes = event.output_bytes,
            page_count = event.page_count,
            elapsed_ms = event.elapsed_ms,
            identity_class = ?event.identity_class,
            client_version = event.client_version.as_deref().unwrap_or("unknown"),
            "document produced"
        );
        Ok(())
    }
}

/// Fans events out to every sink off the request path.
#[derive(Clone, Default)]
pub struct UsageRecorder {
    sinks: Arc<Vec<Arc<dyn UsageSink>>>,
}

impl UsageRecorder {
    pub fn new(sinks: Vec<Arc<dyn UsageSink>>) -> Self {
        Self {
            sinks: Arc::new(sinks),
        }
    }

    /// Spawn delivery and return immediately. Sink failures are logged and
    /// counted; the caller never sees them.
    pub fn emit(&self, event: UsageEvent) -> JoinHandle<()> {
        let sinks = Arc::clone(&self.sinks);
        tokio::spawn(async move {
            for sink in sinks.iter() {
                if let Err(err) = sink.record(&event).await {
                    counter!(METRIC_USAGE_SINK_FAILED_TOTAL, "sink" => sink.name()).increment(1);
                    warn!(
                        target = "application::usage",
                        sink = sink.name(),
                        operation = %event.operation,
                        error = %err,
                        "usage sink failed"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<UsageEvent>>,
    }

    #[async_trait]
    impl UsageSink for CollectingSink {
        fn name(&self) -> &'static str {
            "collecting"
        }

        async fn record(&self, event: &UsageEvent) -> Result<(), UsageSinkError> {
            self.events.lock().expect("lock").push(event.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl UsageSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn record(&self, _event: &UsageEvent) -> Result<(), UsageSinkError> {
            Err(UsageSinkError {
                sink: "failing",
                message: "connection refused".to_string(),
            })
        }
    }

    fn event() -> UsageEvent {
        UsageEvent {
            operation: Operation::Assemble,
            file_count: 2,
            input_bytes: 2048,
            output_bytes: 1024,
            page_count: 3,
            elapsed_ms: 12,
            identity_class: IdentityClass::Anonymous,
            client_version: Some("1.4.0".to_string()),
        }
    }

    #[tokio::test]
    async fn failing_sink_does_not_stop_later_sinks() {
        let collecting = Arc::new(CollectingSink::default());
        let recorder = UsageRecorder::new(vec![
            Arc::new(FailingSink),
            Arc::clone(&collecting) as Arc<dyn UsageSink>,
        ]);

        recorder.emit(event()).await.expect("delivery task");
        let events = collecting.events.lock().expect("lock");
        assert_eq!(events.as_slice(), &[event()]);
    }
}
