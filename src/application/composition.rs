//! Batch ingestion of source files into a [`CompositionOrder`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::composition::CompositionOrder;
use crate::domain::types::{PageId, SourceId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PageCountError(pub String);

/// Reports how many pages a document has.
#[async_trait]
pub trait PageCounter: Send + Sync {
    async fn count_pages(&self, bytes: Bytes) -> Result<u32, PageCountError>;
}

#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFile {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub added: Vec<(SourceId, Vec<PageId>)>,
    pub rejected: Vec<RejectedFile>,
}

/// Register every file, count pages concurrently, then append pages in batch
/// order regardless of which count finished first. A file that cannot be
/// counted is dropped alone; the rest of the batch still lands.
pub async fn add_sources<C>(
    order: &mut CompositionOrder,
    files: Vec<IncomingFile>,
    counter: &C,
) -> IngestReport
where
    C: PageCounter + ?Sized,
{
    let registered: Vec<(SourceId, IncomingFile)> = files
        .into_iter()
        .map(|file| {
            let id = order.register_source(file.name.clone(), file.bytes.len() as u64);
            (id, file)
        })
        .collect();

    let counts = join_all(
        registered
            .iter()
            .map(|(_, file)| counter.count_pages(file.bytes.clone())),
    )
    .await;

    let mut report = IngestReport::default();
    for ((id, file), count) in registered.into_iter().zip(counts) {
        match order.complete_source(id, count.map_err(|err| err.0)) {
            Ok(Some(pages)) => {
                debug!(source = %id, name = %file.name, pages = pages.len(), "source added");
                report.added.push((id, pages));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(name = %file.name, error = %err, "source rejected");
                report.rejected.push(RejectedFile {
                    name: file.name,
                    reason: err.to_string(),
                });
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// Bytes are `pages[:delay_ms]`.
    struct ScriptCounter;

    #[async_trait]
    impl PageCounter for ScriptCounter {
        async fn count_pages(&self, bytes: Bytes) -> Result<u32, PageCountError> {
            let text = String::from_utf8_lossy(&bytes).to_string();
            let mut parts = text.split(':');
            let pages = parts
                .next()
                .and_then(|value| value.parse().ok())
                .ok_or_else(|| PageCountError(format!("unreadable `{text}`")))?;
            if let Some(delay) = parts.next().and_then(|value| value.parse().ok()) {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Ok(pages)
        }
    }

    fn file(name: &str, script: &str) -> IncomingFile {
        IncomingFile {
            name: name.to_string(),
            bytes: Bytes::from(script.to_string()),
        }
    }

    #[tokio::test]
    async fn pages_append_in_batch_order() {
        let mut order = CompositionOrder::new();
        let report = add_sources(
            &mut order,
            vec![file("slow.pdf", "2:40"), file("fast.pdf", "1")],
            &ScriptCounter,
        )
        .await;

        assert_eq!(report.added.len(), 2);
        let (slow, fast) = (report.added[0].0, report.added[1].0);
        let sources: Vec<_> = order.pages().iter().map(|page| page.source_id).collect();
        assert_eq!(sources, vec![slow, slow, fast]);
    }

    #[tokio::test]
    async fn failures_reject_only_the_failing_file() {
        let mut order = CompositionOrder::new();
        let report = add_sources(
            &mut order,
            vec![file("ok.pdf", "1"), file("broken.pdf", "x"), file("empty.pdf", "0")],
            &ScriptCounter,
        )
        .await;

        assert_eq!(report.added.len(), 1);
        let names: Vec<_> = report.rejected.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["broken.pdf", "empty.pdf"]);
        assert_eq!(order.len(), 1);
        assert_eq!(order.sources().count(), 1);
    }
}
