//! Page counts and thumbnails for uploaded documents.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use pagesmith_api_types::PreviewResponse;
use thiserror::Error;
use tracing::info;

use crate::application::assembly::{DocumentLibrary, LibraryError};
use crate::application::composition::{PageCountError, PageCounter};
use crate::application::error::AppError;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("rasterizer unavailable: {0}")]
    NotFound(std::io::Error),
    #[error("failed to stage rasterizer files: {0}")]
    Io(std::io::Error),
    #[error("rasterizer failed (exit {exit_code:?}): {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("rasterizer produced no image for page {page}")]
    MissingOutput { page: u32 },
    #[error("invalid page range {first_page}..={last_page}")]
    InvalidRange { first_page: u32, last_page: u32 },
}

/// Image encoding produced by a [`Rasterizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

/// Renders pages of a document to images.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Pages are 1-based and inclusive; one image per page, in page order.
    /// `first_page == 0` or `last_page < first_page` is
    /// [`RasterError::InvalidRange`].
    async fn rasterize(
        &self,
        document: Bytes,
        first_page: u32,
        last_page: u32,
        format: ImageFormat,
    ) -> Result<Vec<Vec<u8>>, RasterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreviewRange {
    pub first_page: Option<u32>,
    pub last_page: Option<u32>,
}

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("{0}")]
    Validation(String),
    #[error("document could not be read")]
    Unreadable(#[source] LibraryError),
    #[error("preview rendering failed")]
    Raster(#[source] RasterError),
    #[error("preview task failed: {0}")]
    Join(String),
}

impl From<PreviewError> for AppError {
    fn from(error: PreviewError) -> Self {
        match error {
            PreviewError::Validation(message) => AppError::Validation(message),
            PreviewError::Unreadable(source) => {
                AppError::Validation(format!("the file could not be read as a PDF: {source}"))
            }
            PreviewError::Raster(source) => AppError::Unexpected(source.to_string()),
            PreviewError::Join(message) => AppError::Unexpected(message),
        }
    }
}

pub struct PreviewFetcher<L: DocumentLibrary> {
    library: Arc<L>,
    rasterizer: Arc<dyn Rasterizer>,
    max_pages: u32,
}

impl<L: DocumentLibrary> Clone for PreviewFetcher<L> {
    fn clone(&self) -> Self {
        Self {
            library: Arc::clone(&self.library),
            rasterizer: Arc::clone(&self.rasterizer),
            max_pages: self.max_pages,
        }
    }
}

impl<L: DocumentLibrary> PreviewFetcher<L> {
    pub fn new(library: Arc<L>, rasterizer: Arc<dyn Rasterizer>, max_pages: u32) -> Self {
        Self {
            library,
            rasterizer,
            max_pages: max_pages.max(1),
        }
    }

    pub async fn total_pages(&self, document: Bytes) -> Result<u32, PreviewError> {
        let library = Arc::clone(&self.library);
        tokio::task::spawn_blocking(move || {
            library
                .load(&document)
                .map(|source| library.page_count(&source))
        })
        .await
        .map_err(|err| PreviewError::Join(err.to_string()))?
        .map_err(PreviewError::Unreadable)
    }

    pub async fn fetch(
        &self,
        document: Bytes,
        range: PreviewRange,
        count_only: bool,
    ) -> Result<PreviewResponse, PreviewError> {
        let started_at = Instant::now();
        let total_pages = self.total_pages(document.clone()).await?;
        if count_only {
            return Ok(PreviewResponse {
                total_pages,
                previews: Vec::new(),
            });
        }

        let (first, last) = self.resolve_range(range, total_pages)?;
        let images = self
            .rasterizer
            .rasterize(document, first, last, ImageFormat::Png)
            .await
            .map_err(PreviewError::Raster)?;
        let previews: Vec<String> = images
            .iter()
            .map(|png| format!("data:image/png;base64,{}", STANDARD.encode(png)))
            .collect();

        info!(
            target = "application::preview",
            op = "preview",
            total_pages,
            first_page = first,
            last_page = last,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "rendered page previews"
        );
        Ok(PreviewResponse {
            total_pages,
            previews,
        })
    }

    fn resolve_range(&self, range: PreviewRange, total: u32) -> Result<(u32, u32), PreviewError> {
        if total == 0 {
            return Err(PreviewError::Validation("the document has no pages".to_string()));
        }
        let first = range.first_page.unwrap_or(1);
        if first == 0 || first > total {
            return Err(PreviewError::Validation(format!(
                "firstPage must be between 1 and {total}"
            )));
        }
        let window_end = first.saturating_add(self.max_pages - 1).min(total);
        let last = match range.last_page {
            None => window_end,
            Some(last) if last < first => {
                return Err(PreviewError::Validation(
                    "lastPage must not be before firstPage".to_string(),
                ));
            }
            Some(last) => last.min(total),
        };
        if last - first + 1 > self.max_pages {
            return Err(PreviewError::Validation(format!(
                "at most {} pages can be previewed per request",
                self.max_pages
            )));
        }
        Ok((first, last))
    }
}

#[async_trait]
impl<L: DocumentLibrary> PageCounter for PreviewFetcher<L> {
    async fn count_pages(&self, bytes: Bytes) -> Result<u32, PageCountError> {
        self.total_pages(bytes)
            .await
            .map_err(|err| PageCountError(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Documents are the page count as text.
    struct CountLibrary;

    impl DocumentLibrary for CountLibrary {
        type Source = u32;
        type Output = ();

        fn load(&self, bytes: &[u8]) -> Result<u32, LibraryError> {
            std::str::from_utf8(bytes)
                .ok()
                .and_then(|text| text.parse().ok())
                .ok_or_else(|| LibraryError::Parse("not a number".to_string()))
        }

        fn page_count(&self, source: &u32) -> u32 {
            *source
        }

        fn create(&self) {}

        fn copy_page(&self, _: &mut (), _: &u32, _: u32) -> Result<(), LibraryError> {
            Ok(())
        }

        fn save(&self, _: ()) -> Result<Vec<u8>, LibraryError> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct RecordingRasterizer {
        calls: Mutex<Vec<(u32, u32)>>,
    }

    #[async_trait]
    impl Rasterizer for RecordingRasterizer {
        async fn rasterize(
            &self,
            _document: Bytes,
            first_page: u32,
            last_page: u32,
            _format: ImageFormat,
        ) -> Result<Vec<Vec<u8>>, RasterError> {
            self.calls.lock().expect("lock").push((first_page, last_page));
            Ok((first_page..=last_page).map(|page| vec![page as u8]).collect())
        }
    }

    fn fetcher(max_pages: u32) -> (PreviewFetcher<CountLibrary>, Arc<RecordingRasterizer>) {
        let rasterizer = Arc::new(RecordingRasterizer::default());
        let fetcher = PreviewFetcher::new(
            Arc::new(CountLibrary),
            Arc::clone(&rasterizer) as Arc<dyn Rasterizer>,
            max_pages,
        );
        (fetcher, rasterizer)
    }

    #[tokio::test]
    async fn default_range_covers_document_up_to_cap() {
        let (fetcher, rasterizer) = fetcher(3);
        let response = fetcher
            .fetch(Bytes::from_static(b"5"), PreviewRange::default(), false)
            .await
            .expect("preview");
        assert_eq!(response.total_pages, 5);
        assert_eq!(response.previews.len(), 3);
        assert_eq!(response.previews[0], "data:image/png;base64,AQ==");
        assert_eq!(*rasterizer.calls.lock().expect("lock"), vec![(1, 3)]);
    }

    #[tokio::test]
    async fn count_only_skips_the_rasterizer() {
        let (fetcher, rasterizer) = fetcher(10);
        let response = fetcher
            .fetch(Bytes::from_static(b"7"), PreviewRange::default(), true)
            .await
            .expect("preview");
        assert_eq!(response.total_pages, 7);
        assert!(response.previews.is_empty());
        assert!(rasterizer.calls.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn last_page_is_clamped_to_document() {
        let (fetcher, rasterizer) = fetcher(10);
        let range = PreviewRange {
            first_page: Some(2),
            last_page: Some(40),
        };
        fetcher
            .fetch(Bytes::from_static(b"4"), range, false)
            .await
            .expect("preview");
        assert_eq!(*rasterizer.calls.lock().expect("lock"), vec![(2, 4)]);
    }

    #[tokio::test]
    async fn invalid_ranges_are_rejected() {
        let (fetcher, _) = fetcher(10);
        for (first, last) in [(Some(0), None), (Some(9), None), (Some(3), Some(2))] {
            let range = PreviewRange {
                first_page: first,
                last_page: last,
            };
            let err = fetcher
                .fetch(Bytes::from_static(b"4"), range, false)
                .await
                .unwrap_err();
            assert!(matches!(err, PreviewError::Validation(_)), "{first:?}..{last:?}");
        }
    }

    #[tokio::test]
    async fn oversized_explicit_range_is_rejected() {
        let (fetcher, _) = fetcher(2);
        let range = PreviewRange {
            first_page: Some(1),
            last_page: Some(3),
        };
        let err = fetcher
            .fetch(Bytes::from_static(b"5"), range, false)
            .await
            .unwrap_err();
        assert!(matches!(AppError::from(err), AppError::Validation(_)));
    }

    #[tokio::test]
    async fn unreadable_documents_are_client_errors() {
        let (fetcher, _) = fetcher(2);
        let err = fetcher
            .fetch(Bytes::from_static(b"%PDF?"), PreviewRange::default(), true)
            .await
            .unwrap_err();
        assert!(matches!(AppError::from(err), AppError::Validation(_)));
    }
}
