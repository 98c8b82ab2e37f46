//! Raster export: every page of a document rendered and packed into a zip.

use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use thiserror::Error;
use tracing::info;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::application::assembly::{DocumentLibrary, LibraryError};
use crate::application::error::AppError;
use crate::application::preview::{ImageFormat, RasterError, Rasterizer};

const TARGET: &str = "application::convert";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{0}")]
    Validation(String),
    #[error("document could not be read")]
    Unreadable(#[source] LibraryError),
    #[error("page rendering failed")]
    Raster(#[source] RasterError),
    #[error("failed to build the archive")]
    Archive(#[source] ZipError),
    #[error("export task failed: {0}")]
    Join(String),
}

impl From<ExportError> for AppError {
    fn from(error: ExportError) -> Self {
        match error {
            ExportError::Validation(message) => AppError::Validation(message),
            ExportError::Unreadable(source) => {
                AppError::Validation(format!("the file could not be read as a PDF: {source}"))
            }
            ExportError::Raster(source) => AppError::Unexpected(source.to_string()),
            ExportError::Archive(source) => AppError::Unexpected(source.to_string()),
            ExportError::Join(message) => AppError::Unexpected(message),
        }
    }
}

/// Zip archive holding one image per page, named `page-<n>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArchive {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

pub struct RasterExporter<L: DocumentLibrary> {
    library: Arc<L>,
    rasterizer: Arc<dyn Rasterizer>,
    max_pages: u32,
}

impl<L: DocumentLibrary> Clone for RasterExporter<L> {
    fn clone(&self) -> Self {
        Self {
            library: Arc::clone(&self.library),
            rasterizer: Arc::clone(&self.rasterizer),
            max_pages: self.max_pages,
        }
    }
}

impl<L: DocumentLibrary> RasterExporter<L> {
    pub fn new(library: Arc<L>, rasterizer: Arc<dyn Rasterizer>, max_pages: u32) -> Self {
        Self {
            library,
            rasterizer,
            max_pages: max_pages.max(1),
        }
    }

    pub async fn export(
        &self,
        document: Bytes,
        format: ImageFormat,
    ) -> Result<ImageArchive, ExportError> {
        let started_at = Instant::now();
        let library = Arc::clone(&self.library);
        let source = document.clone();
        let total = tokio::task::spawn_blocking(move || {
            library
                .load(&source)
                .map(|loaded| library.page_count(&loaded))
        })
        .await
        .map_err(|err| ExportError::Join(err.to_string()))?
        .map_err(ExportError::Unreadable)?;

        if total == 0 {
            return Err(ExportError::Validation("the document has no pages".to_string()));
        }
        if total > self.max_pages {
            return Err(ExportError::Validation(format!(
                "at most {} pages can be exported per request",
                self.max_pages
            )));
        }

        let images = self
            .rasterizer
            .rasterize(document, 1, total, format)
            .await
            .map_err(ExportError::Raster)?;
        let page_count = images.len();
        let bytes = tokio::task::spawn_blocking(move || pack(&images, format))
            .await
            .map_err(|err| ExportError::Join(err.to_string()))?
            .map_err(ExportError::Archive)?;

        info!(
            target = TARGET,
            op = "export",
            pages = page_count,
            format = format.extension(),
            archive_bytes = bytes.len() as u64,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "exported page images"
        );
        Ok(ImageArchive { bytes, page_count })
    }
}

/// Entry names are zero-padded so archive order matches page order.
fn entry_name(page: usize, total: usize, format: ImageFormat) -> String {
    let width = total.to_string().len();
    format!("page-{page:0width$}.{}", format.extension())
}

fn pack(images: &[Vec<u8>], format: ImageFormat) -> Result<Vec<u8>, ZipError> {
    // Image data is already compressed.
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (offset, image) in images.iter().enumerate() {
        writer.start_file(entry_name(offset + 1, images.len(), format), options)?;
        writer.write_all(image)?;
    }
    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use zip::ZipArchive;

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
    struct LabelRasterizer {
        calls: Mutex<Vec<(u32, u32, ImageFormat)>>,
    }

    #[async_trait]
    impl Rasterizer for LabelRasterizer {
        async fn rasterize(
            &self,
            _document: Bytes,
            first_page: u32,
            last_page: u32,
            format: ImageFormat,
        ) -> Result<Vec<Vec<u8>>, RasterError> {
            self.calls
                .lock()
                .expect("lock")
                .push((first_page, last_page, format));
            Ok((first_page..=last_page)
                .map(|page| format!("img-{page}").into_bytes())
                .collect())
        }
    }

    fn exporter(max_pages: u32) -> (RasterExporter<CountLibrary>, Arc<LabelRasterizer>) {
        let rasterizer = Arc::new(LabelRasterizer::default());
        let exporter = RasterExporter::new(
            Arc::new(CountLibrary),
            Arc::clone(&rasterizer) as Arc<dyn Rasterizer>,
            max_pages,
        );
        (exporter, rasterizer)
    }

    fn entries(bytes: &[u8]) -> Vec<(String, String)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("zip archive");
        (0..archive.len())
            .map(|index| {
                let mut file = archive.by_index(index).expect("entry");
                let mut body = String::new();
                file.read_to_string(&mut body).expect("entry body");
                (file.name().to_string(), body)
            })
            .collect()
    }

    #[tokio::test]
    async fn archive_holds_every_page_in_order() {
        let (exporter, rasterizer) = exporter(50);
        let archive = exporter
            .export(Bytes::from_static(b"12"), ImageFormat::Png)
            .await
            .expect("export");

        assert_eq!(archive.page_count, 12);
        let entries = entries(&archive.bytes);
        assert_eq!(entries.len(), 12);
        assert_eq!(entries[0], ("page-01.png".to_string(), "img-1".to_string()));
        assert_eq!(entries[11], ("page-12.png".to_string(), "img-12".to_string()));
        assert_eq!(
            *rasterizer.calls.lock().expect("lock"),
            vec![(1, 12, ImageFormat::Png)]
        );
    }

    #[tokio::test]
    async fn jpeg_entries_use_the_jpg_extension() {
        let (exporter, _) = exporter(50);
        let archive = exporter
            .export(Bytes::from_static(b"2"), ImageFormat::Jpeg)
            .await
            .expect("export");
        let names: Vec<String> = entries(&archive.bytes)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["page-1.jpg", "page-2.jpg"]);
    }

    #[tokio::test]
    async fn documents_over_the_cap_are_rejected_before_rendering() {
        let (exporter, rasterizer) = exporter(3);
        let err = exporter
            .export(Bytes::from_static(b"4"), ImageFormat::Png)
            .await
            .unwrap_err();
        assert!(matches!(AppError::from(err), AppError::Validation(_)));
        assert!(rasterizer.calls.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn unreadable_documents_are_client_errors() {
        let (exporter, _) = exporter(3);
        let err = exporter
            .export(Bytes::from_static(b"%PDF?"), ImageFormat::Png)
            .await
            .unwrap_err();
        assert!(matches!(AppError::from(err), AppError::Validation(_)));
    }
}
