//! Document assembly: copy referenced pages out of uploaded sources, in order.
//!
//! Uploads live in an arena ([`UploadSet`]) addressed by slot. Each distinct
//! slot that the reference list mentions is parsed exactly once, concurrently
//! on the blocking pool; the output is then built by walking the reference
//! list, so load completion order never shows up in the result.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::future::try_join_all;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::error::AppError;
use crate::domain::error::DomainError;
use crate::domain::types::SlotId;

const SOURCE: &str = "application::assembly";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LibraryError {
    #[error("document could not be parsed: {0}")]
    Parse(String),
    #[error("document is encrypted")]
    Encrypted,
    #[error("page {index} is out of range for a document with {count} pages")]
    PageOutOfRange { index: u32, count: u32 },
    #[error("failed to copy page: {0}")]
    Copy(String),
    #[error("failed to serialize document: {0}")]
    Save(String),
}

/// Parsing and page-copying collaborator.
///
/// Calls are CPU-bound and synchronous; the assembler moves them onto the
/// blocking pool.
pub trait DocumentLibrary: Send + Sync + 'static {
    type Source: Send + Sync + 'static;
    type Output: Send + 'static;

    fn load(&self, bytes: &[u8]) -> Result<Self::Source, LibraryError>;
    fn page_count(&self, source: &Self::Source) -> u32;
    fn create(&self) -> Self::Output;
    fn copy_page(
        &self,
        output: &mut Self::Output,
        source: &Self::Source,
        page_index: u32,
    ) -> Result<(), LibraryError>;
    fn save(&self, output: Self::Output) -> Result<Vec<u8>, LibraryError>;
}

#[derive(Debug, Clone)]
pub struct UploadedSource {
    pub slot: SlotId,
    pub name: String,
    pub bytes: Bytes,
}

/// Uploaded files of one request, indexed by slot and kept in upload order.
#[derive(Debug, Clone, Default)]
pub struct UploadSet {
    entries: Vec<UploadedSource>,
    index: HashMap<SlotId, usize>,
}

impl UploadSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        slot: SlotId,
        name: impl Into<String>,
        bytes: Bytes,
    ) -> Result<(), DomainError> {
        if self.index.contains_key(&slot) {
            return Err(DomainError::validation(format!(
                "slot `{slot}` was uploaded more than once"
            )));
        }
        self.index.insert(slot.clone(), self.entries.len());
        self.entries.push(UploadedSource {
            slot,
            name: name.into(),
            bytes,
        });
        Ok(())
    }

    pub fn get(&self, slot: &SlotId) -> Option<&UploadedSource> {
        self.index.get(slot).map(|position| &self.entries[*position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &UploadedSource> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|entry| entry.bytes.len() as u64).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotReference {
    pub slot: SlotId,
    pub page_index: u32,
}

/// How a reference that cannot be resolved is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceMode {
    /// Abort the whole assembly.
    #[default]
    Strict,
    /// Skip the reference and report its position.
    Tolerant,
}

#[derive(Debug, Clone)]
pub struct AssemblyRequest {
    pub references: Vec<SlotReference>,
    pub uploads: UploadSet,
    pub mode: ReferenceMode,
}

#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    /// Positions in the reference list skipped under [`ReferenceMode::Tolerant`].
    pub skipped: Vec<usize>,
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("{0}")]
    Validation(String),
    #[error("reference {position} (`{slot}` page {page_index}) {reason}")]
    BadReference {
        position: usize,
        slot: SlotId,
        page_index: u32,
        reason: String,
    },
    #[error("none of the {total} references could be resolved")]
    NothingResolvable { total: usize },
    #[error("source `{name}` could not be loaded")]
    Load {
        name: String,
        #[source]
        source: LibraryError,
    },
    #[error("output document could not be produced")]
    Output {
        #[source]
        source: LibraryError,
    },
    #[error("assembly task failed: {0}")]
    Join(String),
}

impl From<AssemblyError> for AppError {
    fn from(error: AssemblyError) -> Self {
        match error {
            AssemblyError::Validation(message) => AppError::Validation(message),
            AssemblyError::BadReference { .. } | AssemblyError::NothingResolvable { .. } => {
                AppError::BadReference(error.to_string())
            }
            AssemblyError::Load { .. } | AssemblyError::Output { .. } => {
                AppError::AssemblyFailure(error_chain(&error))
            }
            AssemblyError::Join(message) => AppError::Unexpected(message),
        }
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut current = error.source();
    while let Some(inner) = current {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        current = inner.source();
    }
    message
}

pub struct DocumentAssembler<L: DocumentLibrary> {
    library: Arc<L>,
}

impl<L: DocumentLibrary> Clone for DocumentAssembler<L> {
    fn clone(&self) -> Self {
        Self {
            library: Arc::clone(&self.library),
        }
    }
}

impl<L: DocumentLibrary> DocumentAssembler<L> {
    pub fn new(library: Arc<L>) -> Self {
        Self { library }
    }

    pub fn library(&self) -> &Arc<L> {
        &self.library
    }

    pub async fn assemble(
        &self,
        request: AssemblyRequest,
    ) -> Result<AssembledDocument, AssemblyError> {
        let started_at = Instant::now();
        let AssemblyRequest {
            references,
            uploads,
            mode,
        } = request;

        if references.is_empty() {
            return Err(AssemblyError::Validation(
                "the composition contains no pages".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let wanted: Vec<&UploadedSource> = references
            .iter()
            .filter(|reference| seen.insert(&reference.slot))
            .filter_map(|reference| uploads.get(&reference.slot))
            .collect();
        let handles: HashMap<SlotId, Arc<L::Source>> =
            self.load_sources(&wanted).await?.into_iter().collect();

        let mut plan = Vec::with_capacity(references.len());
        let mut skipped = Vec::new();
        for (position, reference) in references.iter().enumerate() {
            let resolved = match handles.get(&reference.slot) {
                None => Err("refers to a source that was not uploaded".to_string()),
                Some(source) => {
                    let count = self.library.page_count(source);
                    if reference.page_index < count {
                        Ok(Arc::clone(source))
                    } else {
                        Err(format!("is beyond the {count} pages of its source"))
                    }
                }
            };

            match (resolved, mode) {
                (Ok(source), _) => plan.push((source, reference.page_index)),
                (Err(reason), ReferenceMode::Strict) => {
                    return Err(AssemblyError::BadReference {
                        position,
                        slot: reference.slot.clone(),
                        page_index: reference.page_index,
                        reason,
                    });
                }
                (Err(reason), ReferenceMode::Tolerant) => {
                    warn!(
                        target = SOURCE,
                        position,
                        slot = %reference.slot,
                        page_index = reference.page_index,
                        reason = %reason,
                        "skipping unresolvable page reference"
                    );
                    skipped.push(position);
                }
            }
        }

        if plan.is_empty() {
            return Err(AssemblyError::NothingResolvable {
                total: references.len(),
            });
        }

        let document = self.render(plan, skipped).await?;
        info!(
            target = SOURCE,
            op = "assemble",
            references = references.len(),
            sources = handles.len(),
            pages = document.page_count,
            skipped = document.skipped.len(),
            output_bytes = document.bytes.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "assembled document"
        );
        Ok(document)
    }

    /// Concatenate every page of every upload, in upload order.
    pub async fn merge(&self, uploads: &UploadSet) -> Result<AssembledDocument, AssemblyError> {
        let started_at = Instant::now();
        if uploads.len() < 2 {
            return Err(AssemblyError::Validation(
                "merging requires at least two files".to_string(),
            ));
        }

        let sources: Vec<&UploadedSource> = uploads.iter().collect();
        let loaded = self.load_sources(&sources).await?;
        let mut plan = Vec::new();
        for (upload, (_, source)) in sources.iter().zip(&loaded) {
            let count = self.library.page_count(source);
            if count == 0 {
                return Err(AssemblyError::Validation(format!(
                    "`{}` contains no pages",
                    upload.name
                )));
            }
            plan.extend((0..count).map(|index| (Arc::clone(source), index)));
        }

        let document = self.render(plan, Vec::new()).await?;
        info!(
            target = SOURCE,
            op = "merge",
            sources = loaded.len(),
            pages = document.page_count,
            output_bytes = document.bytes.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "merged documents"
        );
        Ok(document)
    }

    /// Parse each upload once on the blocking pool. Results follow input order.
    async fn load_sources(
        &self,
        uploads: &[&UploadedSource],
    ) -> Result<Vec<(SlotId, Arc<L::Source>)>, AssemblyError> {
        let tasks = uploads.iter().map(|upload| {
            let library = Arc::clone(&self.library);
            let bytes = upload.bytes.clone();
            let slot = upload.slot.clone();
            let name = upload.name.clone();
            async move {
                let loaded = tokio::task::spawn_blocking(move || library.load(&bytes))
                    .await
                    .map_err(|err| AssemblyError::Join(err.to_string()))?;
                let source = loaded.map_err(|source| AssemblyError::Load { name, source })?;
                Ok::<_, AssemblyError>((slot, Arc::new(source)))
            }
        });
        try_join_all(tasks).await
    }

    async fn render(
        &self,
        plan: Vec<(Arc<L::Source>, u32)>,
        skipped: Vec<usize>,
    ) -> Result<AssembledDocument, AssemblyError> {
        let library = Arc::clone(&self.library);
        let page_count = plan.len();
        let bytes = tokio::task::spawn_blocking(move || {
            let mut output = library.create();
            for (source, page_index) in &plan {
                library.copy_page(&mut output, source, *page_index)?;
            }
            library.save(output)
        })
        .await
        .map_err(|err| AssemblyError::Join(err.to_string()))?
        .map_err(|source| AssemblyError::Output { source })?;

        Ok(AssembledDocument {
            bytes,
            page_count,
            skipped,
        })
    }
}
