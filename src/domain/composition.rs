//! Page identity registry and the user-controlled composition order.
//!
//! A [`CompositionOrder`] owns two things: the registry of source files the
//! user added (each with an id minted here) and the ordered list of page
//! references pointing into those sources. Output position is the index in
//! that list, so every mutation goes through this type.

use std::collections::{HashMap, HashSet};


use super::error::DomainError;
use super::types::{PageId, SlotId, SourceId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub id: SourceId,
    /// Display only; never used to resolve anything.
    pub name: String,
    pub byte_length: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageReference {
    pub id: PageId,
    pub source_id: SourceId,
    pub page_index: u32,
}

/// One entry of the assembly payload: which page of which source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderedReference {
    pub source_id: SourceId,
    pub page_index: u32,
}

impl OrderedReference {
    pub fn slot(&self) -> SlotId {
        self.source_id.slot()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    Pending,
    Ready { page_count: u32 },
}

#[derive(Debug, Clone)]
struct RegisteredSource {
    file: SourceFile,
    state: SourceState,
}

#[derive(Debug, Clone, Default)]
pub struct CompositionOrder {
    sources: Vec<RegisteredSource>,
    pages: Vec<PageReference>,
    thumbnails: HashMap<PageId, String>,
}

impl CompositionOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint an id for a new source whose page count is not known yet.
    pub fn register_source(&mut self, name: impl Into<String>, byte_length: u64) -> SourceId {
        let id = SourceId::new();
        self.sources.push(RegisteredSource {
            file: SourceFile {
                id,
                name: name.into(),
                byte_length,
            },
            state: SourceState::Pending,
        });
        id
    }

    /// Apply the page count reported for a pending source.
    ///
    /// Returns `Ok(None)` when the source is no longer pending (removed while
    /// the count was in flight, or already completed); such results are dropped.
    /// A failed count or an empty document removes the source and yields a
    /// validation error for that file only.
    pub fn complete_source(
        &mut self,
        id: SourceId,
        page_count: Result<u32, String>,
    ) -> Result<Option<Vec<PageId>>, DomainError> {
        let Some(position) = self
            .sources
            .iter()
            .position(|source| source.file.id == id && source.state == SourceState::Pending)
        else {
            return Ok(None);
        };

        let count = match page_count {
            Ok(0) => {
                let source = self.sources.remove(position);
                return Err(DomainError::validation(format!(
                    "`{}` contains no pages",
                    source.file.name
                )));
            }
            Ok(count) => count,
            Err(reason) => {
                let source = self.sources.remove(position);
                return Err(DomainError::validation(format!(
                    "`{}` could not be read: {reason}",
                    source.file.name
                )));
            }
        };

        self.sources[position].state = SourceState::Ready { page_count: count };
        let mut added = Vec::with_capacity(count as usize);
        for page_index in 0..count {
            let page = PageReference {
                id: PageId::new(),
                source_id: id,
                page_index,
            };
            added.push(page.id);
            self.pages.push(page);
        }
        Ok(Some(added))
    }

    /// Remove one page entry; unknown ids are ignored.
    pub fn remove_page(&mut self, id: PageId) -> bool {
        let before = self.pages.len();
        self.pages.retain(|page| page.id != id);
        self.thumbnails.remove(&id);
        before != self.pages.len()
    }

    /// Remove a source together with every page that references it.
    pub fn remove_source(&mut self, id: SourceId) -> usize {
        self.sources.retain(|source| source.file.id != id);
        let removed: Vec<PageId> = self
            .pages
            .iter()
            .filter(|page| page.source_id == id)
            .map(|page| page.id)
            .collect();
        self.pages.retain(|page| page.source_id != id);
        for page_id in &removed {
            self.thumbnails.remove(page_id);
        }
        removed.len()
    }

    /// Move the entry at `from` so that it ends up at index `to`.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), DomainError> {
        let len = self.pages.len();
        if from >= len {
            return Err(DomainError::out_of_range(from, len));
        }
        if to >= len {
            return Err(DomainError::out_of_range(to, len));
        }
        let page = self.pages.remove(from);
        self.pages.insert(to, page);
        Ok(())
    }

    pub fn serialize_for_assembly(&self) -> Vec<OrderedReference> {
        self.pages
            .iter()
            .map(|page| OrderedReference {
                source_id: page.source_id,
                page_index: page.page_index,
            })
            .collect()
    }

    /// Sources referenced by at least one page, in order of first reference.
    pub fn referenced_sources(&self) -> Vec<&SourceFile> {
        let mut seen = HashSet::new();
        self.pages
            .iter()
            .filter(|page| seen.insert(page.source_id))
            .filter_map(|page| self.source(page.source_id))
            .collect()
    }

    pub fn source(&self, id: SourceId) -> Option<&SourceFile> {
        self.sources
            .iter()
            .find(|source| source.file.id == id)
            .map(|source| &source.file)
    }

    /// Page count of a completed source.
    pub fn page_count(&self, id: SourceId) -> Option<u32> {
        self.sources
            .iter()
            .find(|source| source.file.id == id)
            .and_then(|source| match source.state {
                SourceState::Ready { page_count } => Some(page_count),
                SourceState::Pending => None,
            })
    }

    pub fn sources(&self) -> impl Iterator<Item = &SourceFile> {
        self.sources.iter().map(|source| &source.file)
    }

    pub fn pages(&self) -> &[PageReference] {
        &self.pages
    }

    pub fn position_of(&self, id: PageId) -> Option<usize> {
        self.pages.iter().position(|page| page.id == id)
    }

    pub fn contains_page(&self, id: PageId) -> bool {
        self.position_of(id).is_some()
    }

    /// Store a thumbnail for a page if the page still exists.
    pub fn attach_thumbnail(&mut self, id: PageId, data: String) -> bool {
        if !self.contains_page(id) {
            return false;
        }
        self.thumbnails.insert(id, data);
        true
    }

    pub fn thumbnail(&self, id: PageId) -> Option<&str> {
        self.thumbnails.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
