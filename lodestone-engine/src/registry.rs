//! Global entity registries and per-library state.
//!
//! One registry per entity kind, each a concurrent map touched only for
//! identity and parent/child bookkeeping; critical sections stay short.
//! All index work goes through [`LibraryHandle::index`], a per-library
//! readers-writer lock: searches share it, writes own it, and no lock
//! spans two libraries.

use dashmap::DashMap;
use lodestone_core::{Chunk, Document, Error, Library, LodestoneId, Result};
use lodestone_index::VectorIndex;
use parking_lot::RwLock;
use std::sync::Arc;

/// Per-library shared state.
pub struct LibraryHandle {
    /// The library record (name, metadata, child set, timestamps).
    pub record: RwLock<Library>,
    /// The index, which owns the vector table and metadata snapshots.
    /// Shared for search, exclusive for add/update/remove/build.
    pub index: RwLock<Box<dyn VectorIndex>>,
}

impl LibraryHandle {
    pub fn new(record: Library, index: Box<dyn VectorIndex>) -> Self {
        Self {
            record: RwLock::new(record),
            index: RwLock::new(index),
        }
    }
}

impl std::fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryHandle")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

/// Process-wide registries.
#[derive(Default)]
pub struct Registry {
    libraries: DashMap<LodestoneId, Arc<LibraryHandle>>,
    documents: DashMap<LodestoneId, Document>,
    chunks: DashMap<LodestoneId, Chunk>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_library(&self, handle: Arc<LibraryHandle>) -> Result<()> {
        let id = handle.record.read().id;
        if self.libraries.contains_key(&id) {
            return Err(Error::already_exists("library", id.to_string()));
        }
        self.libraries.insert(id, handle);
        Ok(())
    }

    pub fn library(&self, id: LodestoneId) -> Result<Arc<LibraryHandle>> {
        self.libraries
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::not_found("library", id))
    }

    pub fn remove_library(&self, id: LodestoneId) -> Option<Arc<LibraryHandle>> {
        self.libraries.remove(&id).map(|(_, handle)| handle)
    }

    pub fn list_libraries(&self) -> Vec<Library> {
        self.libraries
            .iter()
            .map(|entry| entry.value().record.read().clone())
            .collect()
    }

    pub fn insert_document(&self, document: Document) {
        self.documents.insert(document.id, document);
    }

    pub fn document(&self, id: LodestoneId) -> Result<Document> {
        self.documents
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found("document", id))
    }

    pub fn with_document_mut<R>(
        &self,
        id: LodestoneId,
        f: impl FnOnce(&mut Document) -> R,
    ) -> Result<R> {
        match self.documents.get_mut(&id) {
            Some(mut entry) => Ok(f(entry.value_mut())),
            None => Err(Error::not_found("document", id)),
        }
    }

    pub fn remove_document(&self, id: LodestoneId) -> Option<Document> {
        self.documents.remove(&id).map(|(_, document)| document)
    }

    pub fn insert_chunk(&self, chunk: Chunk) {
        self.chunks.insert(chunk.id, chunk);
    }

    pub fn chunk(&self, id: LodestoneId) -> Result<Chunk> {
        self.chunks
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found("chunk", id))
    }

    pub fn try_chunk(&self, id: LodestoneId) -> Option<Chunk> {
        self.chunks.get(&id).map(|entry| entry.value().clone())
    }

    pub fn with_chunk_mut<R>(
        &self,
        id: LodestoneId,
        f: impl FnOnce(&mut Chunk) -> R,
    ) -> Result<R> {
        match self.chunks.get_mut(&id) {
            Some(mut entry) => Ok(f(entry.value_mut())),
            None => Err(Error::not_found("chunk", id)),
        }
    }

    pub fn remove_chunk(&self, id: LodestoneId) -> Option<Chunk> {
        self.chunks.remove(&id).map(|(_, chunk)| chunk)
    }
}
