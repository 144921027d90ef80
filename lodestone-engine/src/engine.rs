//! The library coordinator.
//!
//! Routes chunk CRUD to the owning library's index and orchestrates
//! build and search. Lock discipline, in order, everywhere: resolve
//! registry entries, call the embedder (never under a lock), then take
//! the library lock for the index work alone.

use crate::cache::{EmbeddingCache, EmbeddingCacheKey};
use crate::filter::Filter;
use crate::providers::{embedder_from_config, Embedder};
use crate::registry::{LibraryHandle, Registry};
use chrono::{DateTime, Utc};
use lodestone_core::{
    Chunk, ChunkInput, ChunkPatch, Document, EngineConfig, Error, IndexKind, IndexParams,
    Library, LibraryPatch, LodestoneId, Metadata, Result,
};
use lodestone_index::{build_index, IndexStats};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Outcome of an index build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub library_id: LodestoneId,
    pub message: String,
    pub last_built_at: DateTime<Utc>,
}

/// One accepted search candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: LodestoneId,
    pub score: f32,
    pub chunk: Chunk,
}

/// Response of a search command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub library_id: LodestoneId,
    pub query: String,
    pub k: usize,
    pub filters: Option<JsonValue>,
    pub results: Vec<SearchHit>,
}

/// The engine: registries, embedding provider and per-library indexes.
pub struct Engine {
    config: EngineConfig,
    embedder: Arc<dyn Embedder>,
    cache: Option<EmbeddingCache>,
    registry: Registry,
}

impl Engine {
    /// Create an engine with the provider named in the configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let embedder = embedder_from_config(&config.embedding)?;
        Ok(Self::with_embedder(config, embedder))
    }

    /// Create an engine around an existing embedding provider.
    pub fn with_embedder(config: EngineConfig, embedder: Arc<dyn Embedder>) -> Self {
        let cache = (config.embedding.cache_capacity > 0).then(|| {
            EmbeddingCache::new(
                config.embedding.cache_capacity,
                Duration::from_secs(config.embedding.cache_ttl_seconds),
            )
        });
        info!(model = embedder.model(), "engine initialized");
        Self {
            config,
            embedder,
            cache,
            registry: Registry::new(),
        }
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cache) = &self.cache {
            let key = EmbeddingCacheKey::new(text, self.embedder.model());
            if let Some(hit) = cache.get(&key).await {
                return Ok(hit.as_ref().clone());
            }
            let vector = self.embedder.embed(text).await?;
            cache.insert(key, vector.clone()).await;
            return Ok(vector);
        }
        self.embedder.embed(text).await
    }

    // ---- libraries --------------------------------------------------

    /// Create a library with its own index instance. Names are
    /// free-form labels; only ids are unique.
    pub fn create_library(
        &self,
        name: impl Into<String>,
        index_kind: IndexKind,
        index_params: Option<&Metadata>,
        metadata: Option<Metadata>,
    ) -> Result<Library> {
        let params = match index_params {
            Some(map) => IndexParams::from_metadata(map)?,
            None => IndexParams::default(),
        };
        let resolved = self.config.index.with_params(&params);

        let now = Utc::now();
        let record = Library {
            id: LodestoneId::new(),
            name: name.into(),
            index_kind,
            index_params: params,
            metadata: metadata.unwrap_or_default(),
            document_ids: HashSet::new(),
            created_at: now,
            updated_at: now,
            last_built_at: None,
        };

        let index = build_index(index_kind, &resolved);
        self.registry
            .insert_library(Arc::new(LibraryHandle::new(record.clone(), index)))?;
        info!(library_id = %record.id, kind = %index_kind, "library created");
        Ok(record)
    }

    pub fn get_library(&self, id: LodestoneId) -> Result<Library> {
        Ok(self.registry.library(id)?.record.read().clone())
    }

    pub fn list_libraries(&self) -> Vec<Library> {
        self.registry.list_libraries()
    }

    pub fn update_library(&self, id: LodestoneId, patch: LibraryPatch) -> Result<Library> {
        if patch.is_empty() {
            return Err(Error::invalid_request("empty update patch"));
        }
        let handle = self.registry.library(id)?;
        let mut record = handle.record.write();
        if let Some(name) = patch.name {
            record.name = name;
        }
        if let Some(metadata) = patch.metadata {
            record.metadata = metadata;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    /// Destroy a library, its index and every dependent record.
    /// Unknown ids are an idempotent no-op.
    pub fn delete_library(&self, id: LodestoneId) -> Result<()> {
        let Some(handle) = self.registry.remove_library(id) else {
            return Ok(());
        };
        let record = handle.record.read().clone();
        for document_id in &record.document_ids {
            if let Some(document) = self.registry.remove_document(*document_id) {
                for chunk_id in &document.chunk_ids {
                    self.registry.remove_chunk(*chunk_id);
                }
            }
        }
        info!(library_id = %id, "library deleted");
        Ok(())
    }

    /// Index introspection for a library.
    pub fn library_stats(&self, id: LodestoneId) -> Result<IndexStats> {
        let handle = self.registry.library(id)?;
        let stats = handle.index.read().stats();
        Ok(stats)
    }

    // ---- documents --------------------------------------------------

    pub fn create_document(
        &self,
        library_id: LodestoneId,
        metadata: Option<Metadata>,
    ) -> Result<Document> {
        let handle = self.registry.library(library_id)?;
        let now = Utc::now();
        let document = Document {
            id: LodestoneId::new(),
            library_id,
            metadata: metadata.unwrap_or_default(),
            chunk_ids: HashSet::new(),
            created_at: now,
            updated_at: now,
        };
        self.registry.insert_document(document.clone());
        handle.record.write().document_ids.insert(document.id);
        Ok(document)
    }

    pub fn get_document(&self, id: LodestoneId) -> Result<Document> {
        self.registry.document(id)
    }

    pub fn update_document_metadata(
        &self,
        id: LodestoneId,
        metadata: Metadata,
    ) -> Result<Document> {
        self.registry.with_document_mut(id, |document| {
            document.metadata = metadata;
            document.updated_at = Utc::now();
            document.clone()
        })
    }

    /// Destroy a document and cascade to its chunks. Unknown ids are an
    /// idempotent no-op.
    pub fn delete_document(&self, id: LodestoneId) -> Result<()> {
        let Some(document) = self.registry.remove_document(id) else {
            return Ok(());
        };
        if let Ok(handle) = self.registry.library(document.library_id) {
            {
                let mut index = handle.index.write();
                for chunk_id in &document.chunk_ids {
                    index.remove(*chunk_id);
                }
            }
            handle.record.write().document_ids.remove(&id);
        }
        for chunk_id in &document.chunk_ids {
            self.registry.remove_chunk(*chunk_id);
        }
        info!(document_id = %id, chunks = document.chunk_ids.len(), "document deleted");
        Ok(())
    }

    // ---- chunks -----------------------------------------------------

    /// Insert a chunk, embedding its text and auto-creating the parent
    /// document when none is given. The first successful insert fixes
    /// the library's vector dimension; on any failure the library is
    /// left unchanged.
    pub async fn add_chunk(&self, library_id: LodestoneId, input: ChunkInput) -> Result<Chunk> {
        let handle = self.registry.library(library_id)?;

        // Resolve the parent before paying for the embedding.
        if let Some(document_id) = input.document_id {
            let document = self.registry.document(document_id)?;
            if document.library_id != library_id {
                return Err(Error::invalid_request(format!(
                    "document {document_id} belongs to a different library"
                )));
            }
        }

        let vector = self.embed_text(&input.text).await?;

        let chunk_id = LodestoneId::new();
        let metadata = input.metadata.clone().unwrap_or_default();
        {
            let mut index = handle.index.write();
            index.add(chunk_id, vector, metadata.clone())?;
        }

        let now = Utc::now();
        let document_id = match input.document_id {
            Some(document_id) => document_id,
            None => {
                let document = Document {
                    id: LodestoneId::new(),
                    library_id,
                    metadata: input.document_metadata.clone().unwrap_or_default(),
                    chunk_ids: HashSet::new(),
                    created_at: now,
                    updated_at: now,
                };
                let document_id = document.id;
                self.registry.insert_document(document);
                handle.record.write().document_ids.insert(document_id);
                document_id
            }
        };

        let chunk = Chunk {
            id: chunk_id,
            document_id,
            library_id,
            text: input.text,
            metadata,
            created_at: now,
            updated_at: now,
        };
        self.registry.insert_chunk(chunk.clone());

        let linked = self.registry.with_document_mut(document_id, |document| {
            document.chunk_ids.insert(chunk_id);
        });
        if linked.is_err() {
            // Parent vanished mid-flight: undo the insert.
            handle.index.write().remove(chunk_id);
            self.registry.remove_chunk(chunk_id);
            return Err(Error::not_found("document", document_id));
        }

        debug!(chunk_id = %chunk_id, library_id = %library_id, "chunk added");
        Ok(chunk)
    }

    /// Bulk insert: one batched embedding call, one exclusive lock for
    /// the index work. Fails atomically on dimension errors.
    pub async fn add_chunks(
        &self,
        library_id: LodestoneId,
        inputs: Vec<ChunkInput>,
    ) -> Result<Vec<Chunk>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let handle = self.registry.library(library_id)?;
        for input in &inputs {
            if let Some(document_id) = input.document_id {
                let document = self.registry.document(document_id)?;
                if document.library_id != library_id {
                    return Err(Error::invalid_request(format!(
                        "document {document_id} belongs to a different library"
                    )));
                }
            }
        }

        let texts: Vec<String> = inputs.iter().map(|input| input.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != inputs.len() {
            return Err(Error::embedding(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                vectors.len()
            )));
        }

        let chunk_ids: Vec<LodestoneId> =
            inputs.iter().map(|_| LodestoneId::new()).collect();
        {
            let mut index = handle.index.write();
            let mut added = Vec::with_capacity(inputs.len());
            for ((input, vector), chunk_id) in
                inputs.iter().zip(vectors).zip(chunk_ids.iter())
            {
                let metadata = input.metadata.clone().unwrap_or_default();
                if let Err(e) = index.add(*chunk_id, vector, metadata) {
                    for id in added {
                        index.remove(id);
                    }
                    return Err(e);
                }
                added.push(*chunk_id);
            }
        }

        let now = Utc::now();
        let mut chunks: Vec<Chunk> = Vec::with_capacity(inputs.len());
        let mut created_documents: Vec<LodestoneId> = Vec::new();
        for (input, chunk_id) in inputs.into_iter().zip(chunk_ids.iter().copied()) {
            let metadata = input.metadata.unwrap_or_default();
            let document_id = match input.document_id {
                Some(document_id) => document_id,
                None => {
                    let document = Document {
                        id: LodestoneId::new(),
                        library_id,
                        metadata: input.document_metadata.unwrap_or_default(),
                        chunk_ids: HashSet::new(),
                        created_at: now,
                        updated_at: now,
                    };
                    let document_id = document.id;
                    self.registry.insert_document(document);
                    handle.record.write().document_ids.insert(document_id);
                    created_documents.push(document_id);
                    document_id
                }
            };
            let chunk = Chunk {
                id: chunk_id,
                document_id,
                library_id,
                text: input.text,
                metadata,
                created_at: now,
                updated_at: now,
            };
            self.registry.insert_chunk(chunk.clone());
            chunks.push(chunk);

            let linked = self.registry.with_document_mut(document_id, |document| {
                document.chunk_ids.insert(chunk_id);
            });
            if linked.is_err() {
                // Parent vanished mid-flight: unwind the whole batch so
                // no chunk survives unreachable by the cascade.
                self.unwind_batch(&handle, &chunk_ids, &chunks, &created_documents);
                return Err(Error::not_found("document", document_id));
            }
        }
        info!(library_id = %library_id, count = chunks.len(), "chunks added");
        Ok(chunks)
    }

    /// Undo a partially registered bulk insert: every staged vector
    /// leaves the index, registered chunks leave the tables and their
    /// parents' child sets, and auto-created documents disappear.
    fn unwind_batch(
        &self,
        handle: &Arc<LibraryHandle>,
        chunk_ids: &[LodestoneId],
        chunks: &[Chunk],
        created_documents: &[LodestoneId],
    ) {
        {
            let mut index = handle.index.write();
            for chunk_id in chunk_ids {
                index.remove(*chunk_id);
            }
        }
        for chunk in chunks {
            self.registry.remove_chunk(chunk.id);
            let unlinked = self.registry.with_document_mut(chunk.document_id, |document| {
                document.chunk_ids.remove(&chunk.id);
            });
            if unlinked.is_err() {
                debug!(chunk_id = %chunk.id, document_id = %chunk.document_id,
                    "parent document already gone while unwinding");
            }
        }
        let mut record = handle.record.write();
        for document_id in created_documents {
            self.registry.remove_document(*document_id);
            record.document_ids.remove(document_id);
        }
    }

    pub fn get_chunk(&self, id: LodestoneId) -> Result<Chunk> {
        self.registry.chunk(id)
    }

    /// Patch a chunk. A changed text re-embeds and re-links the index
    /// entry; identical text leaves the index untouched; metadata-only
    /// patches refresh the snapshot without moving anything.
    pub async fn update_chunk(&self, id: LodestoneId, patch: ChunkPatch) -> Result<Chunk> {
        if patch.is_empty() {
            return Err(Error::invalid_request("empty update patch"));
        }
        let chunk = self.registry.chunk(id)?;
        let handle = self.registry.library(chunk.library_id)?;

        let text_changed = patch.text.as_deref().is_some_and(|t| t != chunk.text);
        let vector = match (&patch.text, text_changed) {
            (Some(text), true) => Some(self.embed_text(text).await?),
            _ => None,
        };

        if vector.is_some() || patch.metadata.is_some() {
            let mut index = handle.index.write();
            index.update(id, vector, patch.metadata.clone())?;
        }

        self.registry.with_chunk_mut(id, |chunk| {
            if let Some(text) = patch.text {
                chunk.text = text;
            }
            if let Some(metadata) = patch.metadata {
                chunk.metadata = metadata;
            }
            chunk.updated_at = Utc::now();
            chunk.clone()
        })
    }

    /// Remove a chunk from the index, the tables and the parent's child
    /// set. Unknown ids are an idempotent no-op.
    pub fn delete_chunk(&self, id: LodestoneId) -> Result<()> {
        let Some(chunk) = self.registry.try_chunk(id) else {
            return Ok(());
        };
        if let Ok(handle) = self.registry.library(chunk.library_id) {
            handle.index.write().remove(id);
        }
        self.registry.remove_chunk(id);
        let unlinked = self.registry.with_document_mut(chunk.document_id, |document| {
            document.chunk_ids.remove(&id);
        });
        if unlinked.is_err() {
            // A concurrent document delete already dropped the link.
            debug!(chunk_id = %id, document_id = %chunk.document_id,
                "parent document already removed");
        }
        Ok(())
    }

    // ---- index + search ---------------------------------------------

    /// Consolidate the library's index (the IVF train step; a no-op for
    /// the other kinds) and stamp the build time.
    pub fn build_index(&self, library_id: LodestoneId) -> Result<BuildReport> {
        let handle = self.registry.library(library_id)?;
        let stats = {
            let mut index = handle.index.write();
            index.build()?;
            index.stats()
        };
        let last_built_at = Utc::now();
        {
            let mut record = handle.record.write();
            record.last_built_at = Some(last_built_at);
            record.updated_at = last_built_at;
        }
        info!(library_id = %library_id, size = stats.size, "index built");
        Ok(BuildReport {
            library_id,
            message: format!("index built over {} vectors", stats.size),
            last_built_at,
        })
    }

    /// Top-k cosine search with metadata post-filtering.
    ///
    /// Candidates are over-fetched when a filter is present
    /// (`k × filtered_overfetch`, clamped to the library size) and
    /// streamed through the predicate in score order. When the filter
    /// starves the result set and more candidates exist, the multiplier
    /// doubles for a bounded number of retries.
    pub async fn search(
        &self,
        library_id: LodestoneId,
        query: &str,
        k: usize,
        filters: Option<&JsonValue>,
    ) -> Result<SearchResponse> {
        if k < 1 {
            return Err(Error::invalid_request("k must be at least 1"));
        }
        let k = k.min(self.config.search.max_limit);
        let filter = match filters {
            Some(spec) => Filter::compile(spec)?,
            None => Filter::universal(),
        };

        // Existence check first, then embed outside the read lock.
        let handle = self.registry.library(library_id)?;
        let query_vector = self.embed_text(query).await?;

        let mut results: Vec<SearchHit> = Vec::new();
        {
            let index = handle.index.read();
            let size = index.len();
            if size > 0 {
                let mut multiplier = if filter.is_universal() {
                    1
                } else {
                    self.config.search.filtered_overfetch.max(1)
                };
                let mut expansions = 0;
                loop {
                    let k_effective = k.saturating_mul(multiplier).min(size);
                    let candidates = index.query(&query_vector, k_effective);
                    results.clear();
                    for candidate in &candidates {
                        let Some(snapshot) = index.metadata(&candidate.id) else {
                            continue;
                        };
                        if !filter.matches(snapshot) {
                            continue;
                        }
                        let Some(chunk) = self.registry.try_chunk(candidate.id) else {
                            continue;
                        };
                        results.push(SearchHit {
                            chunk_id: candidate.id,
                            score: candidate.score,
                            chunk,
                        });
                        if results.len() == k {
                            break;
                        }
                    }
                    if results.len() >= k
                        || k_effective >= size
                        || expansions >= self.config.search.max_expansions
                    {
                        break;
                    }
                    multiplier *= 2;
                    expansions += 1;
                    debug!(multiplier, expansions, "filter starved results, widening over-fetch");
                }
            }
        }

        Ok(SearchResponse {
            library_id,
            query: query.to_string(),
            k,
            filters: filters.cloned(),
            results,
        })
    }
}
