//! Core types shared across the Lodestone vector database.
//!
//! This crate carries the pieces every other crate depends on:
//!
//! - **Ids**: [`LodestoneId`], an opaque 128-bit identifier
//! - **Errors**: the [`Error`] taxonomy and [`Result`] alias
//! - **Metadata**: the tagged [`Value`] variant and [`Metadata`] map
//! - **Entities**: [`Library`], [`Document`] and [`Chunk`] records
//! - **Configuration**: [`EngineConfig`] and the per-library index knobs

pub mod config;
pub mod error;
pub mod id;
pub mod types;
pub mod value;

pub use config::{EmbeddingConfig, EngineConfig, IndexConfig, IndexParams, SearchConfig};
pub use error::{Error, Result};
pub use id::LodestoneId;
pub use types::{Chunk, ChunkInput, ChunkPatch, Document, IndexKind, Library, LibraryPatch};
pub use value::{Metadata, Value};
