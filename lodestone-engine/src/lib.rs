//! The Lodestone engine: embedding providers, metadata filtering and
//! the per-library coordinator.
//!
//! The engine owns the global registries (libraries, documents,
//! chunks), routes chunk CRUD to the library's index, and orchestrates
//! build and search. The concurrency envelope is simple and strict:
//! embedding happens *outside* any library lock, writes take the
//! library's exclusive lock, searches take the shared lock, and
//! libraries never share locks with each other.
//!
//! # Example
//!
//! ```no_run
//! use lodestone_core::{ChunkInput, EngineConfig, IndexKind};
//! use lodestone_engine::Engine;
//!
//! # async fn example() -> lodestone_core::Result<()> {
//! let engine = Engine::new(EngineConfig::default())?;
//!
//! let library = engine.create_library("notes", IndexKind::Nsw, None, None)?;
//! engine
//!     .add_chunk(
//!         library.id,
//!         ChunkInput {
//!             text: "the sky above the port".into(),
//!             ..ChunkInput::default()
//!         },
//!     )
//!     .await?;
//!
//! let response = engine.search(library.id, "harbor sky", 5, None).await?;
//! for hit in response.results {
//!     println!("{} {:.3}", hit.chunk_id, hit.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod engine;
pub mod filter;
pub mod providers;
pub mod registry;

pub use cache::EmbeddingCache;
pub use engine::{BuildReport, Engine, SearchHit, SearchResponse};
pub use filter::Filter;
pub use providers::{embedder_from_config, Embedder, MockEmbedder, OpenAiEmbedder};
