//! docrag-core
//!
//! Domain types, errors, configuration, the chunker and document ingest shared
//! by the embedding, vector and answer crates.

pub mod chunker;
pub mod config;
pub mod data_processor;
pub mod error;
pub mod extract;
pub mod traits;
pub mod types;

pub use chunker::{chunk_text, ChunkingConfig};
pub use error::{Error, Result};
pub use types::{Chunk, ChunkMeta, Neighbor, RetrievedChunk};
