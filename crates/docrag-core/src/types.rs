//! Domain types shared by ingest, the vector store and the answer layer.

use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// A bounded piece of one source document; the unit of embedding and retrieval.
///
/// - `id`: unique within one ingest run (`"<source>:<chunk_index>"`)
/// - `source`: path relative to the ingest root, `/`-separated
/// - `chunk_index`: 0-based position within the source document
/// - `text`: the normalized chunk payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub source: String,
    pub chunk_index: usize,
    pub text: String,
}

impl Chunk {
    pub fn new(source: &str, chunk_index: usize, text: String) -> Self {
        Self { id: chunk_id(source, chunk_index), source: source.to_string(), chunk_index, text }
    }

    pub fn meta(&self) -> ChunkMeta {
        ChunkMeta { source: self.source.clone(), chunk_index: self.chunk_index, text: self.text.clone() }
    }
}

pub fn chunk_id(source: &str, chunk_index: usize) -> ChunkId {
    format!("{}:{}", source, chunk_index)
}

/// Metadata persisted per chunk id (the chunk minus its id and embedding).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub source: String,
    pub chunk_index: usize,
    pub text: String,
}

/// Raw output of an index search.
///
/// `row` is the insertion position of the vector. Backends may pad with
/// negative or out-of-range rows; consumers must filter those.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: i64,
    pub score: f32,
}

/// A ranked retrieval result joined with its metadata.
///
/// `score` is the inner product of unit vectors: higher is always better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: ChunkId,
    pub score: f32,
    pub source: String,
    pub chunk_index: usize,
    pub text: String,
}
