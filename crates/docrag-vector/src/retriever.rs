use std::path::Path;
use tracing::{debug, warn};

use docrag_core::error::{Error, Result};
use docrag_core::traits::{Embedder, VectorIndexer};
use docrag_core::types::RetrievedChunk;

use crate::flat::FlatIndex;
use crate::store::{normalize_l2, PersistentIndex, VectorStore};

/// Question-to-chunks lookup over a loaded store.
///
/// The store is an immutable snapshot; a retriever without one answers every
/// question with an empty list.
pub struct Retriever<I = FlatIndex> {
    embedder: Box<dyn Embedder>,
    store: Option<VectorStore<I>>,
}

impl<I: VectorIndexer> Retriever<I> {
    pub fn new(embedder: Box<dyn Embedder>, store: Option<VectorStore<I>>) -> Self {
        Self { embedder, store }
    }

    pub fn store(&self) -> Option<&VectorStore<I>> { self.store.as_ref() }

    pub fn embedder(&self) -> &dyn Embedder { self.embedder.as_ref() }

    pub fn is_ready(&self) -> bool {
        self.store.as_ref().is_some_and(|s| !s.is_empty())
    }

    pub fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if top_k == 0 {
            return Err(Error::InvalidConfig("top_k must be at least 1".to_string()));
        }
        let Some(store) = self.store.as_ref().filter(|s| !s.is_empty()) else {
            debug!("No vector store loaded; returning no results");
            return Ok(vec![]);
        };
        let mut query = self
            .embedder
            .embed_batch(&[question.to_string()])
            .map_err(|e| Error::Embedding(format!("{:#}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("embedder returned no vector for the question".to_string()))?;
        normalize_l2(&mut query);
        let results = store.search(&query, top_k)?;
        if results.is_empty() {
            warn!("No results for question");
        }
        Ok(results)
    }
}

impl<I: PersistentIndex> Retriever<I> {
    /// Load the store under `dir`; a missing store yields an empty retriever.
    pub fn open(dir: &Path, embedder: Box<dyn Embedder>) -> Result<Self> {
        let store = VectorStore::load(dir)?;
        Ok(Self::new(embedder, store))
    }
}
