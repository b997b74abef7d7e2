use crate::types::Neighbor;

/// Text-to-vector model. Vectors in one batch share a dimension; the
/// dimension is fixed per model but callers learn it from the first batch.
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Append-only store of unit vectors searchable by inner product.
///
/// Row `i` is the `i`-th vector ever added.
pub trait VectorIndexer: Send + Sync {
    /// `None` until the first vector is added.
    fn dim(&self) -> Option<usize>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool { self.len() == 0 }
    fn add(&mut self, vectors: &[Vec<f32>]) -> anyhow::Result<()>;
    fn search(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<Neighbor>>;
}
