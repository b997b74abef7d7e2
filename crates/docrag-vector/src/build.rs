use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::info;

use docrag_core::error::{Error, Result};
use docrag_core::traits::{Embedder, VectorIndexer};
use docrag_core::types::Chunk;

use crate::flat::FlatIndex;
use crate::store::{index_error, normalize_l2, PersistentIndex, Staging, VectorStore};

pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Embeds chunks in batches and appends them to a [`VectorStore`] in order.
pub struct StoreBuilder<'a> {
    embedder: &'a dyn Embedder,
    batch_size: usize,
    show_progress: bool,
}

impl<'a> StoreBuilder<'a> {
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self { embedder, batch_size: DEFAULT_BATCH_SIZE, show_progress: true }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn build(&self, chunks: &[Chunk]) -> Result<VectorStore<FlatIndex>> {
        self.build_into(FlatIndex::new(), chunks)
    }

    /// Build a fresh store and make it the store at `out`.
    ///
    /// `make_index` opens an empty index in a staging directory; the staged
    /// store replaces `out` only after every chunk is embedded and every
    /// artifact is written. On any failure `out` is left as it was.
    pub fn build_and_save<I, F>(&self, chunks: &[Chunk], out: &Path, make_index: F) -> Result<usize>
    where
        I: PersistentIndex,
        F: FnOnce(&Path) -> anyhow::Result<I>,
    {
        let staging = Staging::new(out)?;
        let index = make_index(staging.path()).map_err(index_error)?;
        let count = {
            let store = self.build_into(index, chunks)?;
            store.write_to(staging.path())?;
            store.len()
        };
        staging.commit()?;
        info!("Saved {} vectors to {}", count, out.display());
        Ok(count)
    }

    /// Fill `index` with every chunk. Any embedding failure aborts the build.
    pub fn build_into<I: VectorIndexer>(&self, index: I, chunks: &[Chunk]) -> Result<VectorStore<I>> {
        if chunks.is_empty() {
            return Err(Error::NothingToIndex("no chunks were produced".to_string()));
        }
        info!(
            "Embedding {} chunks with {} (batch size {})",
            chunks.len(),
            self.embedder.model_id(),
            self.batch_size
        );
        let pb = if self.show_progress { ProgressBar::new(chunks.len() as u64) } else { ProgressBar::hidden() };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let mut store = VectorStore::new(index);
        let mut dim: Option<usize> = None;
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let mut vectors = self
                .embedder
                .embed_batch(&texts)
                .map_err(|e| Error::Embedding(format!("{:#}", e)))?;
            if vectors.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            let expected = *dim.get_or_insert(vectors[0].len());
            if expected == 0 {
                return Err(Error::Embedding("embedder returned empty vectors".to_string()));
            }
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(Error::DimensionMismatch { expected, actual: bad.len() });
            }
            for v in &mut vectors {
                normalize_l2(v);
            }
            store.insert_batch(batch, &vectors)?;
            pb.inc(batch.len() as u64);
        }
        pb.finish_with_message("done");
        info!("Indexed {} chunks (dim={})", store.len(), dim.unwrap_or(0));
        Ok(store)
    }
}
