//! Vector index plus the id list and metadata map that give rows meaning.
//!
//! Layout of a saved store directory:
//! - the index artifact (`vectors.bin` for [`FlatIndex`](crate::FlatIndex))
//! - `ids.json`: JSON array, position = vector row
//! - `metadata.json`: JSON object, id -> `{source, chunk_index, text}`
//!
//! Saves go to a sibling staging directory that replaces the store directory
//! only once every artifact is written, so a reader never sees a half-written
//! store and a failed save leaves the previous one in place.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use docrag_core::error::{Error, Result};
use docrag_core::traits::VectorIndexer;
use docrag_core::types::{Chunk, ChunkId, ChunkMeta, RetrievedChunk};

use crate::flat::FlatIndex;

pub const IDS_FILE: &str = "ids.json";
pub const METADATA_FILE: &str = "metadata.json";

/// An index that can be written to and reopened from a store directory.
pub trait PersistentIndex: VectorIndexer + Sized {
    fn save(&self, dir: &Path) -> anyhow::Result<()>;
    /// `Ok(None)` when the index artifact does not exist under `dir`.
    fn open(dir: &Path) -> anyhow::Result<Option<Self>>;
}

pub struct VectorStore<I = FlatIndex> {
    index: I,
    ids: Vec<ChunkId>,
    metadata: BTreeMap<ChunkId, ChunkMeta>,
}

impl<I: VectorIndexer> VectorStore<I> {
    pub fn new(index: I) -> Self {
        Self { index, ids: Vec::new(), metadata: BTreeMap::new() }
    }

    /// Assemble a store from loaded parts. The index must hold one vector per id.
    pub fn from_parts(index: I, ids: Vec<ChunkId>, metadata: BTreeMap<ChunkId, ChunkMeta>) -> Result<Self> {
        if index.len() != ids.len() {
            return Err(Error::Inconsistent(format!("{} vectors but {} ids", index.len(), ids.len())));
        }
        let missing = ids.iter().filter(|id| !metadata.contains_key(*id)).count();
        if missing > 0 {
            warn!("{} of {} ids have no metadata; they will be skipped in results", missing, ids.len());
        }
        Ok(Self { index, ids, metadata })
    }

    pub fn len(&self) -> usize { self.ids.len() }

    pub fn is_empty(&self) -> bool { self.ids.is_empty() }

    pub fn dim(&self) -> Option<usize> { self.index.dim() }

    pub fn index(&self) -> &I { &self.index }

    pub fn ids(&self) -> &[ChunkId] { &self.ids }

    pub fn metadata(&self) -> &BTreeMap<ChunkId, ChunkMeta> { &self.metadata }

    /// Append chunks with their (already normalized) vectors, in order.
    pub fn insert_batch(&mut self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(Error::Embedding(format!("{} vectors for {} chunks", vectors.len(), chunks.len())));
        }
        if let (Some(expected), Some(v)) = (self.index.dim(), vectors.first()) {
            if v.len() != expected {
                return Err(Error::DimensionMismatch { expected, actual: v.len() });
            }
        }
        self.index.add(vectors).map_err(|e| Error::Index(format!("{:#}", e)))?;
        for chunk in chunks {
            if self.metadata.insert(chunk.id.clone(), chunk.meta()).is_some() {
                warn!("Duplicate chunk id {}; keeping the latest metadata", chunk.id);
            }
            self.ids.push(chunk.id.clone());
        }
        Ok(())
    }

    /// Up to `top_k` chunks by descending inner product with `query`.
    ///
    /// `query` is used as given; callers normalize it. Rows the backend pads
    /// with and ids without metadata are skipped.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if top_k == 0 {
            return Err(Error::InvalidConfig("top_k must be at least 1".to_string()));
        }
        if self.index.is_empty() {
            return Ok(vec![]);
        }
        if let Some(expected) = self.index.dim() {
            if query.len() != expected {
                return Err(Error::DimensionMismatch { expected, actual: query.len() });
            }
        }
        let k = top_k.min(self.ids.len());
        let mut neighbors = self.index.search(query, k).map_err(|e| Error::Index(format!("{:#}", e)))?;
        neighbors.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.row.cmp(&b.row)));

        let mut seen = HashSet::new();
        let mut results = Vec::with_capacity(k);
        for n in neighbors {
            if n.row < 0 || n.row as usize >= self.ids.len() {
                debug!("Skipping sentinel row {}", n.row);
                continue;
            }
            if !seen.insert(n.row) {
                continue;
            }
            let id = &self.ids[n.row as usize];
            let Some(meta) = self.metadata.get(id) else {
                debug!("Skipping id {} without metadata", id);
                continue;
            };
            results.push(RetrievedChunk {
                id: id.clone(),
                score: n.score,
                source: meta.source.clone(),
                chunk_index: meta.chunk_index,
                text: meta.text.clone(),
            });
            if results.len() == k {
                break;
            }
        }
        Ok(results)
    }
}

impl<I: PersistentIndex> VectorStore<I> {
    /// Replace the store at `dir` with this one. Everything already under
    /// `dir` is discarded on success and kept untouched on failure.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let staging = Staging::new(dir)?;
        self.write_to(staging.path())?;
        staging.commit()?;
        info!("Saved {} vectors to {}", self.ids.len(), dir.display());
        Ok(())
    }

    /// Write the index, `ids.json` and `metadata.json` into an existing `dir`.
    pub(crate) fn write_to(&self, dir: &Path) -> Result<()> {
        self.index.save(dir).map_err(index_error)?;
        write_atomic(dir, IDS_FILE, &serde_json::to_vec(&self.ids)?)?;
        write_atomic(dir, METADATA_FILE, &serde_json::to_vec_pretty(&self.metadata)?)?;
        Ok(())
    }

    /// `Ok(None)` when any artifact is missing.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let ids_path = dir.join(IDS_FILE);
        let metadata_path = dir.join(METADATA_FILE);
        if !ids_path.is_file() || !metadata_path.is_file() {
            info!("No vector store at {}", dir.display());
            return Ok(None);
        }
        let Some(index) = I::open(dir).map_err(index_error)? else {
            info!("No index artifact at {}", dir.display());
            return Ok(None);
        };
        let ids: Vec<ChunkId> = serde_json::from_slice(&fs::read(&ids_path)?)?;
        let metadata: BTreeMap<ChunkId, ChunkMeta> = serde_json::from_slice(&fs::read(&metadata_path)?)?;
        let store = Self::from_parts(index, ids, metadata)?;
        info!("Loaded {} vectors from {}", store.len(), dir.display());
        Ok(Some(store))
    }
}

/// Keeps a typed [`Error`] raised inside an index, wraps anything else.
pub(crate) fn index_error(e: anyhow::Error) -> Error {
    match e.downcast::<Error>() {
        Ok(err) => err,
        Err(e) => Error::Index(format!("{:#}", e)),
    }
}

/// A fresh directory next to a store directory, swapped into its place by
/// [`Staging::commit`]. Dropped without committing, it is removed.
pub(crate) struct Staging {
    dir: TempDir,
    target: PathBuf,
    backup: PathBuf,
}

impl Staging {
    pub(crate) fn new(target: &Path) -> Result<Self> {
        let Some(name) = target.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Err(Error::InvalidConfig(format!("store directory needs a name: {}", target.display())));
        };
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!(".{}.staging-", name))
            .tempdir_in(&parent)?;
        debug!("Staging store for {} in {}", target.display(), dir.path().display());
        let backup = parent.join(format!(".{}.old-{}", name, std::process::id()));
        Ok(Self { dir, target: target.to_path_buf(), backup })
    }

    pub(crate) fn path(&self) -> &Path { self.dir.path() }

    /// Move the staged directory to the target, setting any previous target
    /// aside until the move has succeeded.
    pub(crate) fn commit(self) -> Result<()> {
        let Self { dir, target, backup } = self;
        let had_previous = target.exists();
        if had_previous {
            if backup.exists() {
                fs::remove_dir_all(&backup)?;
            }
            fs::rename(&target, &backup)?;
        }
        let staged = dir.keep();
        if let Err(e) = fs::rename(&staged, &target) {
            if had_previous {
                if let Err(restore) = fs::rename(&backup, &target) {
                    warn!("Could not restore {} from {}: {}", target.display(), backup.display(), restore);
                }
            }
            if let Err(cleanup) = fs::remove_dir_all(&staged) {
                warn!("Could not remove staging directory {}: {}", staged.display(), cleanup);
            }
            return Err(e.into());
        }
        if had_previous {
            if let Err(e) = fs::remove_dir_all(&backup) {
                warn!("Could not remove previous store {}: {}", backup.display(), e);
            }
        }
        Ok(())
    }
}

/// Write `bytes` to `dir/name` through a temp file renamed into place.
pub(crate) fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(name)).map_err(|e| e.error)?;
    Ok(())
}

/// Scale `v` to unit length in place; zero vectors are left unchanged.
pub fn normalize_l2(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
