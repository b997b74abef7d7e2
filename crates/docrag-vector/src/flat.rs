//! Exact brute-force inner-product index, persisted as `vectors.bin`.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use tracing::debug;

use docrag_core::error::Error;
use docrag_core::traits::VectorIndexer;
use docrag_core::types::Neighbor;

use crate::store::{write_atomic, PersistentIndex};

pub const VECTORS_FILE: &str = "vectors.bin";

/// On-disk layout: row-major unit vectors.
#[derive(Deserialize)]
struct FlatFile {
    dim: u64,
    data: Vec<f32>,
}

#[derive(Serialize)]
struct FlatFileRef<'a> {
    dim: u64,
    data: &'a [f32],
}

#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    dim: Option<usize>,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new() -> Self { Self::default() }

    pub fn from_raw(dim: usize, data: Vec<f32>) -> Result<Self> {
        if dim == 0 {
            if !data.is_empty() {
                bail!("zero dimension with {} values", data.len());
            }
            return Ok(Self::default());
        }
        if data.len() % dim != 0 {
            bail!("{} values do not divide into rows of {}", data.len(), dim);
        }
        Ok(Self { dim: Some(dim), data })
    }

    pub fn row(&self, row: usize) -> Option<&[f32]> {
        let dim = self.dim?;
        self.data.get(row * dim..(row + 1) * dim)
    }
}

impl VectorIndexer for FlatIndex {
    fn dim(&self) -> Option<usize> { self.dim }

    fn len(&self) -> usize {
        match self.dim {
            Some(dim) => self.data.len() / dim,
            None => 0,
        }
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        let Some(first) = vectors.first() else { return Ok(()) };
        let dim = *self.dim.get_or_insert(first.len());
        if dim == 0 {
            self.dim = None;
            bail!("cannot add zero-length vectors");
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            bail!("vector of length {} added to index of dimension {}", bad.len(), dim);
        }
        self.data.reserve(vectors.len() * dim);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let Some(dim) = self.dim else { return Ok(vec![]) };
        if query.len() != dim {
            bail!("query of length {} against index of dimension {}", query.len(), dim);
        }
        let mut scored: Vec<Neighbor> = self
            .data
            .chunks_exact(dim)
            .enumerate()
            .map(|(row, v)| Neighbor { row: row as i64, score: dot(query, v) })
            .collect();
        let by_rank = |a: &Neighbor, b: &Neighbor| -> Ordering { b.score.total_cmp(&a.score).then(a.row.cmp(&b.row)) };
        let k = k.min(scored.len());
        if k == 0 {
            return Ok(vec![]);
        }
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_rank);
            scored.truncate(k);
        }
        scored.sort_by(by_rank);
        Ok(scored)
    }
}

impl PersistentIndex for FlatIndex {
    fn save(&self, dir: &Path) -> Result<()> {
        let file = FlatFileRef { dim: self.dim.unwrap_or(0) as u64, data: &self.data };
        let bytes = bincode::serialize(&file).map_err(|e| Error::Serialization(e.to_string()))?;
        write_atomic(dir, VECTORS_FILE, &bytes)?;
        debug!("Wrote {} vectors to {}", self.len(), dir.join(VECTORS_FILE).display());
        Ok(())
    }

    fn open(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(VECTORS_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        let file: FlatFile = bincode::deserialize(&bytes)
            .map_err(|e| Error::Serialization(format!("corrupt {}: {}", path.display(), e)))?;
        Ok(Some(Self::from_raw(file.dim as usize, file.data)?))
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
