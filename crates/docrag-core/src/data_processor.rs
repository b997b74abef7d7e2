use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::chunker::ChunkingConfig;
use crate::extract::{extract_text, DocumentKind};
use crate::types::Chunk;

/// Turns a zip archive or a directory of documents into ordered chunks.
#[derive(Debug, Clone, Default)]
pub struct DataProcessor {
    chunking: ChunkingConfig,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_chunking(chunking: ChunkingConfig) -> Self { Self { chunking } }

    pub fn chunking(&self) -> &ChunkingConfig { &self.chunking }

    /// Ingest a `.zip` archive or a directory.
    pub fn process_path(&self, path: &Path) -> Result<Vec<Chunk>> {
        self.process(path, None)
    }

    pub fn process_path_limited(&self, path: &Path, limit: usize) -> Result<Vec<Chunk>> {
        self.process(path, Some(limit))
    }

    fn process(&self, path: &Path, limit: Option<usize>) -> Result<Vec<Chunk>> {
        if path.is_file() && is_zip(path) {
            self.process_zip(path, limit)
        } else if path.is_dir() {
            self.process_directory(path, limit)
        } else {
            anyhow::bail!("expected a .zip archive or a directory: {}", path.display())
        }
    }

    pub fn process_zip(&self, zip_path: &Path, limit: Option<usize>) -> Result<Vec<Chunk>> {
        let tempdir = tempfile::Builder::new().prefix("docrag_ingest_").tempdir()?;
        info!("Extracting {} to {}", zip_path.display(), tempdir.path().display());
        let file = File::open(zip_path).with_context(|| format!("open {}", zip_path.display()))?;
        let mut archive = zip::ZipArchive::new(file).with_context(|| format!("read zip {}", zip_path.display()))?;
        archive.extract(tempdir.path())?;
        self.process_directory(tempdir.path(), limit)
    }

    pub fn process_directory(&self, data_dir: &Path, limit: Option<usize>) -> Result<Vec<Chunk>> {
        let mut files = list_supported_files(data_dir);
        if files.is_empty() {
            warn!("No supported documents found under {}", data_dir.display());
            return Ok(vec![]);
        }
        if let Some(limit) = limit {
            if files.len() > limit {
                files.truncate(limit);
                info!("Limited to first {} files", limit);
            }
        }
        info!("Processing {} documents from {}", files.len(), data_dir.display());

        let mut all_chunks = Vec::new();
        for (file_index, file_path) in files.iter().enumerate() {
            let source = relative_source(file_path, data_dir);
            debug!("Processing file {}/{}: {}", file_index + 1, files.len(), source);
            let text = match extract_text(file_path) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to extract {}: {:#}", source, e);
                    continue;
                }
            };
            if text.trim().is_empty() {
                warn!("No text extracted from {}, skipping", source);
                continue;
            }
            all_chunks.extend(self.chunk_document(&source, &text)?);
        }
        info!("Processed {} files into {} chunks", files.len(), all_chunks.len());
        Ok(all_chunks)
    }

    /// Chunk one document's text; chunk indices start at 0.
    pub fn chunk_document(&self, source: &str, text: &str) -> Result<Vec<Chunk>> {
        let pieces = self.chunking.chunk(text)?;
        Ok(pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, piece)| Chunk::new(source, chunk_index, piece))
            .collect())
    }
}

fn is_zip(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Supported documents under `root`, sorted by path.
pub fn list_supported_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
        let path = entry.path();
        if DocumentKind::from_path(path).is_some() {
            files.push(path.to_path_buf());
        } else {
            debug!("Skipping unsupported file type: {}", path.display());
        }
    }
    files.sort();
    files
}

/// `path` relative to `root`, joined with `/` on every platform.
pub fn relative_source(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
