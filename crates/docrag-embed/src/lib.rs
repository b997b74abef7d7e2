//! Text embedders: a candle BERT sentence encoder and a hashing embedder for
//! tests and offline development. Both return L2-normalized vectors.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};
use twox_hash::XxHash64;

use docrag_core::config::{expand_path, EmbeddingSettings};
use docrag_core::traits::Embedder;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use pool::{l2_normalize, masked_mean, masked_mean_l2};

pub const DEFAULT_MODEL_DIR: &str = "models/all-MiniLM-L6-v2";
pub const DEFAULT_HASH_DIM: usize = 384;

/// Sentence embeddings from a local BERT-family checkpoint
/// (all-MiniLM-L6-v2 by default): mean pooling over real tokens, then L2.
pub struct SentenceEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
    model_id: String,
}

impl SentenceEmbedder {
    pub fn from_dir(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = device::select_device();
        info!("Loading sentence embedding model from {}", model_dir.display());

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)
            .map_err(|e| anyhow!("Failed to parse {}: {}", config_path.display(), e))?;

        let vb = load_weights(model_dir, &device)?;
        let model = BertModel::load(vb, &config)?;
        let model_id = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sentence-embedder".to_string());
        info!("Model {} loaded (max_len={})", model_id, max_len);
        Ok(Self { model, tokenizer, device, max_len: max_len.max(1), model_id })
    }

    fn embed_tensor(&self, texts: &[String]) -> Result<Tensor> {
        let (input_ids, attention_mask) = tokenize::tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        masked_mean_l2(&hidden, &attention_mask)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        debug!("Loading weights from {}", safetensors.display());
        // SAFETY: the file is memory-mapped read-only and not modified while the model lives.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)? };
        return Ok(vb);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        debug!("Loading weights from {}", pickle.display());
        let weights: HashMap<String, Tensor> = candle_core::pickle::read_all(&pickle)?.into_iter().collect();
        return Ok(VarBuilder::from_tensors(weights, DType::F32, device));
    }
    Err(anyhow!("No model.safetensors or pytorch_model.bin in {}", model_dir.display()))
}

impl Embedder for SentenceEmbedder {
    fn model_id(&self) -> &str { &self.model_id }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let start = Instant::now();
        let embeddings = self.embed_tensor(texts)?.to_device(&Device::Cpu)?.to_dtype(DType::F32)?;
        let rows: Vec<Vec<f32>> = embeddings.to_vec2()?;
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 * texts.len() as u128 {
            warn!("Slow embedding: {} texts in {:?}", texts.len(), elapsed);
        }
        Ok(rows)
    }
}

/// Deterministic bag-of-tokens embedder. Each lowercased alphanumeric token
/// is hashed into one of `dim` buckets. Texts without tokens embed to zeros.
pub struct HashEmbedder {
    dim: usize,
    model_id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, model_id: format!("hash-{}", dim) }
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase());
        for token in tokens {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[idx] += sign * (0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self { Self::new(DEFAULT_HASH_DIM) }
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str { &self.model_id }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Hashing embedder when `APP_USE_FAKE_EMBEDDINGS` or `embedding.fake` is set,
/// the sentence model otherwise.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Box<dyn Embedder>> {
    if settings.fake || env_flag("APP_USE_FAKE_EMBEDDINGS") {
        info!("Using HashEmbedder (dim={})", settings.fake_dim);
        return Ok(Box::new(HashEmbedder::new(settings.fake_dim)));
    }
    let model_dir = resolve_model_dir(settings)?;
    Ok(Box::new(SentenceEmbedder::from_dir(&model_dir, settings.max_len)?))
}

/// First existing directory among `embedding.model_dir`, `APP_MODEL_DIR`,
/// `MODEL_DIR` and [`DEFAULT_MODEL_DIR`].
pub fn resolve_model_dir(settings: &EmbeddingSettings) -> Result<PathBuf> {
    let mut candidates: Vec<(&str, PathBuf)> = Vec::new();
    if let Some(dir) = &settings.model_dir {
        candidates.push(("embedding.model_dir", expand_path(dir)));
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            candidates.push((var, expand_path(dir)));
        }
    }
    candidates.push(("default", PathBuf::from(DEFAULT_MODEL_DIR)));

    for (origin, path) in &candidates {
        if path.is_dir() {
            info!("Using model dir from {}: {}", origin, path.display());
            return Ok(path.clone());
        }
        debug!("Model dir candidate {} missing: {}", origin, path.display());
    }
    Err(anyhow!(
        "Could not locate the embedding model directory (tried {}); set APP_MODEL_DIR or APP_USE_FAKE_EMBEDDINGS=1",
        candidates.iter().map(|(_, p)| p.display().to_string()).collect::<Vec<_>>().join(", ")
    ))
}
