use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// Token ids and attention mask for a batch, padded to a common length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedBatch {
    pub ids: Vec<u32>,
    pub mask: Vec<u32>,
    pub batch: usize,
    pub seq_len: usize,
}

/// Pad (and cap at `max_len`) encoded sequences to the longest one in the batch.
pub fn pad_batch(sequences: &[(Vec<u32>, Vec<u32>)], max_len: usize, pad_id: u32) -> PaddedBatch {
    let seq_len = sequences.iter().map(|(ids, _)| ids.len().min(max_len)).max().unwrap_or(0).max(1);
    let mut ids = Vec::with_capacity(sequences.len() * seq_len);
    let mut mask = Vec::with_capacity(sequences.len() * seq_len);
    for (seq_ids, seq_mask) in sequences {
        let take = seq_ids.len().min(seq_len);
        ids.extend_from_slice(&seq_ids[..take]);
        mask.extend((0..take).map(|i| seq_mask.get(i).copied().unwrap_or(1)));
        ids.extend(std::iter::repeat(pad_id).take(seq_len - take));
        mask.extend(std::iter::repeat(0).take(seq_len - take));
    }
    PaddedBatch { ids, mask, batch: sequences.len(), seq_len }
}

pub fn pad_id(tokenizer: &Tokenizer) -> u32 {
    tokenizer
        .get_padding()
        .map(|p| p.pad_id)
        .or_else(|| tokenizer.token_to_id("[PAD]"))
        .unwrap_or(0)
}

/// Tokenize `texts` and return `(input_ids, attention_mask)`, both `[B, T]` u32.
pub fn tokenize_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let sequences: Vec<(Vec<u32>, Vec<u32>)> = encodings
        .iter()
        .map(|enc| (enc.get_ids().to_vec(), enc.get_attention_mask().to_vec()))
        .collect();
    let padded = pad_batch(&sequences, max_len, pad_id(tokenizer));
    let shape = (padded.batch, padded.seq_len);
    let input_ids = Tensor::from_vec(padded.ids, shape, device)?;
    let attention_mask = Tensor::from_vec(padded.mask, shape, device)?;
    Ok((input_ids, attention_mask))
}
