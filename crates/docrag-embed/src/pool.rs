use anyhow::{bail, Result};
use candle_core::{DType, Tensor};

/// Mean of the token vectors selected by `attention_mask`.
///
/// `hidden` is `[B, T, H]`, `attention_mask` is `[B, T]` with 1 for real
/// tokens and 0 for padding. Rows with no real tokens come out as zeros.
pub fn masked_mean(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, time, hidden_dim) = hidden.dims3()?;
    if attention_mask.dims() != [batch, time] {
        bail!("attention mask shape {:?} does not match hidden states [{}, {}]", attention_mask.dims(), batch, time);
    }
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_3d = mask.unsqueeze(2)?.broadcast_as((batch, time, hidden_dim))?;
    let summed = (hidden * &mask_3d)?.sum(1)?;
    let lengths = mask.sum_keepdim(1)?.maximum(1f64)?;
    Ok(summed.broadcast_div(&lengths)?)
}

/// Scale every row of a `[B, H]` tensor to unit length.
pub fn l2_normalize(x: &Tensor) -> Result<Tensor> {
    let eps_val = match x.dtype() { DType::F16 | DType::BF16 => 1e-6f64, _ => 1e-12f64 };
    let norm = x.sqr()?.sum_keepdim(1)?.sqrt()?.affine(1.0, eps_val)?;
    Ok(x.broadcast_div(&norm)?)
}

pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    l2_normalize(&masked_mean(hidden, attention_mask)?)
}
