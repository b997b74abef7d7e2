use candle_core::{DType, Device, Tensor};
use docrag_embed::tokenize::pad_batch;
use docrag_embed::{l2_normalize, masked_mean, masked_mean_l2};

#[test]
fn masked_mean_l2_basic() {
    let dev = Device::Cpu;
    // Two tokens with hidden dim 4; second token is masked out.
    let h = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], (1, 2, 4), &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 0u32], (1, 2), &dev).unwrap();
    let out = masked_mean_l2(&h, &mask).unwrap();
    let v: Vec<Vec<f32>> = out.to_vec2().unwrap();
    let norm: f32 = (1.0f32 + 4.0 + 9.0 + 16.0).sqrt();
    let expected = [1.0 / norm, 2.0 / norm, 3.0 / norm, 4.0 / norm];
    for (a, b) in v[0].iter().cloned().zip(expected) {
        assert!((a - b).abs() < 1e-5, "a={} b={}", a, b);
    }
}

#[test]
fn masked_mean_averages_only_real_tokens() {
    let dev = Device::Cpu;
    // batch of two: row 0 uses both tokens, row 1 only the first
    let h = Tensor::from_slice(
        &[1.0f32, 3.0, 3.0, 5.0, 2.0, 2.0, 100.0, 100.0],
        (2, 2, 2),
        &dev,
    )
    .unwrap();
    let mask = Tensor::from_slice(&[1u32, 1, 1, 0], (2, 2), &dev).unwrap();
    let out: Vec<Vec<f32>> = masked_mean(&h, &mask).unwrap().to_vec2().unwrap();
    assert_eq!(out, vec![vec![2.0, 4.0], vec![2.0, 2.0]]);
}

#[test]
fn l2_normalize_rows() {
    let dev = Device::Cpu;
    let x = Tensor::from_slice(&[3.0f32, 4.0, 0.0, 2.0], (2, 2), &dev).unwrap();
    let out: Vec<Vec<f32>> = l2_normalize(&x).unwrap().to_dtype(DType::F32).unwrap().to_vec2().unwrap();
    assert!((out[0][0] - 0.6).abs() < 1e-6 && (out[0][1] - 0.8).abs() < 1e-6);
    assert!((out[1][1] - 1.0).abs() < 1e-6);
}

#[test]
fn mismatched_mask_is_rejected() {
    let dev = Device::Cpu;
    let h = Tensor::zeros((1, 3, 2), DType::F32, &dev).unwrap();
    let mask = Tensor::zeros((1, 2), DType::U32, &dev).unwrap();
    assert!(masked_mean(&h, &mask).is_err());
}

#[test]
fn pad_batch_pads_to_longest_and_caps() {
    let seqs = vec![(vec![101, 7, 102], vec![1, 1, 1]), (vec![101, 102], vec![1, 1])];
    let padded = pad_batch(&seqs, 8, 0);
    assert_eq!(padded.seq_len, 3);
    assert_eq!(padded.ids, vec![101, 7, 102, 101, 102, 0]);
    assert_eq!(padded.mask, vec![1, 1, 1, 1, 1, 0]);

    let capped = pad_batch(&seqs, 2, 0);
    assert_eq!(capped.seq_len, 2);
    assert_eq!(capped.ids, vec![101, 7, 101, 102]);
}
