use candle_core::{DType, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::utils::apply_repeat_penalty;

use crate::config::GenerationConfig;
use crate::error::Result;

/// Sampler matching the config: greedy at temperature 0, otherwise
/// temperature scaling with optional top-k and nucleus filtering.
pub fn logits_processor(config: &GenerationConfig) -> LogitsProcessor {
    let seed = config.seed.unwrap_or_else(rand::random);
    LogitsProcessor::from_sampling(seed, sampling_for(config))
}

fn sampling_for(config: &GenerationConfig) -> Sampling {
    let temperature = config.temperature;
    if temperature <= 0.0 {
        return Sampling::ArgMax;
    }

    let top_k = (config.top_k > 0).then_some(config.top_k);
    let top_p = (config.top_p > 0.0 && config.top_p < 1.0).then_some(config.top_p);

    match (top_k, top_p) {
        (None, None) => Sampling::All { temperature },
        (Some(k), None) => Sampling::TopK { k, temperature },
        (None, Some(p)) => Sampling::TopP { p, temperature },
        (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
    }
}

/// Reduces backend output to the 1-D logits of the last position.
///
/// Backends disagree on shape: `[vocab]`, `[batch, vocab]` or `[batch, seq, vocab]`.
pub fn last_logits(logits: &Tensor) -> Result<Tensor> {
    let logits = match logits.dims() {
        [_] => logits.clone(),
        [_, _] => logits.get(0)?,
        [_, seq_len, _] => logits.get(0)?.get(seq_len - 1)?,
        _ => logits.flatten_all()?,
    };
    Ok(logits.to_dtype(DType::F32)?)
}

/// Penalises tokens seen in the last `repeat_last_n` positions of `context`.
pub fn penalize(logits: &Tensor, config: &GenerationConfig, context: &[u32]) -> Result<Tensor> {
    if config.repeat_penalty == 1.0 || context.is_empty() {
        return Ok(logits.clone());
    }
    let start = context.len().saturating_sub(config.repeat_last_n);
    Ok(apply_repeat_penalty(
        logits,
        config.repeat_penalty,
        &context[start..],
    )?)
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;

    fn config(temperature: f64, top_k: usize, top_p: f64) -> GenerationConfig {
        GenerationConfig {
            temperature,
            top_k,
            top_p,
            ..Default::default()
        }
    }

    #[test]
    fn sampling_mode_follows_config() {
        assert!(matches!(sampling_for(&config(0.0, 50, 0.9)), Sampling::ArgMax));
        assert!(matches!(
            sampling_for(&config(0.7, 0, 1.0)),
            Sampling::All { .. }
        ));
        assert!(matches!(
            sampling_for(&config(0.7, 40, 1.0)),
            Sampling::TopK { k: 40, .. }
        ));
        assert!(matches!(
            sampling_for(&config(0.7, 0, 0.9)),
            Sampling::TopP { .. }
        ));
        assert!(matches!(
            sampling_for(&config(0.7, 40, 0.9)),
            Sampling::TopKThenTopP { k: 40, .. }
        ));
    }

    #[test]
    fn last_logits_handles_every_rank() {
        let device = Device::Cpu;
        let flat = Tensor::new(&[0.1f32, 0.9, 0.0], &device).unwrap();
        assert_eq!(
            last_logits(&flat).unwrap().to_vec1::<f32>().unwrap(),
            vec![0.1, 0.9, 0.0]
        );

        let batched = Tensor::new(&[[0.1f32, 0.9, 0.0]], &device).unwrap();
        assert_eq!(last_logits(&batched).unwrap().dims(), &[3]);

        let sequence = Tensor::new(&[[[1f32, 0.0, 0.0], [0.0, 0.0, 1.0]]], &device).unwrap();
        assert_eq!(
            last_logits(&sequence).unwrap().to_vec1::<f32>().unwrap(),
            vec![0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn greedy_picks_the_argmax() {
        let logits = Tensor::new(&[0.1f32, 3.0, 0.2, 2.9], &Device::Cpu).unwrap();
        let mut processor = logits_processor(&config(0.0, 0, 1.0));
        assert_eq!(processor.sample(&logits).unwrap(), 1);
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let logits = Tensor::new(&[1.0f32, 1.1, 0.9, 1.05], &Device::Cpu).unwrap();
        let cfg = GenerationConfig {
            seed: Some(42),
            ..config(1.0, 0, 1.0)
        };
        let first: Vec<u32> = {
            let mut p = logits_processor(&cfg);
            (0..8).map(|_| p.sample(&logits).unwrap()).collect()
        };
        let second: Vec<u32> = {
            let mut p = logits_processor(&cfg);
            (0..8).map(|_| p.sample(&logits).unwrap()).collect()
        };
        assert_eq!(first, second);
    }

    #[test]
    fn penalty_only_touches_recent_context() {
        let logits = Tensor::new(&[2.0f32, 2.0, -2.0], &Device::Cpu).unwrap();
        let cfg = GenerationConfig {
            repeat_penalty: 2.0,
            repeat_last_n: 2,
            ..Default::default()
        };
        let out = penalize(&logits, &cfg, &[0, 1, 2]).unwrap();
        assert_eq!(out.to_vec1::<f32>().unwrap(), vec![2.0, 1.0, -4.0]);
    }

    #[test]
    fn neutral_penalty_is_a_no_op() {
        let logits = Tensor::new(&[2.0f32, -1.0], &Device::Cpu).unwrap();
        let out = penalize(&logits, &GenerationConfig::default(), &[0, 1]).unwrap();
        assert_eq!(out.to_vec1::<f32>().unwrap(), vec![2.0, -1.0]);
    }
}
