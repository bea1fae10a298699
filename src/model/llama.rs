use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig, LlamaEosToks};
use tracing::info;

use super::{mmap_weights, LanguageModel};
use crate::error::Result;

/// Llama 2/3 family, the default backend.
pub struct LlamaModel {
    model: Llama,
    config: Config,
    cache: Cache,
    fresh_cache: Cache,
    eos_token_ids: Vec<u32>,
}

impl LlamaModel {
    pub fn load(
        config_path: &Path,
        weight_paths: &[PathBuf],
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        let raw = std::fs::read_to_string(config_path)?;
        let llama_config: LlamaConfig = serde_json::from_str(&raw)?;
        let config = llama_config.into_config(false);

        info!(
            "Llama config: vocab_size={}, hidden_size={}, num_layers={}, num_heads={}",
            config.vocab_size,
            config.hidden_size,
            config.num_hidden_layers,
            config.num_attention_heads
        );

        let eos_token_ids = match &config.eos_token_id {
            Some(LlamaEosToks::Single(id)) => vec![*id],
            Some(LlamaEosToks::Multiple(ids)) => ids.clone(),
            None => vec![],
        };

        let vb = mmap_weights(weight_paths, dtype, device)?;
        let model = Llama::load(vb, &config)?;
        let fresh_cache = Cache::new(true, dtype, &config, device)?;

        Ok(Self {
            model,
            config,
            cache: fresh_cache.clone(),
            fresh_cache,
            eos_token_ids,
        })
    }
}

impl LanguageModel for LlamaModel {
    fn forward(&mut self, input_ids: &Tensor, position: usize) -> Result<Tensor> {
        Ok(self.model.forward(input_ids, position, &mut self.cache)?)
    }

    fn reset_cache(&mut self) {
        self.cache = self.fresh_cache.clone();
    }

    fn eos_token_ids(&self) -> &[u32] {
        &self.eos_token_ids
    }

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }
}
