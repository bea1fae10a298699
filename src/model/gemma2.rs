use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_transformers::models::gemma2::{Config, Model};
use tracing::info;

use super::{eos_ids_from_config, mmap_weights, read_config_json, LanguageModel};
use crate::error::Result;

pub struct Gemma2Model {
    model: Model,
    vocab_size: usize,
    eos_token_ids: Vec<u32>,
}

impl Gemma2Model {
    pub fn load(
        config_path: &Path,
        weight_paths: &[PathBuf],
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        let config_json = read_config_json(config_path)?;
        let eos_token_ids = eos_ids_from_config(&config_json, 1);
        let config: Config = serde_json::from_value(config_json)?;

        info!(
            "Gemma2 config: vocab_size={}, hidden_size={}, num_layers={}, num_heads={}",
            config.vocab_size,
            config.hidden_size,
            config.num_hidden_layers,
            config.num_attention_heads
        );

        let vb = mmap_weights(weight_paths, dtype, device)?;
        let model = Model::new(false, &config, vb)?;

        Ok(Self {
            model,
            vocab_size: config.vocab_size,
            eos_token_ids,
        })
    }
}

impl LanguageModel for Gemma2Model {
    fn forward(&mut self, input_ids: &Tensor, position: usize) -> Result<Tensor> {
        Ok(self.model.forward(input_ids, position)?)
    }

    fn reset_cache(&mut self) {
        self.model.clear_kv_cache();
    }

    fn eos_token_ids(&self) -> &[u32] {
        &self.eos_token_ids
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}
