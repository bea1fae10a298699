mod gemma2;
mod llama;
mod loader;
mod mistral;

pub use gemma2::Gemma2Model;
pub use llama::LlamaModel;
pub use loader::{load_model_files, ModelFiles};
pub use mistral::MistralModel;

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use tracing::info;

use crate::error::{InferenceError, Result};

/// Trait for language models that can generate next token logits
pub trait LanguageModel: Send + Sync {
    /// Forward pass over `input_ids` (shape `[1, seq]`) starting at `position`.
    fn forward(&mut self, input_ids: &Tensor, position: usize) -> Result<Tensor>;

    /// Drop all cached keys/values so the next forward starts a new sequence.
    fn reset_cache(&mut self);

    fn eos_token_ids(&self) -> &[u32];

    fn vocab_size(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelArchitecture {
    Llama,
    Mistral,
    Gemma2,
}

impl ModelArchitecture {
    fn from_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.contains("gemma2") {
            Some(Self::Gemma2)
        } else if name.contains("mistral") {
            Some(Self::Mistral)
        } else if name.contains("llama") {
            Some(Self::Llama)
        } else {
            None
        }
    }
}

/// Reads `architectures`, then `model_type`; unknown families are treated as Llama.
pub fn detect_architecture(config_path: &Path) -> Result<ModelArchitecture> {
    let config = read_config_json(config_path)?;

    let from_architectures = config
        .get("architectures")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|arch| arch.as_str())
        .find_map(ModelArchitecture::from_name);

    let from_model_type = || {
        config
            .get("model_type")
            .and_then(|v| v.as_str())
            .and_then(ModelArchitecture::from_name)
    };

    Ok(from_architectures
        .or_else(from_model_type)
        .unwrap_or(ModelArchitecture::Llama))
}

pub fn load_language_model(
    files: &ModelFiles,
    device: &Device,
    dtype: DType,
) -> Result<Box<dyn LanguageModel>> {
    let architecture = detect_architecture(&files.config)?;
    info!("Detected architecture: {:?}", architecture);

    let model: Box<dyn LanguageModel> = match architecture {
        ModelArchitecture::Llama => {
            Box::new(LlamaModel::load(&files.config, &files.weights, device, dtype)?)
        }
        ModelArchitecture::Mistral => {
            Box::new(MistralModel::load(&files.config, &files.weights, device, dtype)?)
        }
        ModelArchitecture::Gemma2 => {
            Box::new(Gemma2Model::load(&files.config, &files.weights, device, dtype)?)
        }
    };
    Ok(model)
}

fn read_config_json(path: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// `eos_token_id` may be a single id or a list of ids.
fn eos_ids_from_config(config: &serde_json::Value, fallback: u32) -> Vec<u32> {
    let ids: Vec<u32> = match config.get("eos_token_id") {
        Some(serde_json::Value::Number(n)) => n.as_u64().map(|id| id as u32).into_iter().collect(),
        Some(serde_json::Value::Array(ids)) => ids
            .iter()
            .filter_map(|id| id.as_u64())
            .map(|id| id as u32)
            .collect(),
        _ => Vec::new(),
    };

    if ids.is_empty() {
        vec![fallback]
    } else {
        ids
    }
}

fn mmap_weights(paths: &[PathBuf], dtype: DType, device: &Device) -> Result<VarBuilder<'static>> {
    if paths.is_empty() {
        return Err(InferenceError::ModelLoad("no weight files".to_string()));
    }
    info!("Mapping {} weight file(s) as {:?}", paths.len(), dtype);
    // SAFETY: the hub cache files are not modified while the process runs.
    let vb = unsafe { VarBuilder::from_mmaped_safetensors(paths, dtype, device)? };
    Ok(vb)
}
