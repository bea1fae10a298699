mod routes;
mod types;

pub use routes::create_router;

use std::sync::Arc;

use candle_core::Device;
use tokio::sync::Mutex;

use crate::config::GenerationConfig;
use crate::error::InferenceError;
use crate::model::LanguageModel;
use crate::tokenizer::TokenizerWrapper;

/// A model and its tokenizer, ready to serve.
pub struct LoadedModel {
    pub model: Mutex<Box<dyn LanguageModel>>,
    pub tokenizer: TokenizerWrapper,
}

/// Shared application state
pub struct AppState {
    /// `Err` holds the startup load failure, reported on every query.
    pub model: Result<Arc<LoadedModel>, String>,
    pub device: Device,
    pub model_id: String,
    pub generation: GenerationConfig,
}

impl AppState {
    pub fn ready(
        model: Box<dyn LanguageModel>,
        tokenizer: TokenizerWrapper,
        device: Device,
        model_id: String,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            model: Ok(Arc::new(LoadedModel {
                model: Mutex::new(model),
                tokenizer,
            })),
            device,
            model_id,
            generation,
        }
    }

    pub fn failed(error: InferenceError, device: Device, model_id: String) -> Self {
        Self {
            model: Err(error.to_string()),
            device,
            model_id,
            generation: GenerationConfig::default(),
        }
    }
}
