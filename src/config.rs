use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser};
use serde::Deserialize;

use crate::error::{InferenceError, Result};

pub const DEFAULT_MODEL: &str = "meta-llama/Llama-3.2-1B";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Text generation over a single GET endpoint")]
pub struct Args {
    /// Hugging Face model id, e.g. meta-llama/Llama-3.2-3B for production
    #[arg(short, long, env = "MODEL_NAME", default_value = DEFAULT_MODEL)]
    pub model: String,

    #[arg(long, env = "MODEL_REVISION", default_value = "main")]
    pub revision: String,

    #[arg(long, env = "HUGGINGFACE_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,

    #[arg(long, env = "LISTEN_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    #[arg(long, env = "FORCE_CPU", value_parser = FalseyValueParser::new())]
    pub cpu: bool,

    /// Generate once for this prompt and exit instead of serving
    #[arg(short, long)]
    pub prompt: Option<String>,

    #[arg(long, env = "MAX_NEW_TOKENS", default_value_t = 50)]
    pub max_new_tokens: usize,

    #[arg(long)]
    pub temperature: Option<f64>,

    #[arg(long)]
    pub top_p: Option<f64>,

    #[arg(long)]
    pub top_k: Option<usize>,

    #[arg(long)]
    pub repeat_penalty: Option<f32>,

    #[arg(long, default_value_t = 64)]
    pub repeat_last_n: usize,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop once the continuation contains any of these strings
    #[arg(long = "stop", env = "STOP_SEQUENCES", value_delimiter = ',')]
    pub stop_sequences: Vec<String>,

    /// Return prompt + continuation; `false` returns the continuation alone
    #[arg(long, env = "INCLUDE_PROMPT", default_value_t = true, action = ArgAction::Set)]
    pub include_prompt: bool,
}

impl Args {
    /// The access token, with an empty value (e.g. `HUGGINGFACE_TOKEN=`) treated as unset.
    pub fn hf_token(&self) -> Option<&str> {
        self.hf_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.host.parse().map_err(|_| {
            InferenceError::Config(format!(
                "listen host must be an IP address, got {:?}",
                self.host
            ))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: usize,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
    pub seed: Option<u64>,
    /// Stop ids on top of the ones the model and tokenizer declare.
    pub eos_token_ids: Vec<u32>,
    pub stop_sequences: Vec<String>,
    /// Return prompt + continuation rather than the continuation alone.
    pub include_prompt: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 50,
            temperature: 0.6,
            top_p: 0.9,
            top_k: 50,
            repeat_penalty: 1.0,
            repeat_last_n: 64,
            seed: None,
            eos_token_ids: vec![],
            stop_sequences: vec![],
            include_prompt: true,
        }
    }
}

impl GenerationConfig {
    /// Explicit arguments win over the model's `generation_config.json`,
    /// which wins over the built-in defaults.
    pub fn resolve(args: &Args, model_defaults: &GenerationDefaults) -> Self {
        let base = Self::default();

        let temperature = args.temperature.unwrap_or_else(|| {
            if model_defaults.do_sample == Some(false) {
                0.0
            } else {
                model_defaults.temperature.unwrap_or(base.temperature)
            }
        });

        Self {
            max_new_tokens: args.max_new_tokens,
            temperature,
            top_p: args.top_p.or(model_defaults.top_p).unwrap_or(base.top_p),
            top_k: args.top_k.or(model_defaults.top_k).unwrap_or(base.top_k),
            repeat_penalty: args
                .repeat_penalty
                .or(model_defaults.repetition_penalty)
                .unwrap_or(base.repeat_penalty),
            repeat_last_n: args.repeat_last_n,
            seed: args.seed,
            eos_token_ids: model_defaults
                .eos_token_id
                .as_ref()
                .map(EosTokenId::to_vec)
                .unwrap_or_default(),
            stop_sequences: args
                .stop_sequences
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect(),
            include_prompt: args.include_prompt,
        }
    }
}

/// Subset of a hub repo's `generation_config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationDefaults {
    pub do_sample: Option<bool>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<usize>,
    pub repetition_penalty: Option<f32>,
    pub eos_token_id: Option<EosTokenId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EosTokenId {
    Single(u32),
    Multiple(Vec<u32>),
}

impl EosTokenId {
    pub fn to_vec(&self) -> Vec<u32> {
        match self {
            EosTokenId::Single(id) => vec![*id],
            EosTokenId::Multiple(ids) => ids.clone(),
        }
    }
}

impl GenerationDefaults {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
