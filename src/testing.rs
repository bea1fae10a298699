//! Fixtures shared by unit tests: a scripted model and a word-level tokenizer.

use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

use crate::error::Result;
use crate::model::LanguageModel;
use crate::tokenizer::TokenizerWrapper;

pub const VOCAB_SIZE: usize = 7;

const WORD_TOKENIZER_JSON: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [
    {"id": 0, "content": "<s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 1, "content": "</s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
  ],
  "normalizer": null,
  "pre_tokenizer": {"type": "Whitespace"},
  "post_processor": null,
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": {"<s>": 0, "</s>": 1, "<unk>": 2, "hello": 3, "world": 4, "again": 5, "stop": 6},
    "unk_token": "<unk>"
  }
}"#;

/// ids: `<s>`=0 `</s>`=1 `<unk>`=2 hello=3 world=4 again=5 stop=6
pub fn word_tokenizer() -> TokenizerWrapper {
    let tokenizer = Tokenizer::from_bytes(WORD_TOKENIZER_JSON.as_bytes()).unwrap();
    TokenizerWrapper::from_tokenizer(tokenizer)
}

/// Emits `script` one token per forward pass, then repeats its last entry.
pub struct ScriptedModel {
    script: Vec<u32>,
    step: usize,
    pub positions: Vec<usize>,
    pub resets: usize,
}

impl ScriptedModel {
    pub fn new(script: Vec<u32>) -> Self {
        Self {
            script,
            step: 0,
            positions: Vec::new(),
            resets: 0,
        }
    }
}

impl LanguageModel for ScriptedModel {
    fn forward(&mut self, input_ids: &Tensor, position: usize) -> Result<Tensor> {
        let (_batch, seq_len) = input_ids.dims2()?;
        self.positions.push(position);

        let target = self
            .script
            .get(self.step)
            .or(self.script.last())
            .copied()
            .unwrap_or(1) as usize;
        self.step += 1;

        let mut logits = vec![0f32; VOCAB_SIZE * seq_len];
        logits[(seq_len - 1) * VOCAB_SIZE + target] = 10.0;
        Ok(Tensor::from_vec(logits, (1, seq_len, VOCAB_SIZE), &Device::Cpu)?)
    }

    fn reset_cache(&mut self) {
        self.step = 0;
        self.resets += 1;
    }

    fn eos_token_ids(&self) -> &[u32] {
        &[1]
    }

    fn vocab_size(&self) -> usize {
        VOCAB_SIZE
    }
}

/// Always fails its forward pass.
pub struct BrokenModel;

impl LanguageModel for BrokenModel {
    fn forward(&mut self, _input_ids: &Tensor, _position: usize) -> Result<Tensor> {
        Err(crate::error::InferenceError::Inference(
            "device out of memory".to_string(),
        ))
    }

    fn reset_cache(&mut self) {}

    fn eos_token_ids(&self) -> &[u32] {
        &[]
    }

    fn vocab_size(&self) -> usize {
        VOCAB_SIZE
    }
}
