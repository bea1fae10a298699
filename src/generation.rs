use std::time::Instant;

use candle_core::{Device, Tensor};
use tracing::{debug, info};

use crate::config::GenerationConfig;
use crate::error::{InferenceError, Result};
use crate::model::LanguageModel;
use crate::sampling::{last_logits, logits_processor, penalize};
use crate::tokenizer::TokenizerWrapper;

pub struct GenerationOutput {
    pub text: String,
    /// Newly generated ids only, prompt excluded.
    pub tokens: Vec<u32>,
    pub prompt_tokens: usize,
    pub tokens_per_second: f64,
    pub total_time_ms: u128,
}

pub struct TextGenerator<'a> {
    model: &'a mut dyn LanguageModel,
    tokenizer: &'a TokenizerWrapper,
    device: &'a Device,
}

impl<'a> TextGenerator<'a> {
    pub fn new(
        model: &'a mut dyn LanguageModel,
        tokenizer: &'a TokenizerWrapper,
        device: &'a Device,
    ) -> Self {
        Self {
            model,
            tokenizer,
            device,
        }
    }

    pub fn generate(&mut self, prompt: &str, config: &GenerationConfig) -> Result<GenerationOutput> {
        let start_time = Instant::now();

        self.model.reset_cache();

        let prompt_tokens = self.tokenizer.encode(prompt)?;
        let prompt_len = prompt_tokens.len();
        debug!("Prompt tokens: {}", prompt_len);

        if prompt_tokens.is_empty() {
            return Err(InferenceError::Inference("Empty prompt".to_string()));
        }

        let mut stop_ids: Vec<u32> = self.model.eos_token_ids().to_vec();
        stop_ids.extend(self.tokenizer.eos_token_id());
        stop_ids.extend(&config.eos_token_ids);

        let mut processor = logits_processor(config);
        let mut all_tokens = prompt_tokens.clone();
        let mut generated_tokens: Vec<u32> = Vec::new();

        let input = Tensor::new(prompt_tokens.as_slice(), self.device)?.unsqueeze(0)?;
        let mut logits = self.model.forward(&input, 0)?;

        let generation_start = Instant::now();

        for step in 0..config.max_new_tokens {
            let next_logits = penalize(&last_logits(&logits)?, config, &all_tokens)?;
            let next_token = processor.sample(&next_logits)?;

            if stop_ids.contains(&next_token) {
                debug!("Stop token {} at step {}", next_token, step);
                break;
            }

            generated_tokens.push(next_token);
            all_tokens.push(next_token);

            if !config.stop_sequences.is_empty() {
                let partial = self.tokenizer.decode(&generated_tokens)?;
                if config.stop_sequences.iter().any(|s| partial.contains(s)) {
                    debug!("Stop sequence hit at step {}", step);
                    break;
                }
            }

            if step + 1 == config.max_new_tokens {
                break;
            }

            let input = Tensor::new(&[next_token], self.device)?.unsqueeze(0)?;
            logits = self.model.forward(&input, prompt_len + step)?;
        }

        let generation_time = generation_start.elapsed();
        let tokens_per_second = if generation_time.as_secs_f64() > 0.0 {
            generated_tokens.len() as f64 / generation_time.as_secs_f64()
        } else {
            0.0
        };

        let text = if config.include_prompt {
            self.tokenizer.decode(&all_tokens)?
        } else {
            self.tokenizer.decode(&generated_tokens)?
        };

        info!(
            "Generated {} tokens in {:?} ({:.2} tokens/sec)",
            generated_tokens.len(),
            generation_time,
            tokens_per_second
        );

        Ok(GenerationOutput {
            text,
            tokens: generated_tokens,
            prompt_tokens: prompt_len,
            tokens_per_second,
            total_time_ms: start_time.elapsed().as_millis(),
        })
    }
}
