use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{InferenceError, Result};

pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: Vec<PathBuf>,
    pub generation_config: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct SafetensorsIndex {
    weight_map: std::collections::HashMap<String, String>,
}

/// Fetches (or reuses from the local hub cache) everything needed to build a model.
pub fn load_model_files(model_id: &str, revision: &str, token: Option<&str>) -> Result<ModelFiles> {
    info!("Resolving {} (revision: {})", model_id, revision);

    let api = ApiBuilder::new()
        .with_token(token.map(str::to_string))
        .build()
        .map_err(|e| InferenceError::Hub(e.to_string()))?;

    let repo = api.repo(Repo::with_revision(
        model_id.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    let config = fetch(&repo, "config.json")?;
    let tokenizer = fetch(&repo, "tokenizer.json")?;
    let weights = fetch_weights(&repo)?;

    let generation_config = match repo.get("generation_config.json") {
        Ok(path) => Some(path),
        Err(e) => {
            debug!("No generation_config.json: {}", e);
            None
        }
    };

    info!(
        "Model files ready: config={:?}, tokenizer={:?}, weights={} files",
        config,
        tokenizer,
        weights.len()
    );

    Ok(ModelFiles {
        config,
        tokenizer,
        weights,
        generation_config,
    })
}

fn fetch(repo: &ApiRepo, filename: &str) -> Result<PathBuf> {
    debug!("Fetching {}", filename);
    repo.get(filename)
        .map_err(|e| InferenceError::Hub(format!("Failed to download {}: {}", filename, e)))
}

fn fetch_weights(repo: &ApiRepo) -> Result<Vec<PathBuf>> {
    if let Ok(path) = repo.get("model.safetensors") {
        return Ok(vec![path]);
    }

    let index = fetch(repo, "model.safetensors.index.json").map_err(|_| {
        InferenceError::Hub(
            "Could not find model weights (tried model.safetensors and model.safetensors.index.json)"
                .to_string(),
        )
    })?;

    shard_names(&index)?
        .iter()
        .map(|shard| fetch(repo, shard))
        .collect()
}

/// Distinct shard file names referenced by a safetensors index, in sorted order.
fn shard_names(index_path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(index_path)?;
    let index: SafetensorsIndex = serde_json::from_str(&raw)?;
    let shards: BTreeSet<String> = index.weight_map.into_values().collect();
    if shards.is_empty() {
        return Err(InferenceError::ModelLoad(format!(
            "{:?} lists no weight shards",
            index_path
        )));
    }
    Ok(shards.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn shard_names_are_deduplicated_and_sorted() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "metadata": {{"total_size": 6425499648}},
                "weight_map": {{
                    "lm_head.weight": "model-00002-of-00002.safetensors",
                    "model.embed_tokens.weight": "model-00001-of-00002.safetensors",
                    "model.layers.0.mlp.up_proj.weight": "model-00001-of-00002.safetensors"
                }}
            }}"#
        )
        .unwrap();

        assert_eq!(
            shard_names(file.path()).unwrap(),
            vec![
                "model-00001-of-00002.safetensors".to_string(),
                "model-00002-of-00002.safetensors".to_string(),
            ]
        );
    }

    #[test]
    fn empty_index_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"weight_map": {{}}}}"#).unwrap();
        assert!(shard_names(file.path()).is_err());
    }
}
