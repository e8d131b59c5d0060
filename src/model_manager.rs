//! Locating model assets and picking a compute device.
//!
//! Model identifiers are either a local directory or a Hugging Face Hub
//! repository ID. Local directories are used as-is; repository files are
//! fetched (and cached) through `hf-hub` on first use.

use std::path::{Path, PathBuf};

use candle_core::Device;

use crate::error::Result;

pub const DEFAULT_EMBEDDING_MODEL: &str =
    "sentence-transformers/all-MiniLM-L6-v2";
pub const EMBEDDING_MODEL_ENV_VAR: &str = "DOCQA_EMBEDDING_MODEL";

/// Tokenizer used with GGML/GGUF LLaMA weights, which carry no
/// `tokenizer.json` of their own.
pub const DEFAULT_TOKENIZER_REPO: &str = "hf-internal-testing/llama-tokenizer";

const TOKENIZER_FILE: &str = "tokenizer.json";

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
pub fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

/// Files making up a sentence-transformers style BERT model.
#[derive(Debug, Clone)]
pub struct EmbeddingModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

/// Resolve the files of an embedding model, downloading them from the Hub
/// when `model_id` is not a local directory.
pub fn embedding_model_files(model_id: &str) -> Result<EmbeddingModelFiles> {
    let local = Path::new(model_id);
    if local.is_dir() {
        return Ok(EmbeddingModelFiles {
            config: local.join("config.json"),
            tokenizer: local.join(TOKENIZER_FILE),
            weights: local.join("model.safetensors"),
        });
    }

    tracing::info!(model = model_id, "fetching embedding model from the Hub");
    let api = hf_hub::api::sync::Api::new()?;
    let repo = api.model(model_id.to_string());
    Ok(EmbeddingModelFiles {
        config: repo.get("config.json")?,
        tokenizer: repo.get(TOKENIZER_FILE)?,
        weights: repo.get("model.safetensors")?,
    })
}

/// Resolve a `tokenizer.json` from a file path, a directory containing
/// one, or a Hub repository ID.
pub fn tokenizer_file(source: &str) -> Result<PathBuf> {
    let local = Path::new(source);
    if local.is_file() {
        return Ok(local.to_path_buf());
    }
    if local.is_dir() {
        return Ok(local.join(TOKENIZER_FILE));
    }

    tracing::info!(repo = source, "fetching tokenizer from the Hub");
    let api = hf_hub::api::sync::Api::new()?;
    Ok(api.model(source.to_string()).get(TOKENIZER_FILE)?)
}
