//! Runtime configuration.
//!
//! A [`Config`] is built from defaults rooted in a [`DataDir`], adjusted by
//! environment variables and then by command-line flags, and handed by
//! value to each component.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::Serialize;

use crate::{
    chunking::ChunkingConfig,
    data_dir::DataDir,
    download::{DEFAULT_DOWNLOAD_HOST, normalize_model_filename},
    error::{Error, Result},
    model_manager::{
        DEFAULT_EMBEDDING_MODEL,
        DEFAULT_TOKENIZER_REPO,
        EMBEDDING_MODEL_ENV_VAR,
    },
    params::ModelParameters,
};

pub const DEFAULT_MODEL_NAME: &str =
    "wizardlm-13b-v1.1-superhot-8k.ggmlv3.q4_0.bin";
pub const MODEL_ENV_VAR: &str = "DOCQA_MODEL";

/// Number of chunks retrieved per question.
pub const TARGET_SOURCE_CHUNKS: usize = 4;

/// Chunks embedded per model call during ingestion.
pub const EMBEDDING_BATCH_SIZE: usize = 32;

/// Inference backend the model file is run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Llama,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "llama" => Ok(Self::Llama),
            other => Err(Error::Config(format!(
                "unsupported backend `{other}`; only `llama` is available"
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Llama => f.write_str("llama"),
        }
    }
}

/// Where the language model lives and how it is run.
#[derive(Debug, Clone, Serialize)]
pub struct ModelConfig {
    pub name: String,
    pub folder: PathBuf,
    pub backend: Backend,
    pub allow_download: bool,
    pub download_host: String,
    /// Tokenizer file, directory or Hub repository.
    pub tokenizer: String,
    pub parameters: ModelParameters,
}

impl ModelConfig {
    pub fn new(name: impl Into<String>, folder: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            folder: folder.into(),
            backend: Backend::default(),
            allow_download: false,
            download_host: DEFAULT_DOWNLOAD_HOST.to_string(),
            tokenizer: DEFAULT_TOKENIZER_REPO.to_string(),
            parameters: ModelParameters::default(),
        }
    }

    /// File name on disk, with the model extension appended if missing.
    pub fn file_name(&self) -> String {
        normalize_model_filename(&self.name)
    }

    pub fn path(&self) -> PathBuf {
        self.folder.join(self.file_name())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory documents are ingested from.
    pub source_dir: PathBuf,
    /// Directory holding the vector store.
    pub store_dir: PathBuf,
    pub recursive: bool,
    pub chunking: ChunkingConfig,
    pub target_source_chunks: usize,
    pub embedding_batch_size: usize,
    /// Embedding model Hub repository or local directory.
    pub embedding_model: String,
    pub model: ModelConfig,
    pub hide_sources: bool,
}

impl Config {
    /// Build-time defaults laid out under `data_dir`.
    pub fn new(data_dir: &DataDir) -> Self {
        Self {
            source_dir: data_dir.source_dir(),
            store_dir: data_dir.store_dir(),
            recursive: true,
            chunking: ChunkingConfig::default(),
            target_source_chunks: TARGET_SOURCE_CHUNKS,
            embedding_batch_size: EMBEDDING_BATCH_SIZE,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            model: ModelConfig::new(DEFAULT_MODEL_NAME, data_dir.model_dir()),
            hide_sources: false,
        }
    }

    /// Defaults with `DOCQA_MODEL` and `DOCQA_EMBEDDING_MODEL` applied.
    pub fn from_env(data_dir: &DataDir) -> Self {
        Self::new(data_dir).with_env(|key| std::env::var(key).ok())
    }

    fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(name) = lookup(MODEL_ENV_VAR).filter(|v| !v.is_empty()) {
            self.model.name = name;
        }
        if let Some(model) =
            lookup(EMBEDDING_MODEL_ENV_VAR).filter(|v| !v.is_empty())
        {
            self.embedding_model = model;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.target_source_chunks == 0 {
            return Err(Error::Config(
                "target_source_chunks must be at least 1".into(),
            ));
        }
        if self.embedding_batch_size == 0 {
            return Err(Error::Config(
                "embedding_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }
}
