//! Quantized LLaMA inference with candle.
//!
//! Weights come in GGML (`.bin`) or GGUF containers, detected from the
//! file's magic bytes rather than its name. Neither container ships a
//! `tokenizer.json`, so the tokenizer is resolved separately through
//! [`model_manager::tokenizer_file`].

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use candle_core::{
    Device,
    Tensor,
    quantized::{ggml_file, gguf_file},
};
use candle_transformers::{
    generation::{LogitsProcessor, Sampling},
    models::quantized_llama::ModelWeights,
    utils::apply_repeat_penalty,
};
use tokenizers::Tokenizer;

use crate::{
    error::{Error, Result},
    llm::InferenceEngine,
    model_manager::{self, default_device},
    params::{DEFAULT_BATCH_SIZE, ModelParameters},
};

pub const DEFAULT_SEED: u64 = 299_792_458;

const GGUF_MAGIC: &[u8; 4] = b"GGUF";
const EOS_TOKEN: &str = "</s>";

/// Grouped-query attention factor for GGML files, which do not record it.
/// 1 covers LLaMA 1/2 models up to 13B.
const GGML_GQA: usize = 1;

/// A loaded quantized LLaMA model and its tokenizer.
pub struct CandleLlama {
    model: ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    eos_token: Option<u32>,
    seed: u64,
}

impl CandleLlama {
    /// Load weights from `path` and the tokenizer from `tokenizer_source`
    /// (file, directory or Hub repository).
    pub fn load(path: &Path, tokenizer_source: &str) -> Result<Self> {
        let device = default_device();
        let mut file = File::open(path)?;

        let model = if is_gguf(&mut file)? {
            let content = gguf_file::Content::read(&mut file)
                .map_err(|e| e.with_path(path))?;
            tracing::debug!(
                tensors = content.tensor_infos.len(),
                "read GGUF header"
            );
            ModelWeights::from_gguf(content, &mut file, &device)?
        } else {
            let content = ggml_file::Content::read(&mut file, &device)
                .map_err(|e| e.with_path(path))?;
            tracing::debug!(
                tensors = content.tensors.len(),
                "read GGML header"
            );
            ModelWeights::from_ggml(content, GGML_GQA)?
        };

        let tokenizer_path = model_manager::tokenizer_file(tokenizer_source)?;
        let tokenizer = Tokenizer::from_file(tokenizer_path)?;
        let eos_token = tokenizer.token_to_id(EOS_TOKEN);

        tracing::info!(path = %path.display(), "language model loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
            eos_token,
            seed: DEFAULT_SEED,
        })
    }

    fn run(
        &mut self,
        prompt: &str,
        stop: &[String],
        params: &ModelParameters,
    ) -> Result<String> {
        let encoding = self.tokenizer.encode(prompt, true)?;
        let prompt_tokens = encoding.get_ids().to_vec();
        if prompt_tokens.is_empty() {
            return Ok(String::new());
        }

        let budget = params.token_budget();
        let mut sampler =
            LogitsProcessor::from_sampling(self.seed, sampling(params));
        let mut context = prompt_tokens.clone();
        let mut generated: Vec<u32> = Vec::new();

        // Index 0 resets the KV cache, so each call starts fresh.
        let input = Tensor::new(prompt_tokens.as_slice(), &self.device)?
            .unsqueeze(0)?;
        let mut logits = self.model.forward(&input, 0)?;

        while generated.len() < budget {
            let next = self.sample(&mut sampler, &logits, &context, params)?;
            if Some(next) == self.eos_token {
                break;
            }
            generated.push(next);
            context.push(next);

            let text = self.tokenizer.decode(&generated, true)?;
            if let Some(cut) = stop_position(&text, stop) {
                return Ok(text[..cut].to_string());
            }

            let input = Tensor::new(&[next], &self.device)?.unsqueeze(0)?;
            logits = self.model.forward(&input, context.len() - 1)?;
        }

        tracing::debug!(tokens = generated.len(), "generation finished");
        Ok(self.tokenizer.decode(&generated, true)?)
    }

    fn sample(
        &self,
        sampler: &mut LogitsProcessor,
        logits: &Tensor,
        context: &[u32],
        params: &ModelParameters,
    ) -> Result<u32> {
        let logits = logits.squeeze(0)?;
        let logits = if params.repeat_penalty == 1.0 {
            logits
        } else {
            let start = context.len().saturating_sub(params.repeat_last_n);
            let recent = &context[start..];
            apply_repeat_penalty(&logits, params.repeat_penalty, recent)?
        };
        Ok(sampler.sample(&logits)?)
    }
}

impl InferenceEngine for CandleLlama {
    fn complete(
        &mut self,
        prompt: &str,
        stop: &[String],
        params: &ModelParameters,
    ) -> Result<String> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.n_threads.max(1))
            .build()
            .map_err(|e| Error::Config(format!("inference threads: {e}")))?;
        if ignores_batch_size(params) {
            tracing::debug!(
                n_batch = params.n_batch,
                "n_batch has no effect; the prompt is evaluated in one pass"
            );
        }
        tracing::debug!(
            threads = params.n_threads,
            budget = params.token_budget(),
            "generating"
        );
        pool.install(|| self.run(prompt, stop, params))
    }
}

impl std::fmt::Debug for CandleLlama {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleLlama")
            .field("eos_token", &self.eos_token)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

fn is_gguf(file: &mut (impl Read + Seek)) -> Result<bool> {
    let mut magic = [0u8; 4];
    let gguf = match file.read_exact(&mut magic) {
        Ok(()) => &magic == GGUF_MAGIC,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => false,
        Err(e) => return Err(e.into()),
    };
    file.seek(SeekFrom::Start(0))?;
    Ok(gguf)
}

fn sampling(params: &ModelParameters) -> Sampling {
    if params.temp <= 0.0 {
        return Sampling::ArgMax;
    }
    Sampling::TopKThenTopP {
        k: params.top_k.max(1),
        p: params.top_p,
        temperature: params.temp,
    }
}

/// The prompt always goes through the model in a single forward pass.
fn ignores_batch_size(params: &ModelParameters) -> bool {
    params.n_batch != DEFAULT_BATCH_SIZE
}

/// Byte offset of the earliest stop sequence in `text`, if any.
fn stop_position(text: &str, stop: &[String]) -> Option<usize> {
    stop.iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
}
