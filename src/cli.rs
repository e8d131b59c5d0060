use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::params::ParameterOverrides;

#[derive(Debug, Parser)]
#[command(
    name = "docqa",
    about = "Ask questions about your PDFs with a local language model"
)]
pub struct Cli {
    /// Root directory holding data/, db/ and llm_model/
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Language model file name inside llm_model/
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Embedding model ID (HuggingFace) or local path
    #[arg(long, global = true)]
    pub embedding_model: Option<String>,

    /// Download the language model if it is missing
    #[arg(long, global = true)]
    pub allow_download: bool,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rebuild the vector store from the source documents
    Ingest(IngestArgs),
    /// Ask questions interactively
    Chat(ChatArgs),
    /// Answer a single question and exit
    Ask(AskArgs),
    /// Show configuration and vector store statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Ingest --

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Directory to read documents from (default: <root>/data)
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Maximum chunk size in characters
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Characters shared by adjacent chunks
    #[arg(long)]
    pub chunk_overlap: Option<usize>,

    /// Only read files directly inside the source directory
    #[arg(long)]
    pub no_recursive: bool,
}

// -- Model options shared by chat and ask --

#[derive(Debug, Clone, Args)]
pub struct ModelArgs {
    /// Inference backend
    #[arg(long, default_value = "llama")]
    pub backend: String,

    /// Host the language model is downloaded from
    #[arg(long)]
    pub download_host: Option<String>,

    /// Tokenizer file, directory or HuggingFace repository
    #[arg(long)]
    pub tokenizer: Option<String>,

    /// Number of chunks to retrieve per question
    #[arg(short = 'k', long)]
    pub target_source_chunks: Option<usize>,

    /// Do not print the source chunks after each answer
    #[arg(long)]
    pub hide_sources: bool,

    #[command(flatten)]
    pub generation: GenerationArgs,
}

#[derive(Debug, Clone, Default, Args)]
pub struct GenerationArgs {
    /// Sampling temperature
    #[arg(long)]
    pub temp: Option<f64>,

    /// Nucleus sampling probability
    #[arg(long)]
    pub top_p: Option<f64>,

    /// Tokens kept before nucleus sampling
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Prompt batch size
    #[arg(long)]
    pub n_batch: Option<usize>,

    /// Inference threads
    #[arg(long)]
    pub threads: Option<usize>,

    /// Hard cap on generated tokens
    #[arg(long)]
    pub n_predict: Option<usize>,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<usize>,

    /// Tokens the repeat penalty looks back over
    #[arg(long)]
    pub repeat_last_n: Option<usize>,

    /// Penalty for recently generated tokens
    #[arg(long)]
    pub repeat_penalty: Option<f32>,
}

impl GenerationArgs {
    pub fn overrides(&self) -> ParameterOverrides {
        ParameterOverrides {
            temp: self.temp,
            top_p: self.top_p,
            top_k: self.top_k,
            n_batch: self.n_batch,
            n_threads: self.threads,
            n_predict: self.n_predict,
            max_tokens: self.max_tokens,
            repeat_last_n: self.repeat_last_n,
            repeat_penalty: self.repeat_penalty,
        }
    }
}

// -- Chat --

#[derive(Debug, Parser)]
pub struct ChatArgs {
    #[command(flatten)]
    pub model: ModelArgs,
}

// -- Ask --

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question
    pub query: String,

    /// Output the answer and sources as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub model: ModelArgs,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docqa",
            &mut std::io::stdout(),
        );
    }
}
