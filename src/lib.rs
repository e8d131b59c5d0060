//! docqa - ask questions about a folder of PDFs with a local language model.
//!
//! Documents are split into overlapping chunks, embedded with a
//! sentence-transformers model run by
//! [candle](https://github.com/huggingface/candle) and persisted in a
//! [redb](https://github.com/cberner/redb) vector store.
//! Questions retrieve the closest chunks, which are placed into a single
//! prompt for a quantized LLaMA model running locally.
//!
//! # Quick start
//!
//! ```no_run
//! use docqa::{Config, DataDir, KnowledgeBase};
//! use docqa::download::HttpDownloader;
//! use docqa::embedding::BertEmbedder;
//! use docqa::engine::CandleLlama;
//! use docqa::llm::LocalModel;
//! use docqa::qa::QaChain;
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let config = Config::from_env(&data_dir);
//! let kb = KnowledgeBase::new(&config);
//!
//! let embedder = BertEmbedder::open(&config.embedding_model).unwrap();
//! kb.ingest(&config.source_dir, &embedder).unwrap();
//!
//! let downloader = HttpDownloader::new(true).unwrap();
//! let llm = LocalModel::open(&config.model, &downloader, |path| {
//!     CandleLlama::load(path, &config.model.tokenizer)
//! })
//! .unwrap();
//!
//! let mut chain = QaChain::new(kb.get_retriever(embedder).unwrap(), llm);
//! let answer = chain.answer("What is the capital of France?").unwrap();
//! println!("{}", answer.text);
//! for source in &answer.sources {
//!     println!("{} (score: {:.3})", source.chunk.source(), source.score);
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod data_dir;
pub mod document;
pub mod download;
pub mod embedding;
pub mod engine;
pub mod entry_id;
pub mod error;
pub mod knowledge_base;
pub mod llm;
pub mod model_manager;
pub mod params;
pub mod qa;
pub mod repl;
pub mod vector_store;
pub mod walker;

pub use config::Config;
pub use data_dir::DataDir;
pub use entry_id::EntryId;
pub use error::{Error, Result};
pub use knowledge_base::{KnowledgeBase, Retriever};
pub use vector_store::VectorStore;
