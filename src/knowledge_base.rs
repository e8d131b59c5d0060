//! Building the vector store from documents and querying it.

use std::path::{Path, PathBuf};

use kdam::{BarExt, tqdm};
use serde::Serialize;

use crate::{
    chunking::{self, Chunk, ChunkingConfig},
    config::Config,
    document,
    embedding::Embedder,
    error::{Error, Result},
    vector_store::{ScoredChunk, VectorStore},
};

/// Counts from one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    /// Entries held by the store after the run.
    pub entries: usize,
}

/// State of the persisted store, as shown by `docqa status`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub store_dir: PathBuf,
    pub exists: bool,
    pub entries: usize,
    pub dimension: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    store_dir: PathBuf,
    chunking: ChunkingConfig,
    recursive: bool,
    batch_size: usize,
    top_k: usize,
    show_progress: bool,
}

impl KnowledgeBase {
    pub fn new(config: &Config) -> Self {
        Self {
            store_dir: config.store_dir.clone(),
            chunking: config.chunking,
            recursive: config.recursive,
            batch_size: config.embedding_batch_size.max(1),
            top_k: config.target_source_chunks,
            show_progress: false,
        }
    }

    /// Show a progress bar while embedding.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Rebuild the store from every document under `source`.
    ///
    /// Documents are loaded, chunked and embedded before the store is
    /// opened, so a failure at any of those steps leaves the previous store
    /// untouched. The write itself replaces all previous entries in one
    /// transaction.
    pub fn ingest<E>(&self, source: &Path, embedder: &E) -> Result<IngestReport>
    where
        E: Embedder + ?Sized,
    {
        self.chunking.validate()?;

        tracing::info!(source = %source.display(), "loading documents");
        let documents = document::load_documents(source, self.recursive)?;
        if documents.is_empty() {
            tracing::warn!(
                source = %source.display(),
                "no supported documents found"
            );
        }

        let chunks = chunking::split_documents(&documents, &self.chunking)?;
        tracing::info!(
            documents = documents.len(),
            chunks = chunks.len(),
            "split documents"
        );

        let vectors = self.embed_chunks(&chunks, embedder)?;
        let entries: Vec<(Chunk, Vec<f32>)> =
            chunks.into_iter().zip(vectors).collect();

        let store = VectorStore::open(&self.store_dir)?;
        let stored = store.replace_all(&entries)?;
        tracing::info!(
            entries = stored,
            store = %self.store_dir.display(),
            "vector store written"
        );

        Ok(IngestReport {
            documents: documents.len(),
            chunks: entries.len(),
            entries: stored,
        })
    }

    fn embed_chunks<E>(
        &self,
        chunks: &[Chunk],
        embedder: &E,
    ) -> Result<Vec<Vec<f32>>>
    where
        E: Embedder + ?Sized,
    {
        let mut bar = self.show_progress.then(|| {
            tqdm!(total = chunks.len(), desc = "Embedding", unit = " chunks")
        });

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> =
                batch.iter().map(|c| c.text.clone()).collect();
            let embedded = embedder.embed_documents(&texts)?;
            if embedded.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "embedder returned {} vectors for {} chunks",
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
            if let Some(bar) = bar.as_mut() {
                bar.update(batch.len())?;
            }
        }

        if bar.is_some() {
            eprintln!();
        }
        Ok(vectors)
    }

    /// Open the persisted store for querying with `embedder`.
    ///
    /// Fails with [`Error::StoreMissing`] if nothing was ingested yet.
    pub fn get_retriever<E>(&self, embedder: E) -> Result<Retriever<E>>
    where
        E: Embedder,
    {
        let store = VectorStore::open_existing(&self.store_dir)?;
        Ok(Retriever {
            store,
            embedder,
            k: self.top_k,
        })
    }

    pub fn status(&self) -> Result<StoreStatus> {
        let mut status = StoreStatus {
            store_dir: self.store_dir.clone(),
            exists: false,
            entries: 0,
            dimension: None,
        };
        match VectorStore::open_existing(&self.store_dir) {
            Ok(store) => {
                status.exists = true;
                status.entries = store.len()?;
                status.dimension = store.dimension()?;
            }
            Err(Error::StoreMissing(_)) => {}
            Err(e) => return Err(e),
        }
        Ok(status)
    }
}

/// Embeds queries and looks up the nearest stored chunks.
pub struct Retriever<E> {
    store: VectorStore,
    embedder: E,
    k: usize,
}

impl<E: Embedder> Retriever<E> {
    /// Up to `k` chunks, most similar first.
    pub fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        let vector = self.embedder.embed_query(query)?;
        let results = self.store.search(&vector, self.k)?;
        tracing::debug!(
            query,
            results = results.len(),
            top_score = results.first().map(|r| r.score),
            "retrieved chunks"
        );
        Ok(results)
    }
}

impl<E> std::fmt::Debug for Retriever<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("store", &self.store)
            .field("k", &self.k)
            .finish_non_exhaustive()
    }
}
