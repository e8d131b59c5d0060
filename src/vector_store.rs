use std::path::{Path, PathBuf};

use rayon::prelude::*;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::{
    chunking::Chunk,
    document::Metadata,
    entry_id::EntryId,
    error::{Error, Result},
};

/// File name of the database inside the store directory.
pub const STORE_FILE: &str = "vectors.redb";

const VECTORS: TableDefinition<u64, &[u8]> = TableDefinition::new("vectors");
const CHUNKS: TableDefinition<u64, &[u8]> = TableDefinition::new("chunks");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const DIMENSION_KEY: &str = "dimension";

/// Header size: 4 bytes dimension.
const HEADER_SIZE: usize = 4;

/// Persistent store of chunk embeddings plus their text and metadata.
///
/// Binary format per vector entry:
/// - 4 bytes: embedding dimension D (u32 LE)
/// - D * 4 bytes: f32 values
///
/// Chunk text and metadata live in a second table under the same key,
/// encoded as JSON.
pub struct VectorStore {
    db: Database,
    dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredChunk {
    text: String,
    index: usize,
    start_offset: usize,
    metadata: Metadata,
}

impl From<&Chunk> for StoredChunk {
    fn from(chunk: &Chunk) -> Self {
        Self {
            text: chunk.text.clone(),
            index: chunk.index,
            start_offset: chunk.start_offset,
            metadata: chunk.metadata.clone(),
        }
    }
}

impl From<StoredChunk> for Chunk {
    fn from(stored: StoredChunk) -> Self {
        Self {
            text: stored.text,
            index: stored.index,
            start_offset: stored.start_offset,
            metadata: stored.metadata,
        }
    }
}

/// A chunk returned by [`VectorStore::search`] with its cosine similarity.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: EntryId,
    pub score: f32,
    pub chunk: Chunk,
}

impl VectorStore {
    /// Open or create a store in `dir`, creating the directory if needed.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use docqa::VectorStore;
    ///
    /// let store = VectorStore::open(&tmp.path().join("db")).unwrap();
    /// assert_eq!(store.len().unwrap(), 0);
    /// ```
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Self::open_in(dir)
    }

    /// Open a store that must already exist.
    ///
    /// Fails with [`Error::StoreMissing`] when `dir` is not a directory,
    /// meaning nothing has been ingested yet.
    pub fn open_existing(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::StoreMissing(dir.to_path_buf()));
        }
        Self::open_in(dir)
    }

    fn open_in(dir: &Path) -> Result<Self> {
        let db = Database::create(dir.join(STORE_FILE))?;

        let txn = db.begin_write()?;
        txn.open_table(VECTORS)?;
        txn.open_table(CHUNKS)?;
        txn.open_table(META)?;
        txn.commit()?;

        Ok(Self {
            db,
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Replace the whole store with `entries` in a single transaction.
    ///
    /// Every vector must have the same non-zero dimension; otherwise nothing
    /// is written. Returns the number of entries now stored.
    pub fn replace_all(&self, entries: &[(Chunk, Vec<f32>)]) -> Result<usize> {
        let dimension = check_dimensions(entries)?;

        let txn = self.db.begin_write()?;
        {
            txn.delete_table(VECTORS)?;
            txn.delete_table(CHUNKS)?;
            let mut vectors = txn.open_table(VECTORS)?;
            let mut chunks = txn.open_table(CHUNKS)?;
            let mut meta = txn.open_table(META)?;

            for (chunk, vector) in entries {
                let id = EntryId::new(chunk.source(), chunk.index);

                let byte_len =
                    HEADER_SIZE + std::mem::size_of_val(vector.as_slice());
                {
                    let mut guard =
                        vectors.insert_reserve(id.numeric, byte_len)?;
                    let dest = guard.as_mut();
                    dest[0..HEADER_SIZE]
                        .copy_from_slice(&(vector.len() as u32).to_le_bytes());
                    dest[HEADER_SIZE..]
                        .copy_from_slice(bytemuck::cast_slice(vector));
                }

                let json = serde_json::to_vec(&StoredChunk::from(chunk))?;
                chunks.insert(id.numeric, json.as_slice())?;
            }

            match dimension {
                Some(d) => {
                    meta.insert(DIMENSION_KEY, d as u64)?;
                }
                None => {
                    meta.remove(DIMENSION_KEY)?;
                }
            }
        }
        txn.commit()?;

        self.len()
    }

    /// Number of stored entries.
    pub fn len(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHUNKS)?;
        let mut count = 0;
        for entry in table.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Embedding dimension of the stored vectors, if any were stored.
    pub fn dimension(&self) -> Result<Option<usize>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(META)?;
        Ok(table.get(DIMENSION_KEY)?.map(|v| v.value() as usize))
    }

    /// Load one entry's chunk by key.
    pub fn get(&self, id: u64) -> Result<Option<Chunk>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHUNKS)?;
        let Some(guard) = table.get(id)? else {
            return Ok(None);
        };
        let stored: StoredChunk = serde_json::from_slice(guard.value())?;
        Ok(Some(stored.into()))
    }

    /// Return up to `k` chunks ranked by descending cosine similarity to
    /// `query`. Equal scores keep key order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if let Some(dimension) = self.dimension()?
            && dimension != query.len()
        {
            return Err(Error::Config(format!(
                "query embedding has dimension {}, but the store was built \
                 with dimension {dimension}",
                query.len()
            )));
        }

        let txn = self.db.begin_read()?;
        let vectors = txn.open_table(VECTORS)?;

        let mut stored = Vec::new();
        for entry in vectors.iter()? {
            let (key, value) = entry?;
            if let Some(vector) = decode_vector(value.value()) {
                stored.push((key.value(), vector));
            }
        }

        let mut ranked: Vec<(u64, f32)> = stored
            .par_iter()
            .map(|(id, vector)| (*id, cosine_similarity(query, vector)))
            .collect();

        // Stable sort keeps key order for ties.
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(k);

        let chunks = txn.open_table(CHUNKS)?;
        let mut results = Vec::with_capacity(ranked.len());
        for (id, score) in ranked {
            let Some(guard) = chunks.get(id)? else {
                tracing::warn!(
                    id = %EntryId::from_numeric(id),
                    "vector without chunk"
                );
                continue;
            };
            let stored: StoredChunk = serde_json::from_slice(guard.value())?;
            results.push(ScoredChunk {
                id: EntryId::from_numeric(id),
                score,
                chunk: stored.into(),
            });
        }

        Ok(results)
    }
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

fn check_dimensions(entries: &[(Chunk, Vec<f32>)]) -> Result<Option<usize>> {
    let Some((_, first)) = entries.first() else {
        return Ok(None);
    };
    let dimension = first.len();
    if dimension == 0 {
        return Err(Error::Config("embedding vectors must not be empty".into()));
    }
    if let Some((chunk, vector)) =
        entries.iter().find(|(_, v)| v.len() != dimension)
    {
        return Err(Error::Config(format!(
            "embedding for chunk {} of {} has dimension {}, expected \
             {dimension}",
            chunk.index,
            chunk.source(),
            vector.len()
        )));
    }
    Ok(Some(dimension))
}

fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() < HEADER_SIZE {
        return None;
    }
    let dimension = u32::from_le_bytes(bytes[0..HEADER_SIZE].try_into().ok()?);
    let body = &bytes[HEADER_SIZE..];
    if body.len() != dimension as usize * 4 {
        return None;
    }
    Some(
        body.chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect(),
    )
}

/// Cosine similarity, or 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
