//! Splitting documents into overlapping fixed-size segments.
//!
//! Chunks are windows of `chunk_size` characters that advance by
//! `chunk_size - overlap`, so consecutive chunks of one document share
//! exactly `overlap` characters. Sizes are counted in `char`s, never bytes,
//! so multi-byte text is never split inside a code point.

use crate::{
    document::{Document, Metadata},
    error::{Error, Result},
};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default overlap between chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Chunk window configuration.
///
/// # Examples
///
/// ```
/// use docqa::chunking::ChunkingConfig;
///
/// assert!(ChunkingConfig::new(500, 50).is_ok());
/// assert!(ChunkingConfig::new(50, 50).is_err());
/// assert!(ChunkingConfig::new(0, 0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Characters shared by adjacent chunks.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let config = Self {
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject windows that could not advance through the text.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// A chunk of text from a larger document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// The chunk text content.
    pub text: String,
    /// Zero-based chunk index within the document.
    pub index: usize,
    /// Character offset where this chunk starts in the original document.
    pub start_offset: usize,
    /// Metadata inherited from the parent document.
    pub metadata: Metadata,
}

impl Chunk {
    /// The `source` metadata entry, or `"unknown"` when absent.
    pub fn source(&self) -> &str {
        self.metadata
            .get(crate::document::SOURCE_KEY)
            .map(String::as_str)
            .unwrap_or("unknown")
    }
}

/// Split text into overlapping chunks.
///
/// Text that is empty or only whitespace produces no chunks. Text no longer
/// than `chunk_size` produces exactly one chunk.
///
/// # Examples
///
/// ```
/// use docqa::chunking::{chunk_text, ChunkingConfig};
///
/// let config = ChunkingConfig::new(10, 2).unwrap();
/// let chunks = chunk_text("Hello, world!", &config).unwrap();
/// assert_eq!(chunks.len(), 2);
/// assert_eq!(chunks[0].text, "Hello, wor");
/// assert_eq!(chunks[1].text, "orld!");
/// ```
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    config.validate()?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let char_count = text.chars().count();

    if char_count <= config.chunk_size {
        return Ok(vec![Chunk {
            text: text.to_string(),
            index: 0,
            start_offset: 0,
            metadata: Metadata::new(),
        }]);
    }

    // Build a map of char index -> byte index for O(1) lookups
    let char_to_byte: Vec<usize> = text
        .char_indices()
        .map(|(byte_idx, _)| byte_idx)
        .chain(std::iter::once(text.len()))
        .collect();

    let step = config.step();
    let mut chunks = Vec::with_capacity(char_count.div_ceil(step));
    let mut start_char = 0;

    loop {
        let end_char = (start_char + config.chunk_size).min(char_count);

        chunks.push(Chunk {
            text: text[char_to_byte[start_char]..char_to_byte[end_char]]
                .to_string(),
            index: chunks.len(),
            start_offset: start_char,
            metadata: Metadata::new(),
        });

        if end_char == char_count {
            break;
        }
        start_char += step;
    }

    Ok(chunks)
}

/// Chunk every document, copying each document's metadata onto its chunks.
///
/// Fails before producing anything if `config` is invalid.
pub fn split_documents(
    documents: &[Document],
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>> {
    config.validate()?;

    let mut all = Vec::new();
    for document in documents {
        let chunks = chunk_text(&document.text, config)?;
        tracing::trace!(
            source = document.source(),
            chunks = chunks.len(),
            "split document"
        );
        all.extend(chunks.into_iter().map(|mut chunk| {
            chunk.metadata = document.metadata.clone();
            chunk
        }));
    }
    Ok(all)
}
