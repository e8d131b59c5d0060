use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

/// A stable vector store key derived from (source, chunk_index).
///
/// Re-ingesting an unchanged corpus produces the same keys, so a rebuilt
/// store can be compared entry for entry with the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryId {
    /// The numeric ID used as the key in redb tables.
    pub numeric: u64,
    /// The short hex string for human display (e.g. "a1b2c3").
    pub short: String,
}

impl EntryId {
    pub fn new(source: &str, chunk_index: usize) -> Self {
        let numeric = Self::from_parts(source, chunk_index);
        Self::from_numeric(numeric)
    }

    pub fn from_numeric(numeric: u64) -> Self {
        Self {
            numeric,
            short: Self::short_hex(numeric, 6),
        }
    }

    fn from_parts(source: &str, chunk_index: usize) -> u64 {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        chunk_index.hash(&mut hasher);
        hasher.finish()
    }

    fn short_hex(value: u64, len: usize) -> String {
        let full = format!("{value:016x}");
        full[..len].to_string()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.short)
    }
}
