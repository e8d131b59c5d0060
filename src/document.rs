//! Loading source files into [`Document`]s.

use std::{collections::BTreeMap, path::Path};

use rayon::prelude::*;

use crate::{
    error::{Error, Result},
    walker::{self, DiscoveredFile},
};

/// Metadata key naming the file a document (and its chunks) came from.
pub const SOURCE_KEY: &str = "source";

/// Metadata key holding the [`FileType`] of the origin file.
pub const FILE_TYPE_KEY: &str = "file_type";

pub type Metadata = BTreeMap<String, String>;

/// Kinds of files the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Text,
    Markdown,
}

impl FileType {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "txt",
            Self::Markdown => "md",
        }
    }
}

/// Loaded text of one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    /// Create a document whose metadata holds only `source`.
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), source.into());
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn source(&self) -> &str {
        self.metadata
            .get(SOURCE_KEY)
            .map(String::as_str)
            .unwrap_or("unknown")
    }
}

/// Load every supported file under `root`.
///
/// Any unreadable file fails the whole load. Documents come back in the
/// walker's sorted path order.
pub fn load_documents(root: &Path, recursive: bool) -> Result<Vec<Document>> {
    let files = walker::discover_files(root, recursive)?;
    tracing::debug!(
        root = %root.display(),
        files = files.len(),
        "discovered source files"
    );

    // PDF extraction is CPU-bound, so read in parallel; collect keeps order.
    files.par_iter().map(|file| load_file(root, file)).collect()
}

fn load_file(root: &Path, file: &DiscoveredFile) -> Result<Document> {
    let text = match file.file_type {
        FileType::Pdf => pdf_extract::extract_text(&file.absolute_path)
            .map_err(|e| Error::Pdf {
                path: file.absolute_path.clone(),
                message: e.to_string(),
            })?,
        FileType::Text | FileType::Markdown => {
            std::fs::read_to_string(&file.absolute_path)?
        }
    };

    let source = root.join(&file.relative_path);
    let mut document = Document::new(text, source.to_string_lossy());
    document.metadata.insert(
        FILE_TYPE_KEY.to_string(),
        file.file_type.as_str().to_string(),
    );
    Ok(document)
}
