use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const ROOT_ENV_VAR: &str = "DOCQA_ROOT";

/// Layout of the working directory that holds source documents, the
/// persisted vector store and downloaded model files.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the root directory from, in order of priority:
    /// 1. An explicit path (from --root)
    /// 2. The DOCQA_ROOT environment variable
    /// 3. The current working directory
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var(ROOT_ENV_VAR) {
            PathBuf::from(val)
        } else {
            std::env::current_dir()?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::RootDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory scanned for documents during ingestion.
    pub fn source_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    /// Directory holding the persisted vector store. Not created here: its
    /// absence means nothing has been ingested yet.
    pub fn store_dir(&self) -> PathBuf {
        self.root.join("db")
    }

    pub fn model_dir(&self) -> PathBuf {
        self.root.join("llm_model")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_with_explicit_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        assert_eq!(dir.root(), tmp.path());
        assert_eq!(dir.source_dir(), tmp.path().join("data"));
        assert_eq!(dir.store_dir(), tmp.path().join("db"));
        assert_eq!(dir.model_dir(), tmp.path().join("llm_model"));
    }

    #[test]
    fn explicit_root_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        let dir = DataDir::resolve(Some(&nested)).unwrap();

        assert!(dir.root().is_dir());
    }

    #[test]
    fn store_dir_is_not_created() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        assert!(!dir.store_dir().exists());
    }
}
