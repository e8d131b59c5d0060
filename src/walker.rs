use std::path::{Path, PathBuf};

use crate::{document::FileType, error::Result};

/// A discovered document file.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the source root directory.
    pub relative_path: PathBuf,
    /// Fully resolved absolute path.
    pub absolute_path: PathBuf,
    pub file_type: FileType,
}

/// Walk a directory and discover loadable document files.
///
/// Skips hidden files/directories (names starting with `.`) and only
/// returns files with supported extensions (.pdf, .txt, .md). Descends
/// into subdirectories only when `recursive` is set. A missing `root` is an
/// I/O error.
pub fn discover_files(
    root: &Path,
    recursive: bool,
) -> Result<Vec<DiscoveredFile>> {
    let canonical_root = root.canonicalize()?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, recursive, &mut results)?;
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    recursive: bool,
    results: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let file_name = entry.file_name();

        // Skip hidden files and directories.
        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if recursive {
                walk_dir(root, &entry.path(), recursive, results)?;
            }
        } else if file_type.is_symlink() {
            let resolved = match entry.path().canonicalize() {
                Ok(p) => p,
                Err(_) => continue, // Skip broken symlinks
            };
            // Linked directories are never followed (cycle prevention).
            if resolved.is_file()
                && let Some(kind) = FileType::from_path(&resolved)
            {
                results.push(make_discovered(
                    root,
                    &entry.path(),
                    resolved,
                    kind,
                ));
            }
        } else if file_type.is_file()
            && let Some(kind) = FileType::from_path(&entry.path())
        {
            let abs = entry.path().canonicalize()?;
            results.push(make_discovered(root, &entry.path(), abs, kind));
        }
    }

    Ok(())
}

fn make_discovered(
    root: &Path,
    original_path: &Path,
    absolute_path: PathBuf,
    file_type: FileType,
) -> DiscoveredFile {
    let relative_path = original_path
        .strip_prefix(root)
        .unwrap_or(original_path)
        .to_path_buf();

    DiscoveredFile {
        relative_path,
        absolute_path,
        file_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(files: &[DiscoveredFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.relative_path.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn discovers_supported_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("paper.pdf"), "%PDF-1.4").unwrap();
        std::fs::write(tmp.path().join("note.md"), "# Hello").unwrap();
        std::fs::write(tmp.path().join("readme.txt"), "Hello").unwrap();
        std::fs::write(tmp.path().join("image.png"), "binary").unwrap();

        let files = discover_files(tmp.path(), true).unwrap();
        assert_eq!(names(&files), vec!["note.md", "paper.pdf", "readme.txt"]);
        assert_eq!(files[1].file_type, FileType::Pdf);
    }

    #[test]
    fn skips_hidden_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let hidden = tmp.path().join(".git");
        std::fs::create_dir(&hidden).unwrap();
        std::fs::write(hidden.join("config.txt"), "git config").unwrap();
        std::fs::write(tmp.path().join(".hidden.txt"), "secret").unwrap();
        std::fs::write(tmp.path().join("visible.txt"), "hello").unwrap();

        let files = discover_files(tmp.path(), true).unwrap();
        assert_eq!(names(&files), vec!["visible.txt"]);
    }

    #[test]
    fn recursion_is_optional() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("subdir");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("deep.txt"), "deep").unwrap();
        std::fs::write(tmp.path().join("top.txt"), "top").unwrap();

        let flat = discover_files(tmp.path(), false).unwrap();
        assert_eq!(names(&flat), vec!["top.txt"]);

        let deep = discover_files(tmp.path(), true).unwrap();
        assert_eq!(names(&deep), vec!["subdir/deep.txt", "top.txt"]);
    }

    #[test]
    fn missing_directory_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = discover_files(&tmp.path().join("nope"), true).unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
    }

    #[test]
    fn empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(discover_files(tmp.path(), true).unwrap().is_empty());
    }
}
