use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::CoreError;

/// Extension of Geode source files.
pub const SOURCE_EXTENSION: &str = "g";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub contents: String,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        SourceFile {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// Load `root` itself if it is a file, otherwise every `*.g` file below it,
/// sorted by path.
pub fn load_sources(root: impl AsRef<Path>) -> Result<Vec<SourceFile>, CoreError> {
    let root = root.as_ref();
    if root.is_file() {
        let contents = fs::read_to_string(root)?;
        return Ok(vec![SourceFile::new(root, contents)]);
    }
    if !root.is_dir() {
        return Err(CoreError::MissingSources(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION) {
            let contents = fs::read_to_string(path)?;
            files.push(SourceFile::new(path, contents));
        }
    }
    if files.is_empty() {
        return Err(CoreError::MissingSources(root.to_path_buf()));
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(root = %root.display(), files = files.len(), "loaded sources");
    Ok(files)
}
