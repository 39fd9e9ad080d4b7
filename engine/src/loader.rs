use std::collections::HashMap;
use std::path::{Path, PathBuf};

use flang::construct::reference::normalize_file;

use crate::error::EngineError;

/// Supplies grammar source text for a file identifier.
pub trait SourceLoader {
    fn read(&self, file: &str) -> Result<String, EngineError>;

    /// Called when a grammar is loaded from disk: file identifiers are
    /// resolved relative to its directory from then on.
    fn set_base_dir(&mut self, _base_dir: &Path) {}
}

/// Reads grammar files relative to a base directory.
#[derive(Debug, Clone)]
pub struct FsLoader {
    base_dir: PathBuf,
}

impl FsLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FsLoader {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl Default for FsLoader {
    fn default() -> Self {
        FsLoader::new(".")
    }
}

impl SourceLoader for FsLoader {
    fn read(&self, file: &str) -> Result<String, EngineError> {
        let resolved = self.base_dir.join(file);
        std::fs::read_to_string(&resolved)
            .map_err(|e| EngineError::Io(format!("cannot read '{}': {}", resolved.display(), e)))
    }

    fn set_base_dir(&mut self, base_dir: &Path) {
        self.base_dir = base_dir.to_path_buf();
    }
}

/// Serves sources registered up front.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    sources: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, file: &str, source: impl Into<String>) -> Self {
        self.insert(file, source);
        self
    }

    pub fn insert(&mut self, file: &str, source: impl Into<String>) {
        self.sources.insert(normalize_file(file), source.into());
    }
}

impl SourceLoader for MemoryLoader {
    fn read(&self, file: &str) -> Result<String, EngineError> {
        self.sources
            .get(&normalize_file(file))
            .cloned()
            .ok_or_else(|| EngineError::Io(format!("no source registered for '{}'", file)))
    }
}
