use std::path::{Path, PathBuf};

use codespan_reporting::files::SimpleFiles;
use flang::FlangObject;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::generator::Generator;
use crate::loader::{FsLoader, SourceLoader};
use crate::match_object::MatchObject;
use crate::matcher::Matcher;
use crate::registry::{FileId, Registry, SymbolTable};
use crate::samples::SampleStore;
use crate::spec::Spec;

/// Behaviour switches for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionOptions {
    /// Raise `NoMatch` on a failed match instead of returning nothing.
    pub stop_on_error: bool,
    /// Accept a match that stops before the end of the text.
    pub allow_trailing: bool,
    /// Reject specs with fields the grammar does not consume.
    pub strict_spec: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            stop_on_error: true,
            allow_trailing: false,
            strict_spec: true,
        }
    }
}

/// Loaded grammars plus the sample history they produced.
#[derive(Debug)]
pub struct Session {
    registry: Registry,
    samples: SampleStore,
    options: SessionOptions,
    /// Canonical directory of the first grammar loaded from disk.
    base_dir: Option<PathBuf>,
    inline_count: usize,
}

impl Session {
    /// A session whose dependencies are read from the working directory
    /// until a grammar is loaded from disk.
    pub fn new(options: SessionOptions) -> Self {
        Self::with_loader(FsLoader::default(), options)
    }

    pub fn with_loader(loader: impl SourceLoader + 'static, options: SessionOptions) -> Self {
        Session {
            registry: Registry::new(loader),
            samples: SampleStore::new(),
            options,
            base_dir: None,
            inline_count: 0,
        }
    }

    /// Load markup given inline (anything starting with `<`) or a grammar
    /// file path.
    pub fn load(&mut self, text_or_path: &str) -> Result<FileId, EngineError> {
        if text_or_path.trim_start().starts_with('<') {
            let name = format!("<inline-{}>", self.inline_count);
            self.inline_count += 1;
            self.load_source(&name, text_or_path)
        } else {
            self.load_path(text_or_path)
        }
    }

    /// Load grammar markup under the file identifier `name`. Dependencies
    /// are fetched through the session's loader.
    pub fn load_source(&mut self, name: &str, source: &str) -> Result<FileId, EngineError> {
        let file = self.registry.load_source(name, source.to_string())?;
        info!(grammar = name, symbols = self.registry.symbols().len(), "grammar loaded");
        Ok(file)
    }

    /// Load the grammar the session's loader knows as `name`.
    pub fn load_file(&mut self, name: &str) -> Result<FileId, EngineError> {
        let file = self.registry.load_file(name)?;
        info!(grammar = name, symbols = self.registry.symbols().len(), "grammar loaded");
        Ok(file)
    }

    /// Load a grammar file. The directory of the first file loaded this way
    /// becomes the base for resolving file identifiers.
    ///
    /// A file is identified by its path relative to the base directory, or
    /// by its canonical path when it lies outside it. Loading a file that is
    /// already loaded, as a dependency or otherwise, returns its handle.
    pub fn load_path(&mut self, path: impl AsRef<Path>) -> Result<FileId, EngineError> {
        let path = path.as_ref();
        let canonical = std::fs::canonicalize(path)
            .map_err(|e| EngineError::Io(format!("cannot read '{}': {}", path.display(), e)))?;

        let base = match &self.base_dir {
            Some(base) => base.clone(),
            None => {
                let base = canonical.parent().map(Path::to_path_buf).unwrap_or_default();
                debug!(base_dir = %base.display(), "setting base directory");
                self.registry.set_base_dir(&base);
                self.base_dir = Some(base.clone());
                base
            }
        };

        let name = file_identifier(&canonical, &base);
        if let Some(file) = self.registry.file_by_name(&name) {
            debug!(grammar = %name, "already loaded");
            return Ok(file);
        }

        let source = std::fs::read_to_string(&canonical)
            .map_err(|e| EngineError::Io(format!("cannot read '{}': {}", path.display(), e)))?;
        self.load_source(&name, &source)
    }

    /// Match `text` against a loaded grammar and return the full match tree.
    /// A successful match is recorded as a sample.
    pub fn match_tree(
        &mut self,
        grammar: FileId,
        text: &str,
    ) -> Result<Option<MatchObject>, EngineError> {
        let matcher = Matcher::new(&self.registry, self.options.stop_on_error);
        let found = matcher.run(grammar, text, self.options.allow_trailing)?;

        if let Some(found) = &found {
            let key = self.grammar_key(grammar)?;
            self.samples.record(&key, found.to_flat_dict());
            debug!(grammar = %key, samples = self.samples.len(), "recorded sample");
        }
        Ok(found)
    }

    /// Match `text` and flatten the result into a spec.
    pub fn match_text(&mut self, grammar: FileId, text: &str) -> Result<Option<Spec>, EngineError> {
        Ok(self
            .match_tree(grammar, text)?
            .map(|found| found.to_flat_dict()))
    }

    pub fn generate(&self, grammar: FileId, spec: &Spec) -> Result<String, EngineError> {
        Generator::new(&self.registry).run(grammar, spec, self.options.strict_spec)
    }

    /// Complete `partial` from the closest sample of any grammar.
    pub fn complete(&self, partial: &Spec) -> Result<Spec, EngineError> {
        self.samples.complete(partial)
    }

    /// Complete `partial` from this grammar's samples, then generate.
    pub fn generate_completed(&self, grammar: FileId, partial: &Spec) -> Result<String, EngineError> {
        let key = self.grammar_key(grammar)?;
        let spec = self.samples.complete_for(&key, partial)?;
        self.generate(grammar, &spec)
    }

    pub fn object(&self, grammar: FileId) -> Result<&FlangObject, EngineError> {
        self.registry.object(grammar)
    }

    pub fn grammar_key(&self, grammar: FileId) -> Result<String, EngineError> {
        Ok(self.registry.global_key(self.registry.root(grammar)?))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn symbols(&self) -> &SymbolTable {
        self.registry.symbols()
    }

    pub fn samples(&self) -> &SampleStore {
        &self.samples
    }

    /// Source database for rendering diagnostics.
    pub fn files(&self) -> &SimpleFiles<String, String> {
        self.registry.files()
    }
}

fn file_identifier(canonical: &Path, base: &Path) -> String {
    match canonical.strip_prefix(base) {
        Ok(relative) => relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => canonical.display().to_string(),
    }
}
