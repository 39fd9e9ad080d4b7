use std::collections::{HashMap, VecDeque};
use std::path::Path;

use codespan_reporting::files::SimpleFiles;
use flang::construct::reference::{FILE_SEPARATOR, normalize_file};
use flang::parser::Parser;
use flang::{Builder, Construct, ConstructId, ConstructKind, FlangObject, ReferenceTarget};
use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::error::EngineError;
use crate::loader::SourceLoader;

/// Upper bound on chained `use` hops and on nested reference expansion.
pub const MAX_DEPTH: usize = 256;

/// Handle to a loaded grammar file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub usize);

/// A construct within one of the loaded files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstructRef {
    pub file: FileId,
    pub id: ConstructId,
}

/// Global symbol table, keyed by `file:path`.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: IndexMap<String, ConstructRef>,
}

impl SymbolTable {
    pub fn key(file: &str, path: &str) -> String {
        format!("{}{}{}", file, FILE_SEPARATOR, path)
    }

    pub fn get(&self, key: &str) -> Option<ConstructRef> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ConstructRef)> {
        self.entries.iter().map(|(key, at)| (key.as_str(), *at))
    }

    /// Merge one file's local table under its file prefix. Nothing is
    /// inserted unless every key is new.
    pub fn merge(&mut self, file: FileId, object: &FlangObject) -> Result<(), EngineError> {
        let global: Vec<(String, ConstructRef)> = object
            .symbols
            .iter()
            .map(|(path, id)| (Self::key(&object.name, path), ConstructRef { file, id: *id }))
            .collect();

        if let Some((key, _)) = global.iter().find(|(key, _)| self.entries.contains_key(key)) {
            return Err(EngineError::AmbiguousSymbol { key: key.clone() });
        }
        self.entries.extend(global);
        Ok(())
    }

    fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }
}

struct Checkpoint {
    objects: usize,
    symbols: usize,
}

/// Every loaded file, the global symbol table, and the source database used
/// for diagnostics.
pub struct Registry {
    objects: Vec<FlangObject>,
    by_name: HashMap<String, FileId>,
    table: SymbolTable,
    files: SimpleFiles<String, String>,
    loader: Box<dyn SourceLoader>,
}

impl Registry {
    pub fn new(loader: impl SourceLoader + 'static) -> Self {
        Registry {
            objects: Vec::new(),
            by_name: HashMap::new(),
            table: SymbolTable::default(),
            files: SimpleFiles::new(),
            loader: Box::new(loader),
        }
    }

    pub fn files(&self) -> &SimpleFiles<String, String> {
        &self.files
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.table
    }

    pub fn set_base_dir(&mut self, base_dir: &Path) {
        self.loader.set_base_dir(base_dir);
    }

    pub fn object(&self, file: FileId) -> Result<&FlangObject, EngineError> {
        self.objects
            .get(file.0)
            .ok_or(EngineError::UnknownGrammar(file.0))
    }

    pub fn file_by_name(&self, name: &str) -> Option<FileId> {
        self.by_name.get(&normalize_file(name)).copied()
    }

    pub fn construct(&self, at: ConstructRef) -> &Construct {
        self.objects[at.file.0].get(at.id)
    }

    pub fn root(&self, file: FileId) -> Result<ConstructRef, EngineError> {
        let object = self.object(file)?;
        Ok(ConstructRef {
            file,
            id: object.root_id(),
        })
    }

    /// Global key of a construct.
    pub fn global_key(&self, at: ConstructRef) -> String {
        let object = &self.objects[at.file.0];
        SymbolTable::key(&object.name, &object.get(at.id).path)
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Load a grammar and, breadth-first, every file it depends on, then
    /// link all of them. On failure nothing from this load is kept.
    pub fn load_source(&mut self, name: &str, source: String) -> Result<FileId, EngineError> {
        let checkpoint = Checkpoint {
            objects: self.objects.len(),
            symbols: self.table.len(),
        };

        let result = self.load_with_dependencies(&normalize_file(name), source);
        if let Err(error) = &result {
            debug!(file = name, %error, "load failed, rolling back");
            self.rollback(checkpoint);
        }
        result
    }

    /// Load a grammar whose source is supplied by the loader.
    pub fn load_file(&mut self, name: &str) -> Result<FileId, EngineError> {
        let source = self.loader.read(name)?;
        self.load_source(name, source)
    }

    fn load_with_dependencies(&mut self, name: &str, source: String) -> Result<FileId, EngineError> {
        let root = self.add_file(name, source)?;
        let mut loaded = vec![root];
        let mut queue: VecDeque<String> = self.dependencies(root).into();

        while let Some(file) = queue.pop_front() {
            if self.by_name.contains_key(&file) {
                trace!(file = %file, "already loaded");
                continue;
            }
            debug!(file = %file, "loading dependency");
            let source = self.loader.read(&file)?;
            let id = self.add_file(&file, source)?;
            queue.extend(self.dependencies(id));
            loaded.push(id);
        }

        for file in loaded {
            self.link(file)?;
        }
        Ok(root)
    }

    /// Parse, build and merge a single file.
    fn add_file(&mut self, name: &str, source: String) -> Result<FileId, EngineError> {
        let file_id = self.files.add(name.to_string(), source.clone());

        let tree = Parser::new(source, file_id)
            .parse()
            .map_err(|errors| EngineError::Parse {
                file: name.to_string(),
                errors,
            })?;
        let object = Builder::new()
            .build(name, file_id, &tree)
            .map_err(|source| EngineError::MalformedGrammar {
                file: name.to_string(),
                file_id,
                source,
            })?;

        let id = FileId(self.objects.len());
        self.table.merge(id, &object)?;
        debug!(
            file = name,
            symbols = object.symbols.len(),
            dependencies = object.external_dependencies.len(),
            "merged symbols"
        );

        self.by_name.insert(name.to_string(), id);
        self.objects.push(object);
        Ok(id)
    }

    fn dependencies(&self, file: FileId) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        for (_, target) in self.objects[file.0].references() {
            if let Some(dependency) = target.file() {
                if !files.iter().any(|f| f == dependency) {
                    files.push(dependency.to_string());
                }
            }
        }
        files
    }

    /// Sources stay in `files`: the error being returned points into them,
    /// and codespan file ids are never reused.
    fn rollback(&mut self, checkpoint: Checkpoint) {
        self.objects.truncate(checkpoint.objects);
        self.by_name.retain(|_, id| id.0 < checkpoint.objects);
        self.table.truncate(checkpoint.symbols);
    }

    // -----------------------------------------------------------------------
    // Linking
    // -----------------------------------------------------------------------

    /// Check that every reference in `file` resolves to a non-reference
    /// construct and that no composite records the same field twice.
    fn link(&self, file: FileId) -> Result<(), EngineError> {
        let object = &self.objects[file.0];
        for (id, _) in object.references() {
            self.follow(ConstructRef { file, id })?;
        }
        for (id, construct) in object.constructs() {
            if construct.is_composite() {
                self.recorded_fields(ConstructRef { file, id }, 0)?;
            }
        }
        trace!(file = %object.name, "linked");
        Ok(())
    }

    /// Keys a match of the composite `at` records, looking through anonymous
    /// composites. Alternatives of a choice never match together, so only
    /// the children of a sequence can collide.
    fn recorded_fields(&self, at: ConstructRef, depth: usize) -> Result<Vec<String>, EngineError> {
        let construct = self.construct(at);
        let exclusive = matches!(construct.kind, ConstructKind::Choice);
        let mut fields: Vec<String> = Vec::new();
        if depth > MAX_DEPTH {
            // Left to the matcher, which reports the runaway expansion.
            return Ok(fields);
        }

        for &id in construct.children() {
            let child = ConstructRef { file: at.file, id };
            if self.construct(child).is_inert() {
                continue;
            }
            let recorded = match self.recorded_symbol(child)? {
                Some(symbol) => vec![symbol.to_string()],
                None => {
                    let target = self.follow(child)?;
                    if self.construct(target).is_composite() {
                        self.recorded_fields(target, depth + 1)?
                    } else {
                        Vec::new()
                    }
                }
            };
            for field in recorded {
                if !fields.contains(&field) {
                    fields.push(field);
                } else if !exclusive {
                    return Err(EngineError::FieldCollision {
                        field,
                        path: self.global_key(at),
                    });
                }
            }
        }
        Ok(fields)
    }

    /// Resolve a reference target as seen from `origin`.
    pub fn resolve(&self, target: &ReferenceTarget, origin: FileId) -> Option<ConstructRef> {
        let file = match target.file() {
            Some(file) => file,
            None => self.objects[origin.0].name.as_str(),
        };
        self.table.get(&SymbolTable::key(file, target.path()))
    }

    /// Resolve the `use` construct at `at` one hop.
    pub fn resolve_reference(&self, at: ConstructRef) -> Result<ConstructRef, EngineError> {
        let construct = self.construct(at);
        let ConstructKind::Reference { target } = &construct.kind else {
            return Ok(at);
        };
        self.resolve(target, at.file).ok_or_else(|| {
            let object = &self.objects[at.file.0];
            EngineError::UnresolvedReference {
                reference: construct
                    .attributes
                    .get("ref")
                    .cloned()
                    .unwrap_or_else(|| target.path().to_string()),
                file: object.name.clone(),
                file_id: object.file_id,
                span: construct.span.clone(),
            }
        })
    }

    /// Follow `use` hops until a construct that is not a reference.
    pub fn follow(&self, at: ConstructRef) -> Result<ConstructRef, EngineError> {
        let mut current = at;
        for _ in 0..MAX_DEPTH {
            if !matches!(self.construct(current).kind, ConstructKind::Reference { .. }) {
                return Ok(current);
            }
            current = self.resolve_reference(current)?;
        }
        Err(EngineError::RecursionLimit {
            path: self.global_key(at),
        })
    }

    /// The key under which a match of `at` is recorded by its parent.
    ///
    /// A `use` without a `name` of its own records under its target's symbol.
    pub fn recorded_symbol(&self, at: ConstructRef) -> Result<Option<&str>, EngineError> {
        let mut current = at;
        for _ in 0..MAX_DEPTH {
            let construct = self.construct(current);
            if let Some(symbol) = &construct.symbol {
                return Ok(Some(symbol.as_str()));
            }
            if !matches!(construct.kind, ConstructKind::Reference { .. }) {
                return Ok(None);
            }
            current = self.resolve_reference(current)?;
        }
        Err(EngineError::RecursionLimit {
            path: self.global_key(at),
        })
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("files", &self.by_name)
            .field("symbols", &self.table.len())
            .finish()
    }
}
