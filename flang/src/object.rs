use indexmap::IndexMap;

use crate::construct::reference::ReferenceTarget;
use crate::construct::{Construct, ConstructId, ConstructKind};

/// One loaded grammar file: its construct arena and local symbol table.
#[derive(Debug, Clone)]
pub struct FlangObject {
    /// File identifier, the prefix of this file's global symbol keys.
    pub name: String,
    /// The codespan file id of the source, for diagnostics.
    pub file_id: usize,
    /// Path of the root component.
    pub root: String,
    /// Local path → construct, in construction order.
    pub symbols: IndexMap<String, ConstructId>,
    /// Every `file:path` reference made anywhere in the file.
    pub external_dependencies: Vec<String>,
    root_id: ConstructId,
    constructs: Vec<Construct>,
}

impl FlangObject {
    pub(crate) fn new(
        name: String,
        file_id: usize,
        root: String,
        root_id: ConstructId,
        symbols: IndexMap<String, ConstructId>,
        external_dependencies: Vec<String>,
        constructs: Vec<Construct>,
    ) -> Self {
        FlangObject {
            name,
            file_id,
            root,
            symbols,
            external_dependencies,
            root_id,
            constructs,
        }
    }

    pub fn root_id(&self) -> ConstructId {
        self.root_id
    }

    pub fn root_component(&self) -> &Construct {
        self.get(self.root_id)
    }

    /// Ids are only ever handed out by this object, so indexing cannot miss.
    pub fn get(&self, id: ConstructId) -> &Construct {
        &self.constructs[id.0]
    }

    pub fn lookup(&self, path: &str) -> Option<ConstructId> {
        self.symbols.get(path).copied()
    }

    pub fn parent(&self, id: ConstructId) -> Option<&Construct> {
        self.get(id).parent.map(|parent| self.get(parent))
    }

    pub fn constructs(&self) -> impl Iterator<Item = (ConstructId, &Construct)> {
        self.constructs
            .iter()
            .enumerate()
            .map(|(idx, construct)| (ConstructId(idx), construct))
    }

    /// All `use` constructs with their targets.
    pub fn references(&self) -> impl Iterator<Item = (ConstructId, &ReferenceTarget)> {
        self.constructs().filter_map(|(id, construct)| match &construct.kind {
            ConstructKind::Reference { target } => Some((id, target)),
            _ => None,
        })
    }
}
