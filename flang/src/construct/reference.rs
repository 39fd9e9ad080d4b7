/// Separates the file identifier from the local path in a `use` target.
pub const FILE_SEPARATOR: char = ':';

/// The target of a `use` construct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceTarget {
    /// A dotted path within the referencing file: `root.defs.ident`
    Local(String),
    /// A dotted path within another file: `lib/idents.flang:idents.ident`
    External { file: String, path: String },
}

impl ReferenceTarget {
    /// Parse a `ref` attribute. The split happens at the last separator so
    /// that file identifiers may themselves contain one.
    pub fn parse(raw: &str) -> Self {
        match raw.rsplit_once(FILE_SEPARATOR) {
            Some((file, path)) => ReferenceTarget::External {
                file: normalize_file(file),
                path: path.to_string(),
            },
            None => ReferenceTarget::Local(raw.to_string()),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            ReferenceTarget::Local(path) => path,
            ReferenceTarget::External { path, .. } => path,
        }
    }

    pub fn file(&self) -> Option<&str> {
        match self {
            ReferenceTarget::Local(_) => None,
            ReferenceTarget::External { file, .. } => Some(file),
        }
    }

    /// The `file:path` dependency string recorded for external targets.
    pub fn dependency(&self) -> Option<String> {
        match self {
            ReferenceTarget::Local(_) => None,
            ReferenceTarget::External { file, path } => {
                Some(format!("{}{}{}", file, FILE_SEPARATOR, path))
            }
        }
    }
}

/// Canonical spelling of a file identifier.
pub fn normalize_file(file: &str) -> String {
    let mut file = file.trim();
    while let Some(rest) = file.strip_prefix("./") {
        file = rest;
    }
    file.to_string()
}
