use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use flang::BuildError;
use flang::parser::ParseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("cannot parse '{file}': {}", summarize(.errors))]
    Parse {
        file: String,
        errors: Vec<ParseError>,
    },

    #[error("malformed grammar in '{file}': {source}")]
    MalformedGrammar {
        file: String,
        file_id: usize,
        #[source]
        source: BuildError,
    },

    #[error("unresolved reference '{reference}' in '{file}'")]
    UnresolvedReference {
        reference: String,
        file: String,
        file_id: usize,
        span: Range<usize>,
    },

    #[error("ambiguous symbol '{key}' (defined twice, possibly a recursive import)")]
    AmbiguousSymbol { key: String },

    #[error("field '{field}' is recorded twice by '{path}'")]
    FieldCollision { field: String, path: String },

    #[error("no match for '{path}' at position {position}")]
    NoMatch { path: String, position: usize },

    #[error("'{path}' is a definition and cannot be matched directly")]
    NotMatchable { path: String },

    #[error("reference depth limit exceeded at '{path}'")]
    RecursionLimit { path: String },

    #[error("missing field '{field}' required by '{path}'")]
    MissingField { field: String, path: String },

    #[error("value {value:?} for field '{field}' does not match pattern '{pattern}'")]
    InvalidFieldValue {
        field: String,
        value: String,
        pattern: String,
    },

    #[error("no alternative of '{path}' can be generated")]
    NoAlternative { path: String },

    #[error("unused spec fields: {}", .leftover.join(", "))]
    SpecMismatch { leftover: Vec<String> },

    #[error("no samples recorded")]
    NoSamples,

    #[error("unknown grammar handle {0}")]
    UnknownGrammar(usize),
}

fn summarize(errors: &[ParseError]) -> String {
    match errors {
        [] => "no details".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}

impl EngineError {
    /// Diagnostics for errors that point into a source file.
    pub fn to_diagnostics(&self) -> Vec<Diagnostic<usize>> {
        match self {
            EngineError::Parse { errors, .. } => errors.iter().map(|e| e.to_diagnostic()).collect(),
            EngineError::MalformedGrammar {
                file_id, source, ..
            } => vec![source.to_diagnostic(*file_id)],
            EngineError::UnresolvedReference {
                reference,
                file_id,
                span,
                ..
            } => vec![
                Diagnostic::error()
                    .with_message(self.to_string())
                    .with_labels(vec![
                        Label::primary(*file_id, span.clone())
                            .with_message(format!("'{}' is not defined", reference)),
                    ]),
            ],
            _ => Vec::new(),
        }
    }

    /// Whether this is a (recoverable) matching failure.
    pub fn is_no_match(&self) -> bool {
        matches!(self, EngineError::NoMatch { .. })
    }
}
