use flang::ConstructKind;
use tracing::trace;

use crate::error::EngineError;
use crate::registry::{ConstructRef, FileId, MAX_DEPTH, Registry};
use crate::spec::{Spec, enter_scope, leave_scope, mentions};

/// Backward pass: spec → text, the inverse of [`crate::matcher::Matcher`].
///
/// Every step returns a fresh remaining spec; the caller's mapping is never
/// touched.
pub struct Generator<'a> {
    registry: &'a Registry,
}

impl<'a> Generator<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Generator { registry }
    }

    /// Generate the root component of `file`. With `strict_spec`, fields
    /// left unused are an error.
    pub fn run(&self, file: FileId, spec: &Spec, strict_spec: bool) -> Result<String, EngineError> {
        let root = self.registry.root(file)?;
        if !self.registry.construct(root).is_matchable() {
            return Err(EngineError::NotMatchable {
                path: self.registry.global_key(root),
            });
        }

        // The root is not namespaced: its fields are the top-level keys.
        let (text, leftover) = self.generate_body(root, spec, 0)?;
        if strict_spec && !leftover.is_empty() {
            return Err(EngineError::SpecMismatch {
                leftover: leftover.into_keys().collect(),
            });
        }
        Ok(text)
    }

    /// Generate `at` as seen from its parent, i.e. under its recorded symbol.
    pub fn generate_child(
        &self,
        at: ConstructRef,
        spec: &Spec,
        depth: usize,
    ) -> Result<(String, Spec), EngineError> {
        let symbol = self.registry.recorded_symbol(at)?;
        let target = self.registry.follow(at)?;
        let construct = self.registry.construct(target);

        match &construct.kind {
            ConstructKind::RawText => Ok((
                construct.value().unwrap_or_default().to_string(),
                spec.clone(),
            )),
            ConstructKind::Predicate { pattern } => {
                let field = symbol.ok_or_else(|| EngineError::MissingField {
                    field: construct.path.clone(),
                    path: self.registry.global_key(at),
                })?;
                let value = spec.get(field).ok_or_else(|| EngineError::MissingField {
                    field: field.to_string(),
                    path: self.registry.global_key(at),
                })?;
                if !pattern.accepts(value) {
                    return Err(EngineError::InvalidFieldValue {
                        field: field.to_string(),
                        value: value.clone(),
                        pattern: pattern.raw().to_string(),
                    });
                }
                let mut remaining = spec.clone();
                remaining.remove(field);
                Ok((value.clone(), remaining))
            }
            ConstructKind::Component { .. } | ConstructKind::Choice => match symbol {
                Some(scope) => {
                    let (inner, outer) = enter_scope(spec, scope);
                    let (text, leftover) = self.generate_body(target, &inner, depth + 1)?;
                    Ok((text, leave_scope(leftover, outer, scope)))
                }
                None => self.generate_body(target, spec, depth + 1),
            },
            // Matches nothing; a named use of a rule still records a marker.
            ConstructKind::Rule => match symbol {
                Some(scope) => {
                    let (inner, outer) = enter_scope(spec, scope);
                    Ok((String::new(), leave_scope(inner, outer, scope)))
                }
                None => Ok((String::new(), spec.clone())),
            },
            ConstructKind::Reference { .. } => Ok((String::new(), spec.clone())),
        }
    }

    /// Generate the children of a composite against an already scoped spec.
    fn generate_body(
        &self,
        at: ConstructRef,
        spec: &Spec,
        depth: usize,
    ) -> Result<(String, Spec), EngineError> {
        if depth > MAX_DEPTH {
            return Err(EngineError::RecursionLimit {
                path: self.registry.global_key(at),
            });
        }

        let construct = self.registry.construct(at);
        trace!(path = %construct.path, fields = spec.len(), "generate");

        let children: Vec<ConstructRef> = construct
            .children()
            .iter()
            .map(|&id| ConstructRef { file: at.file, id })
            .filter(|child| !self.registry.construct(*child).is_inert())
            .collect();

        match &construct.kind {
            ConstructKind::Choice => self.generate_choice(at, &children, spec, depth),
            _ => {
                let mut text = String::new();
                let mut remaining = spec.clone();
                for child in children {
                    let (chunk, rest) = self.generate_child(child, &remaining, depth)?;
                    text.push_str(&chunk);
                    remaining = rest;
                }
                Ok((text, remaining))
            }
        }
    }

    /// When the fields mention any alternative only those are tried,
    /// otherwise every alternative is, in declaration order. The first that
    /// generates wins; if none does, the first error is returned.
    fn generate_choice(
        &self,
        at: ConstructRef,
        alternatives: &[ConstructRef],
        spec: &Spec,
        depth: usize,
    ) -> Result<(String, Spec), EngineError> {
        let mut preferred = Vec::new();
        let mut others = Vec::new();
        for &alternative in alternatives {
            match self.registry.recorded_symbol(alternative)? {
                Some(symbol) if mentions(spec, symbol) => preferred.push(alternative),
                _ => others.push(alternative),
            }
        }

        let candidates = if preferred.is_empty() { others } else { preferred };

        let mut first_error = None;
        for alternative in candidates {
            match self.generate_child(alternative, spec, depth) {
                Ok(generated) => return Ok(generated),
                Err(error) => {
                    trace!(%error, "alternative rejected");
                    first_error.get_or_insert(error);
                }
            }
        }

        Err(first_error.unwrap_or_else(|| EngineError::NoAlternative {
            path: self.registry.global_key(at),
        }))
    }
}
