use flang::ConstructKind;
use indexmap::IndexMap;
use tracing::trace;

use crate::error::EngineError;
use crate::match_object::{MatchContent, MatchObject};
use crate::registry::{ConstructRef, FileId, MAX_DEPTH, Registry};

/// Forward pass: text → match tree.
///
/// Children are matched strictly left to right and a failing child fails
/// its parent on the spot; there is no backtracking.
pub struct Matcher<'a> {
    registry: &'a Registry,
    /// Raise `NoMatch` at the first unmatched child instead of returning `None`.
    strict: bool,
}

impl<'a> Matcher<'a> {
    pub fn new(registry: &'a Registry, strict: bool) -> Self {
        Matcher { registry, strict }
    }

    /// Match the root component of `file` at offset 0.
    ///
    /// Unless `allow_trailing` is set the match must cover the whole text.
    pub fn run(
        &self,
        file: FileId,
        text: &str,
        allow_trailing: bool,
    ) -> Result<Option<MatchObject>, EngineError> {
        let root = self.registry.root(file)?;
        if !self.registry.construct(root).is_matchable() {
            return Err(EngineError::NotMatchable {
                path: self.registry.global_key(root),
            });
        }

        match self.match_construct(root, text, 0, 0)? {
            Some(found) if allow_trailing || found.position.end == text.len() => Ok(Some(found)),
            Some(found) => {
                trace!(end = found.position.end, len = text.len(), "unconsumed input");
                self.fail(root, found.position.end)
            }
            None => self.fail(root, 0),
        }
    }

    pub fn match_construct(
        &self,
        at: ConstructRef,
        text: &str,
        start: usize,
        depth: usize,
    ) -> Result<Option<MatchObject>, EngineError> {
        if depth > MAX_DEPTH {
            return Err(EngineError::RecursionLimit {
                path: self.registry.global_key(at),
            });
        }

        let construct = self.registry.construct(at);
        trace!(path = %construct.path, start, "match");

        match &construct.kind {
            ConstructKind::RawText => {
                let value = construct.value().unwrap_or_default();
                Ok(text
                    .get(start..)
                    .filter(|rest| rest.starts_with(value))
                    .map(|_| MatchObject::leaf(start, value)))
            }
            ConstructKind::Predicate { pattern } => Ok(pattern
                .match_at(text, start)
                .map(|end| MatchObject::leaf(start, &text[start..end]))),
            ConstructKind::Component { .. } => self.match_sequence(at, text, start, depth),
            ConstructKind::Choice => self.match_choice(at, text, start, depth),
            ConstructKind::Reference { .. } => {
                let target = self.registry.resolve_reference(at)?;
                self.match_construct(target, text, start, depth + 1)
            }
            ConstructKind::Rule => Ok(Some(MatchObject::composite(start, start, IndexMap::new()))),
        }
    }

    fn match_sequence(
        &self,
        at: ConstructRef,
        text: &str,
        start: usize,
        depth: usize,
    ) -> Result<Option<MatchObject>, EngineError> {
        let mut fields = IndexMap::new();
        let mut cursor = start;

        for &id in self.registry.construct(at).children() {
            let child = ConstructRef { file: at.file, id };
            if self.registry.construct(child).is_inert() {
                continue;
            }
            match self.match_construct(child, text, cursor, depth + 1)? {
                Some(found) => {
                    cursor = found.position.end;
                    self.record(&mut fields, child, found)?;
                }
                None => return self.fail(child, cursor),
            }
        }

        Ok(Some(MatchObject::composite(start, cursor, fields)))
    }

    /// First alternative that matches wins. Alternatives are probed
    /// leniently whatever the strictness, the choice itself then fails
    /// like any other child.
    fn match_choice(
        &self,
        at: ConstructRef,
        text: &str,
        start: usize,
        depth: usize,
    ) -> Result<Option<MatchObject>, EngineError> {
        let probe = Matcher::new(self.registry, false);

        for &id in self.registry.construct(at).children() {
            let alternative = ConstructRef { file: at.file, id };
            if self.registry.construct(alternative).is_inert() {
                continue;
            }
            if let Some(found) = probe.match_construct(alternative, text, start, depth + 1)? {
                let end = found.position.end;
                let mut fields = IndexMap::new();
                self.record(&mut fields, alternative, found)?;
                return Ok(Some(MatchObject::composite(start, end, fields)));
            }
        }
        Ok(None)
    }

    /// Store a child match under its symbol; anonymous composites are
    /// spliced into the parent, anonymous leaves only consume input.
    fn record(
        &self,
        fields: &mut IndexMap<String, MatchObject>,
        child: ConstructRef,
        found: MatchObject,
    ) -> Result<(), EngineError> {
        match self.registry.recorded_symbol(child)? {
            Some(symbol) => {
                fields.insert(symbol.to_string(), found);
            }
            None => {
                if let MatchContent::Fields(nested) = found.content {
                    fields.extend(nested);
                }
            }
        }
        Ok(())
    }

    fn fail(&self, at: ConstructRef, position: usize) -> Result<Option<MatchObject>, EngineError> {
        if self.strict {
            Err(EngineError::NoMatch {
                path: self.registry.global_key(at),
                position,
            })
        } else {
            Ok(None)
        }
    }
}
