use std::fmt;

use indexmap::IndexMap;

use crate::spec::Spec;

/// Byte offsets of a match within the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub start: usize,
    /// Exclusive.
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchContent {
    /// Text matched by a leaf.
    Matched(String),
    /// Child symbol → nested match, in match order.
    Fields(IndexMap<String, MatchObject>),
}

/// The result of matching one construct. Its shape mirrors the grammar.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchObject {
    pub position: Position,
    pub content: MatchContent,
}

impl MatchObject {
    pub fn leaf(start: usize, matched: impl Into<String>) -> Self {
        let matched = matched.into();
        MatchObject {
            position: Position {
                start,
                end: start + matched.len(),
            },
            content: MatchContent::Matched(matched),
        }
    }

    pub fn composite(start: usize, end: usize, fields: IndexMap<String, MatchObject>) -> Self {
        MatchObject {
            position: Position { start, end },
            content: MatchContent::Fields(fields),
        }
    }

    /// The matched text of a leaf.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MatchContent::Matched(s) => Some(s),
            MatchContent::Fields(_) => None,
        }
    }

    pub fn fields(&self) -> Option<&IndexMap<String, MatchObject>> {
        match &self.content {
            MatchContent::Fields(fields) => Some(fields),
            MatchContent::Matched(_) => None,
        }
    }

    /// Look up a nested match by dotted path.
    pub fn get(&self, path: &str) -> Option<&MatchObject> {
        path.split('.')
            .try_fold(self, |current, segment| current.fields()?.get(segment))
    }

    /// Flatten into a spec with dotted keys.
    ///
    /// A nested composite that recorded nothing still leaves its key behind
    /// (with an empty value) so that generation can tell it was chosen.
    pub fn to_flat_dict(&self) -> Spec {
        let mut spec = Spec::new();
        if let MatchContent::Fields(fields) = &self.content {
            for (key, child) in fields {
                flatten_into(&mut spec, key, child);
            }
        }
        spec
    }
}

fn flatten_into(spec: &mut Spec, prefix: &str, object: &MatchObject) {
    match &object.content {
        MatchContent::Matched(s) => {
            spec.insert(prefix.to_string(), s.clone());
        }
        MatchContent::Fields(fields) if fields.is_empty() => {
            spec.insert(prefix.to_string(), String::new());
        }
        MatchContent::Fields(fields) => {
            for (key, child) in fields {
                flatten_into(spec, &format!("{}.{}", prefix, key), child);
            }
        }
    }
}

impl fmt::Display for MatchObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_tree(f, None, self, 0)
    }
}

fn write_tree(
    f: &mut fmt::Formatter<'_>,
    key: Option<&str>,
    object: &MatchObject,
    indent: usize,
) -> fmt::Result {
    let pad = "  ".repeat(indent);
    let label = key.map(|k| format!("{}: ", k)).unwrap_or_default();
    let Position { start, end } = object.position;
    match &object.content {
        MatchContent::Matched(s) => writeln!(f, "{}{}{:?} [{}..{}]", pad, label, s, start, end),
        MatchContent::Fields(fields) => {
            writeln!(f, "{}{}[{}..{}]", pad, label, start, end)?;
            for (child_key, child) in fields {
                write_tree(f, Some(child_key), child, indent + 1)?;
            }
            Ok(())
        }
    }
}
