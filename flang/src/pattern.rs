use regex::Regex;

/// Named sub-patterns any predicate may reference as `{name}`.
pub const BUILTIN_PATTERNS: &[(&str, &str)] = &[
    ("vname", r"[A-Za-z]\w+"),
    ("number", r"-?(([1-9]+\d*)|0)(\.\d*)?"),
    ("string", r#""[^"]*"|'[^']*'"#),
];

pub fn builtin(name: &str) -> Option<&'static str> {
    BUILTIN_PATTERNS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, pattern)| *pattern)
}

/// Substitute `{name}` placeholders with their builtin sub-patterns.
///
/// Each substitution is wrapped in a non-capturing group. Braces that do not
/// name a builtin (e.g. the repetition in `\d{2,4}`) are left untouched.
pub fn expand(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let substituted = after
            .find('}')
            .and_then(|close| builtin(&after[..close]).map(|p| (close, p)));

        match substituted {
            Some((close, pattern)) => {
                out.push_str("(?:");
                out.push_str(pattern);
                out.push(')');
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// A predicate's compiled pattern.
#[derive(Debug, Clone)]
pub struct PredicatePattern {
    raw: String,
    /// Anchored at the start of the haystack.
    prefix: Regex,
    /// Anchored at both ends.
    whole: Regex,
}

impl PredicatePattern {
    pub fn compile(raw: &str) -> Result<Self, regex::Error> {
        let expanded = expand(raw);
        Ok(PredicatePattern {
            raw: raw.to_string(),
            prefix: Regex::new(&format!(r"\A(?:{})", expanded))?,
            whole: Regex::new(&format!(r"\A(?:{})\z", expanded))?,
        })
    }

    /// The pattern as written by the grammar author.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Match anchored at byte offset `start`, returning the end offset.
    pub fn match_at(&self, text: &str, start: usize) -> Option<usize> {
        let haystack = text.get(start..)?;
        self.prefix.find(haystack).map(|m| start + m.end())
    }

    /// Whether `value` is, in its entirety, something this pattern matches.
    pub fn accepts(&self, value: &str) -> bool {
        self.whole.is_match(value)
    }
}
