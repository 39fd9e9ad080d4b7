use std::collections::HashMap;
use std::ops::Range;

use crate::parser::error::ParseError;
use crate::tree::{ElementValue, IntermediateTreeElement};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Read a markup document holding exactly one root element.
pub fn parse_document(
    source: &str,
    file_id: usize,
) -> Result<IntermediateTreeElement, Vec<ParseError>> {
    let mut reader = Reader::new(source, file_id);
    reader.document().map_err(|e| vec![e])
}

// ---------------------------------------------------------------------------
// Reader state
// ---------------------------------------------------------------------------

struct Reader<'a> {
    source: &'a str,
    pos: usize,
    file_id: usize,
}

impl<'a> Reader<'a> {
    fn new(source: &'a str, file_id: usize) -> Self {
        // strip BOM
        let pos = if source.starts_with('\u{feff}') { 3 } else { 0 };
        Reader {
            source,
            pos,
            file_id,
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    /// Skip whitespace, returning whether any was skipped.
    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
        self.pos > start
    }

    /// A span covering the next character (or the end of input).
    fn here(&self) -> Range<usize> {
        let len = self.peek().map(|c| c.len_utf8()).unwrap_or(0);
        self.pos..self.pos + len
    }

    fn error(&self, message: impl Into<String>, span: Range<usize>) -> ParseError {
        ParseError::new(message, span, self.file_id)
    }

    // -----------------------------------------------------------------------
    // Document level
    // -----------------------------------------------------------------------

    fn document(&mut self) -> Result<IntermediateTreeElement, ParseError> {
        self.skip_misc()?;
        if self.at_end() {
            return Err(self.error("expected a root element", self.pos..self.pos));
        }
        if !self.starts_with("<") {
            return Err(self.error("text outside of the root element", self.here()));
        }

        let root = self.element()?;

        self.skip_misc()?;
        if !self.at_end() {
            return Err(self.error(
                "unexpected content after the root element",
                self.pos..self.source.len(),
            ));
        }
        Ok(root)
    }

    /// Skip whitespace, comments, processing instructions and doctypes.
    fn skip_misc(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_whitespace();
            if self.starts_with("<!--") {
                self.skip_past("<!--", "-->", "comment")?;
            } else if self.starts_with("<?") {
                self.skip_past("<?", "?>", "processing instruction")?;
            } else if self.starts_with("<!DOCTYPE") {
                self.skip_past("<!DOCTYPE", ">", "doctype declaration")?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_past(&mut self, open: &str, close: &str, what: &str) -> Result<(), ParseError> {
        let start = self.pos;
        match self.source[start + open.len()..].find(close) {
            Some(offset) => {
                self.pos = start + open.len() + offset + close.len();
                Ok(())
            }
            None => Err(self.error(format!("unterminated {}", what), start..self.source.len())),
        }
    }

    // -----------------------------------------------------------------------
    // Elements
    // -----------------------------------------------------------------------

    fn element(&mut self) -> Result<IntermediateTreeElement, ParseError> {
        let start = self.pos;
        self.eat("<");
        let name = self.name()?;
        let attributes = self.attributes(&name)?;

        if self.eat("/>") {
            return Ok(IntermediateTreeElement {
                name,
                value: ElementValue::Children(Vec::new()),
                attributes,
                span: start..self.pos,
            });
        }
        if !self.eat(">") {
            let message = if self.at_end() {
                format!("unterminated tag <{}>", name)
            } else {
                format!("expected '>' or '/>' to close <{}>", name)
            };
            return Err(self.error(message, self.here()));
        }

        let children = self.content(&name, start)?;
        Ok(IntermediateTreeElement {
            name,
            value: ElementValue::Children(children),
            attributes,
            span: start..self.pos,
        })
    }

    fn name(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => {}
            _ => return Err(self.error("expected a name", self.here())),
        }
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':') {
                self.bump();
            } else {
                break;
            }
        }
        Ok(self.source[start..self.pos].to_string())
    }

    fn attributes(&mut self, tag: &str) -> Result<HashMap<String, String>, ParseError> {
        let mut attributes = HashMap::new();
        loop {
            let had_space = self.skip_whitespace();
            if self.at_end() || self.starts_with("/>") || self.starts_with(">") {
                return Ok(attributes);
            }
            if !had_space {
                return Err(self.error(
                    format!("expected whitespace before attribute in <{}>", tag),
                    self.here(),
                ));
            }

            let key_start = self.pos;
            let key = self.name()?;
            self.skip_whitespace();
            if !self.eat("=") {
                return Err(self.error(
                    format!("expected '=' after attribute '{}'", key),
                    self.here(),
                ));
            }
            self.skip_whitespace();
            let value = self.quoted()?;

            if attributes.insert(key.clone(), value).is_some() {
                return Err(self.error(
                    format!("duplicate attribute '{}' in <{}>", key, tag),
                    key_start..self.pos,
                ));
            }
        }
    }

    fn quoted(&mut self) -> Result<String, ParseError> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected a quoted attribute value", self.here())),
        };
        let open = self.pos;
        self.bump();

        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.error("unterminated attribute value", open..self.pos));
                }
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(value);
                }
                Some('<') => {
                    return Err(self
                        .error("'<' is not allowed in attribute values", self.here())
                        .with_note("write it as &lt;"));
                }
                Some('&') => value.push(self.entity()?),
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
    }

    fn entity(&mut self) -> Result<char, ParseError> {
        let start = self.pos;
        let end = match self.rest().find(';') {
            Some(offset) if offset <= 12 => start + offset,
            _ => return Err(self.error("unterminated entity reference", self.here())),
        };
        let body = &self.source[start + 1..end];

        let decoded = match body {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => {
                let code = if let Some(hex) = body.strip_prefix("#x").or(body.strip_prefix("#X")) {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = body.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
            }
        };

        match decoded {
            Some(c) => {
                self.pos = end + 1;
                Ok(c)
            }
            None => Err(self.error(format!("unknown entity '&{};'", body), start..end + 1)),
        }
    }

    /// Read element content up to and including the matching closing tag.
    fn content(
        &mut self,
        tag: &str,
        open_start: usize,
    ) -> Result<Vec<IntermediateTreeElement>, ParseError> {
        let mut children = Vec::new();
        let mut text = String::new();
        let mut text_start: Option<usize> = None;

        loop {
            if self.at_end() {
                return Err(self.error(
                    format!("unclosed element <{}>", tag),
                    open_start..open_start + 1 + tag.len(),
                ));
            }

            if self.starts_with("</") {
                flush_text(&mut children, &mut text, &mut text_start, self.pos);
                let close_start = self.pos;
                self.pos += 2;
                let closing = self.name()?;
                self.skip_whitespace();
                if !self.eat(">") {
                    return Err(self.error(
                        format!("expected '>' after </{}", closing),
                        self.here(),
                    ));
                }
                if closing != tag {
                    return Err(self
                        .error(
                            format!(
                                "mismatched closing tag: expected </{}>, found </{}>",
                                tag, closing
                            ),
                            close_start..self.pos,
                        )
                        .with_note(format!("<{}> was opened at byte {}", tag, open_start)));
                }
                return Ok(children);
            } else if self.starts_with("<!--") {
                self.skip_past("<!--", "-->", "comment")?;
            } else if self.starts_with("<![CDATA[") {
                let open = self.pos;
                let body_start = open + "<![CDATA[".len();
                let Some(offset) = self.source[body_start..].find("]]>") else {
                    return Err(self.error("unterminated CDATA section", open..self.source.len()));
                };
                text_start.get_or_insert(open);
                text.push_str(&self.source[body_start..body_start + offset]);
                self.pos = body_start + offset + "]]>".len();
            } else if self.starts_with("<") {
                flush_text(&mut children, &mut text, &mut text_start, self.pos);
                children.push(self.element()?);
            } else if self.starts_with("&") {
                text_start.get_or_insert(self.pos);
                let c = self.entity()?;
                text.push(c);
            } else {
                text_start.get_or_insert(self.pos);
                if let Some(c) = self.bump() {
                    text.push(c);
                }
            }
        }
    }
}

/// Emit the pending text run as a `text` element. Empty runs are dropped.
fn flush_text(
    children: &mut Vec<IntermediateTreeElement>,
    text: &mut String,
    text_start: &mut Option<usize>,
    end: usize,
) {
    if let Some(start) = text_start.take() {
        if !text.is_empty() {
            children.push(IntermediateTreeElement::text(std::mem::take(text)).with_span(start..end));
        }
    }
    text.clear();
}
