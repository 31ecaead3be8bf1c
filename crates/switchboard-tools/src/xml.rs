//! Minimal, non-validating XML element reader for tool-call markup.
//!
//! Handles elements, attributes, text, CDATA, comments, processing
//! instructions and the predefined/numeric entities. DTDs are skipped, never
//! interpreted. Anything else is reported as malformed.

use std::fmt;

/// Deepest element nesting accepted. Tool calls need three levels.
const MAX_DEPTH: usize = 64;

/// A parsed element. Names are local names (any `prefix:` is dropped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// Concatenated text of all descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct XmlError {
    pub message: String,
    pub offset: usize,
}

impl fmt::Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.message, self.offset)
    }
}

impl std::error::Error for XmlError {}

/// Parses one or more sibling root elements. Whitespace, comments and
/// processing instructions may surround them; any other top-level text is an
/// error.
pub(crate) fn parse_fragment(input: &str) -> Result<Vec<Element>, XmlError> {
    let mut reader = Reader {
        src: input,
        pos: 0,
        depth: 0,
    };
    let mut roots = Vec::new();
    loop {
        reader.skip_misc()?;
        if reader.at_end() {
            break;
        }
        if !reader.starts_with("<") {
            return Err(reader.error("text outside of an element"));
        }
        roots.push(reader.element()?);
    }
    if roots.is_empty() {
        return Err(reader.error("no root element"));
    }
    Ok(roots)
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn error(&self, message: &str) -> XmlError {
        XmlError {
            message: message.to_string(),
            offset: self.pos,
        }
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
        self.pos += rest.len() - trimmed.len();
    }

    /// Advances past `terminator`, returning the text before it.
    fn until(&mut self, terminator: &str, what: &str) -> Result<&'a str, XmlError> {
        match self.rest().find(terminator) {
            Some(idx) => {
                let body = &self.rest()[..idx];
                self.pos += idx + terminator.len();
                Ok(body)
            }
            None => Err(self.error(&format!("unterminated {what}"))),
        }
    }

    fn skip_misc(&mut self) -> Result<(), XmlError> {
        loop {
            self.skip_ws();
            if self.starts_with("<!--") {
                self.pos += 4;
                self.until("-->", "comment")?;
            } else if self.starts_with("<?") {
                self.pos += 2;
                self.until("?>", "processing instruction")?;
            } else if self.starts_with("<!DOCTYPE") {
                self.until(">", "doctype")?;
            } else {
                return Ok(());
            }
        }
    }

    fn name(&mut self) -> Result<&'a str, XmlError> {
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '/' | '>' | '=' | '<'))
            .unwrap_or(rest.len());
        let name = &rest[..end];
        match name.chars().next() {
            Some(c) if c.is_alphabetic() || c == '_' || c == ':' => {
                self.pos += end;
                Ok(name)
            }
            _ => Err(self.error("invalid name")),
        }
    }

    fn element(&mut self) -> Result<Element, XmlError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("elements nested too deeply"));
        }
        self.depth += 1;
        let element = self.element_body();
        self.depth -= 1;
        element
    }

    fn element_body(&mut self) -> Result<Element, XmlError> {
        self.pos += 1; // '<'
        let qualified = self.name()?;
        let mut element = Element {
            name: local_name(qualified).to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        };

        loop {
            self.skip_ws();
            if self.starts_with("/>") {
                self.pos += 2;
                return Ok(element);
            }
            if self.starts_with(">") {
                self.pos += 1;
                break;
            }
            if self.at_end() {
                return Err(self.error("unterminated start tag"));
            }
            let key = local_name(self.name()?).to_string();
            self.skip_ws();
            if !self.starts_with("=") {
                return Err(self.error("expected '=' after attribute name"));
            }
            self.pos += 1;
            self.skip_ws();
            let quote = match self.rest().chars().next() {
                Some(q @ ('"' | '\'')) => q,
                _ => return Err(self.error("attribute value must be quoted")),
            };
            self.pos += 1;
            let raw = self.until(if quote == '"' { "\"" } else { "'" }, "attribute value")?;
            if raw.contains('<') {
                return Err(self.error("'<' in attribute value"));
            }
            if element.attr(&key).is_some() {
                return Err(self.error("duplicate attribute"));
            }
            let value = decode_entities(raw).map_err(|m| self.error(&m))?;
            element.attributes.push((key, value));
        }

        loop {
            if self.at_end() {
                return Err(self.error(&format!("unclosed element <{qualified}>")));
            }
            if self.starts_with("</") {
                self.pos += 2;
                let closing = self.name()?;
                self.skip_ws();
                if !self.starts_with(">") {
                    return Err(self.error("malformed end tag"));
                }
                self.pos += 1;
                if closing != qualified {
                    return Err(self.error(&format!(
                        "mismatched end tag </{closing}> for <{qualified}>"
                    )));
                }
                return Ok(element);
            }
            if self.starts_with("<!--") {
                self.pos += 4;
                self.until("-->", "comment")?;
            } else if self.starts_with("<![CDATA[") {
                self.pos += 9;
                let data = self.until("]]>", "CDATA section")?;
                push_text(&mut element, data.to_string());
            } else if self.starts_with("<?") {
                self.pos += 2;
                self.until("?>", "processing instruction")?;
            } else if self.starts_with("<") {
                let child = self.element()?;
                element.children.push(Node::Element(child));
            } else {
                let rest = self.rest();
                let end = rest.find('<').unwrap_or(rest.len());
                let raw = &rest[..end];
                let text = decode_entities(raw).map_err(|m| self.error(&m))?;
                self.pos += end;
                push_text(&mut element, text);
            }
        }
    }
}

fn push_text(element: &mut Element, text: String) {
    if let Some(Node::Text(prev)) = element.children.last_mut() {
        prev.push_str(&text);
    } else {
        element.children.push(Node::Text(text));
    }
}

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

fn decode_entities(raw: &str) -> Result<String, String> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| "unterminated entity reference".to_string())?;
        let entity = &after[..semi];
        let decoded = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| format!("unknown entity '&{entity};'"))?
            }
        };
        out.push(decoded);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
