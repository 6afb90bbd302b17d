//! Streaming tokenizer for graph scripts
//!
//! The script language looks like XML but carries its own semantics, so we
//! scan it ourselves rather than delegating to an XML library. The scanner
//! produces a lightweight element tree; property expansion and condition
//! evaluation are layered on top by the reader.

use anyhow::{bail, Result};

/// One element of the document: name, raw attributes and children.
///
/// Attribute values are entity-decoded but not property-expanded; the reader
/// expands them at evaluation time (macro bodies are re-expanded per
/// instantiation).
#[derive(Debug, Clone)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// 1-based line of the opening tag, for diagnostics
    pub line: usize,
}

impl Element {
    /// Raw attribute value by (case-insensitive) name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

struct Scanner<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        if byte == b'\n' {
            self.line += 1;
        }
        self.pos += 1;
        Some(byte)
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.bytes[self.pos..].starts_with(prefix.as_bytes())
    }

    fn skip_past(&mut self, terminator: &str) -> Result<()> {
        let start_line = self.line;
        while self.pos < self.bytes.len() {
            if self.starts_with(terminator) {
                for _ in 0..terminator.len() {
                    self.advance();
                }
                return Ok(());
            }
            self.advance();
        }
        bail!("line {start_line}: unterminated construct (expected '{terminator}')");
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.advance();
        }
    }

    fn scan_name(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            let c = byte as char;
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                self.advance();
            } else {
                break;
            }
        }
        if start == self.pos {
            bail!("line {}: expected a name", self.line);
        }
        Ok(self.text[start..self.pos].to_string())
    }

    fn scan_quoted(&mut self) -> Result<String> {
        let quote = match self.advance() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => bail!("line {}: expected a quoted attribute value", self.line),
        };
        let start_line = self.line;
        let mut value: Vec<u8> = Vec::new();
        loop {
            match self.advance() {
                Some(byte) if byte == quote => break,
                Some(b'&') => {
                    let mut buf = [0u8; 4];
                    value.extend_from_slice(self.scan_entity()?.encode_utf8(&mut buf).as_bytes());
                }
                Some(byte) => value.push(byte),
                None => bail!("line {start_line}: unterminated attribute value"),
            }
        }
        String::from_utf8(value)
            .map_err(|_| anyhow::anyhow!("line {start_line}: attribute value is not valid UTF-8"))
    }

    fn scan_entity(&mut self) -> Result<char> {
        let start = self.pos;
        let start_line = self.line;
        while let Some(byte) = self.peek() {
            if byte == b';' {
                let entity = &self.text[start..self.pos];
                self.advance();
                return match entity {
                    "amp" => Ok('&'),
                    "lt" => Ok('<'),
                    "gt" => Ok('>'),
                    "quot" => Ok('"'),
                    "apos" => Ok('\''),
                    _ => bail!("line {start_line}: unknown entity '&{entity};'"),
                };
            }
            if self.pos - start > 8 {
                break;
            }
            self.advance();
        }
        bail!("line {start_line}: unterminated entity reference");
    }

    /// Scan one `<Name attr="value" ...>` tag, returning the element (without
    /// children) and whether it was self-closing.
    fn scan_open_tag(&mut self) -> Result<(Element, bool)> {
        let line = self.line;
        self.advance(); // consume '<'
        let name = self.scan_name()?;
        let mut attrs = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'>') => {
                    self.advance();
                    return Ok((
                        Element {
                            name,
                            attrs,
                            children: Vec::new(),
                            line,
                        },
                        false,
                    ));
                }
                Some(b'/') => {
                    self.advance();
                    if self.peek() != Some(b'>') {
                        bail!("line {}: expected '>' after '/'", self.line);
                    }
                    self.advance();
                    return Ok((
                        Element {
                            name,
                            attrs,
                            children: Vec::new(),
                            line,
                        },
                        true,
                    ));
                }
                Some(_) => {
                    let attr_name = self.scan_name()?;
                    self.skip_whitespace();
                    if self.peek() != Some(b'=') {
                        bail!(
                            "line {}: attribute '{attr_name}' is missing '=\"value\"'",
                            self.line
                        );
                    }
                    self.advance();
                    self.skip_whitespace();
                    let value = self.scan_quoted()?;
                    if attrs
                        .iter()
                        .any(|(existing, _): &(String, String)| existing.eq_ignore_ascii_case(&attr_name))
                    {
                        bail!("line {}: duplicate attribute '{attr_name}'", self.line);
                    }
                    attrs.push((attr_name, value));
                }
                None => bail!("line {line}: unterminated tag <{name}"),
            }
        }
    }

    fn scan_close_tag(&mut self) -> Result<String> {
        self.advance(); // '<'
        self.advance(); // '/'
        let name = self.scan_name()?;
        self.skip_whitespace();
        if self.peek() != Some(b'>') {
            bail!("line {}: malformed closing tag </{name}", self.line);
        }
        self.advance();
        Ok(name)
    }
}

/// Parse a whole document into its single root element
pub fn parse_document(text: &str) -> Result<Element> {
    let mut scanner = Scanner::new(text);
    let mut root: Option<Element> = None;
    // (element, expected close name) for each open tag
    let mut stack: Vec<Element> = Vec::new();

    loop {
        scanner.skip_whitespace();
        let Some(byte) = scanner.peek() else {
            break;
        };
        if byte != b'<' {
            // Free text between elements carries no meaning in this language
            let line = scanner.line;
            bail!("line {line}: unexpected text outside of a tag");
        }

        if scanner.starts_with("<!--") {
            scanner.skip_past("-->")?;
            continue;
        }
        if scanner.starts_with("<?") {
            scanner.skip_past("?>")?;
            continue;
        }
        if scanner.starts_with("<!") {
            scanner.skip_past(">")?;
            continue;
        }

        if scanner.starts_with("</") {
            let line = scanner.line;
            let name = scanner.scan_close_tag()?;
            let Some(element) = stack.pop() else {
                bail!("line {line}: closing tag </{name}> with no open element");
            };
            if !element.name.eq_ignore_ascii_case(&name) {
                bail!(
                    "line {line}: closing tag </{name}> does not match <{}> (line {})",
                    element.name,
                    element.line
                );
            }
            attach(&mut stack, &mut root, element, line)?;
            continue;
        }

        let (element, self_closing) = scanner.scan_open_tag()?;
        if self_closing {
            let line = element.line;
            attach(&mut stack, &mut root, element, line)?;
        } else {
            stack.push(element);
        }
    }

    if let Some(open) = stack.last() {
        bail!("line {}: element <{}> is never closed", open.line, open.name);
    }
    match root {
        Some(root) => Ok(root),
        None => bail!("Document contains no elements"),
    }
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
    line: usize,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None => {
            if root.is_some() {
                bail!("line {line}: multiple root elements");
            }
            *root = Some(element);
            Ok(())
        }
    }
}
