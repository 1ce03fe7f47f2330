//! Fragment scanner.
//!
//! Splits markup into raw text runs and the elements the engine cares about.
//! Everything that is not a `script`, `style`, `link` or `meta` start tag is
//! kept byte-for-byte as raw text, so rendering an untouched fragment
//! reproduces its input.

use crate::markup::element::{Attribute, Element};
use crate::markup::Node;

const TRACKED: &[&str] = &["script", "style", "link", "meta"];

pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Scan the whole input into nodes.
    pub fn run(mut self) -> Vec<Node> {
        let mut nodes = Vec::new();
        let mut raw = String::new();

        while self.pos < self.input.len() {
            let remaining = &self.input[self.pos..];
            let Some(lt) = remaining.find('<') else {
                raw.push_str(remaining);
                break;
            };
            raw.push_str(&remaining[..lt]);
            self.pos += lt;

            let remaining = &self.input[self.pos..];
            if remaining.starts_with("<!--") {
                let end = remaining.find("-->").map(|i| i + 3).unwrap_or(remaining.len());
                raw.push_str(&remaining[..end]);
                self.pos += end;
                continue;
            }

            match self.scan_tracked_element() {
                Some(element) => {
                    if !raw.is_empty() {
                        nodes.push(Node::Raw(std::mem::take(&mut raw)));
                    }
                    nodes.push(Node::Element(element));
                }
                None => {
                    raw.push('<');
                    self.pos += 1;
                }
            }
        }

        if !raw.is_empty() {
            nodes.push(Node::Raw(raw));
        }
        nodes
    }

    /// Try to read a tracked start tag at `self.pos`. Leaves `pos` untouched
    /// when the tag is not tracked or is malformed.
    fn scan_tracked_element(&mut self) -> Option<Element> {
        let remaining = &self.input[self.pos..];
        let name_len = remaining[1..]
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(remaining.len() - 1);
        let name = remaining[1..1 + name_len].to_ascii_lowercase();
        if !TRACKED.contains(&name.as_str()) {
            return None;
        }

        let after_name = &remaining[1 + name_len..];
        if !after_name.starts_with(|c: char| c.is_whitespace() || c == '>' || c == '/') {
            return None;
        }

        let tag_end = find_tag_end(after_name)?;
        let attributes = parse_attributes(&after_name[..tag_end]);
        let mut consumed = 1 + name_len + tag_end + 1;

        let content = if name == "script" || name == "style" {
            let body = &remaining[consumed..];
            let (text, close_len) = find_raw_text_end(body, &name)?;
            consumed += text.len() + close_len;
            Some(text.to_string())
        } else {
            None
        };

        self.pos += consumed;
        Some(Element::from_parts(name, attributes, content))
    }
}

/// Index of the `>` closing a start tag, skipping quoted attribute values.
fn find_tag_end(tag: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in tag.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}

/// Raw text up to the matching end tag, plus the end tag's length.
fn find_raw_text_end<'b>(body: &'b str, name: &str) -> Option<(&'b str, usize)> {
    let lower = body.to_ascii_lowercase();
    let needle = format!("</{}", name);
    let mut from = 0;
    while let Some(found) = lower[from..].find(&needle) {
        let start = from + found;
        let rest = &body[start + needle.len()..];
        if rest.starts_with(|c: char| c.is_whitespace() || c == '>' || c == '/') {
            let close = rest.find('>')?;
            return Some((&body[..start], needle.len() + close + 1));
        }
        from = start + needle.len();
    }
    None
}

fn parse_attributes(attr_str: &str) -> Vec<Attribute> {
    let mut attributes = Vec::new();
    let mut chars = attr_str.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() || c == '/' {
            chars.next();
            continue;
        }

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == '=' || c == '/' {
                break;
            }
            name.push(c);
            chars.next();
        }

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        let value = if chars.peek() == Some(&'=') {
            chars.next();
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            let mut value = String::new();
            match chars.peek() {
                Some(&quote) if quote == '"' || quote == '\'' => {
                    chars.next();
                    for c in chars.by_ref() {
                        if c == quote {
                            break;
                        }
                        value.push(c);
                    }
                }
                _ => {
                    while let Some(&c) = chars.peek() {
                        if c.is_whitespace() {
                            break;
                        }
                        value.push(c);
                        chars.next();
                    }
                }
            }
            Some(value)
        } else {
            None
        };

        if !name.is_empty() {
            attributes.push(Attribute {
                name: name.to_ascii_lowercase(),
                value,
            });
        }
    }

    attributes
}
