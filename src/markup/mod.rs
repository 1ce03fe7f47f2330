//! Structured view of a rendered HTML response.
//!
//! # Responsibilities
//! - Split a buffered page into named regions (head, body-prepend, body,
//!   body-append)
//! - Expose the `script`, `style`, `link` and `meta` elements of each region
//!   for in-place rewriting
//! - Serialize back; text outside tracked elements is reproduced byte for byte
//!
//! # Design Decisions
//! - Not a general HTML parser: only tracked start tags become elements,
//!   everything else stays opaque text
//! - Script and style bodies are raw text, never scanned for tags

pub mod document;
pub mod element;
pub mod tokenizer;

pub use document::{Document, Region};
pub use element::{Attribute, Element};

use tokenizer::Tokenizer;

/// One piece of a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Raw(String),
}

/// A region of markup as a flat list of nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    nodes: Vec<Node>,
}

impl Fragment {
    pub fn parse(html: &str) -> Self {
        Self {
            nodes: Tokenizer::new(html).run(),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn push(&mut self, element: Element) {
        self.nodes.push(Node::Element(element));
    }

    pub fn insert_first(&mut self, element: Element) {
        self.nodes.insert(0, Node::Element(element));
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Raw(_) => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.nodes.iter_mut().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Raw(_) => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn render_into(&self, out: &mut String) {
        for node in &self.nodes {
            match node {
                Node::Element(element) => element.render_into(out),
                Node::Raw(raw) => out.push_str(raw),
            }
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }
}
