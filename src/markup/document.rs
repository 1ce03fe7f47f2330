//! Page-level document split into regions.

use crate::markup::{Element, Fragment};

/// Named insertion regions of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Head,
    BodyPrepend,
    Body,
    BodyAppend,
}

impl Region {
    pub const ALL: [Region; 4] = [
        Region::Head,
        Region::BodyPrepend,
        Region::Body,
        Region::BodyAppend,
    ];
}

/// A rendered page. The `shell_*` strings are the markup around the regions
/// (`<html><head>`, `</head><body>`, `</body></html>`) and are never touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    shell_open: String,
    head: Fragment,
    shell_middle: String,
    body_prepend: Fragment,
    body: Fragment,
    body_append: Fragment,
    shell_close: String,
}

impl Document {
    /// Split a full page. Input without `<head>`/`<body>` tags ends up
    /// entirely in the body region.
    pub fn parse(html: &str) -> Self {
        let lower = html.to_ascii_lowercase();

        let mut cursor = 0;
        let mut shell_open = String::new();
        let mut head = Fragment::default();

        if let Some(head_open_end) = find_open_tag(&lower, "head", 0) {
            if let Some(head_close) = lower[head_open_end..].find("</head").map(|i| head_open_end + i) {
                shell_open = html[..head_open_end].to_string();
                head = Fragment::parse(&html[head_open_end..head_close]);
                cursor = head_close;
            }
        }

        let body_bounds = find_open_tag(&lower, "body", cursor).and_then(|open_end| {
            lower
                .rfind("</body")
                .filter(|close| *close >= open_end)
                .map(|close| (open_end, close))
        });

        match body_bounds {
            Some((open_end, close)) => Self {
                shell_open,
                head,
                shell_middle: html[cursor..open_end].to_string(),
                body_prepend: Fragment::default(),
                body: Fragment::parse(&html[open_end..close]),
                body_append: Fragment::default(),
                shell_close: html[close..].to_string(),
            },
            None => {
                let body_start = match lower[cursor..].find('>') {
                    Some(i) if cursor > 0 => cursor + i + 1,
                    _ => cursor,
                };
                Self {
                    shell_open,
                    head,
                    shell_middle: html[cursor..body_start].to_string(),
                    body_prepend: Fragment::default(),
                    body: Fragment::parse(&html[body_start..]),
                    body_append: Fragment::default(),
                    shell_close: String::new(),
                }
            }
        }
    }

    /// Assemble a document from already separated regions.
    pub fn from_regions(head: &str, body_prepend: &str, body: &str, body_append: &str) -> Self {
        Self {
            head: Fragment::parse(head),
            body_prepend: Fragment::parse(body_prepend),
            body: Fragment::parse(body),
            body_append: Fragment::parse(body_append),
            ..Default::default()
        }
    }

    pub fn region(&self, region: Region) -> &Fragment {
        match region {
            Region::Head => &self.head,
            Region::BodyPrepend => &self.body_prepend,
            Region::Body => &self.body,
            Region::BodyAppend => &self.body_append,
        }
    }

    pub fn region_mut(&mut self, region: Region) -> &mut Fragment {
        match region {
            Region::Head => &mut self.head,
            Region::BodyPrepend => &mut self.body_prepend,
            Region::Body => &mut self.body,
            Region::BodyAppend => &mut self.body_append,
        }
    }

    /// Tracked elements of every region, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.head
            .elements()
            .chain(self.body_prepend.elements())
            .chain(self.body.elements())
            .chain(self.body_append.elements())
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.head
            .elements_mut()
            .chain(self.body_prepend.elements_mut())
            .chain(self.body.elements_mut())
            .chain(self.body_append.elements_mut())
    }

    /// Insert an element as the first child of the head region.
    pub fn insert_head_first(&mut self, element: Element) {
        self.head.insert_first(element);
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.shell_open.len() + self.shell_close.len() + 1024);
        out.push_str(&self.shell_open);
        self.head.render_into(&mut out);
        out.push_str(&self.shell_middle);
        self.body_prepend.render_into(&mut out);
        self.body.render_into(&mut out);
        self.body_append.render_into(&mut out);
        out.push_str(&self.shell_close);
        out
    }
}

/// Byte offset just past the `>` of the first `<name ...>` start tag at or
/// after `from`. `lower` must already be ASCII-lowercased.
fn find_open_tag(lower: &str, name: &str, from: usize) -> Option<usize> {
    let needle = format!("<{}", name);
    let mut search = from;
    while let Some(found) = lower[search..].find(&needle) {
        let start = search + found;
        let after = start + needle.len();
        if lower[after..].starts_with(|c: char| c.is_whitespace() || c == '>') {
            return lower[after..].find('>').map(|i| after + i + 1);
        }
        search = after;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html><html><HEAD><title>t</title><link rel="stylesheet" href="/a.css"></HEAD><body class="x"><header>h</header><script>boot()</script></body></html>"#;

    #[test]
    fn test_parse_and_render_is_identity() {
        assert_eq!(Document::parse(PAGE).render(), PAGE);
    }

    #[test]
    fn test_regions() {
        let doc = Document::parse(PAGE);
        assert_eq!(doc.region(Region::Head).elements().count(), 1);
        assert_eq!(doc.region(Region::Body).elements().count(), 1);
        assert!(doc.region(Region::Body).render().starts_with("<header>"));
        assert_eq!(doc.elements().count(), 2);
    }

    #[test]
    fn test_insert_head_first() {
        let mut doc = Document::parse(PAGE);
        doc.insert_head_first(Element::new("meta").with_attr("charset", "utf-8"));
        assert!(doc.render().contains(r#"<HEAD><meta charset="utf-8"><title>"#));
    }

    #[test]
    fn test_body_append_region() {
        let mut doc = Document::parse(PAGE);
        doc.region_mut(Region::BodyAppend)
            .push(Element::new("script").with_content("late()"));
        assert!(doc.render().ends_with("<script>late()</script></body></html>"));
    }

    #[test]
    fn test_fragment_without_shell() {
        let html = r#"<div><script src="/x.js"></script></div>"#;
        let doc = Document::parse(html);
        assert_eq!(doc.region(Region::Body).elements().count(), 1);
        assert_eq!(doc.render(), html);
    }

    #[test]
    fn test_head_without_body_tag() {
        let html = "<head><style>p{}</style></head><p>x</p>";
        let doc = Document::parse(html);
        assert_eq!(doc.region(Region::Head).elements().count(), 1);
        assert_eq!(doc.render(), html);
    }

    #[test]
    fn test_from_regions() {
        let doc = Document::from_regions("<style>a{}</style>", "", "<p>x</p>", "<script>y()</script>");
        assert_eq!(doc.elements().count(), 2);
        assert_eq!(doc.render(), "<style>a{}</style><p>x</p><script>y()</script>");
    }
}
