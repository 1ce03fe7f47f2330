//! Elements the engine inspects and rewrites: `script`, `style`, `link`, `meta`.

/// A single attribute; `value` is `None` for boolean attributes (`async`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<Attribute>,
    /// Raw text between the start and end tag (`script`, `style`).
    content: Option<String>,
}

/// Elements with raw text content and an end tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

impl Element {
    pub fn new(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        let content = RAW_TEXT_ELEMENTS
            .contains(&name.as_str())
            .then(String::new);
        Self {
            name,
            attributes: Vec::new(),
            content,
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub(crate) fn from_parts(name: String, attributes: Vec<Attribute>, content: Option<String>) -> Self {
        Self {
            name,
            attributes,
            content,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// Attribute value; boolean attributes yield `Some("")`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_deref().unwrap_or(""))
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Set or replace an attribute, keeping its position when it exists.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = Some(value.to_string()),
            None => self.attributes.push(Attribute {
                name,
                value: Some(value.to_string()),
            }),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<Attribute> {
        let index = self
            .attributes
            .iter()
            .position(|a| a.name.eq_ignore_ascii_case(name))?;
        Some(self.attributes.remove(index))
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// `rel` tokens, lowercased (`<link rel="preload stylesheet">`).
    pub fn rel_tokens(&self) -> Vec<String> {
        self.attr("rel")
            .map(|rel| rel.split_whitespace().map(str::to_ascii_lowercase).collect())
            .unwrap_or_default()
    }

    pub fn has_rel(&self, rel: &str) -> bool {
        self.rel_tokens().iter().any(|r| r == rel)
    }

    /// Inline script or style: no `src`/`href`, text content present.
    pub fn is_inline(&self) -> bool {
        RAW_TEXT_ELEMENTS.contains(&self.name.as_str()) && !self.has_attr("src")
    }

    pub fn render_into(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for attribute in &self.attributes {
            out.push(' ');
            out.push_str(&attribute.name);
            if let Some(value) = &attribute.value {
                out.push_str("=\"");
                out.push_str(&value.replace('"', "&quot;"));
                out.push('"');
            }
        }
        out.push('>');
        if let Some(content) = &self.content {
            out.push_str(content);
            out.push_str("</");
            out.push_str(&self.name);
            out.push('>');
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }
}
