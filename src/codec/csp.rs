//! Content-Security-Policy wire format.
//!
//! `script-src 'self'; upgrade-insecure-requests`
//!
//! A bare directive decodes to `Flag(true)` for flag directives and to an
//! empty source list otherwise, so both round-trip. `Flag(false)` entries are
//! never written: they only switch off an inherited flag while merging, and
//! decode back as absent.

use crate::policy::csp::{CspDirectives, DirectiveValue, SourceList, FLAG_DIRECTIVES};

pub fn encode(directives: &CspDirectives) -> String {
    let mut parts = Vec::with_capacity(directives.len());
    for (name, value) in directives.iter() {
        match value {
            DirectiveValue::Flag(true) => parts.push(name.clone()),
            DirectiveValue::Flag(false) => {}
            DirectiveValue::Sources(sources) if sources.is_empty() => parts.push(name.clone()),
            DirectiveValue::Sources(sources) => {
                let mut part = name.clone();
                for source in sources {
                    part.push(' ');
                    part.push_str(source);
                }
                parts.push(part);
            }
        }
    }
    parts.join("; ")
}

/// Parse a CSP string. Directive names are lowercased; a repeated directive
/// is ignored after its first occurrence.
pub fn decode(raw: &str) -> CspDirectives {
    let mut directives = CspDirectives::new();

    for part in raw.split(';') {
        let mut tokens = part.split_whitespace();
        let Some(name) = tokens.next() else {
            continue;
        };
        let name = name.to_ascii_lowercase();
        if directives.contains(&name) {
            continue;
        }

        let sources: SourceList = tokens.map(str::to_string).collect();
        let value = if sources.is_empty() && FLAG_DIRECTIVES.contains(&name.as_str()) {
            DirectiveValue::Flag(true)
        } else {
            DirectiveValue::Sources(sources)
        };
        directives.insert(&name, value);
    }

    directives
}
