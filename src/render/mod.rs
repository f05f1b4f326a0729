//! Template rendering for feed entries.
//!
//! Templates are plain text with `{{.Key}}` placeholders. Lines starting with
//! `Field:` become structured fields (`Field: Name=value`); everything else
//! forms the description. Rendering never fails: unknown placeholders are
//! left as written.

use std::collections::HashMap;

use crate::domain::FeedEntry;

const FIELD_PREFIX: &str = "Field:";
const PUBLISHED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A named value shown alongside the description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Output of rendering one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedEntry {
    /// Always empty; layout is carried by description and fields.
    pub title: String,
    pub description: String,
    pub fields: Vec<EmbedField>,
}

/// Render `entry` through `format`.
pub fn render(format: &str, entry: &FeedEntry) -> RenderedEntry {
    let values = placeholders(entry);
    let mut description = String::new();
    let mut fields = Vec::new();

    for line in format.split('\n') {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(FIELD_PREFIX) {
            if let Some((name, value)) = rest.split_once('=') {
                fields.push(EmbedField {
                    name: name.trim().to_string(),
                    value: substitute(value, &values),
                    inline: true,
                });
            }
        } else {
            description.push_str(&substitute(line, &values));
            description.push('\n');
        }
    }

    RenderedEntry {
        title: String::new(),
        description: description.trim().to_string(),
        fields,
    }
}

/// Lookup table of placeholder values for one entry.
pub fn placeholders(entry: &FeedEntry) -> HashMap<String, String> {
    let mut values = HashMap::new();
    values.insert("Title".to_string(), entry.title.clone());
    values.insert("Link".to_string(), entry.link.clone());
    values.insert("Description".to_string(), entry.description.clone());
    values.insert(
        "Published".to_string(),
        entry
            .published
            .map(|dt| dt.format(PUBLISHED_FORMAT).to_string())
            .unwrap_or_default(),
    );
    values.insert(
        "Author".to_string(),
        entry.author.clone().unwrap_or_default(),
    );

    for (namespace, elements) in &entry.extensions {
        for (key, vals) in elements {
            let Some(first) = vals.first() else {
                continue;
            };
            let name = if key.is_empty() {
                namespace.clone()
            } else {
                format!("{}.{}", namespace, key)
            };
            values.insert(name, first.clone());
        }
    }

    values
}

/// Replace every `{{.Key}}` found in `text` in a single pass.
pub fn substitute(text: &str, values: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{.") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 3..];

        match after_open.find("}}") {
            Some(end) => match values.get(&after_open[..end]) {
                Some(value) => {
                    out.push_str(value);
                    rest = &after_open[end + 2..];
                }
                None => {
                    // Unknown key: keep the opening braces and rescan after them.
                    out.push_str("{{.");
                    rest = after_open;
                }
            },
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}
