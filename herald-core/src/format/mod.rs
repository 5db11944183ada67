//! Message formatting
//!
//! Templates use `{{field}}` placeholders (whitespace inside the braces is
//! ignored). Each placeholder is replaced by the `Display` form of the
//! matching data value; placeholders whose field is absent are left in the
//! output verbatim so a missing field is visible rather than silently blank.

mod builtin;

use crate::core::{AlertError, Fields, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

pub use builtin::BUILTIN_TEMPLATES;

/// Render `template` against `data`
pub fn format_template(template: &str, data: &Fields) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            // unterminated placeholder, emit the remainder as-is
            out.push_str(&rest[start..]);
            return out;
        };

        let name = after_open[..end].trim();
        match data.get(name) {
            Some(value) => out.push_str(&value.to_string()),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after_open[end + 2..];
    }

    out.push_str(rest);
    out
}

/// Placeholder names referenced by a template, in order of appearance
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            break;
        };
        names.push(after_open[..end].trim().to_string());
        rest = &after_open[end + 2..];
    }
    names
}

/// Registry of named message templates
///
/// Seeded with the built-in market, strategy and system templates.
#[derive(Debug)]
pub struct MessageFormatter {
    templates: RwLock<HashMap<String, String>>,
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFormatter {
    pub fn new() -> Self {
        let templates = BUILTIN_TEMPLATES
            .iter()
            .map(|(name, body)| (name.to_string(), body.to_string()))
            .collect();
        Self {
            templates: RwLock::new(templates),
        }
    }

    /// Formatter with no templates registered
    pub fn empty() -> Self {
        Self {
            templates: RwLock::new(HashMap::new()),
        }
    }

    /// Register or replace a named template
    pub fn register(&self, name: impl Into<String>, body: impl Into<String>) -> Result<()> {
        let name = name.into();
        let body = body.into();
        if name.trim().is_empty() {
            return Err(AlertError::missing_field("template.name"));
        }
        if body.trim().is_empty() {
            return Err(AlertError::missing_field("template.body"));
        }
        self.templates.write().insert(name, body);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.templates.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Render a named template; `None` if the name is not registered
    pub fn render(&self, name: &str, data: &Fields) -> Option<String> {
        let templates = self.templates.read();
        templates.get(name).map(|body| format_template(body, data))
    }

    /// Render a rule's message: the named template when one is set and
    /// registered, otherwise the inline message
    pub fn render_message(&self, template: Option<&str>, message: &str, data: &Fields) -> String {
        template
            .and_then(|name| self.render(name, data))
            .unwrap_or_else(|| format_template(message, data))
    }
}
