//! Manifest template rendering

use crate::error::{DeployError, Result};
use handlebars::Handlebars;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Render template text with the run's variables
///
/// Unknown variables render as empty strings.
pub fn render(template: &str, variables: &BTreeMap<String, String>) -> Result<String> {
    let mut registry = Handlebars::new();
    registry.register_escape_fn(escape_markup);
    registry
        .render_template(template, variables)
        .map_err(|e| DeployError::Render(e.to_string()))
}

/// Escape `{{value}}` output
///
/// Only `&'<>"` are replaced, so base64 padding and `key=value` text
/// survive unchanged. `{{{value}}}` bypasses this entirely.
fn escape_markup(data: &str) -> String {
    let mut out = String::with_capacity(data.len());
    for c in data.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&apos;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// Read a template file and render it
pub fn render_file(path: &Path, variables: &BTreeMap<String, String>) -> Result<String> {
    debug!(path = %path.display(), "Rendering template");
    let template = std::fs::read_to_string(path).map_err(|e| {
        DeployError::Render(format!("cannot read template {}: {}", path.display(), e))
    })?;
    render(&template, variables)
}
