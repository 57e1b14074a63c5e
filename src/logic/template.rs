//! Package-name template substitution.
//!
//! Matrix entries may reference the descriptor through `{{distro}}`,
//! `{{family}}`, `{{arch}}` and `{{version}}` (e.g. `linux-image-{{arch}}`).
//! Package templates are restricted to bare `{{ name }}` expressions: every
//! brace must belong to one, and tags, comments and filters are rejected
//! before `tera` renders the rest. A malformed template is a
//! [`TemplateError`] instead of a partially substituted string.

use crate::error::TemplateError;
use crate::system::SystemDescriptor;
use serde::Serialize;
use std::error::Error as _;
use tera::{Context, Tera};

/// Names a package template may reference.
const PARAMETERS: [&str; 4] = ["distro", "family", "arch", "version"];

/// Parameter set available to package templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateParams {
    pub distro: String,
    pub family: String,
    pub arch: String,
    pub version: String,
}

impl TemplateParams {
    pub fn from_descriptor(system: &SystemDescriptor) -> Self {
        Self {
            distro: system.distro.to_string(),
            family: system.family.to_string(),
            arch: system.arch.to_string(),
            version: system.version.clone(),
        }
    }
}

/// Render a single package template.
pub fn render(template: &str, params: &TemplateParams) -> Result<String, TemplateError> {
    // Plain names are the common case and never need the engine.
    if !template.contains('{') && !template.contains('}') {
        return Ok(template.to_string());
    }

    check_grammar(template).map_err(|reason| TemplateError {
        template: template.to_string(),
        reason,
    })?;

    let context = Context::from_serialize(params).map_err(|e| TemplateError {
        template: template.to_string(),
        reason: error_chain(&e),
    })?;

    let rendered = Tera::one_off(template, &context, false).map_err(|e| TemplateError {
        template: template.to_string(),
        reason: error_chain(&e),
    })?;

    if rendered.trim().is_empty() {
        return Err(TemplateError {
            template: template.to_string(),
            reason: "renders to an empty package name".to_string(),
        });
    }

    Ok(rendered)
}

/// Accept only literal text and `{{ name }}` expressions over [`PARAMETERS`].
fn check_grammar(template: &str) -> Result<(), String> {
    let mut rest = template;
    while let Some(pos) = rest.find(['{', '}']) {
        let tail = &rest[pos..];
        if tail.starts_with('}') {
            return Err(format!("stray `}}` at offset {}", template.len() - tail.len()));
        }
        let Some(expr) = tail.strip_prefix("{{") else {
            return Err(format!(
                "`{{` at offset {} does not open a `{{{{ name }}}}` expression",
                template.len() - tail.len()
            ));
        };
        let Some(end) = expr.find("}}") else {
            return Err("unclosed `{{`".to_string());
        };
        let name = expr[..end].trim();
        if !PARAMETERS.contains(&name) {
            return Err(format!(
                "`{}` is not one of {}",
                name,
                PARAMETERS.join(", ")
            ));
        }
        rest = &expr[end + 2..];
    }
    Ok(())
}

/// Render a free-form text body (an asset) against any serializable context.
///
/// Unlike [`render`], an empty result is fine and no brace check is applied
/// to the output, since file bodies may legitimately contain braces.
pub fn render_text<C: Serialize>(name: &str, body: &str, context: &C) -> Result<String, TemplateError> {
    let context = Context::from_serialize(context).map_err(|e| TemplateError {
        template: name.to_string(),
        reason: error_chain(&e),
    })?;
    Tera::one_off(body, &context, false).map_err(|e| TemplateError {
        template: name.to_string(),
        reason: error_chain(&e),
    })
}

fn error_chain(err: &tera::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}
