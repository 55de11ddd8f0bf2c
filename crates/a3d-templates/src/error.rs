//! Error types for template rendering.

use thiserror::Error;

/// Errors that can occur while looking up or rendering a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// A placeholder is unresolved, mistyped or malformed.
    #[error("Cannot render template {template}: placeholder '{key}' {reason}")]
    TemplateRender {
        template: String,
        key: String,
        reason: String,
    },

    /// No provider has a template of this name.
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
