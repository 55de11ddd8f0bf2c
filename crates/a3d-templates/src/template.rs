//! Template parsing and rendering.
//!
//! A template is plain text with placeholders of the form `{{name:type}}`.
//! Rendering is a single pass: inserted values are never scanned for
//! placeholders again.

use crate::params::{ParamType, ParamValue, Params};
use crate::{Result, TemplateError};
use serde::Serialize;
use std::collections::BTreeSet;

/// A placeholder occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placeholder {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
}

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Slot(Placeholder),
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    segments: Vec<Segment>,
}

/// Output of a successful render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    /// Template name, also the file name of the rendered config.
    pub name: String,
    pub text: String,
    /// Package paths inserted through `path` and `paths` placeholders.
    pub references: BTreeSet<String>,
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

impl Template {
    /// Parse `text`. Malformed placeholders fail with `TemplateRender`.
    pub fn parse(name: &str, text: &str) -> Result<Self> {
        let fail = |key: &str, reason: &str| TemplateError::TemplateRender {
            template: name.to_string(),
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut rest = text;
        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Text(rest[..open].to_string()));
            }
            let after = &rest[open + 2..];
            let close = after
                .find("}}")
                .ok_or_else(|| fail(after.lines().next().unwrap_or(""), "is not terminated"))?;
            let inner = after[..close].trim();
            let (key, ty) = inner
                .split_once(':')
                .ok_or_else(|| fail(inner, "has no type (expected {{name:type}})"))?;
            let key = key.trim();
            if !valid_name(key) {
                return Err(fail(key, "is not a valid name"));
            }
            let ty: ParamType = ty.trim().parse().map_err(|reason: String| fail(key, &reason))?;
            segments.push(Segment::Slot(Placeholder {
                name: key.to_string(),
                ty,
            }));
            rest = &after[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            segments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Distinct placeholders in order of first appearance.
    pub fn placeholders(&self) -> Vec<Placeholder> {
        let mut seen = BTreeSet::new();
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Slot(p) if seen.insert(p.name.clone()) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    /// Render with `params`. Every placeholder must be resolved with a value
    /// of its declared type.
    pub fn render(&self, params: &Params) -> Result<RenderedConfig> {
        let mut text = String::new();
        let mut references = BTreeSet::new();

        for segment in &self.segments {
            match segment {
                Segment::Text(t) => text.push_str(t),
                Segment::Slot(p) => {
                    let fail = |reason: String| TemplateError::TemplateRender {
                        template: self.name.clone(),
                        key: p.name.clone(),
                        reason,
                    };
                    let value = params
                        .get(&p.name)
                        .ok_or_else(|| fail("is not resolved".to_string()))?;
                    text.push_str(&value.render_as(p.ty).map_err(fail)?);
                    match value {
                        ParamValue::Path(path) => {
                            references.insert(path.clone());
                        }
                        ParamValue::Paths(paths) => references.extend(paths.iter().cloned()),
                        _ => {}
                    }
                }
            }
        }

        Ok(RenderedConfig {
            name: self.name.clone(),
            text,
            references,
        })
    }
}
