//! The templating engine.

use crate::params::Params;
use crate::provider::{BuiltinProvider, DirectoryProvider, TemplateProvider};
use crate::template::{RenderedConfig, Template};
use crate::{Result, TemplateError};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Renders templates looked up through an ordered provider list.
pub struct TemplateEngine {
    providers: Vec<Box<dyn TemplateProvider>>,
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<_> = self.providers.iter().map(|p| p.label()).collect();
        f.debug_struct("TemplateEngine").field("providers", &labels).finish()
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateEngine {
    /// Engine with explicit providers, first match wins.
    pub fn new(providers: Vec<Box<dyn TemplateProvider>>) -> Self {
        Self { providers }
    }

    /// Built-in templates only.
    pub fn builtin() -> Self {
        Self::new(vec![Box::new(BuiltinProvider)])
    }

    /// Override directory first, built-ins second.
    pub fn with_override_dir<P: AsRef<Path>>(dir: Option<P>) -> Self {
        let mut providers: Vec<Box<dyn TemplateProvider>> = Vec::new();
        if let Some(dir) = dir {
            providers.push(Box::new(DirectoryProvider::new(dir)));
        }
        providers.push(Box::new(BuiltinProvider));
        Self::new(providers)
    }

    /// Text of `name` and the label of the provider that supplied it.
    pub fn source(&self, name: &str) -> Result<(String, String)> {
        for provider in &self.providers {
            if let Some(text) = provider.get(name)? {
                debug!(template = name, provider = %provider.label(), "Resolved template");
                return Ok((text, provider.label()));
            }
        }
        Err(TemplateError::NotFound(name.to_string()))
    }

    /// Parsed template `name`.
    pub fn template(&self, name: &str) -> Result<Template> {
        let (text, _) = self.source(name)?;
        Template::parse(name, &text)
    }

    /// Render `name` with `params`.
    pub fn render(&self, name: &str, params: &Params) -> Result<RenderedConfig> {
        self.template(name)?.render(params)
    }

    /// Every available template name with the provider that wins for it.
    pub fn list(&self) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for provider in &self.providers {
            for name in provider.names()? {
                out.entry(name).or_insert_with(|| provider.label());
            }
        }
        Ok(out)
    }
}
