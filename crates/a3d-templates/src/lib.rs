//! # a3d-templates
//!
//! Strictly typed configuration templates.
//!
//! Placeholders have the form `{{name:type}}` with the types `str`, `int`,
//! `float`, `bool`, `date`, `datetime`, `path`, `paths` and `block`. Every
//! placeholder must be given a value of its type; otherwise rendering fails
//! with [`TemplateError::TemplateRender`] naming the placeholder. Values of
//! `path` and `paths` placeholders are collected in
//! [`RenderedConfig::references`] so the packager can check that every
//! referenced file is shipped.
//!
//! Templates are looked up in an ordered provider list: an optional override
//! directory, then the built-in set (`alpine3d.ini`, `snowpack.ini`,
//! `meteoio.ini`, `station.sno`, `poi.pts`).
//!
//! ```
//! use a3d_templates::{Params, TemplateEngine};
//!
//! let engine = TemplateEngine::builtin();
//! let mut params = Params::new();
//! params.block("points", "2600100 1200100 1500.0");
//! let poi = engine.render("poi.pts", &params)?;
//! assert!(poi.text.contains("2600100 1200100"));
//! # Ok::<(), a3d_templates::TemplateError>(())
//! ```

mod engine;
mod error;
mod params;
mod provider;
mod template;

pub use engine::TemplateEngine;
pub use error::TemplateError;
pub use params::{ParamType, ParamValue, Params};
pub use provider::{BuiltinProvider, DirectoryProvider, TemplateProvider, BUILTIN_TEMPLATES};
pub use template::{Placeholder, RenderedConfig, Template};

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;
