//! Template providers, consulted in order.

use crate::Result;
use std::path::{Path, PathBuf};

/// A named source of template text.
pub trait TemplateProvider: Send + Sync {
    /// Short label shown by `templates list`.
    fn label(&self) -> String;

    /// Template text, `None` if this provider does not have it.
    fn get(&self, name: &str) -> Result<Option<String>>;

    /// Names of all templates of this provider.
    fn names(&self) -> Result<Vec<String>>;
}

/// Templates compiled into the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinProvider;

/// Built-in template names and contents.
pub const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("alpine3d.ini", include_str!("../templates/alpine3d.ini")),
    ("snowpack.ini", include_str!("../templates/snowpack.ini")),
    ("meteoio.ini", include_str!("../templates/meteoio.ini")),
    ("station.sno", include_str!("../templates/station.sno")),
    ("poi.pts", include_str!("../templates/poi.pts")),
];

impl TemplateProvider for BuiltinProvider {
    fn label(&self) -> String {
        "builtin".to_string()
    }

    fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(BUILTIN_TEMPLATES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, text)| text.to_string()))
    }

    fn names(&self) -> Result<Vec<String>> {
        Ok(BUILTIN_TEMPLATES.iter().map(|(n, _)| n.to_string()).collect())
    }
}

/// Templates read from a directory, one file per template.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    dir: PathBuf,
}

impl DirectoryProvider {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl TemplateProvider for DirectoryProvider {
    fn label(&self) -> String {
        self.dir.display().to_string()
    }

    fn get(&self, name: &str) -> Result<Option<String>> {
        // Template names are plain file names
        if name.contains(['/', '\\']) || name.starts_with('.') {
            return Ok(None);
        }
        let path = self.dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn names(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    if !name.starts_with('.') {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
