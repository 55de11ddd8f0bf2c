//! Typed template parameters.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Declared type of a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
    Date,
    DateTime,
    /// A relative path inside the output package.
    Path,
    /// Several relative paths, rendered space-separated.
    Paths,
    /// Multi-line text inserted verbatim.
    Block,
}

impl FromStr for ParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        Ok(match s {
            "str" => ParamType::Str,
            "int" => ParamType::Int,
            "float" => ParamType::Float,
            "bool" => ParamType::Bool,
            "date" => ParamType::Date,
            "datetime" => ParamType::DateTime,
            "path" => ParamType::Path,
            "paths" => ParamType::Paths,
            "block" => ParamType::Block,
            other => return Err(format!("has unknown type '{other}'")),
        })
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::Str => "str",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
            ParamType::Date => "date",
            ParamType::DateTime => "datetime",
            ParamType::Path => "path",
            ParamType::Paths => "paths",
            ParamType::Block => "block",
        };
        f.write_str(name)
    }
}

/// A parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Path(String),
    Paths(Vec<String>),
    Block(String),
}

impl ParamValue {
    /// The type this value naturally has.
    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Str(_) => ParamType::Str,
            ParamValue::Int(_) => ParamType::Int,
            ParamValue::Float(_) => ParamType::Float,
            ParamValue::Bool(_) => ParamType::Bool,
            ParamValue::Date(_) => ParamType::Date,
            ParamValue::DateTime(_) => ParamType::DateTime,
            ParamValue::Path(_) => ParamType::Path,
            ParamValue::Paths(_) => ParamType::Paths,
            ParamValue::Block(_) => ParamType::Block,
        }
    }

    /// Render for a placeholder of type `ty`.
    ///
    /// Only an integer may stand in for a float; every other pairing must
    /// match exactly.
    pub(crate) fn render_as(&self, ty: ParamType) -> Result<String, String> {
        match (ty, self) {
            (ParamType::Str, ParamValue::Str(s)) => {
                if s.contains('\n') {
                    return Err("is a single-line str but the value spans lines".to_string());
                }
                Ok(s.clone())
            }
            (ParamType::Int, ParamValue::Int(v)) => Ok(v.to_string()),
            (ParamType::Float, ParamValue::Float(v)) => {
                if !v.is_finite() {
                    return Err(format!("has non-finite value {v}"));
                }
                Ok(format_float(*v))
            }
            (ParamType::Float, ParamValue::Int(v)) => Ok(v.to_string()),
            (ParamType::Bool, ParamValue::Bool(v)) => Ok(v.to_string()),
            (ParamType::Date, ParamValue::Date(d)) => Ok(d.format("%Y-%m-%d").to_string()),
            (ParamType::DateTime, ParamValue::DateTime(t)) => Ok(t.format("%Y-%m-%dT%H:%M:%S").to_string()),
            (ParamType::Path, ParamValue::Path(p)) => {
                check_relative(p)?;
                Ok(p.clone())
            }
            (ParamType::Paths, ParamValue::Paths(ps)) => {
                for p in ps {
                    check_relative(p)?;
                    if p.contains(char::is_whitespace) {
                        return Err(format!("contains path {p:?} with whitespace"));
                    }
                }
                Ok(ps.join(" "))
            }
            (ParamType::Block, ParamValue::Block(b)) => Ok(b.trim_end_matches('\n').to_string()),
            (expected, value) => Err(format!("expects {expected} but was given {}", value.param_type())),
        }
    }
}

/// Shortest representation that reads back as the same float; integral
/// values keep one decimal.
fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

fn check_relative(p: &str) -> Result<(), String> {
    let invalid = p.is_empty()
        || p.starts_with('/')
        || p.starts_with('\\')
        || p.contains(':')
        || p.split(['/', '\\']).any(|c| c == "..");
    if invalid {
        return Err(format!("needs a relative package path, got {p:?}"));
    }
    Ok(())
}

/// Named parameters for one render call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, ParamValue>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn str(&mut self, name: &str, v: impl Into<String>) -> &mut Self {
        self.insert(name, ParamValue::Str(v.into()))
    }

    pub fn int(&mut self, name: &str, v: i64) -> &mut Self {
        self.insert(name, ParamValue::Int(v))
    }

    pub fn float(&mut self, name: &str, v: f64) -> &mut Self {
        self.insert(name, ParamValue::Float(v))
    }

    pub fn bool(&mut self, name: &str, v: bool) -> &mut Self {
        self.insert(name, ParamValue::Bool(v))
    }

    pub fn date(&mut self, name: &str, v: NaiveDate) -> &mut Self {
        self.insert(name, ParamValue::Date(v))
    }

    pub fn datetime(&mut self, name: &str, v: NaiveDateTime) -> &mut Self {
        self.insert(name, ParamValue::DateTime(v))
    }

    pub fn path(&mut self, name: &str, v: impl Into<String>) -> &mut Self {
        self.insert(name, ParamValue::Path(v.into()))
    }

    pub fn paths(&mut self, name: &str, v: Vec<String>) -> &mut Self {
        self.insert(name, ParamValue::Paths(v))
    }

    pub fn block(&mut self, name: &str, v: impl Into<String>) -> &mut Self {
        self.insert(name, ParamValue::Block(v.into()))
    }
}
