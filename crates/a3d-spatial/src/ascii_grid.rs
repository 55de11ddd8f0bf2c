//! ESRI ASCII grid codec (the Alpine3D `ARC` format).
//!
//! ```text
//! ncols        40
//! nrows        40
//! xllcorner    2600000
//! yllcorner    1200000
//! cellsize     50
//! NODATA_value -9999
//! 1532.250 1533.000 ...
//! ```
//!
//! Continuous values are written with three decimals, categorical values as
//! integers, so that the text form of a dataset is deterministic.

use crate::crs::Crs;
use crate::grid::{GridDataset, GridDefinition, ValueKind};
use crate::{RegionError, Result};
use std::fmt::Write as _;
use std::path::Path;

/// Serialize a dataset.
pub fn write_ascii_grid(ds: &GridDataset) -> String {
    let def = ds.definition();
    let mut out = String::with_capacity(def.len() * 9 + 128);
    // Writing to a String cannot fail
    let _ = writeln!(out, "ncols        {}", def.cols);
    let _ = writeln!(out, "nrows        {}", def.rows);
    let _ = writeln!(out, "xllcorner    {}", def.xllcorner);
    let _ = writeln!(out, "yllcorner    {}", def.yllcorner);
    let _ = writeln!(out, "cellsize     {}", def.cell_size);
    let _ = writeln!(out, "NODATA_value {}", format_value(ds.no_data(), ValueKind::Categorical));

    for row in ds.values().chunks(def.cols) {
        let line: Vec<String> = row
            .iter()
            .map(|&v| {
                if ds.is_no_data(v) {
                    format_value(ds.no_data(), ValueKind::Categorical)
                } else {
                    format_value(v, ds.kind())
                }
            })
            .collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out
}

fn format_value(v: f64, kind: ValueKind) -> String {
    match kind {
        ValueKind::Continuous => format!("{v:.3}"),
        ValueKind::Categorical => format!("{}", v.round() as i64),
    }
}

/// Parse ESRI ASCII grid text. The CRS is not part of the format and must be
/// supplied by the caller.
pub fn parse_ascii_grid(text: &str, crs: Crs, kind: ValueKind) -> Result<GridDataset> {
    let mut tokens = text.split_whitespace().peekable();

    let mut ncols = None;
    let mut nrows = None;
    let mut xll = None;
    let mut yll = None;
    let mut cell_size = None;
    let mut no_data = None;
    let mut centered = false;

    while let Some(&key) = tokens.peek() {
        if key.parse::<f64>().is_ok() {
            break;
        }
        tokens.next();
        let value = tokens
            .next()
            .ok_or_else(|| RegionError::AsciiGrid(format!("missing value for {key}")))?;
        let number: f64 = value
            .parse()
            .map_err(|_| RegionError::AsciiGrid(format!("invalid value {value:?} for {key}")))?;
        match key.to_ascii_lowercase().as_str() {
            "ncols" => ncols = Some(number as usize),
            "nrows" => nrows = Some(number as usize),
            "xllcorner" => xll = Some(number),
            "yllcorner" => yll = Some(number),
            "xllcenter" => {
                xll = Some(number);
                centered = true;
            }
            "yllcenter" => {
                yll = Some(number);
                centered = true;
            }
            "cellsize" => cell_size = Some(number),
            "nodata_value" => no_data = Some(number),
            other => return Err(RegionError::AsciiGrid(format!("unknown header key {other}"))),
        }
    }

    let missing = |name: &str| RegionError::AsciiGrid(format!("missing header {name}"));
    let cols = ncols.ok_or_else(|| missing("ncols"))?;
    let rows = nrows.ok_or_else(|| missing("nrows"))?;
    let cell_size = cell_size.ok_or_else(|| missing("cellsize"))?;
    let mut xll = xll.ok_or_else(|| missing("xllcorner"))?;
    let mut yll = yll.ok_or_else(|| missing("yllcorner"))?;
    if centered {
        xll -= cell_size / 2.0;
        yll -= cell_size / 2.0;
    }
    let no_data = no_data.unwrap_or(crate::grid::NO_DATA);

    let values = tokens
        .map(|t| {
            t.parse::<f64>()
                .map_err(|_| RegionError::AsciiGrid(format!("invalid cell value {t:?}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let definition = GridDefinition::new(crs, xll, yll, cell_size, cols, rows)?;
    if values.len() != definition.len() {
        return Err(RegionError::AsciiGrid(format!(
            "expected {} cell values, found {}",
            definition.len(),
            values.len()
        )));
    }
    GridDataset::with_no_data(definition, kind, no_data, values)
}

/// Read and parse an ASCII grid file.
pub fn read_ascii_grid<P: AsRef<Path>>(path: P, crs: Crs, kind: ValueKind) -> Result<GridDataset> {
    let text = std::fs::read_to_string(path)?;
    parse_ascii_grid(&text, crs, kind)
}
