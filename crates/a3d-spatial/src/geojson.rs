//! Minimal GeoJSON reader for polygon features.
//!
//! Only `Polygon` and `MultiPolygon` geometries are understood; other
//! geometry types are skipped. The legacy `crs` member
//! (`urn:ogc:def:crs:EPSG::2056`) is honoured when present.

use crate::geometry::{Point, Polygon};
use crate::{RegionError, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// A polygon feature and its properties.
#[derive(Debug, Clone)]
pub struct Feature {
    pub polygons: Vec<Polygon>,
    pub properties: Map<String, Value>,
}

impl Feature {
    /// String value of a property, with numbers rendered as text.
    pub fn property(&self, name: &str) -> Option<String> {
        match self.properties.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// All polygon features of a GeoJSON document.
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    /// EPSG code declared by the document, if any.
    pub epsg: Option<u32>,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Parse a GeoJSON document (FeatureCollection, Feature or bare geometry).
    pub fn parse(text: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(text)?;
        let epsg = root.get("crs").and_then(parse_crs_member);

        let features = match type_of(&root)? {
            "FeatureCollection" => root
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| RegionError::GeoJson("FeatureCollection without features".into()))?
                .iter()
                .map(parse_feature)
                .collect::<Result<Vec<_>>>()?,
            "Feature" => vec![parse_feature(&root)?],
            _ => vec![Feature {
                polygons: parse_geometry(&root)?,
                properties: Map::new(),
            }],
        };

        Ok(Self {
            epsg,
            features: features.into_iter().filter(|f| !f.polygons.is_empty()).collect(),
        })
    }

    /// Read and parse a GeoJSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// The first polygon of the document, used as a region outline.
    pub fn first_polygon(&self) -> Result<&Polygon> {
        self.features
            .iter()
            .flat_map(|f| f.polygons.iter())
            .next()
            .ok_or_else(|| RegionError::GeoJson("document contains no polygon".into()))
    }
}

fn type_of(value: &Value) -> Result<&str> {
    value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| RegionError::GeoJson("object without \"type\"".into()))
}

fn parse_crs_member(crs: &Value) -> Option<u32> {
    let name = crs.get("properties")?.get("name")?.as_str()?;
    name.rsplit(|c: char| c == ':' || c == '/').next()?.parse().ok()
}

fn parse_feature(value: &Value) -> Result<Feature> {
    let properties = value
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let polygons = match value.get("geometry") {
        Some(Value::Null) | None => Vec::new(),
        Some(geometry) => parse_geometry(geometry)?,
    };
    Ok(Feature { polygons, properties })
}

fn parse_geometry(value: &Value) -> Result<Vec<Polygon>> {
    let coords = value.get("coordinates");
    match type_of(value)? {
        "Polygon" => Ok(vec![parse_polygon(coords)?]),
        "MultiPolygon" => coords
            .and_then(Value::as_array)
            .ok_or_else(|| RegionError::GeoJson("MultiPolygon without coordinates".into()))?
            .iter()
            .map(|p| parse_polygon(Some(p)))
            .collect(),
        _ => Ok(Vec::new()),
    }
}

fn parse_polygon(coords: Option<&Value>) -> Result<Polygon> {
    let rings = coords
        .and_then(Value::as_array)
        .ok_or_else(|| RegionError::GeoJson("Polygon without coordinates".into()))?;
    let mut rings = rings.iter().map(parse_ring);
    let exterior = rings
        .next()
        .ok_or_else(|| RegionError::GeoJson("Polygon without exterior ring".into()))??;
    let holes = rings.collect::<Result<Vec<_>>>()?;
    Polygon::with_holes(exterior, holes)
}

fn parse_ring(ring: &Value) -> Result<Vec<Point>> {
    ring.as_array()
        .ok_or_else(|| RegionError::GeoJson("ring is not an array".into()))?
        .iter()
        .map(|pos| {
            let pos = pos.as_array().filter(|p| p.len() >= 2);
            match pos.map(|p| (p[0].as_f64(), p[1].as_f64())) {
                Some((Some(x), Some(y))) => Ok(Point::new(x, y)),
                _ => Err(RegionError::GeoJson("invalid position".into())),
            }
        })
        .collect()
}
