//! Planar geometry primitives in projected coordinates.

use crate::{RegionError, Result};
use serde::{Deserialize, Serialize};

/// A point in a planar coordinate system (easting `x`, northing `y`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Easting (or longitude for geographic systems).
    pub x: f64,
    /// Northing (or latitude for geographic systems).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Minimum x (west edge).
    pub min_x: f64,
    /// Minimum y (south edge).
    pub min_y: f64,
    /// Maximum x (east edge).
    pub max_x: f64,
    /// Maximum y (north edge).
    pub max_y: f64,
}

impl Bounds {
    /// Create bounds from two corners, normalising their order.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    /// Square of side `size` centred on `center`.
    pub fn square(center: Point, size: f64) -> Self {
        let half = size / 2.0;
        Self::new(center.x - half, center.y - half, center.x + half, center.y + half)
    }

    /// Smallest bounds containing all points, or `None` for an empty slice.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Self::new(first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            bounds.min_x = bounds.min_x.min(p.x);
            bounds.min_y = bounds.min_y.min(p.y);
            bounds.max_x = bounds.max_x.max(p.x);
            bounds.max_y = bounds.max_y.max(p.y);
        }
        Some(bounds)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Point {
        Point::new((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    /// Check if a coordinate is within the bounds (edges included).
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    /// Check if `other` lies entirely within these bounds.
    pub fn contains_bounds(&self, other: &Bounds) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Check if the two bounds overlap with non-zero area.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }

    /// Grow the bounds by `margin` on every side.
    pub fn expand(&self, margin: f64) -> Self {
        Self {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }

    /// The four corners, counter-clockwise from south-west.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.min_x, self.min_y),
            Point::new(self.max_x, self.min_y),
            Point::new(self.max_x, self.max_y),
            Point::new(self.min_x, self.max_y),
        ]
    }

    /// The bounds as a closed polygon ring.
    pub fn to_polygon(&self) -> Polygon {
        Polygon {
            exterior: self.corners().to_vec(),
            holes: Vec::new(),
        }
    }
}

/// A simple polygon with optional holes.
///
/// Rings are stored without repeating the first vertex at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    exterior: Vec<Point>,
    holes: Vec<Vec<Point>>,
}

impl Polygon {
    /// Create a polygon from its exterior ring.
    pub fn new(exterior: Vec<Point>) -> Result<Self> {
        Self::with_holes(exterior, Vec::new())
    }

    /// Create a polygon with interior rings.
    pub fn with_holes(exterior: Vec<Point>, holes: Vec<Vec<Point>>) -> Result<Self> {
        let exterior = open_ring(exterior);
        if exterior.len() < 3 {
            return Err(RegionError::invalid(format!(
                "polygon ring needs at least 3 distinct vertices, got {}",
                exterior.len()
            )));
        }
        let holes = holes.into_iter().map(open_ring).filter(|h| h.len() >= 3).collect();
        Ok(Self { exterior, holes })
    }

    pub fn exterior(&self) -> &[Point] {
        &self.exterior
    }

    pub fn holes(&self) -> &[Vec<Point>] {
        &self.holes
    }

    pub fn bounds(&self) -> Bounds {
        // A polygon always has at least three vertices
        Bounds::from_points(&self.exterior).unwrap_or(Bounds::new(0.0, 0.0, 0.0, 0.0))
    }

    /// Enclosed area (exterior minus holes), shoelace formula.
    pub fn area(&self) -> f64 {
        let holes: f64 = self.holes.iter().map(|h| ring_area(h)).sum();
        (ring_area(&self.exterior) - holes).max(0.0)
    }

    /// Map every vertex through `f`.
    pub fn try_map<F>(&self, mut f: F) -> Result<Polygon>
    where
        F: FnMut(Point) -> Result<Point>,
    {
        let exterior = self.exterior.iter().map(|p| f(*p)).collect::<Result<Vec<_>>>()?;
        let holes = self
            .holes
            .iter()
            .map(|h| h.iter().map(|p| f(*p)).collect::<Result<Vec<_>>>())
            .collect::<Result<Vec<_>>>()?;
        Polygon::with_holes(exterior, holes)
    }

    /// Point-in-polygon test (even-odd rule, holes excluded).
    pub fn contains(&self, p: Point) -> bool {
        ring_contains(&self.exterior, p) && !self.holes.iter().any(|h| ring_contains(h, p))
    }

    /// Check that `other` lies entirely inside this polygon.
    ///
    /// Every vertex of `other` must be inside and no pair of edges may cross.
    pub fn contains_polygon(&self, other: &Polygon) -> bool {
        if !other.exterior.iter().all(|p| self.contains(*p)) {
            return false;
        }
        let rings = std::iter::once(&self.exterior).chain(self.holes.iter());
        for ring in rings {
            for (a0, a1) in edges(ring) {
                for (b0, b1) in edges(&other.exterior) {
                    if segments_cross(a0, a1, b0, b1) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Check whether the two polygons share any area.
    pub fn intersects(&self, other: &Polygon) -> bool {
        if !self.bounds().intersects(&other.bounds()) {
            return false;
        }
        if other.exterior.iter().any(|p| self.contains(*p))
            || self.exterior.iter().any(|p| other.contains(*p))
        {
            return true;
        }
        edges(&self.exterior)
            .any(|(a0, a1)| edges(&other.exterior).any(|(b0, b1)| segments_cross(a0, a1, b0, b1)))
    }
}

fn open_ring(mut ring: Vec<Point>) -> Vec<Point> {
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

fn edges(ring: &[Point]) -> impl Iterator<Item = (Point, Point)> + '_ {
    (0..ring.len()).map(move |i| (ring[i], ring[(i + 1) % ring.len()]))
}

fn ring_area(ring: &[Point]) -> f64 {
    let twice: f64 = edges(ring).map(|(a, b)| a.x * b.y - b.x * a.y).sum();
    twice.abs() / 2.0
}

fn ring_contains(ring: &[Point], p: Point) -> bool {
    let mut inside = false;
    for (a, b) in edges(ring) {
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if p.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Proper crossing of two segments (touching endpoints do not count).
fn segments_cross(a0: Point, a1: Point, b0: Point, b1: Point) -> bool {
    let d1 = orientation(b0, b1, a0);
    let d2 = orientation(b0, b1, a1);
    let d3 = orientation(a0, a1, b0);
    let d4 = orientation(a0, a1, b1);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}
