//! Region-of-interest geometry and point containment.
//!
//! Coordinates are WGS84 degrees stored GeoJSON-style as `(lon, lat)`.
//!
//! # Boundary policy
//!
//! Containment is **edge-inclusive**: a point lying exactly on any ring edge
//! of a polygon (exterior or hole) counts as inside that polygon. Detections
//! sitting on a coastline or border vertex are therefore kept.
//!
//! Degenerate rings (fewer than three distinct vertices, or zero area) never
//! contain anything. A degenerate hole is ignored.

use serde_json::Value;
use std::path::Path;

use crate::error::RegionError;

/// Tolerance for the on-edge test, in squared-degree cross product units.
const EDGE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    points: Vec<(f64, f64)>,
    degenerate: bool,
}

impl Ring {
    /// Builds a ring from `(lon, lat)` vertices. A closing vertex equal to
    /// the first one is optional.
    pub fn new(mut points: Vec<(f64, f64)>) -> Self {
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }

        let mut distinct = points.clone();
        distinct.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        distinct.dedup();

        let degenerate = distinct.len() < 3 || signed_area(&points).abs() <= EDGE_EPSILON;

        Self { points, degenerate }
    }

    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    fn edges(&self) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[(i + n - 1) % n], self.points[i]))
    }

    fn on_boundary(&self, lon: f64, lat: f64) -> bool {
        self.edges().any(|((x1, y1), (x2, y2))| {
            let cross = (x2 - x1) * (lat - y1) - (y2 - y1) * (lon - x1);
            cross.abs() <= EDGE_EPSILON
                && lon >= x1.min(x2) - EDGE_EPSILON
                && lon <= x1.max(x2) + EDGE_EPSILON
                && lat >= y1.min(y2) - EDGE_EPSILON
                && lat <= y1.max(y2) + EDGE_EPSILON
        })
    }

    /// Even-odd ray casting. Boundary points may go either way; callers
    /// check [`Ring::on_boundary`] first.
    fn ray_cast(&self, lon: f64, lat: f64) -> bool {
        let mut inside = false;
        for ((xj, yj), (xi, yi)) in self.edges() {
            if ((yi > lat) != (yj > lat)) && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi) {
                inside = !inside;
            }
        }
        inside
    }
}

fn signed_area(points: &[(f64, f64)]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let (x1, y1) = points[i];
            let (x2, y2) = points[(i + 1) % n];
            x1 * y2 - x2 * y1
        })
        .sum();
    twice / 2.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    exterior: Ring,
    holes: Vec<Ring>,
}

impl Polygon {
    pub fn new(exterior: Ring, holes: Vec<Ring>) -> Self {
        Self { exterior, holes }
    }

    pub fn exterior(&self) -> &Ring {
        &self.exterior
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        if self.exterior.is_degenerate() {
            return false;
        }
        if self.exterior.on_boundary(lon, lat) {
            return true;
        }
        if !self.exterior.ray_cast(lon, lat) {
            return false;
        }

        for hole in self.holes.iter().filter(|h| !h.is_degenerate()) {
            if hole.on_boundary(lon, lat) {
                return true;
            }
            if hole.ray_cast(lon, lat) {
                return false;
            }
        }
        true
    }
}

/// Axis-aligned extent of a region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Bounds {
    /// Area parameter for the FIRMS area API: `west,south,east,north`.
    pub fn to_area_param(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

/// A region of interest made of one or more polygons.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    polygons: Vec<Polygon>,
}

impl Region {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    /// The whole globe. Every valid coordinate is inside.
    pub fn world() -> Self {
        Self::new(vec![Polygon::new(
            Ring::new(vec![(-180.0, -90.0), (180.0, -90.0), (180.0, 90.0), (-180.0, 90.0)]),
            Vec::new(),
        )])
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    /// Whether the point lies inside any polygon of the region.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        if !latitude.is_finite() || !longitude.is_finite() {
            return false;
        }
        self.polygons.iter().any(|p| p.contains(longitude, latitude))
    }

    /// Extent of all non-degenerate exteriors, or `None` if there are none.
    pub fn bounding_box(&self) -> Option<Bounds> {
        let mut points = self
            .polygons
            .iter()
            .filter(|p| !p.exterior.is_degenerate())
            .flat_map(|p| p.exterior.points().iter().copied())
            .peekable();

        let &(lon, lat) = points.peek()?;
        let init = Bounds {
            west: lon,
            south: lat,
            east: lon,
            north: lat,
        };

        Some(points.fold(init, |b, (lon, lat)| Bounds {
            west: b.west.min(lon),
            south: b.south.min(lat),
            east: b.east.max(lon),
            north: b.north.max(lat),
        }))
    }

    /// Reads a GeoJSON region from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegionError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| RegionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_geojson_str(&content)
    }

    /// Builds a region from a GeoJSON document.
    ///
    /// Accepts `Polygon`, `MultiPolygon`, `Feature`, `FeatureCollection` and
    /// `GeometryCollection`. Non-areal geometries are ignored.
    pub fn from_geojson_str(content: &str) -> Result<Self, RegionError> {
        let json: Value = serde_json::from_str(content)?;
        let mut polygons = Vec::new();
        collect_polygons(&json, &mut polygons)?;

        if polygons.is_empty() {
            return Err(RegionError::Empty);
        }
        Ok(Self::new(polygons))
    }
}

/// Free-function form of [`Region::contains`].
pub fn is_inside(latitude: f64, longitude: f64, region: &Region) -> bool {
    region.contains(latitude, longitude)
}

fn invalid(reason: impl Into<String>) -> RegionError {
    RegionError::InvalidGeometry {
        reason: reason.into(),
    }
}

fn collect_polygons(value: &Value, out: &mut Vec<Polygon>) -> Result<(), RegionError> {
    let kind = value["type"]
        .as_str()
        .ok_or_else(|| invalid("object without a \"type\" member"))?;

    match kind {
        "FeatureCollection" => {
            let features = value["features"]
                .as_array()
                .ok_or_else(|| invalid("FeatureCollection without \"features\" array"))?;
            for feature in features {
                collect_polygons(feature, out)?;
            }
        }
        "Feature" => {
            let geometry = &value["geometry"];
            if !geometry.is_null() {
                collect_polygons(geometry, out)?;
            }
        }
        "GeometryCollection" => {
            let geometries = value["geometries"]
                .as_array()
                .ok_or_else(|| invalid("GeometryCollection without \"geometries\" array"))?;
            for geometry in geometries {
                collect_polygons(geometry, out)?;
            }
        }
        "Polygon" => out.push(parse_polygon(&value["coordinates"])?),
        "MultiPolygon" => {
            let polygons = value["coordinates"]
                .as_array()
                .ok_or_else(|| invalid("MultiPolygon without coordinates"))?;
            for polygon in polygons {
                out.push(parse_polygon(polygon)?);
            }
        }
        _ => {}
    }

    Ok(())
}

fn parse_polygon(value: &Value) -> Result<Polygon, RegionError> {
    let rings = value
        .as_array()
        .ok_or_else(|| invalid("polygon coordinates must be an array of rings"))?;

    let mut rings = rings.iter().map(parse_ring);
    let exterior = rings
        .next()
        .ok_or_else(|| invalid("polygon has no exterior ring"))??;
    let holes = rings.collect::<Result<Vec<_>, _>>()?;

    Ok(Polygon::new(exterior, holes))
}

fn parse_ring(value: &Value) -> Result<Ring, RegionError> {
    let positions = value
        .as_array()
        .ok_or_else(|| invalid("ring must be an array of positions"))?;

    let points = positions
        .iter()
        .map(|position| match (position[0].as_f64(), position[1].as_f64()) {
            (Some(lon), Some(lat)) if lon.is_finite() && lat.is_finite() => Ok((lon, lat)),
            _ => Err(invalid(format!("invalid position {position}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Ring::new(points))
}
