//! Planar projections and point-in-polygon testing for spatial subsetting.
//!
//! The subsetter only needs a projection good enough to make a polygon test
//! well behaved near the poles, where plate carrée folds the longitude axis.
//! Spherical polar stereographic keeps polygons around either pole simply
//! connected; between ±60° plate carrée is used unchanged.

use std::f64::consts::PI;

use serde::Deserialize;

/// Maximum number of polygon vertices accepted by the parameter table.
pub const MAX_COORDS: usize = 16384;

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Coord {
    /// Latitude in degrees, positive north
    pub lat: f64,
    /// Longitude in degrees, positive east
    pub lon: f64,
}

/// A projected planar point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Projected x
    pub x: f64,
    /// Projected y
    pub y: f64,
}

/// Projection used for polygon containment tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Polar stereographic about the north pole
    NorthPolar,
    /// Polar stereographic about the south pole
    SouthPolar,
    /// Identity lat/lon plane
    PlateCarree,
}

impl Projection {
    /// Choose a projection from the first reference latitude of a track.
    #[must_use]
    pub fn select(first_lat: f64) -> Projection {
        if first_lat > 60.0 {
            Projection::NorthPolar
        } else if first_lat < -60.0 {
            Projection::SouthPolar
        } else {
            Projection::PlateCarree
        }
    }

    /// Project a coordinate onto the plane.
    #[must_use]
    pub fn project(self, coord: Coord) -> Point {
        let to_rad = PI / 180.0;
        let lat = coord.lat * to_rad;
        let lon = coord.lon * to_rad;
        match self {
            Projection::PlateCarree => Point { x: coord.lon, y: coord.lat },
            Projection::NorthPolar => {
                // Unit-sphere stereographic radius from the north pole
                let rho = 2.0 * (PI / 4.0 - lat / 2.0).tan();
                Point { x: rho * lon.sin(), y: -rho * lon.cos() }
            }
            Projection::SouthPolar => {
                let rho = 2.0 * (PI / 4.0 + lat / 2.0).tan();
                Point { x: rho * lon.sin(), y: rho * lon.cos() }
            }
        }
    }
}

/// Ray-casting containment test against a closed polygon ring.
///
/// The ring may be given in either winding order and need not repeat its
/// first vertex. Points on an edge fall on one side or the other; callers
/// should not rely on boundary behavior.
#[must_use]
pub fn point_in_polygon(polygon: &[Point], point: Point) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > point.y) != (pj.y > point.y) {
            let x_cross = (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Project every vertex of a polygon.
#[must_use]
pub fn project_polygon(polygon: &[Coord], projection: Projection) -> Vec<Point> {
    polygon.iter().map(|&c| projection.project(c)).collect()
}
