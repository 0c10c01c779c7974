//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

use crate::angle::normalize_longitude_degrees;

/// A geographic or projected bounding box.
///
/// For geographic extents, coordinates are in degrees (or radians for the
/// grid extents, which are converted at load time). For projected extents,
/// coordinates are in the projection's linear unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The whole-globe extent in degrees.
    pub fn whole_world() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Check whether this is the whole-globe extent in degrees.
    pub fn is_whole_world(&self) -> bool {
        self.min_x == -180.0 && self.min_y == -90.0 && self.max_x == 180.0 && self.max_y == 90.0
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Containment test for a (lon, lat) degree point, accepting the point
    /// after reducing its longitude into `[-180, 180]`.
    pub fn contains_lon_lat_wrapped(&self, lon: f64, lat: f64) -> bool {
        if self.contains_point(lon, lat) {
            return true;
        }
        if lat < self.min_y || lat > self.max_y {
            return false;
        }
        let lon = normalize_longitude_degrees(lon);
        lon >= self.min_x && lon <= self.max_x
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Whether `other` is contained within this bbox.
    pub fn contains_bbox(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x
            && other.min_y >= self.min_y
            && other.max_x <= self.max_x
            && other.max_y <= self.max_y
    }
}
