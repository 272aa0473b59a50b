//! Web Mercator screen-space projection (256 px tiles).
//!
//! Cluster radii and viewport fitting are defined in screen pixels at a given
//! zoom, so every spatial decision goes through this module.

use crate::entity::Position;
use geo::Rect;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Tile edge in pixels.
pub const TILE_SIZE: f64 = 256.0;

/// Latitude limit of the square Mercator world.
pub const MAX_LATITUDE: f64 = 85.051_128_779_8;

/// Equatorial circumference in meters (spherical Mercator radius 6378137 m).
pub const EARTH_CIRCUMFERENCE_M: f64 = 40_075_016.686;

/// Width of the whole world in pixels at `zoom`.
pub fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * 2f64.powf(zoom)
}

/// Projects a position to world pixel coordinates (origin top-left).
pub fn project(position: Position, zoom: f64) -> Point2<f64> {
    let size = world_size(zoom);
    let lat = position.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let sin = lat.to_radians().sin();

    let x = (position.lon + 180.0) / 360.0 * size;
    let y = (0.5 - ((1.0 + sin) / (1.0 - sin)).ln() / (4.0 * PI)) * size;
    Point2::new(x, y)
}

/// Inverse of [`project`].
pub fn unproject(point: Point2<f64>, zoom: f64) -> Position {
    let size = world_size(zoom);
    let lon = point.x / size * 360.0 - 180.0;
    let n = PI - 2.0 * PI * point.y / size;
    let lat = n.sinh().atan().to_degrees();
    Position { lat, lon }
}

/// Upper bound of ground meters covered by one pixel at `zoom`.
///
/// Exact at the equator; the true value shrinks with `cos(latitude)`.
pub fn meters_per_pixel(zoom: f64) -> f64 {
    EARTH_CIRCUMFERENCE_M / world_size(zoom)
}

/// Pixel distance between two projected points.
pub fn pixel_distance(a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    (a - b).norm()
}

/// Mean of projected points.
pub fn pixel_mean(sum: &Vector2<f64>, count: usize) -> Point2<f64> {
    let n = count.max(1) as f64;
    Point2::from(sum / n)
}

// ============================================================================
// GEOGRAPHIC BOUNDS
// ============================================================================

/// A latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl LatLngBounds {
    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self {
            south: rect.min().y,
            west: rect.min().x,
            north: rect.max().y,
            east: rect.max().x,
        }
    }

    pub fn center(&self) -> Position {
        Position {
            lat: (self.south + self.north) / 2.0,
            lon: (self.west + self.east) / 2.0,
        }
    }

    /// Grows the box by `ratio` of its span on every side.
    pub fn pad(&self, ratio: f64) -> Self {
        let lat_pad = (self.north - self.south) * ratio;
        let lon_pad = (self.east - self.west) * ratio;
        Self {
            south: self.south - lat_pad,
            west: self.west - lon_pad,
            north: self.north + lat_pad,
            east: self.east + lon_pad,
        }
    }

    pub fn contains(&self, position: Position) -> bool {
        (self.south..=self.north).contains(&position.lat)
            && (self.west..=self.east).contains(&position.lon)
    }

    pub fn south_west(&self) -> Position {
        Position {
            lat: self.south,
            lon: self.west,
        }
    }

    pub fn north_east(&self) -> Position {
        Position {
            lat: self.north,
            lon: self.east,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_origin_projects_to_world_center() {
        let p = project(Position { lat: 0.0, lon: 0.0 }, 0.0);
        assert_relative_eq!(p.x, 128.0, epsilon = 1e-9);
        assert_relative_eq!(p.y, 128.0, epsilon = 1e-9);
    }

    #[test]
    fn test_project_unproject_round_trip() {
        let pos = Position {
            lat: -23.5505,
            lon: -46.6333,
        };
        let back = unproject(project(pos, 12.0), 12.0);
        assert_relative_eq!(back.lat, pos.lat, epsilon = 1e-9);
        assert_relative_eq!(back.lon, pos.lon, epsilon = 1e-9);
    }

    #[test]
    fn test_each_zoom_doubles_pixel_distance() {
        let a = Position { lat: -22.90, lon: -43.20 };
        let b = Position { lat: -22.91, lon: -43.21 };
        let d10 = pixel_distance(&project(a, 10.0), &project(b, 10.0));
        let d11 = pixel_distance(&project(a, 11.0), &project(b, 11.0));
        assert_relative_eq!(d11, d10 * 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_polar_latitudes_are_clamped() {
        let p = project(Position { lat: 90.0, lon: 0.0 }, 0.0);
        assert!(p.y.is_finite());
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_meters_per_pixel_at_zoom_zero() {
        assert_relative_eq!(meters_per_pixel(0.0), 156_543.033_9, epsilon = 1e-3);
    }

    #[test]
    fn test_bounds_pad() {
        let b = LatLngBounds {
            south: -1.0,
            west: -2.0,
            north: 1.0,
            east: 2.0,
        };
        let padded = b.pad(0.1);
        assert_relative_eq!(padded.south, -1.2);
        assert_relative_eq!(padded.east, 2.4);
        assert!(padded.contains(b.center()));
    }
}
