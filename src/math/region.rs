//! Geographic regions on the WGS84 ellipsoid

use crate::core::types::{DMat3, DVec3};
use super::bounds::OrientedBox;

/// WGS84 semi-major axis in metres
pub const WGS84_RADIUS_EQUATOR: f64 = 6_378_137.0;
/// WGS84 first eccentricity squared
pub const WGS84_ECCENTRICITY_SQ: f64 = 0.006_694_379_990_14;

/// Samples per edge when wrapping a region in an oriented box
const REGION_SAMPLES: usize = 5;

/// Longitude/latitude rectangle (radians) with a height range (metres)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub min_height: f64,
    pub max_height: f64,
}

impl Region {
    /// Build from the `[west, south, east, north, minHeight, maxHeight]` layout
    pub fn from_array(values: [f64; 6]) -> Self {
        let [west, south, east, north, min_height, max_height] = values;
        Self { west, south, east, north, min_height, max_height }
    }

    /// Check ranges; returns a human readable reason on failure
    pub fn validate(&self) -> Result<(), String> {
        let values = [self.west, self.south, self.east, self.north, self.min_height, self.max_height];
        if values.iter().any(|v| !v.is_finite()) {
            return Err("region contains non-finite values".into());
        }
        let pi = std::f64::consts::PI;
        if self.west < -pi || self.west > pi || self.east < -pi || self.east > pi {
            return Err("longitude outside [-pi, pi]".into());
        }
        let half_pi = std::f64::consts::FRAC_PI_2;
        if self.south < -half_pi || self.north > half_pi || self.south > self.north {
            return Err("latitude range is inverted or outside [-pi/2, pi/2]".into());
        }
        if self.min_height > self.max_height {
            return Err("minimum height exceeds maximum height".into());
        }
        Ok(())
    }

    /// Longitude span, accounting for regions crossing the antimeridian
    pub fn width(&self) -> f64 {
        if self.east >= self.west {
            self.east - self.west
        } else {
            self.east + std::f64::consts::TAU - self.west
        }
    }

    /// Earth-centered, earth-fixed position of a geodetic coordinate
    pub fn cartographic_to_ecef(longitude: f64, latitude: f64, height: f64) -> DVec3 {
        let (sin_lat, cos_lat) = latitude.sin_cos();
        let (sin_lon, cos_lon) = longitude.sin_cos();
        let n = WGS84_RADIUS_EQUATOR / (1.0 - WGS84_ECCENTRICITY_SQ * sin_lat * sin_lat).sqrt();
        DVec3::new(
            (n + height) * cos_lat * cos_lon,
            (n + height) * cos_lat * sin_lon,
            (n * (1.0 - WGS84_ECCENTRICITY_SQ) + height) * sin_lat,
        )
    }

    /// Oriented box in ECEF enclosing the region
    ///
    /// The box is aligned to the local east/north/up frame at the region's
    /// center and fitted to a grid of samples over both height bounds, which
    /// is tight for tile-sized regions.
    pub fn to_oriented_box(&self) -> OrientedBox {
        let center_lon = self.west + self.width() * 0.5;
        let center_lat = (self.south + self.north) * 0.5;

        let (sin_lat, cos_lat) = center_lat.sin_cos();
        let (sin_lon, cos_lon) = center_lon.sin_cos();
        let up = DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);
        let east = DVec3::new(-sin_lon, cos_lon, 0.0);
        let north = up.cross(east);
        let origin = Self::cartographic_to_ecef(center_lon, center_lat, self.min_height);

        let mut min = DVec3::splat(f64::INFINITY);
        let mut max = DVec3::splat(f64::NEG_INFINITY);
        let steps = (REGION_SAMPLES - 1) as f64;
        for i in 0..REGION_SAMPLES {
            let lon = self.west + self.width() * (i as f64 / steps);
            for j in 0..REGION_SAMPLES {
                let lat = self.south + (self.north - self.south) * (j as f64 / steps);
                for height in [self.min_height, self.max_height] {
                    let d = Self::cartographic_to_ecef(lon, lat, height) - origin;
                    let local = DVec3::new(d.dot(east), d.dot(north), d.dot(up));
                    min = min.min(local);
                    max = max.max(local);
                }
            }
        }

        let local_center = (min + max) * 0.5;
        let half = (max - min) * 0.5;
        let center = origin + east * local_center.x + north * local_center.y + up * local_center.z;
        OrientedBox::new(center, DMat3::from_cols(east * half.x, north * half.y, up * half.z))
    }
}
