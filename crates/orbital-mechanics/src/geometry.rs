//! Distance, reachability and latency primitives.
//!
//! All positions are kilometers in a common Cartesian frame. Latency is the
//! free-space propagation delay of an optical link.

use serde::{Deserialize, Serialize};

pub type Vector3 = nalgebra::Vector3<f64>;

/// Speed of light in vacuum (km/s)
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Mean Earth radius used for surface (great-circle) distances
const SURFACE_RADIUS_KM: f64 = 6378.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLong {
    /// Degrees
    pub latitude: f64,
    /// Degrees
    pub longitude: f64,
}

impl LatLong {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Euclidean distance between two points (km)
#[inline]
pub fn distance(a: &Vector3, b: &Vector3) -> f64 {
    (a - b).norm()
}

/// Two points can hold a link when they are at most `max_range_km` apart.
#[inline]
pub fn reachable(a: &Vector3, b: &Vector3, max_range_km: f64) -> bool {
    distance(a, b) <= max_range_km
}

/// One-way propagation latency in seconds for a link of the given length.
#[inline]
pub fn latency(distance_km: f64) -> f64 {
    distance_km / SPEED_OF_LIGHT_KM_S
}

/// One-way latency in whole milliseconds, always rounded up.
pub fn latency_ms(distance_km: f64) -> u64 {
    let ms = (latency(distance_km) * 1000.0).ceil();
    if ms.is_finite() && ms > 0.0 {
        ms as u64
    } else {
        0
    }
}

/// Great-circle distance along the surface between two points (km).
pub fn surface_distance(a: LatLong, b: LatLong) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (a.latitude - b.latitude).to_radians();
    let d_lon = (a.longitude - b.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * SURFACE_RADIUS_KM * h.sqrt().min(1.0).asin()
}
